//! # Global runtime configuration.
//!
//! [`SchedulerConfig`] defines the scheduler's behavior: hard-shutdown grace
//! period, loop polling cadence, watchdog intervals, escalation window,
//! bus capacity, and dispatch scan width.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use labvisor::SchedulerConfig;
//!
//! let mut cfg = SchedulerConfig::default();
//! cfg.shutdown_timeout = Duration::from_secs(10);
//! cfg.battery_poll_interval = Duration::from_millis(500);
//!
//! assert_eq!(cfg.shutdown_timeout, Duration::from_secs(10));
//! ```

use std::time::Duration;

/// Global configuration for the command scheduler.
///
/// Controls shutdown grace, loop cadence, watchdog timing, and event bus sizing.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Grace window after `shutdown_hard` before still-live workers are
    /// escalated to forced termination.
    pub shutdown_timeout: Duration,
    /// Upper bound on how long the scheduler loop sleeps between passes when
    /// no wakeup arrives.
    pub poll_interval: Duration,
    /// How often a worker's battery watchdog probes the device, when a
    /// battery cutoff is configured.
    pub battery_poll_interval: Duration,
    /// Cooperative window between setting `forced` and escalating to the
    /// kill signal (invocation-timeout path and post-grace teardown).
    pub escalation_grace: Duration,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
    /// Minimum number of head-of-queue candidates examined per dispatch pass.
    /// The effective scan width is the larger of this and the free device count.
    pub dispatch_scan: usize,
}

impl Default for SchedulerConfig {
    /// Provides a default configuration:
    /// - `shutdown_timeout = 30s`
    /// - `poll_interval = 250ms`
    /// - `battery_poll_interval = 1s`
    /// - `escalation_grace = 2s`
    /// - `bus_capacity = 1024`
    /// - `dispatch_scan = 4`
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
            battery_poll_interval: Duration::from_secs(1),
            escalation_grace: Duration::from_secs(2),
            bus_capacity: 1024,
            dispatch_scan: 4,
        }
    }
}
