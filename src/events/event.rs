//! # Runtime events emitted by the scheduler and invocation workers.
//!
//! The [`EventKind`] enum classifies event types across five categories:
//! - **Command events**: queue membership changes (queued, requeued, removed)
//! - **Invocation events**: worker execution flow (starting, stopped, failed,
//!   interrupted, timeout)
//! - **Device events**: allocation lifecycle and health
//! - **Shutdown events**: drain, hard shutdown, grace outcome
//! - **Subscriber events**: fan-out diagnostics
//!
//! The [`Event`] struct carries additional metadata such as timestamps,
//! command name, device serial, error messages, and elapsed durations.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so events can be ordered correctly even when delivered
//! out-of-order through async channels.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Command events ===
    /// Command accepted and inserted into the queue.
    CommandQueued,
    /// Loop-mode command re-entered the queue with updated accounting.
    CommandRequeued,
    /// Command left the scheduler for good (finished, drained, or errored).
    CommandRemoved,

    // === Invocation events ===
    /// Worker is starting an invocation on a device.
    InvocationStarting,
    /// Invocation finished normally.
    InvocationStopped,
    /// Invocation failed (configuration, device, runner error, or panic).
    InvocationFailed,
    /// Invocation terminated through the cooperative interrupt path.
    InvocationInterrupted,
    /// Invocation exceeded its configured timeout.
    InvocationTimeoutHit,

    // === Device events ===
    /// Device leased to a worker.
    DeviceAllocated,
    /// Device returned to the free pool.
    DeviceReleased,
    /// Device marked unhealthy and withheld from matching.
    DeviceUnhealthy,
    /// Device battery reported below the configured cutoff.
    BatteryBelowCutoff,

    // === Shutdown events ===
    /// Graceful shutdown requested; no further commands dispatch.
    ShutdownRequested,
    /// Hard shutdown requested; active workers forced, grace window armed.
    HardShutdownRequested,
    /// All workers stopped within the hard-shutdown grace window.
    AllStoppedWithin,
    /// Grace window expired; still-live workers were escalated.
    GraceExceeded,
    /// The scheduler loop exited; no workers remain.
    SchedulerClosed,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
///
/// Carries information about command, invocation, and device lifecycles.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp (may go backwards, use for logging only).
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Name of the command (first argv token), if applicable.
    pub command: Option<String>,
    /// Serial of the device involved, if applicable.
    pub serial: Option<String>,
    /// Error message, if the event represents a failure.
    pub error: Option<String>,
    /// Invocation wall time, for completion events.
    pub elapsed: Option<Duration>,
    /// Relevant timeout or grace duration, if any.
    pub timeout: Option<Duration>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            command: None,
            serial: None,
            error: None,
            elapsed: None,
            timeout: None,
        }
    }

    /// Attaches a command name.
    pub fn with_command(mut self, name: impl Into<String>) -> Self {
        self.command = Some(name.into());
        self
    }

    /// Attaches a device serial.
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }

    /// Attaches an elapsed duration.
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        self.elapsed = Some(d);
        self
    }

    /// Attaches a timeout or grace duration.
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }
}
