//! # LogWriter — simple event logger
//!
//! A minimal subscriber that forwards incoming [`Event`]s to `tracing`.
//! Use it for demos or as a reference for custom subscribers.
//!
//! Enabled via the `logging` feature.

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
pub struct LogWriter;

impl LogWriter {
    /// Constructs a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::CommandQueued => {
                tracing::info!(command = ?e.command, "command queued");
            }
            EventKind::CommandRequeued => {
                tracing::info!(command = ?e.command, elapsed = ?e.elapsed, "command requeued");
            }
            EventKind::CommandRemoved => {
                tracing::info!(command = ?e.command, "command removed");
            }
            EventKind::InvocationStarting => {
                tracing::info!(command = ?e.command, serial = ?e.serial, "invocation starting");
            }
            EventKind::InvocationStopped => {
                tracing::info!(command = ?e.command, elapsed = ?e.elapsed, "invocation stopped");
            }
            EventKind::InvocationFailed => {
                tracing::warn!(command = ?e.command, err = ?e.error, "invocation failed");
            }
            EventKind::InvocationInterrupted => {
                tracing::info!(command = ?e.command, err = ?e.error, "invocation interrupted");
            }
            EventKind::InvocationTimeoutHit => {
                tracing::warn!(command = ?e.command, timeout = ?e.timeout, "invocation timeout");
            }
            EventKind::DeviceAllocated => {
                tracing::debug!(serial = ?e.serial, command = ?e.command, "device allocated");
            }
            EventKind::DeviceReleased => {
                tracing::debug!(serial = ?e.serial, "device released");
            }
            EventKind::DeviceUnhealthy => {
                tracing::warn!(serial = ?e.serial, err = ?e.error, "device unhealthy");
            }
            EventKind::BatteryBelowCutoff => {
                tracing::warn!(serial = ?e.serial, err = ?e.error, "battery below cutoff");
            }
            EventKind::ShutdownRequested => {
                tracing::info!("shutdown requested");
            }
            EventKind::HardShutdownRequested => {
                tracing::info!(timeout = ?e.timeout, "hard shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                tracing::info!("all workers stopped within grace");
            }
            EventKind::GraceExceeded => {
                tracing::warn!(timeout = ?e.timeout, command = ?e.command, "grace exceeded");
            }
            EventKind::SchedulerClosed => {
                tracing::info!("scheduler closed");
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(err = ?e.error, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
