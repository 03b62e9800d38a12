//! Per-command scheduling options.

use std::time::Duration;

/// Options controlling how a command is scheduled and re-scheduled.
#[derive(Clone, Copy, Debug)]
pub struct CommandOptions {
    /// Re-enqueue the command after each invocation with updated accounting.
    pub loop_mode: bool,
    /// Minimum interval between loop-mode invocations. The worker sleeps
    /// `max(0, min_loop_time - elapsed)` before requeueing.
    pub min_loop_time: Duration,
    /// Per-invocation wall-clock limit (`None` = unlimited).
    pub invocation_timeout: Option<Duration>,
}

impl Default for CommandOptions {
    /// Provides defaults matching a one-shot command:
    /// - `loop_mode = false`
    /// - `min_loop_time = 10s`
    /// - `invocation_timeout = None`
    fn default() -> Self {
        Self {
            loop_mode: false,
            min_loop_time: Duration::from_secs(10),
            invocation_timeout: None,
        }
    }
}
