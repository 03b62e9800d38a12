//! # Command tracker.
//!
//! A [`Command`] is a queued, re-runnable unit of work: the user-supplied
//! argument vector plus the configuration derived from it at submission time
//! and the scheduling state the runtime maintains.
//!
//! ## Ownership rules
//! - `total_exec_time` is mutated only by the worker that owns the command
//!   for the duration of an invocation; the queue reads it only while the
//!   command is out of the queue (at insert time).
//! - Presence in the queue is exclusive of `CommandStatus::Running`.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::configuration::Configuration;
use crate::devices::DeviceRequirements;

use super::options::CommandOptions;

/// Scheduling state of a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandStatus {
    /// Waiting in the queue for a matching free device.
    Queued,
    /// Owned by a worker; an invocation is in flight.
    Running,
    /// Loop-mode pause between invocations.
    Sleeping,
    /// Finished, drained, or errored; will not run again.
    Terminated,
}

const STATUS_QUEUED: u8 = 0;
const STATUS_RUNNING: u8 = 1;
const STATUS_SLEEPING: u8 = 2;
const STATUS_TERMINATED: u8 = 3;

/// A queued, re-runnable unit of work.
pub struct Command {
    id: u64,
    args: Vec<String>,
    configuration: Arc<Configuration>,
    total_exec_time_ms: AtomicU64,
    status: AtomicU8,
    // Queue slot token: (sort_key, seq) while queued, None otherwise.
    // Managed exclusively by CommandQueue under its lock.
    pub(crate) queue_slot: Mutex<Option<(u64, u64)>>,
}

impl Command {
    /// Creates a new command with zero accumulated runtime.
    pub fn new(id: u64, args: Vec<String>, configuration: Arc<Configuration>) -> Self {
        Self {
            id,
            args,
            configuration,
            total_exec_time_ms: AtomicU64::new(0),
            status: AtomicU8::new(STATUS_QUEUED),
            queue_slot: Mutex::new(None),
        }
    }

    /// Unique command id, assigned at submission.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The user-supplied argument vector.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The configuration name (first argv token).
    pub fn name(&self) -> &str {
        &self.configuration.name
    }

    /// The configuration validated at submission time.
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// Scheduling options derived from the configuration.
    pub fn options(&self) -> &CommandOptions {
        &self.configuration.command_options
    }

    /// Device predicate used at dispatch time.
    pub fn requirements(&self) -> &DeviceRequirements {
        &self.configuration.device_requirements
    }

    /// Accumulated invocation runtime. Monotonically non-decreasing.
    pub fn total_exec_time(&self) -> Duration {
        Duration::from_millis(self.total_exec_time_ms.load(Ordering::SeqCst))
    }

    /// Adds one invocation's wall time to the accumulated runtime.
    ///
    /// Called only by the worker that owns the command.
    pub fn record_elapsed(&self, elapsed: Duration) {
        self.total_exec_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::SeqCst);
    }

    /// Current scheduling status.
    pub fn status(&self) -> CommandStatus {
        match self.status.load(Ordering::SeqCst) {
            STATUS_RUNNING => CommandStatus::Running,
            STATUS_SLEEPING => CommandStatus::Sleeping,
            STATUS_TERMINATED => CommandStatus::Terminated,
            _ => CommandStatus::Queued,
        }
    }

    /// Updates the scheduling status.
    pub fn set_status(&self, status: CommandStatus) {
        let raw = match status {
            CommandStatus::Queued => STATUS_QUEUED,
            CommandStatus::Running => STATUS_RUNNING,
            CommandStatus::Sleeping => STATUS_SLEEPING,
            CommandStatus::Terminated => STATUS_TERMINATED,
        };
        self.status.store(raw, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("status", &self.status())
            .field("total_exec_time", &self.total_exec_time())
            .finish()
    }
}
