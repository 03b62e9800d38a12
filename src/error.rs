//! # Error types used by the labvisor runtime and invocations.
//!
//! This module defines three error enums, one per layer:
//!
//! - [`SchedulerError`] errors raised by the scheduling runtime itself.
//! - [`ConfigurationError`] errors raised while turning an argv into a
//!   [`Configuration`](crate::Configuration).
//! - [`InvocationError`] errors raised by individual invocations.
//!
//! All types provide `as_label` helpers for logs/metrics.

use thiserror::Error;

use crate::interrupt::{InterruptCause, Interrupted};

/// # Errors produced by the scheduling runtime.
///
/// These represent failures of control operations, not of invocations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// A command was submitted after shutdown was requested.
    #[error("scheduler is shutting down; no new commands accepted")]
    ShuttingDown,

    /// The configuration factory rejected the argument vector.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl SchedulerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SchedulerError::ShuttingDown => "scheduler_shutting_down",
            SchedulerError::Configuration(_) => "scheduler_bad_configuration",
        }
    }
}

/// # Errors produced while parsing command arguments.
///
/// Surfaced synchronously from `add_command`; the command is never queued.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The argument vector was empty or started with a flag.
    #[error("missing configuration name in argument vector")]
    MissingName,

    /// An option was not recognized by the factory.
    #[error("unknown option '{option}'")]
    UnknownOption { option: String },

    /// An option that requires a value was given none.
    #[error("option '{option}' requires a value")]
    MissingValue { option: String },

    /// An option value failed to parse.
    #[error("invalid value '{value}' for option '{option}'")]
    InvalidValue { option: String, value: String },
}

impl ConfigurationError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigurationError::MissingName => "config_missing_name",
            ConfigurationError::UnknownOption { .. } => "config_unknown_option",
            ConfigurationError::MissingValue { .. } => "config_missing_value",
            ConfigurationError::InvalidValue { .. } => "config_invalid_value",
        }
    }
}

/// # Errors produced by invocation execution.
///
/// Returned by [`Invocation::invoke`](crate::Invocation::invoke). The worker
/// is the error boundary: none of these propagate to the scheduler loop.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum InvocationError {
    /// The invocation was interrupted cooperatively (or by escalation).
    ///
    /// This is **not an error** in the traditional sense, but signals
    /// intentional termination. The command is never requeued.
    #[error("invocation interrupted ({})", cause.as_label())]
    Interrupted {
        /// What requested the interruption.
        cause: InterruptCause,
    },

    /// The device became unusable mid-invocation.
    ///
    /// Terminal for the worker; the device is marked unhealthy and the
    /// command is not requeued regardless of loop mode.
    #[error("device '{serial}' not available: {reason}")]
    DeviceNotAvailable { serial: String, reason: String },

    /// The runner failed for any other reason.
    #[error("invocation failed: {reason}")]
    Failed { reason: String },
}

impl InvocationError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            InvocationError::Interrupted { .. } => "invocation_interrupted",
            InvocationError::DeviceNotAvailable { .. } => "invocation_device_not_available",
            InvocationError::Failed { .. } => "invocation_failed",
        }
    }

    /// True if this is the cooperative-interruption outcome.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, InvocationError::Interrupted { .. })
    }
}

impl From<Interrupted> for InvocationError {
    fn from(e: Interrupted) -> Self {
        InvocationError::Interrupted { cause: e.cause }
    }
}
