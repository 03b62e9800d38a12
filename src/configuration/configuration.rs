//! # Invocation configuration.
//!
//! A [`Configuration`] is what a command's argument vector resolves to:
//! scheduling options, the device predicate, device handling options, and
//! the listener set handed to the invocation runner.

use std::sync::Arc;

use crate::commands::CommandOptions;
use crate::devices::{DeviceOptions, DeviceRequirements};
use crate::invocation::InvocationListener;

/// Everything derived from one argument vector.
#[derive(Clone)]
pub struct Configuration {
    /// Configuration name (first argv token). Used in events and logs.
    pub name: String,
    /// Scheduling options (loop mode, minimum loop time, invocation timeout).
    pub command_options: CommandOptions,
    /// Device predicate matched at dispatch time.
    pub device_requirements: DeviceRequirements,
    /// Device handling options (battery cutoff).
    pub device_options: DeviceOptions,
    /// Listeners surfaced to the invocation runner.
    pub listeners: Vec<Arc<dyn InvocationListener>>,
}

impl Configuration {
    /// Creates a configuration with the given name and default options.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command_options: CommandOptions::default(),
            device_requirements: DeviceRequirements::default(),
            device_options: DeviceOptions::default(),
            listeners: Vec::new(),
        }
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("name", &self.name)
            .field("command_options", &self.command_options)
            .field("device_requirements", &self.device_requirements)
            .field("device_options", &self.device_options)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
