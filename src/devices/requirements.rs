//! # Capability-based device matching.
//!
//! [`DeviceRequirements`] is the predicate a command carries: the scheduler
//! dispatches a command only onto a free device that satisfies every listed
//! constraint. The battery predicate is evaluated lazily — the device is
//! probed only when `min_battery` is set, and devices that have never
//! reported a level pass the check.

use super::device::{DeviceHandle, DeviceState};

/// Physical/emulator preference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeviceKind {
    /// No preference (default).
    #[default]
    Any,
    /// Physical devices only.
    Physical,
    /// Emulators only.
    Emulator,
}

/// Capability predicate matched against free devices at dispatch time.
#[derive(Clone, Debug, Default)]
pub struct DeviceRequirements {
    /// Allowlist of serials; empty means any serial.
    pub serials: Vec<String>,
    /// Allowlist of product types; empty means any product.
    pub product_types: Vec<String>,
    /// Physical/emulator preference.
    pub kind: DeviceKind,
    /// Minimum reported battery level, 0–100.
    pub min_battery: Option<u8>,
}

impl DeviceRequirements {
    /// True if the device satisfies every predicate.
    ///
    /// Only online devices ever match.
    pub fn matches(&self, device: &DeviceHandle) -> bool {
        if device.state() != DeviceState::Online {
            return false;
        }
        if !self.serials.is_empty() && !self.serials.iter().any(|s| s == device.serial()) {
            return false;
        }
        if !self.product_types.is_empty()
            && !self.product_types.iter().any(|p| p == device.product_type())
        {
            return false;
        }
        match self.kind {
            DeviceKind::Any => {}
            DeviceKind::Physical if device.is_emulator() => return false,
            DeviceKind::Emulator if !device.is_emulator() => return false,
            _ => {}
        }
        if let Some(min) = self.min_battery {
            // Unknown battery passes; the predicate only filters devices
            // that actually report a level below the threshold.
            if let Some(level) = device.battery_level() {
                if level < min {
                    return false;
                }
            }
        }
        true
    }
}
