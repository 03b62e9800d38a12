//! # Device handles.
//!
//! [`DeviceHandle`] is a cloneable reference to one managed device. The
//! underlying record (serial, product type, health state, reported battery)
//! is shared; exclusivity of the *lease* is enforced by the device manager,
//! not by the handle itself.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

/// Health/connectivity state of a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    /// Connected and usable; eligible for allocation.
    Online,
    /// Temporarily disconnected; not eligible for allocation.
    Offline,
    /// Marked bad after a device failure; withheld from allocation.
    Unhealthy,
}

struct DeviceRecord {
    serial: String,
    product_type: String,
    emulator: bool,
    // AtomicU8-encoded DeviceState so reads never block allocation.
    state: AtomicU8,
    battery: Mutex<Option<u8>>,
}

const STATE_ONLINE: u8 = 0;
const STATE_OFFLINE: u8 = 1;
const STATE_UNHEALTHY: u8 = 2;

fn encode(state: DeviceState) -> u8 {
    match state {
        DeviceState::Online => STATE_ONLINE,
        DeviceState::Offline => STATE_OFFLINE,
        DeviceState::Unhealthy => STATE_UNHEALTHY,
    }
}

fn decode(raw: u8) -> DeviceState {
    match raw {
        STATE_OFFLINE => DeviceState::Offline,
        STATE_UNHEALTHY => DeviceState::Unhealthy,
        _ => DeviceState::Online,
    }
}

/// Opaque, cloneable reference to one managed device.
///
/// Battery is a *reported* value: external probing (or a test) stores it via
/// [`set_battery`](DeviceHandle::set_battery) and requirement matching reads
/// it lazily. A device that has never reported battery yields `None`.
#[derive(Clone)]
pub struct DeviceHandle {
    record: Arc<DeviceRecord>,
}

impl DeviceHandle {
    /// Creates a new online, physical device with the given serial.
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            record: Arc::new(DeviceRecord {
                serial: serial.into(),
                product_type: String::new(),
                emulator: false,
                state: AtomicU8::new(STATE_ONLINE),
                battery: Mutex::new(None),
            }),
        }
    }

    /// Sets the product type. Builder style; only meaningful before the
    /// handle is cloned or registered with a manager.
    pub fn with_product_type(mut self, product_type: impl Into<String>) -> Self {
        if let Some(record) = Arc::get_mut(&mut self.record) {
            record.product_type = product_type.into();
        }
        self
    }

    /// Marks the device as an emulator. Builder style; only meaningful before
    /// the handle is cloned or registered with a manager.
    pub fn emulator(mut self) -> Self {
        if let Some(record) = Arc::get_mut(&mut self.record) {
            record.emulator = true;
        }
        self
    }

    /// Returns the device serial number.
    pub fn serial(&self) -> &str {
        &self.record.serial
    }

    /// Returns the product type ("" if unknown).
    pub fn product_type(&self) -> &str {
        &self.record.product_type
    }

    /// True if the device is an emulator.
    pub fn is_emulator(&self) -> bool {
        self.record.emulator
    }

    /// Returns the current health state.
    pub fn state(&self) -> DeviceState {
        decode(self.record.state.load(Ordering::SeqCst))
    }

    /// Updates the health state.
    pub fn set_state(&self, state: DeviceState) {
        self.record.state.store(encode(state), Ordering::SeqCst);
    }

    /// Returns the last reported battery level, if any.
    pub fn battery_level(&self) -> Option<u8> {
        *self.record.battery.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stores a reported battery level (or clears it with `None`).
    pub fn set_battery(&self, level: Option<u8>) {
        *self.record.battery.lock().unwrap_or_else(|e| e.into_inner()) = level;
    }

    /// True if both handles refer to the same device record.
    pub fn same_device(&self, other: &DeviceHandle) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("serial", &self.record.serial)
            .field("product_type", &self.record.product_type)
            .field("emulator", &self.record.emulator)
            .field("state", &self.state())
            .field("battery", &self.battery_level())
            .finish()
    }
}
