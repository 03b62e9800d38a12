//! # In-memory device pool.
//!
//! [`DevicePool`] is the bundled [`DeviceManager`] implementation: a mutex-
//! guarded table of devices with lease bits and a watch channel that ticks on
//! every availability change. Tests and demos register stub devices directly;
//! nothing here talks to real hardware.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use super::device::{DeviceHandle, DeviceState};
use super::manager::DeviceManager;
use super::requirements::DeviceRequirements;

struct Slot {
    device: DeviceHandle,
    leased: bool,
}

/// Mutex-guarded in-memory device inventory.
pub struct DevicePool {
    slots: Mutex<Vec<Slot>>,
    state_tx: watch::Sender<u64>,
}

impl DevicePool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(0);
        Self {
            slots: Mutex::new(Vec::new()),
            state_tx,
        }
    }

    /// Creates a pool seeded with the given devices.
    pub fn with_devices(devices: impl IntoIterator<Item = DeviceHandle>) -> Self {
        let pool = Self::new();
        for device in devices {
            pool.add_device(device);
        }
        pool
    }

    /// Registers a device. Duplicate serials are rejected silently.
    pub fn add_device(&self, device: DeviceHandle) {
        let mut slots = self.lock_slots();
        if slots.iter().any(|s| s.device.serial() == device.serial()) {
            return;
        }
        slots.push(Slot {
            device,
            leased: false,
        });
        drop(slots);
        self.bump();
    }

    /// Removes every device, including leased ones.
    pub fn clear(&self) {
        self.lock_slots().clear();
        self.bump();
    }

    /// Total number of registered devices.
    pub fn device_count(&self) -> usize {
        self.lock_slots().len()
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        self.state_tx.send_modify(|generation| *generation += 1);
    }
}

impl Default for DevicePool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceManager for DevicePool {
    async fn allocate(&self, requirements: &DeviceRequirements) -> Option<DeviceHandle> {
        let mut slots = self.lock_slots();
        let slot = slots
            .iter_mut()
            .find(|s| !s.leased && requirements.matches(&s.device))?;
        slot.leased = true;
        let device = slot.device.clone();
        drop(slots);
        self.bump();
        Some(device)
    }

    async fn release(&self, device: DeviceHandle) {
        let mut slots = self.lock_slots();
        if let Some(slot) = slots.iter_mut().find(|s| s.device.same_device(&device)) {
            slot.leased = false;
        }
        drop(slots);
        self.bump();
    }

    async fn mark_unhealthy(&self, device: &DeviceHandle) {
        device.set_state(DeviceState::Unhealthy);
        self.bump();
    }

    fn free_count(&self) -> usize {
        self.lock_slots()
            .iter()
            .filter(|s| !s.leased && s.device.state() == DeviceState::Online)
            .count()
    }

    fn subscribe_state(&self) -> watch::Receiver<u64> {
        self.state_tx.subscribe()
    }
}
