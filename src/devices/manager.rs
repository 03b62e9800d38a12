//! # Device manager seam.
//!
//! [`DeviceManager`] is the thin mediator the scheduler talks to for device
//! inventory. Allocation is atomic and exclusive: no two workers ever hold
//! the same device simultaneously. The scheduler loop subscribes to
//! [`subscribe_state`](DeviceManager::subscribe_state) so it can wake on
//! availability changes instead of polling.
//!
//! [`DevicePool`](crate::DevicePool) is the bundled in-memory implementation;
//! production deployments put a real inventory service behind this trait.

use async_trait::async_trait;
use tokio::sync::watch;

use super::device::DeviceHandle;
use super::requirements::DeviceRequirements;

/// Mediator over a device inventory.
#[async_trait]
pub trait DeviceManager: Send + Sync + 'static {
    /// Atomically leases a free device matching all predicates.
    ///
    /// Returns `None` without blocking when nothing matches.
    async fn allocate(&self, requirements: &DeviceRequirements) -> Option<DeviceHandle>;

    /// Returns a leased device to the free pool.
    async fn release(&self, device: DeviceHandle);

    /// Marks a device unhealthy so it is withheld from future matching.
    ///
    /// The lease (if any) must still be released separately.
    async fn mark_unhealthy(&self, device: &DeviceHandle);

    /// Number of devices currently free and eligible for allocation.
    fn free_count(&self) -> usize;

    /// Notification channel that ticks whenever availability changes.
    ///
    /// The carried value is a generation counter; only the change matters.
    fn subscribe_state(&self) -> watch::Receiver<u64>;
}
