//! Per-command device handling options.

/// Options governing how a worker treats its device during an invocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceOptions {
    /// Battery level (0–100) below which the invocation is asked to stop.
    ///
    /// When set, a per-worker watchdog polls the device's reported battery
    /// and requests cooperative termination once it drops below the cutoff.
    pub cutoff_battery: Option<u8>,
}
