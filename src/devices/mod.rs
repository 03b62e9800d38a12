pub mod device;
pub mod manager;
pub mod options;
pub mod pool;
pub mod requirements;

pub use device::{DeviceHandle, DeviceState};
pub use manager::DeviceManager;
pub use options::DeviceOptions;
pub use pool::DevicePool;
pub use requirements::{DeviceKind, DeviceRequirements};
