pub mod set;
pub mod subscriber;

#[cfg(feature = "logging")]
pub mod log;

pub use set::SubscriberSet;
pub use subscriber::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
