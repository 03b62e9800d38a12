pub mod configuration;
pub mod factory;

pub use configuration::Configuration;
pub use factory::{ArgsConfigFactory, ConfigurationFactory};
