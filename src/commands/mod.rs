pub mod command;
pub mod options;
pub mod queue;

pub use command::{Command, CommandStatus};
pub use options::CommandOptions;
pub use queue::CommandQueue;
