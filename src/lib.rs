//! # labvisor
//!
//! **Labvisor** is a device-lab command scheduling library.
//!
//! It continuously dispatches pending test-invocation commands onto a pool
//! of managed devices, enforcing fairness by accumulated runtime, honoring
//! cooperative interruption, and terminating invocations under bounded
//! shutdown and per-invocation timeouts. The crate is designed as the core
//! of a test-harness automation system; configuration resolution, the
//! actual invocation logic, and device discovery stay behind seams.
//!
//! ## Features
//!
//! | Area               | Description                                                        | Key types / traits                            |
//! |--------------------|--------------------------------------------------------------------|-----------------------------------------------|
//! | **Scheduling**     | Accumulated-runtime fair queue, loop-mode requeue, device matching. | [`CommandScheduler`], [`SchedulerConfig`]     |
//! | **Devices**        | Capability-matched exclusive allocation over an inventory seam.    | [`DeviceManager`], [`DevicePool`], [`DeviceHandle`] |
//! | **Invocations**    | Opaque runners with interrupt-aware suspension helpers.            | [`Invocation`], [`InvocationFn`], [`InvocationContext`] |
//! | **Interruption**   | Cooperative flags with bounded escalation.                         | [`InterruptToken`], [`InterruptCause`]        |
//! | **Configuration**  | Argv in, validated configuration out.                              | [`ConfigurationFactory`], [`ArgsConfigFactory`] |
//! | **Observability**  | Event bus with isolated subscriber fan-out.                        | [`Event`], [`Subscribe`], [`SubscriberSet`]   |
//! | **Errors**         | Typed errors per layer.                                            | [`SchedulerError`], [`InvocationError`]       |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber _(demo/reference only)_.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use labvisor::{
//!     ArgsConfigFactory, CommandScheduler, DeviceHandle, DevicePool, InvocationContext,
//!     InvocationError, InvocationFn, SchedulerConfig,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Devices the scheduler may dispatch onto.
//!     let pool = Arc::new(DevicePool::with_devices([DeviceHandle::new("lab-0")]));
//!
//!     // The invocation runner: opaque work using the context's suspension
//!     // helpers so cooperative interruption works.
//!     let runner = InvocationFn::arc(|ctx: InvocationContext| async move {
//!         ctx.set_interruptible(true);
//!         ctx.sleep(Duration::from_millis(100)).await?;
//!         Ok::<(), InvocationError>(())
//!     });
//!
//!     let scheduler = CommandScheduler::new(
//!         SchedulerConfig::default(),
//!         Arc::new(ArgsConfigFactory::new()),
//!         pool,
//!         runner,
//!     );
//!     scheduler.start();
//!     scheduler.add_command(&["smoke".into()])?;
//!
//!     scheduler.shutdown();
//!     scheduler.join(Duration::from_secs(30)).await;
//!     Ok(())
//! }
//! ```
//!
//! ---

mod commands;
mod config;
mod configuration;
mod devices;
mod error;
mod events;
mod interrupt;
mod invocation;
mod scheduler;
mod subscribers;

// ---- Public re-exports ----

pub use commands::{Command, CommandOptions, CommandQueue, CommandStatus};
pub use config::SchedulerConfig;
pub use configuration::{ArgsConfigFactory, Configuration, ConfigurationFactory};
pub use devices::{
    DeviceHandle, DeviceKind, DeviceManager, DeviceOptions, DevicePool, DeviceRequirements,
    DeviceState,
};
pub use error::{ConfigurationError, InvocationError, SchedulerError};
pub use events::{Bus, Event, EventKind};
pub use interrupt::{InterruptCause, InterruptToken, Interrupted};
pub use invocation::{Invocation, InvocationContext, InvocationFn, InvocationListener, Rescheduler};
pub use scheduler::{CommandScheduler, SchedulerState};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logging subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
