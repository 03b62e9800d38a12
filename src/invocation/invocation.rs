//! # Invocation runner seam.
//!
//! Defines the contract between the scheduler and the opaque work it runs:
//!
//! - **[`Invocation`]** — trait for the runner itself (flashing, test
//!   execution, result reporting live behind it)
//! - **[`InvocationFn`]** — function-backed implementation that wraps
//!   closures as runners
//! - **[`InvocationContext`]** — what a runner receives: the device, the
//!   freshly loaded configuration, the interrupt-aware suspension helpers,
//!   and the rescheduler
//! - **[`Rescheduler`]** — callback allowing a runner to enqueue derived
//!   commands
//! - **[`InvocationListener`]** — lifecycle hooks carried on the
//!   configuration
//!
//! ## Rules
//! - Runners may take seconds to hours; every sleep or wait **must** go
//!   through the context helpers so cooperative interruption works. A helper
//!   raises [`InvocationError::Interrupted`] instead of returning when
//!   termination was requested inside an interruptible region.
//! - Runners start non-interruptible. Call
//!   [`set_interruptible(true)`](InvocationContext::set_interruptible) once
//!   critical setup is done.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::configuration::Configuration;
use crate::devices::DeviceHandle;
use crate::error::InvocationError;
use crate::interrupt::InterruptToken;

/// One execution of a command on one device.
///
/// The scheduler treats the runner as opaque work; the worker owns the
/// error boundary around it.
#[async_trait]
pub trait Invocation: Send + Sync + 'static {
    /// Runs the invocation to completion, cooperative interruption included.
    async fn invoke(&self, ctx: InvocationContext) -> Result<(), InvocationError>;
}

/// Lifecycle hooks surfaced to result-reporting integrations.
///
/// All methods default to no-ops; implement what you need.
pub trait InvocationListener: Send + Sync + 'static {
    /// Called when a worker starts an invocation on a device.
    fn on_invocation_started(&self, configuration: &str, serial: &str) {
        let _ = (configuration, serial);
    }

    /// Called when the invocation finishes, with the error if it failed.
    fn on_invocation_finished(
        &self,
        configuration: &str,
        serial: &str,
        error: Option<&InvocationError>,
    ) {
        let _ = (configuration, serial, error);
    }
}

/// Callback allowing a runner to split work and enqueue derived commands.
///
/// Returns false when the scheduler is shutting down or the argument vector
/// is rejected.
pub trait Rescheduler: Send + Sync + 'static {
    /// Enqueues a derived command.
    fn reschedule(&self, args: &[String]) -> bool;
}

/// Everything a runner receives for one invocation.
///
/// Cloneable so runners can hand it to helper tasks; all clones share the
/// same interrupt state.
#[derive(Clone)]
pub struct InvocationContext {
    device: DeviceHandle,
    configuration: Arc<Configuration>,
    interrupt: Arc<InterruptToken>,
    rescheduler: Arc<dyn Rescheduler>,
}

impl InvocationContext {
    pub(crate) fn new(
        device: DeviceHandle,
        configuration: Arc<Configuration>,
        interrupt: Arc<InterruptToken>,
        rescheduler: Arc<dyn Rescheduler>,
    ) -> Self {
        Self {
            device,
            configuration,
            interrupt,
            rescheduler,
        }
    }

    /// The device leased to this invocation.
    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    /// The configuration loaded for this invocation.
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// Listeners carried on the configuration.
    pub fn listeners(&self) -> &[Arc<dyn InvocationListener>] {
        &self.configuration.listeners
    }

    /// Marks (or unmarks) the current region as interruption-safe.
    pub fn set_interruptible(&self, allowed: bool) {
        self.interrupt.set_interruptible(allowed);
    }

    /// True if the invocation currently honors cooperative interrupts.
    pub fn is_interruptible(&self) -> bool {
        self.interrupt.is_interruptible()
    }

    /// Checks for a pending interrupt without suspending.
    pub fn check_interrupted(&self) -> Result<(), InvocationError> {
        self.interrupt.check().map_err(Into::into)
    }

    /// Sleeps as a suspension point: raises
    /// [`InvocationError::Interrupted`] instead of completing when
    /// termination was requested.
    pub async fn sleep(&self, dur: std::time::Duration) -> Result<(), InvocationError> {
        self.interrupt.sleep(dur).await.map_err(Into::into)
    }

    /// Runs any future as a suspension point (device I/O, waits).
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, InvocationError> {
        self.interrupt.guard(fut).await.map_err(Into::into)
    }

    /// Enqueues a derived command through the scheduler.
    pub fn reschedule(&self, args: &[String]) -> bool {
        self.rescheduler.reschedule(args)
    }
}

/// Function-backed invocation runner.
///
/// Wraps a closure that *creates* a new future per invocation.
///
/// ## Example
/// ```rust
/// use labvisor::{InvocationContext, InvocationError, InvocationFn};
///
/// let runner = InvocationFn::arc(|ctx: InvocationContext| async move {
///     ctx.set_interruptible(true);
///     ctx.sleep(std::time::Duration::from_millis(100)).await?;
///     Ok::<(), InvocationError>(())
/// });
/// ```
pub struct InvocationFn<F> {
    f: F,
}

impl<F> InvocationFn<F> {
    /// Creates a new function-backed runner.
    ///
    /// Prefer [`InvocationFn::arc`] when you immediately need an
    /// `Arc<dyn Invocation>`.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the runner and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Invocation for InvocationFn<F>
where
    F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), InvocationError>> + Send + 'static,
{
    async fn invoke(&self, ctx: InvocationContext) -> Result<(), InvocationError> {
        (self.f)(ctx).await
    }
}
