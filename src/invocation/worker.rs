//! # Invocation worker.
//!
//! One worker task per dispatched (command, device) pair.
//!
//! ```text
//!   STARTING ──► RUNNING ──► STOPPING ──► done
//!      │            │            │
//!  load config   runner +     record elapsed,
//!  (may fail)    watchdogs    release device,
//!                             requeue iff loop-mode && scheduler open
//! ```
//!
//! The worker is the error boundary: configuration failures, device loss,
//! runner errors, interruption, and panics all end here. Nothing propagates
//! to the scheduler loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::commands::{Command, CommandQueue, CommandStatus};
use crate::config::SchedulerConfig;
use crate::configuration::{Configuration, ConfigurationFactory};
use crate::devices::{DeviceHandle, DeviceManager};
use crate::error::InvocationError;
use crate::events::{Bus, Event, EventKind};
use crate::interrupt::{InterruptCause, InterruptToken};
use crate::scheduler::SchedulerState;

use super::invocation::{Invocation, InvocationContext, Rescheduler};

pub(crate) struct InvocationWorker {
    pub command: Arc<Command>,
    pub device: DeviceHandle,
    pub interrupt: Arc<InterruptToken>,
    pub factory: Arc<dyn ConfigurationFactory>,
    pub devices: Arc<dyn DeviceManager>,
    pub invocation: Arc<dyn Invocation>,
    pub rescheduler: Arc<dyn Rescheduler>,
    pub queue: Arc<CommandQueue>,
    pub bus: Bus,
    pub config: SchedulerConfig,
    pub state_rx: watch::Receiver<SchedulerState>,
}

impl InvocationWorker {
    pub(crate) async fn run(self) {
        let name = self.command.name().to_string();
        let serial = self.device.serial().to_string();

        // STARTING: each invocation runs against freshly loaded configuration.
        let configuration = match self.factory.create_configuration_from_args(self.command.args())
        {
            Ok(configuration) => Arc::new(configuration),
            Err(e) => {
                self.bus.publish(
                    Event::now(EventKind::InvocationFailed)
                        .with_command(&name)
                        .with_serial(&serial)
                        .with_error(e.to_string()),
                );
                self.finish_command(&name);
                self.release_device(&serial).await;
                return;
            }
        };

        self.bus.publish(
            Event::now(EventKind::InvocationStarting)
                .with_command(&name)
                .with_serial(&serial),
        );
        for listener in &configuration.listeners {
            listener.on_invocation_started(&configuration.name, &serial);
        }

        // RUNNING
        let watchdogs = self.spawn_watchdogs(&configuration, &name);
        let ctx = InvocationContext::new(
            self.device.clone(),
            Arc::clone(&configuration),
            Arc::clone(&self.interrupt),
            Arc::clone(&self.rescheduler),
        );
        let invocation = Arc::clone(&self.invocation);
        let started = Instant::now();
        let mut inner = tokio::spawn(async move { invocation.invoke(ctx).await });

        let joined = tokio::select! {
            res = &mut inner => res,
            _ = self.interrupt.escalated() => {
                // Escalation makes every suspension point raise; give the
                // runner one bounded window to notice before tearing the
                // task down.
                match time::timeout(self.config.escalation_grace, &mut inner).await {
                    Ok(res) => res,
                    Err(_) => {
                        inner.abort();
                        (&mut inner).await
                    }
                }
            }
        };
        let elapsed = started.elapsed();
        for watchdog in watchdogs {
            watchdog.abort();
        }

        let outcome: Result<(), InvocationError> = match joined {
            Ok(res) => res,
            Err(join_err) if join_err.is_cancelled() => Err(InvocationError::Interrupted {
                cause: self.interrupt.cause().unwrap_or(InterruptCause::Shutdown),
            }),
            Err(join_err) => Err(InvocationError::Failed {
                reason: format!("invocation panicked: {join_err}"),
            }),
        };

        for listener in &configuration.listeners {
            listener.on_invocation_finished(&configuration.name, &serial, outcome.as_ref().err());
        }

        // STOPPING
        self.command.record_elapsed(elapsed);
        match &outcome {
            Ok(()) => {
                self.bus.publish(
                    Event::now(EventKind::InvocationStopped)
                        .with_command(&name)
                        .with_serial(&serial)
                        .with_elapsed(elapsed),
                );
            }
            Err(err @ InvocationError::Interrupted { .. }) => {
                self.bus.publish(
                    Event::now(EventKind::InvocationInterrupted)
                        .with_command(&name)
                        .with_serial(&serial)
                        .with_elapsed(elapsed)
                        .with_error(err.to_string()),
                );
            }
            Err(err @ InvocationError::DeviceNotAvailable { .. }) => {
                self.bus.publish(
                    Event::now(EventKind::InvocationFailed)
                        .with_command(&name)
                        .with_serial(&serial)
                        .with_error(err.to_string()),
                );
                self.devices.mark_unhealthy(&self.device).await;
                self.bus.publish(
                    Event::now(EventKind::DeviceUnhealthy)
                        .with_serial(&serial)
                        .with_error(err.to_string()),
                );
            }
            Err(err) => {
                tracing::warn!(command = %name, serial = %serial, %err, "invocation failed");
                self.bus.publish(
                    Event::now(EventKind::InvocationFailed)
                        .with_command(&name)
                        .with_serial(&serial)
                        .with_error(err.to_string()),
                );
            }
        }

        self.release_device(&serial).await;

        if outcome.is_ok() && self.command.options().loop_mode && self.scheduler_open() {
            self.loop_pause(elapsed).await;
            if self.scheduler_open() {
                self.bus.publish(
                    Event::now(EventKind::CommandRequeued)
                        .with_command(&name)
                        .with_elapsed(self.command.total_exec_time()),
                );
                self.queue.add(Arc::clone(&self.command));
                return;
            }
        }
        self.finish_command(&name);
    }

    fn scheduler_open(&self) -> bool {
        *self.state_rx.borrow() == SchedulerState::Open
    }

    /// Loop-mode pause: sleep out the remainder of the minimum loop time,
    /// waking early if the scheduler leaves the Open state.
    async fn loop_pause(&self, elapsed: Duration) {
        let pause = self
            .command
            .options()
            .min_loop_time
            .saturating_sub(elapsed);
        if pause.is_zero() {
            return;
        }
        self.command.set_status(CommandStatus::Sleeping);
        let mut rx = self.state_rx.clone();
        tokio::select! {
            _ = time::sleep(pause) => {}
            _ = rx.wait_for(|s| *s != SchedulerState::Open) => {}
        }
    }

    fn finish_command(&self, name: &str) {
        self.command.set_status(CommandStatus::Terminated);
        self.bus
            .publish(Event::now(EventKind::CommandRemoved).with_command(name));
    }

    async fn release_device(&self, serial: &str) {
        self.devices.release(self.device.clone()).await;
        self.bus
            .publish(Event::now(EventKind::DeviceReleased).with_serial(serial));
    }

    /// Arms the per-invocation watchdogs: the wall-clock timeout and the
    /// battery cutoff monitor. Both request cooperative termination; the
    /// timeout path escalates after the secondary grace.
    fn spawn_watchdogs(&self, configuration: &Configuration, name: &str) -> Vec<JoinHandle<()>> {
        let mut watchdogs = Vec::new();

        if let Some(timeout) = configuration.command_options.invocation_timeout {
            let interrupt = Arc::clone(&self.interrupt);
            let bus = self.bus.clone();
            let grace = self.config.escalation_grace;
            let command = name.to_string();
            watchdogs.push(tokio::spawn(async move {
                time::sleep(timeout).await;
                bus.publish(
                    Event::now(EventKind::InvocationTimeoutHit)
                        .with_command(&command)
                        .with_timeout(timeout),
                );
                interrupt.force(InterruptCause::InvocationTimeout);
                time::sleep(grace).await;
                interrupt.escalate();
            }));
        }

        if let Some(cutoff) = configuration.device_options.cutoff_battery {
            let interrupt = Arc::clone(&self.interrupt);
            let bus = self.bus.clone();
            let device = self.device.clone();
            let interval = self.config.battery_poll_interval;
            watchdogs.push(tokio::spawn(async move {
                loop {
                    if let Some(level) = device.battery_level() {
                        if level < cutoff {
                            bus.publish(
                                Event::now(EventKind::BatteryBelowCutoff)
                                    .with_serial(device.serial())
                                    .with_error(format!(
                                        "battery {level} below cutoff {cutoff}"
                                    )),
                            );
                            interrupt.force(InterruptCause::BatteryLow);
                            return;
                        }
                    }
                    time::sleep(interval).await;
                }
            }));
        }

        watchdogs
    }
}
