//! # Command scheduler.
//!
//! [`CommandScheduler`] is the coordinator of the whole crate: it owns the
//! command queue, talks to the device manager, spawns one invocation worker
//! per dispatched (command, device) pair, and drives the three termination
//! paths (graceful drain, hard shutdown with grace, per-invocation timeout
//! via the workers' watchdogs).
//!
//! # High-level architecture
//!
//! ```text
//!  add_command ──► CommandQueue ◄── requeue (loop mode)
//!                      │                 ▲
//!                 dispatch pass          │
//!                      ▼                 │
//!              DeviceManager ──► InvocationWorker ──► Invocation runner
//!                                       │
//!                                 InterruptToken ◄── shutdown_hard / watchdogs
//! ```
//!
//! ## Scheduler loop
//! A single coordinator task wakes on: a command being added, a worker
//! completing, a device availability change, a shutdown request, or a
//! bounded tick. Each pass matches head-of-queue commands against free
//! devices in accumulated-runtime order. The queue lock is never held while
//! allocating devices: the pass snapshots candidates, allocates, then
//! re-enters the queue to remove the chosen command.
//!
//! ## Shutdown coordinator
//! States `Open → Closing → Closed`. `shutdown()` stops dispatching and lets
//! workers run out. `shutdown_hard()` additionally forces every active
//! worker and arms the grace window; on expiry, still-live workers are
//! escalated to forced termination. `join()` waits for `Closed`, which is
//! entered once no worker remains.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, watch, Notify};
use tokio::time;

use crate::commands::{Command, CommandQueue, CommandStatus};
use crate::config::SchedulerConfig;
use crate::configuration::ConfigurationFactory;
use crate::devices::DeviceManager;
use crate::error::SchedulerError;
use crate::events::{Bus, Event, EventKind};
use crate::interrupt::{InterruptCause, InterruptToken};
use crate::invocation::worker::InvocationWorker;
use crate::invocation::{Invocation, Rescheduler};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Lifecycle state of the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// Accepting and dispatching commands.
    Open,
    /// Shutdown requested: no new commands, no further dispatches; existing
    /// workers run out.
    Closing,
    /// No worker active; the coordinator task has exited.
    Closed,
}

struct WorkerHandle {
    command: String,
    interrupt: Arc<InterruptToken>,
}

/// Coordinator over the command queue, the device pool, and the workers.
///
/// Constructed with [`CommandScheduler::new`], shared as `Arc`, started once
/// with [`start`](CommandScheduler::start).
pub struct CommandScheduler {
    // Self-reference so &self methods can hand owned handles to spawned
    // tasks; always upgradable while a caller holds the Arc.
    self_ref: Weak<CommandScheduler>,
    config: SchedulerConfig,
    factory: Arc<dyn ConfigurationFactory>,
    devices: Arc<dyn DeviceManager>,
    invocation: Arc<dyn Invocation>,
    subscribers: Mutex<Vec<Arc<dyn Subscribe>>>,
    queue: Arc<CommandQueue>,
    bus: Bus,
    state: watch::Sender<SchedulerState>,
    workers: DashMap<u64, WorkerHandle>,
    wake: Notify,
    started: AtomicBool,
    hard_shutdown: AtomicBool,
    next_command_id: AtomicU64,
    next_worker_id: AtomicU64,
}

impl CommandScheduler {
    /// Creates a scheduler over the given collaborators.
    pub fn new(
        config: SchedulerConfig,
        factory: Arc<dyn ConfigurationFactory>,
        devices: Arc<dyn DeviceManager>,
        invocation: Arc<dyn Invocation>,
    ) -> Arc<Self> {
        let bus = Bus::new(config.bus_capacity);
        let (state, _) = watch::channel(SchedulerState::Open);
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            config,
            factory,
            devices,
            invocation,
            subscribers: Mutex::new(Vec::new()),
            queue: Arc::new(CommandQueue::new()),
            bus,
            state,
            workers: DashMap::new(),
            wake: Notify::new(),
            started: AtomicBool::new(false),
            hard_shutdown: AtomicBool::new(false),
            next_command_id: AtomicU64::new(0),
            next_worker_id: AtomicU64::new(0),
        })
    }

    fn shared(&self) -> Option<Arc<Self>> {
        self.self_ref.upgrade()
    }

    /// Registers an event subscriber. Effective only before
    /// [`start`](Self::start).
    pub fn add_subscriber(&self, subscriber: Arc<dyn Subscribe>) {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(subscriber);
    }

    /// Starts the coordinator task. Idempotent after the first call.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(sched) = self.shared() else { return };

        let subs = std::mem::take(&mut *self.subscribers.lock().unwrap_or_else(|e| e.into_inner()));
        SubscriberSet::attach(&self.bus, subs);

        tokio::spawn(sched.run_loop());
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Number of commands waiting in the queue.
    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    /// Number of invocation workers currently active.
    pub fn active_invocations(&self) -> usize {
        self.workers.len()
    }

    /// Direct tap on the event bus (tests, tooling).
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Validates an argument vector and enqueues the resulting command.
    ///
    /// Fails synchronously when the scheduler is no longer open or the
    /// configuration factory rejects the argv; in both cases nothing is
    /// queued.
    pub fn add_command(&self, args: &[String]) -> Result<(), SchedulerError> {
        if self.state() != SchedulerState::Open {
            return Err(SchedulerError::ShuttingDown);
        }
        let configuration = self.factory.create_configuration_from_args(args)?;
        let id = self.next_command_id.fetch_add(1, Ordering::SeqCst);
        let command = Arc::new(Command::new(id, args.to_vec(), Arc::new(configuration)));

        self.publish(Event::now(EventKind::CommandQueued).with_command(command.name()));
        self.queue.add(command);
        self.wake.notify_one();
        Ok(())
    }

    /// Drains the queue. Running workers are untouched.
    pub fn remove_all_commands(&self) {
        for command in self.queue.drain() {
            command.set_status(CommandStatus::Terminated);
            self.publish(Event::now(EventKind::CommandRemoved).with_command(command.name()));
        }
    }

    /// Requests a graceful drain: no further commands are accepted or
    /// dispatched; active workers run to completion. Idempotent.
    pub fn shutdown(&self) {
        let changed = self.state.send_if_modified(|s| {
            if *s == SchedulerState::Open {
                *s = SchedulerState::Closing;
                true
            } else {
                false
            }
        });
        if changed {
            self.publish(Event::now(EventKind::ShutdownRequested));
            self.wake.notify_one();
        }
    }

    /// Requests a hard shutdown: graceful drain plus a termination request
    /// on every active worker, with the grace window armed. Workers that are
    /// still live when the window expires are escalated to forced
    /// termination. Idempotent.
    pub fn shutdown_hard(&self) {
        self.shutdown();
        if self.hard_shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        let grace = self.config.shutdown_timeout;
        self.publish(Event::now(EventKind::HardShutdownRequested).with_timeout(grace));
        for worker in self.workers.iter() {
            worker.interrupt.force(InterruptCause::Shutdown);
        }

        let Some(sched) = self.shared() else { return };
        tokio::spawn(async move {
            let mut rx = sched.state.subscribe();
            let result = time::timeout(grace, rx.wait_for(|s| *s == SchedulerState::Closed)).await;
            match result {
                Ok(_) => {
                    sched.publish(Event::now(EventKind::AllStoppedWithin));
                }
                Err(_) => {
                    let stuck: Vec<String> =
                        sched.workers.iter().map(|w| w.command.clone()).collect();
                    tracing::warn!(
                        ?grace,
                        stuck = ?stuck,
                        "shutdown grace exceeded; forcing worker termination"
                    );
                    sched.publish(
                        Event::now(EventKind::GraceExceeded)
                            .with_timeout(grace)
                            .with_error(stuck.join(", ")),
                    );
                    for worker in sched.workers.iter() {
                        worker.interrupt.escalate();
                    }
                }
            }
        });
    }

    /// Waits until the scheduler reaches [`SchedulerState::Closed`].
    ///
    /// Returns true if it closed within the timeout.
    pub async fn join(&self, timeout: Duration) -> bool {
        let mut rx = self.state.subscribe();
        let result = time::timeout(timeout, rx.wait_for(|s| *s == SchedulerState::Closed)).await;
        matches!(result, Ok(Ok(_)))
    }

    /// Wires OS termination signals to a graceful [`shutdown`](Self::shutdown).
    ///
    /// SIGINT, SIGTERM, and SIGQUIT (Ctrl-C on non-Unix platforms) all
    /// request the same drain: no further commands dispatch, active
    /// invocations run out.
    pub fn shutdown_on_signal(&self) {
        let Some(sched) = self.shared() else { return };
        tokio::spawn(async move {
            match termination_signal().await {
                Ok(signal) => {
                    tracing::info!(signal, "termination signal received; draining scheduler");
                    sched.shutdown();
                }
                Err(err) => {
                    tracing::warn!(%err, "signal handler setup failed; shutdown_on_signal inert");
                }
            }
        });
    }

    fn publish(&self, ev: Event) {
        self.bus.publish(ev);
    }

    async fn run_loop(self: Arc<Self>) {
        let mut device_rx = self.devices.subscribe_state();
        loop {
            if self.state() == SchedulerState::Open {
                self.dispatch_pass().await;
            }
            if self.state() != SchedulerState::Open && self.workers.is_empty() {
                break;
            }

            tokio::select! {
                _ = self.wake.notified() => {}
                res = device_rx.changed() => {
                    if res.is_err() {
                        // Inventory sender gone; fall back to the tick.
                        time::sleep(self.config.poll_interval).await;
                    }
                }
                _ = time::sleep(self.config.poll_interval) => {}
            }
        }

        self.state.send_modify(|s| *s = SchedulerState::Closed);
        self.publish(Event::now(EventKind::SchedulerClosed));
    }

    /// Matches head-of-queue commands against free devices until no eligible
    /// pair remains. The queue lock is released before any device allocation.
    async fn dispatch_pass(&self) {
        loop {
            let free = self.devices.free_count();
            if free == 0 {
                return;
            }
            let candidates = self.queue.candidates(free.max(self.config.dispatch_scan));
            if candidates.is_empty() {
                return;
            }

            let mut dispatched = false;
            for command in candidates {
                if self.state() != SchedulerState::Open {
                    return;
                }
                let Some(device) = self.devices.allocate(command.requirements()).await else {
                    continue;
                };
                if self.state() != SchedulerState::Open {
                    self.devices.release(device).await;
                    return;
                }
                if self.queue.remove(&command) {
                    command.set_status(CommandStatus::Running);
                    self.publish(
                        Event::now(EventKind::DeviceAllocated)
                            .with_serial(device.serial())
                            .with_command(command.name()),
                    );
                    self.spawn_worker(command, device);
                    dispatched = true;
                } else {
                    // Command was drained between snapshot and removal.
                    self.devices.release(device).await;
                }
            }
            if !dispatched {
                return;
            }
        }
    }

    fn spawn_worker(&self, command: Arc<Command>, device: crate::devices::DeviceHandle) {
        let Some(sched) = self.shared() else { return };
        let id = self.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let interrupt = Arc::new(InterruptToken::new());
        self.workers.insert(
            id,
            WorkerHandle {
                command: command.name().to_string(),
                interrupt: Arc::clone(&interrupt),
            },
        );
        // A hard shutdown racing this dispatch must still reach the worker.
        if self.hard_shutdown.load(Ordering::SeqCst) {
            interrupt.force(InterruptCause::Shutdown);
        }

        let worker = InvocationWorker {
            command,
            device,
            interrupt,
            factory: Arc::clone(&self.factory),
            devices: Arc::clone(&self.devices),
            invocation: Arc::clone(&self.invocation),
            rescheduler: Arc::clone(&sched) as Arc<dyn Rescheduler>,
            queue: Arc::clone(&self.queue),
            bus: self.bus.clone(),
            config: self.config.clone(),
            state_rx: self.state.subscribe(),
        };
        tokio::spawn(async move {
            worker.run().await;
            sched.workers.remove(&id);
            sched.wake.notify_one();
        });
    }
}

impl Rescheduler for CommandScheduler {
    fn reschedule(&self, args: &[String]) -> bool {
        self.add_command(args).is_ok()
    }
}

/// Resolves with the name of the first termination signal the process
/// receives. Backs [`CommandScheduler::shutdown_on_signal`].
#[cfg(unix)]
async fn termination_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
