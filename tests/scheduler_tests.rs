//! Longer-running scenario tests for the command scheduler.
//!
//! Each test wires the scheduler to the in-memory device pool and a
//! function- or struct-backed invocation runner, then drives one scheduling
//! scenario end to end: fairness, battery cutoff, hard shutdown inside and
//! outside the grace window, and per-invocation timeouts.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use labvisor::{
    ArgsConfigFactory, CommandScheduler, DeviceHandle, DevicePool, EventKind, Invocation,
    InvocationContext, InvocationError, InvocationFn, SchedulerConfig, SchedulerError,
};

const JOIN_TIMEOUT: Duration = Duration::from_secs(30);

fn argv(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| t.to_string()).collect()
}

/// Scheduler config tightened for tests: fast ticks, fast battery polls,
/// short escalation window. Shutdown grace stays long unless a test arms it.
fn test_config() -> SchedulerConfig {
    let mut cfg = SchedulerConfig::default();
    cfg.poll_interval = Duration::from_millis(25);
    cfg.battery_poll_interval = Duration::from_millis(50);
    cfg.escalation_grace = Duration::from_millis(300);
    cfg
}

fn scheduler_with(
    config: SchedulerConfig,
    devices: Arc<DevicePool>,
    invocation: Arc<dyn Invocation>,
) -> Arc<CommandScheduler> {
    CommandScheduler::new(config, Arc::new(ArgsConfigFactory::new()), devices, invocation)
}

fn single_device_pool() -> Arc<DevicePool> {
    Arc::new(DevicePool::with_devices([DeviceHandle::new("stub-0")]))
}

/// Polls a condition until it holds or the timeout expires.
async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Runner that sleeps 100 ms per "fastConfig" invocation and 200 ms per
/// "slowConfig" invocation, counting completions per config.
struct MeasuredInvocation {
    interruptible: bool,
    fast_count: AtomicU32,
    slow_count: AtomicU32,
    run_interrupted: AtomicBool,
}

impl MeasuredInvocation {
    fn new(interruptible: bool) -> Arc<Self> {
        Arc::new(Self {
            interruptible,
            fast_count: AtomicU32::new(0),
            slow_count: AtomicU32::new(0),
            run_interrupted: AtomicBool::new(false),
        })
    }

    fn fast(&self) -> u32 {
        self.fast_count.load(Ordering::SeqCst)
    }

    fn slow(&self) -> u32 {
        self.slow_count.load(Ordering::SeqCst)
    }

    fn interrupted(&self) -> bool {
        self.run_interrupted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Invocation for MeasuredInvocation {
    async fn invoke(&self, ctx: InvocationContext) -> Result<(), InvocationError> {
        if self.interruptible {
            ctx.set_interruptible(true);
        }
        let name = ctx.configuration().name.clone();
        let slept = if name == "slowConfig" {
            ctx.sleep(Duration::from_millis(200)).await
        } else {
            ctx.sleep(Duration::from_millis(100)).await
        };
        match slept {
            Ok(()) => {
                if name == "slowConfig" {
                    self.slow_count.fetch_add(1, Ordering::SeqCst);
                } else {
                    self.fast_count.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
            Err(e) => {
                if e.is_interrupted() {
                    self.run_interrupted.store(true, Ordering::SeqCst);
                }
                Err(e)
            }
        }
    }
}

/// Runner that sleeps in fixed chunks, recording whether any chunk was
/// interrupted and whether the full run completed.
struct LongInvocation {
    iterations: u32,
    chunk: Duration,
    interruptible: bool,
    run_interrupted: AtomicBool,
    completed: AtomicBool,
}

impl LongInvocation {
    fn new(iterations: u32, chunk: Duration, interruptible: bool) -> Arc<Self> {
        Arc::new(Self {
            iterations,
            chunk,
            interruptible,
            run_interrupted: AtomicBool::new(false),
            completed: AtomicBool::new(false),
        })
    }

    fn interrupted(&self) -> bool {
        self.run_interrupted.load(Ordering::SeqCst)
    }

    fn completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Invocation for LongInvocation {
    async fn invoke(&self, ctx: InvocationContext) -> Result<(), InvocationError> {
        if self.interruptible {
            ctx.set_interruptible(true);
        }
        for _ in 0..self.iterations {
            if let Err(e) = ctx.sleep(self.chunk).await {
                if e.is_interrupted() {
                    self.run_interrupted.store(true, Ordering::SeqCst);
                }
                return Err(e);
            }
        }
        self.completed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Two loop-mode configs on one device: the fast config (100 ms) should
/// execute roughly twice as often as the slow config (200 ms), because the
/// queue prefers the command with the smaller accumulated runtime.
#[tokio::test(flavor = "multi_thread")]
async fn fair_scheduling_balances_accumulated_runtime() {
    let invocation = MeasuredInvocation::new(false);
    let scheduler = scheduler_with(
        test_config(),
        single_device_pool(),
        Arc::clone(&invocation) as Arc<dyn Invocation>,
    );
    scheduler.start();
    scheduler
        .add_command(&argv(&["fastConfig", "--loop", "--min-loop-time", "0"]))
        .unwrap();
    scheduler
        .add_command(&argv(&["slowConfig", "--loop", "--min-loop-time", "0"]))
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(60), || invocation.slow() >= 40).await,
        "slow config never reached 40 executions"
    );
    scheduler.shutdown();
    assert!(scheduler.join(JOIN_TIMEOUT).await);

    let fast = i64::from(invocation.fast());
    let slow = i64::from(invocation.slow());
    assert!(
        (fast - 2 * slow).abs() <= 5,
        "expected fast ~= 2 * slow, got fast={fast} slow={slow}"
    );
    assert!(!invocation.interrupted());
}

/// Battery below cutoff while the worker stays non-interruptible: the
/// termination request is pending but never honored, so the invocation
/// completes normally.
#[tokio::test(flavor = "multi_thread")]
async fn battery_low_non_interruptible_completes() {
    let device = DeviceHandle::new("serial");
    device.set_battery(Some(10));
    let pool = Arc::new(DevicePool::with_devices([device]));

    let invocation = MeasuredInvocation::new(false);
    let scheduler = scheduler_with(test_config(), pool, Arc::clone(&invocation) as _);
    scheduler.start();
    scheduler
        .add_command(&argv(&[
            "slowConfig",
            "--loop",
            "--min-loop-time",
            "0",
            "--cutoff-battery",
            "20",
        ]))
        .unwrap();

    assert!(wait_until(Duration::from_secs(10), || invocation.slow() >= 3).await);
    scheduler.shutdown();
    assert!(scheduler.join(JOIN_TIMEOUT).await);
    assert!(!invocation.interrupted());
}

/// Battery below cutoff with an interruptible worker: the first suspension
/// point raises, and the command is not requeued despite loop mode.
#[tokio::test(flavor = "multi_thread")]
async fn battery_low_interruptible_aborts() {
    let device = DeviceHandle::new("serial");
    device.set_battery(Some(10));
    let pool = Arc::new(DevicePool::with_devices([device]));

    let invocation = MeasuredInvocation::new(true);
    let scheduler = scheduler_with(test_config(), pool, Arc::clone(&invocation) as _);
    scheduler.start();
    scheduler
        .add_command(&argv(&[
            "slowConfig",
            "--loop",
            "--min-loop-time",
            "0",
            "--cutoff-battery",
            "20",
        ]))
        .unwrap();

    assert!(wait_until(Duration::from_secs(10), || invocation.interrupted()).await);

    // Interrupted commands are removed, not looped.
    assert!(wait_until(Duration::from_secs(5), || {
        scheduler.pending_commands() == 0 && scheduler.active_invocations() == 0
    })
    .await);

    scheduler.shutdown();
    assert!(scheduler.join(JOIN_TIMEOUT).await);
}

/// Hard shutdown against an interruptible worker interrupts it and the
/// scheduler joins cleanly.
#[tokio::test(flavor = "multi_thread")]
async fn hard_shutdown_interrupts_interruptible_worker() {
    let invocation = LongInvocation::new(30, Duration::from_millis(200), true);
    let scheduler = scheduler_with(
        test_config(),
        single_device_pool(),
        Arc::clone(&invocation) as _,
    );
    scheduler.start();
    scheduler
        .add_command(&argv(&["slowConfig", "--loop", "--min-loop-time", "0"]))
        .unwrap();

    let trigger = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            scheduler.shutdown_hard();
        })
    };

    assert!(wait_until(Duration::from_secs(10), || invocation.interrupted()).await);
    trigger.await.unwrap();
    assert!(scheduler.join(JOIN_TIMEOUT).await);
    assert!(!invocation.completed());
}

/// Hard shutdown against a non-interruptible worker whose remaining work
/// fits inside the grace window: the invocation completes normally.
#[tokio::test(flavor = "multi_thread")]
async fn hard_shutdown_within_grace_lets_worker_finish() {
    let invocation = LongInvocation::new(5, Duration::from_millis(300), false);
    let scheduler = scheduler_with(
        test_config(),
        single_device_pool(),
        Arc::clone(&invocation) as _,
    );
    scheduler.start();
    scheduler.add_command(&argv(&["slowConfig"])).unwrap();

    let trigger = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            scheduler.shutdown_hard();
        })
    };

    assert!(scheduler.join(JOIN_TIMEOUT).await);
    trigger.await.unwrap();
    assert!(invocation.completed());
    assert!(!invocation.interrupted());
}

/// Hard shutdown against a non-interruptible worker that outlives the grace
/// window: escalation tears through and the run ends interrupted.
#[tokio::test(flavor = "multi_thread")]
async fn hard_shutdown_grace_expiry_escalates() {
    let mut config = test_config();
    config.shutdown_timeout = Duration::from_secs(1);

    let invocation = LongInvocation::new(15, Duration::from_millis(300), false);
    let scheduler = scheduler_with(config, single_device_pool(), Arc::clone(&invocation) as _);
    scheduler.start();
    scheduler.add_command(&argv(&["slowConfig"])).unwrap();

    let trigger = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            scheduler.shutdown_hard();
        })
    };

    assert!(scheduler.join(JOIN_TIMEOUT).await);
    trigger.await.unwrap();
    assert!(invocation.interrupted());
    assert!(!invocation.completed());
}

/// An invocation that overruns its configured timeout is interrupted within
/// the timeout plus the escalation window.
#[tokio::test(flavor = "multi_thread")]
async fn invocation_timeout_interrupts_overrunning_worker() {
    let invocation = LongInvocation::new(100, Duration::from_millis(200), true);
    let scheduler = scheduler_with(
        test_config(),
        single_device_pool(),
        Arc::clone(&invocation) as _,
    );
    scheduler.start();

    let started = Instant::now();
    scheduler
        .add_command(&argv(&["slowConfig", "--invocation-timeout", "500"]))
        .unwrap();

    assert!(wait_until(Duration::from_secs(10), || invocation.interrupted()).await);
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(400) && elapsed <= Duration::from_millis(1500),
        "interrupt arrived at {elapsed:?}, expected ~500-1500ms"
    );

    scheduler.shutdown();
    assert!(scheduler.join(JOIN_TIMEOUT).await);
}

/// `shutdown` observed before `add_command` makes the add fail and nothing
/// is queued.
#[tokio::test(flavor = "multi_thread")]
async fn add_command_fails_after_shutdown() {
    let invocation = InvocationFn::arc(|_ctx: InvocationContext| async { Ok(()) });
    let scheduler = scheduler_with(test_config(), single_device_pool(), invocation);
    scheduler.start();
    scheduler.shutdown();

    let err = scheduler.add_command(&argv(&["late"])).unwrap_err();
    assert!(matches!(err, SchedulerError::ShuttingDown));
    assert_eq!(scheduler.pending_commands(), 0);
    assert!(scheduler.join(JOIN_TIMEOUT).await);
}

/// A rejected argument vector surfaces synchronously and is never queued.
#[tokio::test(flavor = "multi_thread")]
async fn bad_argv_is_rejected_synchronously() {
    let invocation = InvocationFn::arc(|_ctx: InvocationContext| async { Ok(()) });
    let scheduler = scheduler_with(test_config(), single_device_pool(), invocation);
    scheduler.start();

    let err = scheduler
        .add_command(&argv(&["cfg", "--frobnicate"]))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Configuration(_)));
    assert_eq!(scheduler.pending_commands(), 0);

    scheduler.shutdown();
    assert!(scheduler.join(JOIN_TIMEOUT).await);
}

/// No two workers ever hold the same device: with a single device, two
/// loop-mode commands never overlap.
#[tokio::test(flavor = "multi_thread")]
async fn device_allocation_is_exclusive_across_workers() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicBool::new(false));

    let invocation = {
        let in_flight = Arc::clone(&in_flight);
        let overlap = Arc::clone(&overlap);
        InvocationFn::arc(move |ctx: InvocationContext| {
            let in_flight = Arc::clone(&in_flight);
            let overlap = Arc::clone(&overlap);
            async move {
                if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlap.store(true, Ordering::SeqCst);
                }
                let res = ctx.sleep(Duration::from_millis(30)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                res
            }
        })
    };

    let scheduler = scheduler_with(test_config(), single_device_pool(), invocation);
    scheduler.start();
    scheduler
        .add_command(&argv(&["a", "--loop", "--min-loop-time", "0"]))
        .unwrap();
    scheduler
        .add_command(&argv(&["b", "--loop", "--min-loop-time", "0"]))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    scheduler.shutdown();
    assert!(scheduler.join(JOIN_TIMEOUT).await);
    assert!(!overlap.load(Ordering::SeqCst), "two workers shared a device");
}

/// `remove_all_commands` drains the queue but leaves the running worker
/// untouched.
#[tokio::test(flavor = "multi_thread")]
async fn remove_all_commands_leaves_running_worker() {
    let ran = Arc::new(AtomicU32::new(0));
    let invocation = {
        let ran = Arc::clone(&ran);
        InvocationFn::arc(move |ctx: InvocationContext| {
            let ran = Arc::clone(&ran);
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                ctx.sleep(Duration::from_millis(500)).await
            }
        })
    };

    let scheduler = scheduler_with(test_config(), single_device_pool(), invocation);
    scheduler.start();
    scheduler.add_command(&argv(&["first"])).unwrap();
    scheduler.add_command(&argv(&["second"])).unwrap();

    // First command dispatches onto the only device; second stays queued.
    assert!(wait_until(Duration::from_secs(5), || {
        scheduler.active_invocations() == 1
    })
    .await);
    scheduler.remove_all_commands();
    assert_eq!(scheduler.pending_commands(), 0);

    scheduler.shutdown();
    assert!(scheduler.join(JOIN_TIMEOUT).await);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

/// A runner can split work through the rescheduler seam; the derived
/// command is queued and executed.
#[tokio::test(flavor = "multi_thread")]
async fn rescheduler_enqueues_derived_commands() {
    let child_runs = Arc::new(AtomicU32::new(0));
    let invocation = {
        let child_runs = Arc::clone(&child_runs);
        InvocationFn::arc(move |ctx: InvocationContext| {
            let child_runs = Arc::clone(&child_runs);
            async move {
                if ctx.configuration().name == "parent" {
                    assert!(ctx.reschedule(&["child".to_string()]));
                } else {
                    child_runs.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
        })
    };

    let scheduler = scheduler_with(test_config(), single_device_pool(), invocation);
    scheduler.start();
    scheduler.add_command(&argv(&["parent"])).unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        child_runs.load(Ordering::SeqCst) == 1
    })
    .await);
    scheduler.shutdown();
    assert!(scheduler.join(JOIN_TIMEOUT).await);
}

/// One command running start to finish publishes the full event trail.
#[tokio::test(flavor = "multi_thread")]
async fn event_trail_covers_command_lifecycle() {
    let done = Arc::new(AtomicBool::new(false));
    let invocation = {
        let done = Arc::clone(&done);
        InvocationFn::arc(move |ctx: InvocationContext| {
            let done = Arc::clone(&done);
            async move {
                ctx.sleep(Duration::from_millis(50)).await?;
                done.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
    };
    let scheduler = scheduler_with(test_config(), single_device_pool(), invocation);
    let mut events = scheduler.subscribe_events();

    scheduler.start();
    scheduler.add_command(&argv(&["smoke"])).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        done.load(Ordering::SeqCst) && scheduler.active_invocations() == 0
    })
    .await);
    scheduler.shutdown();
    assert!(scheduler.join(JOIN_TIMEOUT).await);

    let mut seen = Vec::new();
    while let Ok(ev) = events.try_recv() {
        seen.push(ev.kind);
    }
    for expected in [
        EventKind::CommandQueued,
        EventKind::DeviceAllocated,
        EventKind::InvocationStarting,
        EventKind::InvocationStopped,
        EventKind::DeviceReleased,
        EventKind::CommandRemoved,
        EventKind::ShutdownRequested,
        EventKind::SchedulerClosed,
    ] {
        assert!(seen.contains(&expected), "missing event {expected:?}");
    }
}

/// Shutdown entry points are idempotent and `join` keeps answering after
/// the scheduler closed.
#[tokio::test(flavor = "multi_thread")]
async fn shutdown_is_idempotent() {
    let invocation = InvocationFn::arc(|_ctx: InvocationContext| async { Ok(()) });
    let scheduler = scheduler_with(test_config(), single_device_pool(), invocation);
    scheduler.start();

    scheduler.shutdown();
    scheduler.shutdown();
    scheduler.shutdown_hard();
    scheduler.shutdown_hard();

    assert!(scheduler.join(JOIN_TIMEOUT).await);
    assert!(scheduler.join(Duration::from_millis(10)).await);
}
