//! # Demo: loop_commands
//!
//! Two loop-mode commands sharing one device, with the built-in `LogWriter`
//! subscriber rendering the event stream through `tracing`.
//!
//! Demonstrates how to:
//! - Build a `DevicePool` and register stub devices.
//! - Provide an invocation runner with `InvocationFn`.
//! - Submit loop-mode commands and watch accumulated-runtime fairness.
//! - Drain gracefully on Ctrl-C (or after a fixed demo window).
//!
//! ## Run
//! ```bash
//! cargo run --example loop_commands --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use labvisor::{
    ArgsConfigFactory, CommandScheduler, DeviceHandle, DevicePool, InvocationContext,
    InvocationError, InvocationFn, LogWriter, SchedulerConfig,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 1) One device; both commands compete for it.
    let pool = Arc::new(DevicePool::with_devices([
        DeviceHandle::new("lab-0").with_product_type("stub")
    ]));

    // 2) The runner: pretend work, interruptible once "setup" is done.
    let runner = InvocationFn::arc(|ctx: InvocationContext| async move {
        let pause = if ctx.configuration().name == "slow" {
            Duration::from_millis(400)
        } else {
            Duration::from_millis(200)
        };
        ctx.set_interruptible(true);
        ctx.sleep(pause).await?;
        Ok::<(), InvocationError>(())
    });

    // 3) Scheduler with the event logger attached.
    let scheduler = CommandScheduler::new(
        SchedulerConfig::default(),
        Arc::new(ArgsConfigFactory::new()),
        pool,
        runner,
    );
    scheduler.add_subscriber(Arc::new(LogWriter::new()));
    scheduler.start();
    scheduler.shutdown_on_signal();

    // 4) Two loop-mode commands; the fast one should run about twice as often.
    scheduler.add_command(&args(&["fast", "--loop", "--min-loop-time", "0"]))?;
    scheduler.add_command(&args(&["slow", "--loop", "--min-loop-time", "0"]))?;

    // 5) Let the demo run, then drain.
    tokio::time::sleep(Duration::from_secs(10)).await;
    scheduler.shutdown();
    scheduler.join(Duration::from_secs(30)).await;

    Ok(())
}

fn args(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| t.to_string()).collect()
}
