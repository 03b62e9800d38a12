//! # Cooperative interruption for invocation workers.
//!
//! Every worker owns one [`InterruptToken`] shared with the shutdown
//! coordinator and the per-worker watchdogs. The token carries two flags and
//! one escalation signal:
//!
//! - `allowed` — set by the worker itself via
//!   [`set_interruptible`](InterruptToken::set_interruptible) to mark an
//!   interruption-safe region. Device flashing and critical setup run with
//!   `allowed = false`.
//! - `forced` — set by the shutdown coordinator, the invocation-timeout
//!   watchdog, or the battery watchdog to request termination. Sticky for
//!   the lifetime of the worker.
//! - `killed` — the bounded escalation, honored at suspension points
//!   regardless of `allowed`.
//!
//! Suspension-point helpers ([`sleep`](InterruptToken::sleep),
//! [`guard`](InterruptToken::guard)) behave as:
//!
//! ```text
//! if killed or (forced and allowed):   raise Interrupted
//! else:                                sleep/wait as requested
//! ```
//!
//! A `forced` flag set before the worker enters an interruptible region still
//! causes an abort at the first suspension point inside that region.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// What requested the interruption.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptCause {
    /// Hard shutdown of the scheduler.
    Shutdown,
    /// The invocation exceeded its configured timeout.
    InvocationTimeout,
    /// The device battery dropped below the configured cutoff.
    BatteryLow,
}

impl InterruptCause {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            InterruptCause::Shutdown => "shutdown",
            InterruptCause::InvocationTimeout => "invocation_timeout",
            InterruptCause::BatteryLow => "battery_low",
        }
    }
}

/// Raised by suspension-point helpers when termination was requested.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("interrupted ({})", cause.as_label())]
pub struct Interrupted {
    /// What requested the interruption.
    pub cause: InterruptCause,
}

/// Per-worker interruption state.
///
/// Writers: the shutdown coordinator and watchdogs (`force`, `escalate`),
/// and the worker itself (`set_interruptible`). Readers: every suspension
/// point the invocation runner goes through.
pub struct InterruptToken {
    allowed: AtomicBool,
    forced: AtomicBool,
    cause: Mutex<Option<InterruptCause>>,
    killed: CancellationToken,
    changed: Notify,
}

impl InterruptToken {
    /// Creates a token with `allowed = false`, `forced = false`.
    pub fn new() -> Self {
        Self {
            allowed: AtomicBool::new(false),
            forced: AtomicBool::new(false),
            cause: Mutex::new(None),
            killed: CancellationToken::new(),
            changed: Notify::new(),
        }
    }

    /// Marks (or unmarks) the current region as interruption-safe.
    ///
    /// Takes effect at the next suspension point; an in-flight
    /// [`sleep`](Self::sleep) re-evaluates immediately.
    pub fn set_interruptible(&self, allowed: bool) {
        self.allowed.store(allowed, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    /// True if the worker currently honors cooperative interrupts.
    pub fn is_interruptible(&self) -> bool {
        self.allowed.load(Ordering::SeqCst)
    }

    /// Requests cooperative termination. Sticky; the first cause wins.
    pub fn force(&self, cause: InterruptCause) {
        if !self.forced.swap(true, Ordering::SeqCst) {
            let mut slot = self.cause.lock().unwrap_or_else(|e| e.into_inner());
            *slot = Some(cause);
        }
        self.changed.notify_waiters();
    }

    /// True once termination has been requested.
    pub fn is_forced(&self) -> bool {
        self.forced.load(Ordering::SeqCst)
    }

    /// Returns the recorded interruption cause, if any.
    pub fn cause(&self) -> Option<InterruptCause> {
        *self.cause.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Escalates to forced termination: suspension points raise regardless
    /// of `allowed`. Used on hard-shutdown grace expiry and after the
    /// invocation-timeout secondary grace.
    pub fn escalate(&self) {
        self.killed.cancel();
        self.changed.notify_waiters();
    }

    /// True once the token has been escalated.
    pub fn is_escalated(&self) -> bool {
        self.killed.is_cancelled()
    }

    /// Resolves once the token has been escalated.
    pub async fn escalated(&self) {
        self.killed.cancelled().await
    }

    fn pending(&self) -> Option<InterruptCause> {
        if self.killed.is_cancelled()
            || (self.forced.load(Ordering::SeqCst) && self.allowed.load(Ordering::SeqCst))
        {
            Some(self.cause().unwrap_or(InterruptCause::Shutdown))
        } else {
            None
        }
    }

    /// Checks for a pending interrupt without suspending.
    pub fn check(&self) -> Result<(), Interrupted> {
        match self.pending() {
            Some(cause) => Err(Interrupted { cause }),
            None => Ok(()),
        }
    }

    /// Runs an arbitrary future as a suspension point.
    ///
    /// The future is polled to completion unless an interrupt becomes
    /// pending, in which case [`Interrupted`] is raised instead. Flag changes
    /// mid-wait (a `forced` arriving inside an `allowed` region, or `allowed`
    /// flipping while `forced` is already set) take effect without completing
    /// the wait.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        tokio::pin!(fut);
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            // Register the waiter before re-checking so no flag flip is lost.
            changed.as_mut().enable();
            self.check()?;

            tokio::select! {
                out = &mut fut => return Ok(out),
                _ = self.killed.cancelled() => {
                    return Err(Interrupted {
                        cause: self.cause().unwrap_or(InterruptCause::Shutdown),
                    });
                }
                _ = &mut changed => {}
            }
        }
    }

    /// Sleeps for `dur`, honoring pending and arriving interrupts.
    pub async fn sleep(&self, dur: Duration) -> Result<(), Interrupted> {
        self.guard(time::sleep(dur)).await
    }
}

impl Default for InterruptToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn sleep_completes_when_not_forced() {
        let token = InterruptToken::new();
        token.set_interruptible(true);
        assert!(token.sleep(Duration::from_millis(10)).await.is_ok());
    }

    #[tokio::test]
    async fn forced_without_allowed_does_not_interrupt() {
        let token = InterruptToken::new();
        token.force(InterruptCause::BatteryLow);
        assert!(token.sleep(Duration::from_millis(10)).await.is_ok());
    }

    #[tokio::test]
    async fn forced_before_allowed_raises_at_first_suspension() {
        let token = InterruptToken::new();
        token.force(InterruptCause::Shutdown);
        token.set_interruptible(true);

        let err = token.sleep(Duration::from_secs(60)).await.unwrap_err();
        assert_eq!(err.cause, InterruptCause::Shutdown);
    }

    #[tokio::test]
    async fn allowed_flip_mid_sleep_interrupts() {
        let token = Arc::new(InterruptToken::new());
        token.force(InterruptCause::InvocationTimeout);

        let flipper = {
            let token = Arc::clone(&token);
            tokio::spawn(async move {
                time::sleep(Duration::from_millis(20)).await;
                token.set_interruptible(true);
            })
        };

        let err = token.sleep(Duration::from_secs(60)).await.unwrap_err();
        assert_eq!(err.cause, InterruptCause::InvocationTimeout);
        flipper.await.unwrap();
    }

    #[tokio::test]
    async fn force_mid_sleep_interrupts_allowed_region() {
        let token = Arc::new(InterruptToken::new());
        token.set_interruptible(true);

        let forcer = {
            let token = Arc::clone(&token);
            tokio::spawn(async move {
                time::sleep(Duration::from_millis(20)).await;
                token.force(InterruptCause::BatteryLow);
            })
        };

        let err = token.sleep(Duration::from_secs(60)).await.unwrap_err();
        assert_eq!(err.cause, InterruptCause::BatteryLow);
        forcer.await.unwrap();
    }

    #[tokio::test]
    async fn escalation_ignores_allowed() {
        let token = Arc::new(InterruptToken::new());
        token.force(InterruptCause::Shutdown);

        let killer = {
            let token = Arc::clone(&token);
            tokio::spawn(async move {
                time::sleep(Duration::from_millis(20)).await;
                token.escalate();
            })
        };

        // Region never marked interruptible; only escalation can break in.
        let err = token.sleep(Duration::from_secs(60)).await.unwrap_err();
        assert_eq!(err.cause, InterruptCause::Shutdown);
        killer.await.unwrap();
    }

    #[tokio::test]
    async fn forced_is_sticky_across_toggles() {
        let token = InterruptToken::new();
        token.force(InterruptCause::InvocationTimeout);
        token.set_interruptible(true);
        token.set_interruptible(false);
        token.set_interruptible(true);

        assert!(token.check().is_err());
        assert!(token.is_forced());
    }

    #[tokio::test]
    async fn first_cause_wins() {
        let token = InterruptToken::new();
        token.force(InterruptCause::BatteryLow);
        token.force(InterruptCause::Shutdown);
        assert_eq!(token.cause(), Some(InterruptCause::BatteryLow));
    }
}
