//! # Subscriber fan-out for scheduler events.
//!
//! [`SubscriberSet`] bridges the scheduler's [`Bus`] to the registered
//! [`Subscribe`] implementations. One bridge task drains the bus; each
//! subscriber gets its own bounded lane and worker task, so a slow results
//! uploader cannot stall the scheduler loop or its peers.
//!
//! ## Delivery rules
//! - Scheduler-side publishing never waits on subscribers: when a lane is
//!   full the event is dropped for that subscriber only, and the lane keeps
//!   a running drop count.
//! - A subscriber that panics is isolated; the panic is reported back onto
//!   the bus as [`EventKind::SubscriberPanicked`], except when the event
//!   being handled was itself that diagnostic (reported only to the log, so
//!   a subscriber that chokes on its own failure report cannot feed back).
//! - A bridge that lags the bus loses the oldest events, like any other
//!   bus reader; the miss count is logged.
//!
//! ```text
//!   Bus ──► bridge task ──┬──► [lane S1] ──► worker S1 ──► on_event()
//!                         ├──► [lane S2] ──► worker S2 ──► on_event()
//!                         └──► [lane SN] ──► worker SN ──► on_event()
//! ```
//!
//! The bridge exits when the bus closes (the scheduler was dropped); the
//! lanes close behind it and the workers drain whatever is left queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};

use crate::events::{Bus, Event, EventKind};

use super::Subscribe;

/// One subscriber's bounded delivery lane.
struct Lane {
    name: &'static str,
    queue: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
}

/// Fan-out from the scheduler's event bus to isolated subscriber workers.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
}

impl SubscriberSet {
    /// Opens one lane per subscriber and spawns the bridge task draining
    /// the bus. A no-op when `subscribers` is empty.
    pub fn attach(bus: &Bus, subscribers: Vec<Arc<dyn Subscribe>>) {
        if subscribers.is_empty() {
            return;
        }
        let set = Self {
            lanes: subscribers
                .into_iter()
                .map(|subscriber| open_lane(bus.clone(), subscriber))
                .collect(),
        };

        let mut events = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ev) => set.deliver(ev),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "subscriber bridge lagged the event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Hands one scheduler event to every lane without waiting on any of
    /// them. Full or closed lanes drop the event for that subscriber only.
    fn deliver(&self, event: Event) {
        let ev = Arc::new(event);
        for lane in &self.lanes {
            match lane.queue.try_send(Arc::clone(&ev)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let total = lane.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        subscriber = lane.name,
                        kind = ?ev.kind,
                        total_dropped = total,
                        "subscriber lane full; scheduler event dropped"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!(
                        subscriber = lane.name,
                        kind = ?ev.kind,
                        "subscriber worker gone; scheduler event dropped"
                    );
                }
            }
        }
    }
}

/// Spawns the worker draining one subscriber's lane with panic isolation.
fn open_lane(bus: Bus, subscriber: Arc<dyn Subscribe>) -> Lane {
    let capacity = subscriber.queue_capacity().max(1);
    let name = subscriber.name();
    let (tx, mut rx) = mpsc::channel::<Arc<Event>>(capacity);

    tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            let handled = std::panic::AssertUnwindSafe(subscriber.on_event(ev.as_ref()))
                .catch_unwind()
                .await;
            if let Err(payload) = handled {
                report_panic(&bus, name, &ev, payload.as_ref());
            }
        }
    });

    Lane {
        name,
        queue: tx,
        dropped: AtomicU64::new(0),
    }
}

/// Surfaces a subscriber panic through the scheduler's event vocabulary.
///
/// Panics raised while handling a `SubscriberPanicked` event are logged
/// only; republishing would hand the failing subscriber its own diagnostic
/// again.
fn report_panic(
    bus: &Bus,
    subscriber: &'static str,
    event: &Event,
    payload: &(dyn std::any::Any + Send),
) {
    let reason = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());

    tracing::warn!(
        subscriber,
        kind = ?event.kind,
        %reason,
        "subscriber panicked while handling scheduler event"
    );
    if event.kind != EventKind::SubscriberPanicked {
        bus.publish(
            Event::now(EventKind::SubscriberPanicked)
                .with_error(format!("subscriber={subscriber}: {reason}")),
        );
    }
}
