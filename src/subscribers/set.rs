//! # SubscriberSet: non-blocking fan-out over multiple subscribers
//!
//! [`SubscriberSet`] distributes each [`Event`](crate::Event) to multiple
//! subscribers **without awaiting** their processing.
//!
//! ## What it guarantees
//! - `emit(Event)` returns immediately.
//! - Per-subscriber FIFO (queue order).
//! - Panics inside subscribers are caught and logged (isolation).
//!
//! ## What it does **not** guarantee
//! - No global ordering across different subscribers.
//! - No retries on per-subscriber queue overflow (events are dropped for that
//!   subscriber and counted; see [`SubscriberSet::dropped_events`]).
//! - No draining on drop: workers end once the set is gone and their queue is empty.
//!
//! ## Diagram
//! ```text
//!    emit(Event)
//!        │                        (Arc-clone per subscriber)
//!        ├────────────────► [queue S1] ─► worker S1 ─► on_event()
//!        ├────────────────► [queue S2] ─► worker S2 ─► on_event()
//!        └────────────────► [queue SN] ─► worker SN ─► on_event()
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::warn;

use crate::events::Event;

use super::Subscribe;

/// Queue feeding one subscriber's worker.
struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
}

impl Lane {
    fn offer(&self, ev: &Arc<Event>) {
        let reason = match self.tx.try_send(Arc::clone(ev)) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(_)) => "queue full",
            Err(mpsc::error::TrySendError::Closed(_)) => "worker gone",
        };
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        // 1st, 2nd, 4th, 8th, ... drop: a stuck subscriber must not flood the log.
        if dropped.is_power_of_two() {
            warn!(subscriber = self.name, seq = ev.seq, dropped, "dropped event: {reason}");
        }
    }
}

/// Fan-out with one bounded queue and one worker task per subscriber.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker per subscriber.
    ///
    /// Subscribers reporting a queue capacity of `0` get `fallback_capacity`.
    /// Must be called from within a tokio runtime when `subs` is non-empty.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, fallback_capacity: usize) -> Self {
        let lanes = subs
            .into_iter()
            .map(|sub| {
                let cap = match sub.queue_capacity() {
                    0 => fallback_capacity.max(1),
                    n => n,
                };
                let (tx, rx) = mpsc::channel(cap);
                let name = sub.name();
                tokio::spawn(serve(sub, rx));
                Lane {
                    name,
                    tx,
                    dropped: AtomicU64::new(0),
                }
            })
            .collect();
        Self { lanes }
    }

    /// A set with no subscribers; `emit` is a no-op.
    #[must_use]
    pub fn empty() -> Self {
        Self { lanes: Vec::new() }
    }

    /// Queues `event` for every subscriber without waiting.
    pub fn emit(&self, event: Event) {
        if self.lanes.is_empty() {
            return;
        }
        let ev = Arc::new(event);
        for lane in &self.lanes {
            lane.offer(&ev);
        }
    }

    /// Events dropped so far across all subscribers.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.lanes
            .iter()
            .map(|lane| lane.dropped.load(Ordering::Relaxed))
            .sum()
    }

    /// True if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.len()
    }
}

impl Default for SubscriberSet {
    fn default() -> Self {
        Self::empty()
    }
}

/// Worker loop: one event at a time, panics contained.
async fn serve(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>) {
    while let Some(ev) = rx.recv().await {
        let call = std::panic::AssertUnwindSafe(sub.on_event(&ev));
        if call.catch_unwind().await.is_err() {
            warn!(subscriber = sub.name(), seq = ev.seq, kind = ev.kind.as_label(), "subscriber panicked");
        }
    }
}
