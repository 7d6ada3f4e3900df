//! # Time source used for every timeout in the runtime.
//!
//! [`Clock`] supplies "now" and "sleep(duration)". Production code uses [`TokioClock`];
//! tests drive time by hand with [`ManualClock`] so timeouts fire deterministically.
//!
//! ## ManualClock
//! ```text
//! sleep(d) ─► registers waiter {deadline = now + d} ─► future resolves on advance()
//! advance(d) ─► now += d ─► fires every waiter with deadline <= now
//! block_until(n) ─► resolves once n sleeps are pending
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Notify, oneshot};

/// Source of time for timeouts.
pub trait Clock: Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Future that completes once `duration` has elapsed on this clock.
    ///
    /// The deadline is fixed when this method is called, not when the future is first polled.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Shared clock handle.
pub type ClockRef = Arc<dyn Clock>;

/// Real clock backed by `tokio::time`.
///
/// Honors tokio's paused test time (`#[tokio::test(start_paused = true)]`).
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

struct Waiter {
    deadline: Instant,
    tx: oneshot::Sender<()>,
}

struct ManualState {
    now: Instant,
    waiters: Vec<Waiter>,
}

struct ManualInner {
    state: Mutex<ManualState>,
    registered: Notify,
}

/// Virtual clock that only moves when [`advance`](ManualClock::advance) is called.
///
/// Cloning yields another handle to the same clock.
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<ManualInner>,
}

impl ManualClock {
    /// Creates a clock frozen at the current real instant.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManualInner {
                state: Mutex::new(ManualState {
                    now: Instant::now(),
                    waiters: Vec::new(),
                }),
                registered: Notify::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ManualState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Moves time forward and wakes every sleep whose deadline has been reached.
    pub fn advance(&self, by: Duration) {
        let fired: Vec<Waiter> = {
            let mut state = self.state();
            state.now += by;
            let now = state.now;
            let (due, pending) = std::mem::take(&mut state.waiters)
                .into_iter()
                .partition(|w| w.deadline <= now);
            state.waiters = pending;
            due
        };
        for w in fired {
            let _ = w.tx.send(());
        }
    }

    /// Number of sleeps currently pending (abandoned sleeps are not counted).
    pub fn pending(&self) -> usize {
        let mut state = self.state();
        state.waiters.retain(|w| !w.tx.is_closed());
        state.waiters.len()
    }

    /// Waits until at least `n` sleeps are pending.
    pub async fn block_until(&self, n: usize) {
        loop {
            let notified = self.inner.registered.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() >= n {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state().now
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state();
            let deadline = state.now + duration;
            if duration.is_zero() {
                let _ = tx.send(());
            } else {
                state.waiters.push(Waiter { deadline, tx });
            }
        }
        self.inner.registered.notify_waiters();
        async move {
            // A dropped sender means the clock is gone; time never reaches the deadline.
            if rx.await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
        .boxed()
    }
}
