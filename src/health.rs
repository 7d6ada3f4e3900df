//! # Readiness tracking for the running process group.
//!
//! [`Health`] keeps the set of reasons why the application is currently not ready to
//! serve. Any component can add a keyed [`Reason`] while it is warming up (binding a
//! listener, catching up on a backlog, ...) and remove it once done:
//!   - the application is healthy iff no reason is registered
//!   - keys are unique: adding a duplicate or removing a missing key is an error
//!     and leaves the registry untouched
//!   - [`Health::last_change`] reports how long ago the registry last flipped between
//!     healthy and unhealthy
//!
//! The registry is cheap to clone; clones share the same state. It is polled from
//! unrelated tasks at arbitrary times, so it is guarded by a single `RwLock`
//! (writers exclusive, readers shared). Transitions are additionally published on a
//! `watch` channel so that waiters ([`Health::wait_healthy`]) do not need to poll.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::debug;

use crate::clock::{ClockRef, TokioClock};
use crate::error::HealthError;

/// One registered cause of unreadiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reason {
    /// Opaque key chosen by the component that added the reason.
    pub key: String,
    /// When the reason was added.
    pub added: Instant,
}

struct State {
    reasons: HashMap<String, Reason>,
    last_change: Instant,
}

struct Inner {
    state: RwLock<State>,
    healthy: watch::Sender<bool>,
    clock: ClockRef,
}

/// Shared registry of readiness reasons.
#[derive(Clone)]
pub struct Health {
    inner: Arc<Inner>,
}

impl Health {
    /// Creates an empty (healthy) registry using the real clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(TokioClock))
    }

    /// Creates an empty (healthy) registry timestamping with `clock`.
    pub fn with_clock(clock: ClockRef) -> Self {
        let (healthy, _) = watch::channel(true);
        let now = clock.now();
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State {
                    reasons: HashMap::new(),
                    last_change: now,
                }),
                healthy,
                clock,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        // Every write leaves the state consistent, so a poisoned lock is still usable.
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new reason under `key`.
    ///
    /// Fails with [`HealthError::AlreadyRegistered`] if the key is present.
    pub fn add_reason(&self, key: impl Into<String>) -> Result<(), HealthError> {
        let key = key.into();
        let mut state = self.write();
        if state.reasons.contains_key(&key) {
            return Err(HealthError::AlreadyRegistered { key });
        }
        let now = self.inner.clock.now();
        if state.reasons.is_empty() {
            state.last_change = now;
            self.inner.healthy.send_replace(false);
        }
        debug!(reason = %key, "health reason added");
        state.reasons.insert(
            key.clone(),
            Reason {
                key,
                added: now,
            },
        );
        Ok(())
    }

    /// Removes the reason registered under `key`.
    ///
    /// Fails with [`HealthError::NotRegistered`] if the key is absent.
    pub fn remove_reason(&self, key: &str) -> Result<(), HealthError> {
        let mut state = self.write();
        if state.reasons.remove(key).is_none() {
            return Err(HealthError::NotRegistered {
                key: key.to_string(),
            });
        }
        debug!(reason = %key, "health reason removed");
        if state.reasons.is_empty() {
            state.last_change = self.inner.clock.now();
            self.inner.healthy.send_replace(true);
        }
        Ok(())
    }

    /// Returns the registered reasons, oldest first.
    pub fn reasons(&self) -> Vec<Reason> {
        let state = self.read();
        let mut reasons: Vec<Reason> = state.reasons.values().cloned().collect();
        reasons.sort_by(|a, b| a.added.cmp(&b.added).then_with(|| a.key.cmp(&b.key)));
        reasons
    }

    /// Returns the registered keys, sorted.
    pub fn reason_keys(&self) -> Vec<String> {
        let state = self.read();
        let mut keys: Vec<String> = state.reasons.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// True if no reason is registered.
    pub fn is_healthy(&self) -> bool {
        self.read().reasons.is_empty()
    }

    /// Time elapsed since the registry last flipped between healthy and unhealthy
    /// (or since creation if it never did).
    pub fn last_change(&self) -> Duration {
        let last = self.read().last_change;
        self.inner.clock.now().saturating_duration_since(last)
    }

    /// Resolves once no reason is registered.
    pub async fn wait_healthy(&self) {
        let mut rx = self.inner.healthy.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|healthy| *healthy).await;
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Health")
            .field("reasons", &self.reason_keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn starts_healthy() {
        let health = Health::new();
        assert!(health.is_healthy());
        assert!(health.reasons().is_empty());
    }

    #[test]
    fn add_then_remove_restores_previous_set() {
        let health = Health::new();
        health.add_reason("warming").unwrap();
        let before = health.reason_keys();

        health.add_reason("binding").unwrap();
        health.remove_reason("binding").unwrap();

        assert_eq!(health.reason_keys(), before);
        assert!(!health.is_healthy());
    }

    #[test]
    fn duplicate_add_fails_without_mutation() {
        let health = Health::new();
        health.add_reason("a").unwrap();
        let err = health.add_reason("a").unwrap_err();
        assert_eq!(err, HealthError::AlreadyRegistered { key: "a".into() });
        assert_eq!(health.reason_keys(), vec!["a".to_string()]);
    }

    #[test]
    fn missing_remove_fails_without_mutation() {
        let health = Health::new();
        health.add_reason("a").unwrap();
        let err = health.remove_reason("b").unwrap_err();
        assert_eq!(err, HealthError::NotRegistered { key: "b".into() });
        assert_eq!(health.reason_keys(), vec!["a".to_string()]);
    }

    #[test]
    fn last_change_tracks_transitions_only() {
        let clock = ManualClock::new();
        let health = Health::with_clock(Arc::new(clock.clone()));

        clock.advance(Duration::from_secs(5));
        assert_eq!(health.last_change(), Duration::from_secs(5));

        health.add_reason("a").unwrap();
        assert_eq!(health.last_change(), Duration::ZERO);

        clock.advance(Duration::from_secs(3));
        // Not a transition: still unhealthy.
        health.add_reason("b").unwrap();
        assert_eq!(health.last_change(), Duration::from_secs(3));

        health.remove_reason("a").unwrap();
        clock.advance(Duration::from_secs(1));
        assert_eq!(health.last_change(), Duration::from_secs(4));

        health.remove_reason("b").unwrap();
        assert_eq!(health.last_change(), Duration::ZERO);
    }

    #[test]
    fn reasons_are_ordered_by_insertion_time() {
        let clock = ManualClock::new();
        let health = Health::with_clock(Arc::new(clock.clone()));
        health.add_reason("z").unwrap();
        clock.advance(Duration::from_millis(1));
        health.add_reason("a").unwrap();

        let keys: Vec<String> = health.reasons().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["z".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn wait_healthy_resolves_on_last_removal() {
        let health = Health::new();
        health.add_reason("a").unwrap();

        let waiter = {
            let health = health.clone();
            tokio::spawn(async move { health.wait_healthy().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        health.remove_reason("a").unwrap();
        waiter.await.unwrap();
    }
}
