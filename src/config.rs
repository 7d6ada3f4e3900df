//! # Runner-wide configuration.
//!
//! Provides [`Config`], the defaults a [`Runner`](crate::Runner) applies to every record
//! that did not set its own value at registration time.
//!
//! ## Sentinel values
//! - any timeout of `0s` → no timeout (treated as `None` by the helpers below)
//! - `start_timeout = 0s` → do not wait for the health registry after `start`

use std::time::Duration;

/// Global configuration for the runner.
///
/// ## Field semantics
/// - `init_timeout`: default bound on each `init` call
/// - `start_timeout`: default bound on a started process becoming healthy (`0s` = don't wait)
/// - `stop_timeout`: default bound on each `stop` call
/// - `shutdown_timeout`: how long the watcher drains before aborting
/// - `finalize_timeout`: default bound on each `finalize` rollback
/// - `handle_signals`: subscribe to SIGINT/SIGTERM (Ctrl-C on non-unix)
/// - `subscriber_queue`: fallback queue size for subscribers reporting capacity `0`
///
/// All fields are public; prefer the helper accessors over sprinkling `0` checks.
#[derive(Clone, Debug)]
pub struct Config {
    /// Default init timeout for initializers and processes.
    pub init_timeout: Duration,

    /// Default health wait after a process has been started.
    pub start_timeout: Duration,

    /// Default stop timeout for processes that did not set their own.
    ///
    /// Keep it below `shutdown_timeout` so an overrunning `stop` is reported before
    /// the watcher aborts.
    pub stop_timeout: Duration,

    /// Time the watcher keeps draining before it gives up and aborts.
    ///
    /// Starts counting when graceful shutdown begins, regardless of whether
    /// [`Runner::shutdown`](crate::Runner::shutdown) was called.
    pub shutdown_timeout: Duration,

    /// Default finalize timeout for initializers with a rollback hook.
    pub finalize_timeout: Duration,

    /// Whether the watcher listens for OS termination signals.
    pub handle_signals: bool,

    /// Queue capacity used for subscribers that report a capacity of `0`.
    pub subscriber_queue: usize,
}

impl Config {
    /// Default init timeout as an `Option` (`None` = unbounded).
    #[inline]
    pub fn default_init_timeout(&self) -> Option<Duration> {
        non_zero(self.init_timeout)
    }

    /// Default start (health) timeout as an `Option` (`None` = don't wait).
    #[inline]
    pub fn default_start_timeout(&self) -> Option<Duration> {
        non_zero(self.start_timeout)
    }

    /// Default stop timeout as an `Option` (`None` = unbounded).
    #[inline]
    pub fn default_stop_timeout(&self) -> Option<Duration> {
        non_zero(self.stop_timeout)
    }

    /// Default finalize timeout as an `Option` (`None` = unbounded).
    #[inline]
    pub fn default_finalize_timeout(&self) -> Option<Duration> {
        non_zero(self.finalize_timeout)
    }

    /// Watcher drain timeout as an `Option` (`None` = drain forever).
    #[inline]
    pub fn drain_timeout(&self) -> Option<Duration> {
        non_zero(self.shutdown_timeout)
    }

    /// Subscriber queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn subscriber_queue_clamped(&self) -> usize {
        self.subscriber_queue.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `init_timeout = 60s`
    /// - `start_timeout = 0s` (no health wait)
    /// - `stop_timeout = 30s`
    /// - `shutdown_timeout = 60s`
    /// - `finalize_timeout = 60s`
    /// - `handle_signals = true`
    /// - `subscriber_queue = 1024`
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(60),
            start_timeout: Duration::ZERO,
            stop_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(60),
            finalize_timeout: Duration::from_secs(60),
            handle_signals: true,
            subscriber_queue: 1024,
        }
    }
}

/// Maps the `0s` sentinel to `None`.
#[inline]
pub(crate) fn non_zero(d: Duration) -> Option<Duration> {
    if d == Duration::ZERO { None } else { Some(d) }
}
