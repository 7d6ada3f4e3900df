//! # Registration-time options.
//!
//! [`Options`] is the only per-unit configuration surface. It is applied once when a
//! unit is registered; fields that do not apply to a unit kind are ignored
//! (`priority`, `silent_exit`, `start_timeout` and `shutdown_timeout` only matter for
//! processes, `finalize_timeout` only for initializers with a rollback hook).
//!
//! Timeouts left unset inherit the runner's [`Config`](crate::Config); an explicit
//! `Duration::ZERO` means "no timeout".
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use procvisor::Options;
//!
//! let opts = Options::new()
//!     .name("http")
//!     .priority(5)
//!     .init_timeout(Duration::from_secs(10));
//! assert_eq!(opts.display_name(), "http");
//! assert_eq!(Options::new().display_name(), procvisor::UNNAMED);
//! ```

use std::borrow::Cow;
use std::time::Duration;

use crate::config::non_zero;

/// Display name used for units registered without a name.
pub const UNNAMED: &str = "<unnamed>";

/// Metadata applied to a unit at registration.
#[derive(Clone, Debug, Default)]
pub struct Options {
    pub(crate) name: Option<Cow<'static, str>>,
    pub(crate) priority: i32,
    pub(crate) silent_exit: bool,
    pub(crate) init_timeout: Option<Duration>,
    pub(crate) start_timeout: Option<Duration>,
    pub(crate) shutdown_timeout: Option<Duration>,
    pub(crate) finalize_timeout: Option<Duration>,
}

impl Options {
    /// Options with every field at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the display name used in logs and errors.
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the priority; lower priorities are initialized and started first.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// A clean return from `start` will not trigger a system-wide shutdown.
    pub fn silent_exit(mut self, silent: bool) -> Self {
        self.silent_exit = silent;
        self
    }

    /// Bounds the `init` call.
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = Some(timeout);
        self
    }

    /// Bounds how long after `start` the health registry may stay unhealthy.
    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = Some(timeout);
        self
    }

    /// Bounds the `stop` call.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Bounds the `finalize` rollback call.
    pub fn finalize_timeout(mut self, timeout: Duration) -> Self {
        self.finalize_timeout = Some(timeout);
        self
    }

    /// The name set with [`Options::name`], or [`UNNAMED`].
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNNAMED)
    }
}

/// Resolves a per-record timeout against a runner default.
///
/// - unset → `default`
/// - `0s` → no timeout
#[inline]
pub(crate) fn resolve(own: Option<Duration>, default: Option<Duration>) -> Option<Duration> {
    match own {
        Some(d) => non_zero(d),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = Options::new();
        assert_eq!(opts.display_name(), UNNAMED);
        assert_eq!(opts.priority, 0);
        assert!(!opts.silent_exit);
        assert!(opts.init_timeout.is_none());
    }

    #[test]
    fn resolve_prefers_own_value_and_honors_zero() {
        let default = Some(Duration::from_secs(60));
        assert_eq!(resolve(None, default), default);
        assert_eq!(
            resolve(Some(Duration::from_secs(1)), default),
            Some(Duration::from_secs(1))
        );
        assert_eq!(resolve(Some(Duration::ZERO), default), None);
    }
}
