//! Error types used by the procvisor runtime and by supervised units.
//!
//! - [`RunError`] - every error delivered on the runner's public error stream.
//! - [`ShutdownError`] - returned to callers of [`Runner::shutdown`](crate::Runner::shutdown).
//! - [`HealthError`] - misuse of the [`Health`](crate::Health) registry.
//! - [`InjectError`] - a dependency could not be resolved.
//! - [`InitErrors`] - the unordered failure set of a [`ParallelInitializer`](crate::ParallelInitializer).
//!
//! Errors that describe a unit carry its display name; `as_label` gives a stable
//! snake_case label for logs/metrics.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Error type returned by user units (`init`, `start`, `stop`, `finalize`).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// # Errors produced while running the supervised process group.
///
/// Each variant names the record and the phase it failed in. The watcher decides
/// whether an error also triggers a graceful shutdown (every error does).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RunError {
    /// Dependencies could not be injected into a record before its `init`.
    #[error("could not inject dependencies into {name}: {source}")]
    Inject {
        /// Display name of the record.
        name: String,
        /// The resolution failure.
        source: InjectError,
    },

    /// A unit's `init` returned an error.
    #[error("could not initialize {name}: {source}")]
    Init {
        /// Display name of the record.
        name: String,
        /// The underlying error.
        source: BoxError,
    },

    /// A unit's `init` did not complete within its init timeout.
    #[error("{name} did not initialize within timeout {timeout:?}")]
    InitTimeout {
        /// Display name of the record.
        name: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// Shutdown was requested while the unit was still initializing.
    #[error("aborting initialization of {name}")]
    InitAborted {
        /// Display name of the record.
        name: String,
    },

    /// A process' `start` returned an error.
    #[error("could not start {name}: {source}")]
    Start {
        /// Display name of the record.
        name: String,
        /// The underlying error.
        source: BoxError,
    },

    /// A process' `stop` returned an error.
    #[error("could not stop {name}: {source}")]
    Stop {
        /// Display name of the record.
        name: String,
        /// The underlying error.
        source: BoxError,
    },

    /// A process' `stop` did not complete within its shutdown timeout.
    #[error("{name} did not stop within timeout {timeout:?}")]
    StopTimeout {
        /// Display name of the record.
        name: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// A started process did not see the health registry clear within its start timeout.
    #[error("process did not become healthy within timeout: {name} (outstanding reasons: {reasons:?})")]
    HealthTimeout {
        /// Display name of the record.
        name: String,
        /// Keys of the reasons still registered when the timeout elapsed.
        reasons: Vec<String>,
    },

    /// An initializer's rollback hook returned an error.
    #[error("could not finalize {name}: {source}")]
    Finalize {
        /// Display name of the record.
        name: String,
        /// The underlying error.
        source: BoxError,
    },

    /// An initializer's rollback hook did not complete within its finalize timeout.
    #[error("{name} did not finalize within timeout {timeout:?}")]
    FinalizeTimeout {
        /// Display name of the record.
        name: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The unit's future panicked during the given phase.
    #[error("{name} panicked during {phase}")]
    Panicked {
        /// Display name of the record.
        name: String,
        /// Lifecycle phase (`init`, `start`, `stop`, `finalize`).
        phase: &'static str,
    },

    /// `run` was called on a runner that already ran.
    #[error("runner already started")]
    AlreadyStarted,
}

impl RunError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::RunError;
    ///
    /// let err = RunError::InitAborted { name: "db".into() };
    /// assert_eq!(err.as_label(), "init_aborted");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RunError::Inject { .. } => "inject_failed",
            RunError::Init { .. } => "init_failed",
            RunError::InitTimeout { .. } => "init_timeout",
            RunError::InitAborted { .. } => "init_aborted",
            RunError::Start { .. } => "start_failed",
            RunError::Stop { .. } => "stop_failed",
            RunError::StopTimeout { .. } => "stop_timeout",
            RunError::HealthTimeout { .. } => "health_timeout",
            RunError::Finalize { .. } => "finalize_failed",
            RunError::FinalizeTimeout { .. } => "finalize_timeout",
            RunError::Panicked { .. } => "panicked",
            RunError::AlreadyStarted => "already_started",
        }
    }

    /// Returns the display name of the record the error originated from, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            RunError::Inject { name, .. }
            | RunError::Init { name, .. }
            | RunError::InitTimeout { name, .. }
            | RunError::InitAborted { name }
            | RunError::Start { name, .. }
            | RunError::Stop { name, .. }
            | RunError::StopTimeout { name, .. }
            | RunError::HealthTimeout { name, .. }
            | RunError::Finalize { name, .. }
            | RunError::FinalizeTimeout { name, .. }
            | RunError::Panicked { name, .. } => Some(name),
            RunError::AlreadyStarted => None,
        }
    }
}

/// # Errors returned by [`Runner::shutdown`](crate::Runner::shutdown).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShutdownError {
    /// The error stream did not close before the caller's timeout.
    #[error("did not shutdown within timeout {timeout:?}")]
    Timeout {
        /// The caller-supplied timeout.
        timeout: Duration,
    },
}

impl ShutdownError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ShutdownError::Timeout { .. } => "shutdown_timeout",
        }
    }
}

/// # Errors produced by the [`Health`](crate::Health) registry.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HealthError {
    /// `add_reason` was called with a key that is already present.
    #[error("reason already registered: {key}")]
    AlreadyRegistered {
        /// The duplicate key.
        key: String,
    },

    /// `remove_reason` was called with a key that is not present.
    #[error("reason not registered: {key}")]
    NotRegistered {
        /// The missing key.
        key: String,
    },
}

/// # Errors produced while resolving dependencies.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InjectError {
    /// Nothing was provided under the requested key.
    #[error("missing dependency `{key}` of type {expected}")]
    Missing {
        /// Requested key.
        key: String,
        /// Requested type name.
        expected: &'static str,
    },

    /// A value exists under the key but has a different type.
    #[error("dependency `{key}` has type {found}, expected {expected}")]
    Mismatch {
        /// Requested key.
        key: String,
        /// Requested type name.
        expected: &'static str,
        /// Type name of the stored value.
        found: &'static str,
    },
}

/// Unordered set of failures collected while running units concurrently.
///
/// Every entry carries the name of the record it came from (see [`RunError::name`]).
#[derive(Debug, Default)]
pub struct InitErrors(Vec<RunError>);

impl InitErrors {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds one failure.
    pub fn push(&mut self, err: RunError) {
        self.0.push(err);
    }

    /// True if no failure was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of failures.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the failures.
    pub fn iter(&self) -> impl Iterator<Item = &RunError> {
        self.0.iter()
    }

    /// Consumes the set, returning the failures.
    pub fn into_vec(self) -> Vec<RunError> {
        self.0
    }
}

impl Extend<RunError> for InitErrors {
    fn extend<T: IntoIterator<Item = RunError>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl IntoIterator for InitErrors {
    type Item = RunError;
    type IntoIter = std::vec::IntoIter<RunError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for InitErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred:", self.0.len())?;
        for err in &self.0 {
            write!(f, " [{err}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for InitErrors {}
