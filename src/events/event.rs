//! # Lifecycle events emitted by the runner.
//!
//! The [`EventKind`] enum classifies events across three groups:
//! - **Initialization**: initializers and process `init` calls
//! - **Processes**: `start`, exit and `stop` of each process
//! - **Shutdown**: triggers observed by the watcher, reported errors, rollback
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use procvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ProcessStarting)
//!     .with_name("http")
//!     .with_priority(5)
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::ProcessStarting);
//! assert_eq!(ev.name.as_deref(), Some("http"));
//! assert_eq!(ev.priority, Some(5));
//! assert_eq!(ev.timeout_ms, Some(5_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Initialization ===
    /// An initializer is about to run `init`.
    ///
    /// Sets:
    /// - `name`: initializer name
    /// - `timeout_ms`: effective init timeout, if any
    InitializerStarting,

    /// An initializer finished `init` successfully.
    ///
    /// Sets:
    /// - `name`: initializer name
    InitializerReady,

    /// A process is about to run `init`.
    ///
    /// Sets:
    /// - `name`: process name
    /// - `priority`: process priority
    /// - `timeout_ms`: effective init timeout, if any
    ProcessInitializing,

    // === Processes ===
    /// A process is being started.
    ///
    /// Sets:
    /// - `name`: process name
    /// - `priority`: process priority
    ProcessStarting,

    /// A process' `start` returned.
    ///
    /// Sets:
    /// - `name`: process name
    /// - `reason`: the error message, if `start` failed
    ProcessExited,

    /// A process is being stopped.
    ///
    /// Sets:
    /// - `name`: process name
    /// - `timeout_ms`: effective shutdown timeout, if any
    ProcessStopping,

    // === Shutdown ===
    /// An initializer's rollback hook is about to run.
    ///
    /// Sets:
    /// - `name`: initializer name
    FinalizerStarting,

    /// Graceful shutdown began.
    ///
    /// Sets:
    /// - `reason`: trigger (`error`, `exited`, `signal`, `halt`, `closed`)
    ShutdownRequested,

    /// Shutdown escalated to abort; remaining work is abandoned.
    ///
    /// Sets:
    /// - `reason`: trigger (`signal`, `timeout`)
    AbortRequested,

    /// An OS termination signal was observed.
    ///
    /// Sets:
    /// - `reason`: `first` or `second`
    SignalReceived,

    /// An error was delivered to the public error stream.
    ///
    /// Sets:
    /// - `name`: originating record, if any
    /// - `reason`: error message
    ErrorReported,
}

impl EventKind {
    /// Short stable label (kebab-case) used by the built-in log writer.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::InitializerStarting => "initializer-starting",
            EventKind::InitializerReady => "initializer-ready",
            EventKind::ProcessInitializing => "process-initializing",
            EventKind::ProcessStarting => "process-starting",
            EventKind::ProcessExited => "process-exited",
            EventKind::ProcessStopping => "process-stopping",
            EventKind::FinalizerStarting => "finalizer-starting",
            EventKind::ShutdownRequested => "shutdown-requested",
            EventKind::AbortRequested => "abort-requested",
            EventKind::SignalReceived => "signal-received",
            EventKind::ErrorReported => "error-reported",
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Display name of the record, if applicable.
    pub name: Option<Arc<str>>,
    /// Human-readable reason (error message, shutdown trigger, etc.).
    pub reason: Option<Arc<str>>,
    /// Process priority, if applicable.
    pub priority: Option<i32>,
    /// Effective timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            name: None,
            reason: None,
            priority: None,
            timeout_ms: None,
        }
    }

    /// Attaches a record name.
    #[inline]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a process priority.
    #[inline]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches a timeout when one applies.
    #[inline]
    pub(crate) fn with_timeout_opt(self, d: Option<Duration>) -> Self {
        match d {
            Some(d) => self.with_timeout(d),
            None => self,
        }
    }
}
