//! # procvisor
//!
//! **Procvisor** is an in-process supervisor for Rust services.
//!
//! It brings up independently developed components in a controlled order, keeps them
//! running, and tears them down safely on failure, on request, or on an OS signal.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ Initializer  │   │ Initializer  │   │   Process    │  ...
//!     │ (migrations) │   │   (caches)   │   │ (http, prio) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Registry                                                         │
//! │  - initializers in registration order                             │
//! │  - processes bucketed by priority (ascending)                     │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Runner::run(cfg) ──► ErrorStream                                 │
//! │  - supervision task (init, start levels, health gate, finalize)   │
//! │  - Watcher (signal / error / halt / timeout listeners)            │
//! │  - SubscriberSet (lifecycle events to subscribers)                │
//! │  - Health (reasons a running process is not ready yet)            │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   start task #1      start task #2      start task #N     (one per process)
//!   stop task #1       stop task #2       stop task #N      (wait for shutdown latch)
//! ```
//!
//! ### Lifecycle
//! ```text
//! Idle ──run()──► Watching ──first trigger──► Draining ──┬─ every task done ─► Done
//!                                                        └─ 2nd signal/timeout ─► Aborted
//!
//! Triggers: a reported error, a non-silent process exit, Runner::shutdown,
//!           SIGINT/SIGTERM (Ctrl-C elsewhere).
//! ```
//!
//! The returned [`ErrorStream`] yields every error of the run and closes exactly once,
//! when the process group has fully exited (or on abort).
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                                |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------------|
//! | **Units**         | One-shot setup with rollback, long-running processes.         | [`Initializer`], [`Finalizer`], [`Process`]       |
//! | **Registration**  | Names, priorities, per-phase timeouts, silent exit.           | [`Registry`], [`Options`]                         |
//! | **Supervision**   | Ordered startup, graceful shutdown, abort escalation.         | [`Runner`], [`ShutdownHandle`], [`ErrorStream`]   |
//! | **Composition**   | Concurrent initialization with rollback.                      | [`ParallelInitializer`]                           |
//! | **Readiness**     | Reasons a running process is not ready.                       | [`Health`]                                        |
//! | **Injection**     | Keyed, typed dependencies pulled before `init`.               | [`Dependencies`]                                  |
//! | **Observability** | Lifecycle events for logging and metrics.                     | [`Subscribe`], [`Event`], [`LogWriter`]           |
//! | **Time**          | Real and virtual clocks for every timeout.                    | [`Clock`], [`TokioClock`], [`ManualClock`]        |
//! | **Errors**        | Typed errors for every phase.                                 | [`RunError`], [`ShutdownError`], [`InitErrors`]   |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//! use procvisor::{BoxError, Config, Initializer, Options, Process, Registry, Runner};
//!
//! struct Migrations;
//!
//! #[async_trait]
//! impl Initializer<Arc<String>> for Migrations {
//!     async fn init(&mut self, _dsn: &Arc<String>) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//! }
//!
//! struct Worker {
//!     stop: CancellationToken,
//! }
//!
//! #[async_trait]
//! impl Process<Arc<String>> for Worker {
//!     async fn start(&self) -> Result<(), BoxError> {
//!         self.stop.cancelled().await;
//!         Ok(())
//!     }
//!
//!     async fn stop(&self) -> Result<(), BoxError> {
//!         self.stop.cancel();
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = Registry::new();
//!     registry
//!         .register_initializer(Migrations, Options::new().name("migrations"))
//!         .register_process(Worker { stop: CancellationToken::new() }, Options::new().name("worker"));
//!
//!     let cfg = Config { handle_signals: false, ..Config::default() };
//!     let mut runner = Runner::builder(registry).with_config(cfg).build();
//!
//!     let errors = runner.run(Arc::new("postgres://localhost/app".to_string()));
//!     runner.shutdown(Duration::from_secs(5)).await?;
//!
//!     for err in errors.collect_all().await {
//!         eprintln!("{err}");
//!     }
//!     Ok(())
//! }
//! ```
mod clock;
mod config;
mod core;
mod error;
mod events;
mod health;
mod inject;
mod registry;
mod subscribers;
mod units;

// ---- Public re-exports ----

pub use clock::{Clock, ClockRef, ManualClock, TokioClock};
pub use config::Config;
pub use crate::core::{ErrorStream, Runner, RunnerBuilder, ShutdownHandle, SignalStream};
pub use error::{BoxError, HealthError, InitErrors, InjectError, RunError, ShutdownError};
pub use events::{Event, EventKind};
pub use health::{Health, Reason};
pub use inject::Dependencies;
pub use registry::Registry;
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use units::{
    AppConfig, Finalizer, Initializer, InitializerRecord, Options, ParallelInitializer, Process,
    ProcessHandle, ProcessRecord, UNNAMED,
};
