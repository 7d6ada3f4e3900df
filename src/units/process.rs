//! # Processes: long-running units with `start` / `stop`.
//!
//! A [`Process`] is initialized once, then `start` runs for as long as the unit is
//! serving. `stop` must make a running `start` return; the runtime never kills a
//! `start` call.
//!
//! ```text
//! ProcessRecord ──inject──► ProcessRecord ──init──► ProcessHandle ──start──► ... ──stop──►
//!  (registered)                                     (shared, Arc)            (at most once)
//! ```
//!
//! [`ProcessHandle::stop`] is guarded: concurrent shutdown triggers (signal, error,
//! explicit shutdown) collapse into exactly one call to the unit's `stop`.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//! use procvisor::{BoxError, Process};
//!
//! struct Ticker {
//!     stop: CancellationToken,
//! }
//!
//! #[async_trait]
//! impl Process<()> for Ticker {
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
//! ```

use std::borrow::Cow;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::clock::ClockRef;
use crate::core::phase::{Outcome, race};
use crate::error::{BoxError, InjectError, RunError};
use crate::inject::Dependencies;
use crate::units::AppConfig;
use crate::units::options::{Options, UNNAMED, resolve};

/// # Long-running supervised unit.
#[async_trait]
pub trait Process<C: AppConfig>: Send + Sync + 'static {
    /// Pulls dependencies before `init`. Defaults to needing none.
    fn inject(&mut self, _deps: &Dependencies) -> Result<(), InjectError> {
        Ok(())
    }

    /// Prepares the unit. Defaults to nothing.
    async fn init(&mut self, _cfg: &C) -> Result<(), BoxError> {
        Ok(())
    }

    /// Serves until done or until `stop` is called.
    async fn start(&self) -> Result<(), BoxError>;

    /// Makes a running `start` return.
    async fn stop(&self) -> Result<(), BoxError>;
}

/// Registration metadata shared by [`ProcessRecord`] and [`ProcessHandle`].
#[derive(Clone, Debug)]
struct Meta {
    name: Cow<'static, str>,
    priority: i32,
    silent_exit: bool,
    init_timeout: Option<Duration>,
    start_timeout: Option<Duration>,
    shutdown_timeout: Option<Duration>,
}

/// A registered, not yet initialized [`Process`].
pub struct ProcessRecord<C: AppConfig> {
    unit: Box<dyn Process<C>>,
    meta: Meta,
}

impl<C: AppConfig> ProcessRecord<C> {
    /// Wraps `unit` with `opts`.
    pub fn new(unit: impl Process<C>, opts: Options) -> Self {
        Self {
            unit: Box::new(unit),
            meta: Meta {
                name: opts.name.unwrap_or(Cow::Borrowed(UNNAMED)),
                priority: opts.priority,
                silent_exit: opts.silent_exit,
                init_timeout: opts.init_timeout,
                start_timeout: opts.start_timeout,
                shutdown_timeout: opts.shutdown_timeout,
            },
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Priority; lower runs first.
    pub fn priority(&self) -> i32 {
        self.meta.priority
    }

    /// True if a clean exit must not trigger shutdown.
    pub fn silent_exit(&self) -> bool {
        self.meta.silent_exit
    }

    /// Init timeout set at registration (`None` = runner default).
    pub fn init_timeout(&self) -> Option<Duration> {
        self.meta.init_timeout
    }

    /// Health timeout set at registration (`None` = runner default).
    pub fn start_timeout(&self) -> Option<Duration> {
        self.meta.start_timeout
    }

    /// Stop timeout set at registration (`None` = unbounded).
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.meta.shutdown_timeout
    }

    pub(crate) fn inject(&mut self, deps: &Dependencies) -> Result<(), RunError> {
        self.unit.inject(deps).map_err(|source| RunError::Inject {
            name: self.meta.name.to_string(),
            source,
        })
    }

    /// Runs `init` under its timeout and `abort`, producing a startable handle.
    pub(crate) async fn init(
        self,
        cfg: C,
        clock: &ClockRef,
        default_timeout: Option<Duration>,
        abort: Option<&CancellationToken>,
    ) -> Result<ProcessHandle<C>, RunError> {
        let timeout = resolve(self.meta.init_timeout, default_timeout);
        let name = self.meta.name.to_string();
        let Self { mut unit, meta } = self;

        let call = async move {
            let res = unit.init(&cfg).await;
            (unit, res)
        };
        match race(call, clock, timeout, abort).await {
            Outcome::Done((unit, Ok(()))) => Ok(ProcessHandle {
                unit: Arc::from(unit),
                meta,
                stopped: OnceCell::new(),
            }),
            Outcome::Done((_, Err(source))) => Err(RunError::Init { name, source }),
            Outcome::TimedOut(timeout) => Err(RunError::InitTimeout { name, timeout }),
            Outcome::Aborted => Err(RunError::InitAborted { name }),
            Outcome::Panicked => Err(RunError::Panicked {
                name,
                phase: "init",
            }),
        }
    }
}

impl<C: AppConfig> std::fmt::Debug for ProcessRecord<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRecord")
            .field("meta", &self.meta)
            .finish()
    }
}

/// An initialized [`Process`], shared between its start task and its stop trigger.
pub struct ProcessHandle<C: AppConfig> {
    unit: Arc<dyn Process<C>>,
    meta: Meta,
    stopped: OnceCell<()>,
}

impl<C: AppConfig> ProcessHandle<C> {
    /// Display name.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Priority bucket the process was registered in.
    pub fn priority(&self) -> i32 {
        self.meta.priority
    }

    /// True if a clean exit must not trigger shutdown.
    pub fn silent_exit(&self) -> bool {
        self.meta.silent_exit
    }

    pub(crate) fn shutdown_timeout(&self, default: Option<Duration>) -> Option<Duration> {
        resolve(self.meta.shutdown_timeout, default)
    }

    pub(crate) fn start_timeout(&self, default: Option<Duration>) -> Option<Duration> {
        resolve(self.meta.start_timeout, default)
    }

    /// Runs the unit's `start` to completion.
    pub async fn start(&self) -> Result<(), RunError> {
        match AssertUnwindSafe(self.unit.start()).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(RunError::Start {
                name: self.meta.name.to_string(),
                source,
            }),
            Err(_) => Err(RunError::Panicked {
                name: self.meta.name.to_string(),
                phase: "start",
            }),
        }
    }

    /// Calls the unit's `stop` at most once.
    ///
    /// The first caller runs `stop` and gets its result; concurrent callers wait for
    /// it to finish and return `Ok(())`, as do all later callers.
    pub async fn stop(&self) -> Result<(), RunError> {
        let mut result = Ok(());
        let slot = &mut result;
        self.stopped
            .get_or_init(move || async move {
                *slot = self.stop_unit().await;
            })
            .await;
        result
    }

    /// True once `stop` has completed.
    pub fn is_stopped(&self) -> bool {
        self.stopped.initialized()
    }

    async fn stop_unit(&self) -> Result<(), RunError> {
        match AssertUnwindSafe(self.unit.stop()).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(RunError::Stop {
                name: self.meta.name.to_string(),
                source,
            }),
            Err(_) => Err(RunError::Panicked {
                name: self.meta.name.to_string(),
                phase: "stop",
            }),
        }
    }

    /// Stops under the record's shutdown timeout, or `default` if it set none.
    ///
    /// A `stop` that overruns is abandoned.
    pub(crate) async fn stop_within(
        self: &Arc<Self>,
        clock: &ClockRef,
        default: Option<Duration>,
    ) -> Result<(), RunError> {
        let Some(timeout) = self.shutdown_timeout(default) else {
            return self.stop().await;
        };
        let me = Arc::clone(self);
        match race(async move { me.stop().await }, clock, Some(timeout), None).await {
            Outcome::Done(res) => res,
            Outcome::TimedOut(timeout) => Err(RunError::StopTimeout {
                name: self.meta.name.to_string(),
                timeout,
            }),
            Outcome::Aborted | Outcome::Panicked => Err(RunError::Panicked {
                name: self.meta.name.to_string(),
                phase: "stop",
            }),
        }
    }
}

impl<C: AppConfig> std::fmt::Debug for ProcessHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("meta", &self.meta)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
