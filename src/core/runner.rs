//! # Runner: sequences initialization, fans out processes, drives shutdown.
//!
//! ```text
//! run(cfg) ──► Watcher::watch()                  (four listeners + control loop)
//!          └─► supervision task:
//!                initializers, in order          inject → init (race: done | shutdown | timeout)
//!                inject every process, all levels
//!                for level in priorities (ascending):
//!                    init each record, in order  (same race)
//!                    spawn start task + paired stop task per record
//!                    health gate                 (records with a start timeout)
//!                wait for every task             (or abort → detach and leave)
//!                finalize initializers, reverse order
//!                drop reporter ──► watcher closes the public ErrorStream
//! ```
//!
//! ## Rules
//! - The first failure in any startup phase is reported and ends startup; levels already
//!   started keep running until the watcher's shutdown latch stops them.
//! - Every started process is stopped exactly once, concurrently with its siblings, as
//!   soon as graceful shutdown begins.
//! - Nothing is ever killed: abandoned calls keep running in their own tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::clock::ClockRef;
use crate::config::Config;
use crate::core::builder::RunnerBuilder;
use crate::core::signals::{SignalStream, os_signals};
use crate::core::stream::ErrorStream;
use crate::core::watcher::{Latches, Reporter, Watcher};
use crate::error::{RunError, ShutdownError};
use crate::events::{Event, EventKind};
use crate::health::Health;
use crate::inject::Dependencies;
use crate::registry::Registry;
use crate::subscribers::SubscriberSet;
use crate::units::{AppConfig, InitializerRecord, ProcessHandle, ProcessRecord, resolve};

/// Supervisor for one [`Registry`].
///
/// ## Example
/// ```no_run
/// use std::time::Duration;
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use procvisor::{BoxError, Options, Process, Registry, Runner};
///
/// struct Server {
///     stop: CancellationToken,
/// }
///
/// #[async_trait]
/// impl Process<()> for Server {
///     async fn start(&self) -> Result<(), BoxError> {
///         self.stop.cancelled().await;
///         Ok(())
///     }
///     async fn stop(&self) -> Result<(), BoxError> {
///         self.stop.cancel();
///         Ok(())
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let mut registry = Registry::new();
///     registry.register_process(Server { stop: CancellationToken::new() }, Options::new().name("http"));
///
///     let mut runner = Runner::new(registry);
///     let mut errors = runner.run(());
///     while let Some(err) = errors.recv().await {
///         eprintln!("{err}");
///     }
/// }
/// ```
pub struct Runner<C: AppConfig> {
    registry: Option<Registry<C>>,
    health: Health,
    deps: Arc<Dependencies>,
    clock: ClockRef,
    cfg: Config,
    subs: Arc<SubscriberSet>,
    signals: Option<SignalStream>,
    latches: Latches,
    control: ShutdownHandle,
}

impl<C: AppConfig> Runner<C> {
    /// Runner with default collaborators: fresh health registry, no dependencies,
    /// real clock, [`Config::default`], no subscribers.
    pub fn new(registry: Registry<C>) -> Self {
        RunnerBuilder::new(registry).build()
    }

    /// Starts building a runner for `registry`.
    pub fn builder(registry: Registry<C>) -> RunnerBuilder<C> {
        RunnerBuilder::new(registry)
    }

    pub(crate) fn from_parts(
        registry: Registry<C>,
        health: Health,
        deps: Arc<Dependencies>,
        clock: ClockRef,
        cfg: Config,
        subs: Arc<SubscriberSet>,
        signals: Option<SignalStream>,
    ) -> Self {
        let latches = Latches::new();
        let control = ShutdownHandle {
            halt: CancellationToken::new(),
            done: latches.done.clone(),
            started: Arc::new(AtomicBool::new(false)),
            clock: Arc::clone(&clock),
        };
        Self {
            registry: Some(registry),
            health,
            deps,
            clock,
            cfg,
            subs,
            signals,
            latches,
            control,
        }
    }

    /// Health registry shared with the supervised units.
    pub fn health(&self) -> &Health {
        &self.health
    }

    /// Runner configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// True once [`run`](Self::run) has been called.
    pub fn is_started(&self) -> bool {
        self.registry.is_none()
    }

    /// Cloneable handle for requesting shutdown from other tasks.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.control.clone()
    }

    /// Starts the watcher and the supervision task, returning the public error stream.
    ///
    /// `cfg` is cloned into every `init` call and never inspected. The stream closes
    /// once every supervised task has wound down, or immediately on abort.
    ///
    /// A second call returns a stream carrying a single [`RunError::AlreadyStarted`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn run(&mut self, cfg: C) -> ErrorStream {
        let Some(registry) = self.registry.take() else {
            return ErrorStream::single(RunError::AlreadyStarted);
        };
        self.control.started.store(true, Ordering::SeqCst);

        let (public_tx, public_rx) = mpsc::unbounded_channel();
        let (reporter, reports) = Reporter::channel();

        let signals = match self.signals.take() {
            Some(custom) => Some(custom),
            None if self.cfg.handle_signals => match os_signals() {
                Ok(s) => Some(s),
                Err(err) => {
                    warn!(error = %err, "could not subscribe to termination signals");
                    None
                }
            },
            None => None,
        };

        Watcher::new(
            self.latches.clone(),
            self.control.halt.clone(),
            signals,
            Arc::clone(&self.clock),
            self.cfg.drain_timeout(),
            Arc::clone(&self.subs),
        )
        .watch(reports, public_tx);

        let supervision = Supervision {
            app: cfg,
            cfg: self.cfg.clone(),
            clock: Arc::clone(&self.clock),
            deps: Arc::clone(&self.deps),
            health: self.health.clone(),
            subs: Arc::clone(&self.subs),
            latches: self.latches.clone(),
            reporter,
        };
        tokio::spawn(supervision.run(registry));

        ErrorStream::new(public_rx)
    }

    /// Requests a graceful shutdown and waits for the public error stream to close.
    ///
    /// See [`ShutdownHandle::shutdown`].
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ShutdownError> {
        self.control.shutdown(timeout).await
    }
}

/// Requests shutdown of a [`Runner`] from anywhere.
#[derive(Clone)]
pub struct ShutdownHandle {
    halt: CancellationToken,
    done: CancellationToken,
    started: Arc<AtomicBool>,
    clock: ClockRef,
}

impl ShutdownHandle {
    /// Requests a graceful shutdown and waits for the public error stream to close.
    ///
    /// Returns [`ShutdownError::Timeout`] if it is still open after `timeout`. Returns
    /// immediately if the runner was never started; a later `run` then shuts down as
    /// soon as it begins. Calling it again, or concurrently, is harmless.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ShutdownError> {
        self.halt.cancel();
        if !self.started.load(Ordering::SeqCst) {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = self.done.cancelled() => Ok(()),
            _ = self.clock.sleep(timeout) => Err(ShutdownError::Timeout { timeout }),
        }
    }

    /// True once the public error stream has closed.
    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("requested", &self.halt.is_cancelled())
            .field("done", &self.done.is_cancelled())
            .finish()
    }
}

impl<C: AppConfig> std::fmt::Debug for Runner<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("started", &self.is_started())
            .field("cfg", &self.cfg)
            .field("subscribers", &self.subs.len())
            .finish()
    }
}

/// State moved into the supervision task.
struct Supervision<C: AppConfig> {
    app: C,
    cfg: Config,
    clock: ClockRef,
    deps: Arc<Dependencies>,
    health: Health,
    subs: Arc<SubscriberSet>,
    latches: Latches,
    reporter: Reporter,
}

impl<C: AppConfig> Supervision<C> {
    async fn run(self, registry: Registry<C>) {
        let (initializers, levels) = registry.into_parts();
        let mut tasks = JoinSet::new();

        let (ready, initialized) = self.init_initializers(initializers).await;
        if initialized {
            self.start_levels(levels, &mut tasks).await;
        }

        let drained = tokio::select! {
            biased;
            _ = self.latches.abort.cancelled() => false,
            _ = async { while tasks.join_next().await.is_some() {} } => true,
        };
        if !drained {
            // Outstanding start/stop calls keep running in the background.
            tasks.detach_all();
            return;
        }

        self.finalize(ready).await;
    }

    /// Injects then initializes every initializer in order.
    ///
    /// Returns the records that initialized, and whether all of them did.
    async fn init_initializers(
        &self,
        records: Vec<InitializerRecord<C>>,
    ) -> (Vec<InitializerRecord<C>>, bool) {
        let default_timeout = self.cfg.default_init_timeout();
        let mut ready = Vec::with_capacity(records.len());

        for mut rec in records {
            rec.attach(&self.clock, &self.cfg);
            if let Err(err) = rec.inject(&self.deps) {
                self.reporter.error(err);
                return (ready, false);
            }
            let name = rec.name().to_string();
            self.subs.emit(
                Event::new(EventKind::InitializerStarting)
                    .with_name(name.as_str())
                    .with_timeout_opt(resolve(rec.init_timeout(), default_timeout)),
            );
            let res = rec
                .init(
                    self.app.clone(),
                    &self.clock,
                    default_timeout,
                    Some(&self.latches.shutdown),
                )
                .await;
            match res {
                Ok(rec) => {
                    self.subs
                        .emit(Event::new(EventKind::InitializerReady).with_name(name));
                    ready.push(rec);
                }
                Err(err) => {
                    self.reporter.error(err);
                    return (ready, false);
                }
            }
        }
        (ready, true)
    }

    /// Injects every process, then brings the levels up in ascending priority.
    async fn start_levels(&self, mut levels: Vec<Vec<ProcessRecord<C>>>, tasks: &mut JoinSet<()>) {
        for rec in levels.iter_mut().flatten() {
            if let Err(err) = rec.inject(&self.deps) {
                self.reporter.error(err);
                return;
            }
        }

        let default_timeout = self.cfg.default_init_timeout();
        for level in levels {
            let mut handles = Vec::with_capacity(level.len());
            for rec in level {
                self.subs.emit(
                    Event::new(EventKind::ProcessInitializing)
                        .with_name(rec.name())
                        .with_priority(rec.priority())
                        .with_timeout_opt(resolve(rec.init_timeout(), default_timeout)),
                );
                let res = rec
                    .init(
                        self.app.clone(),
                        &self.clock,
                        default_timeout,
                        Some(&self.latches.shutdown),
                    )
                    .await;
                match res {
                    Ok(handle) => handles.push(Arc::new(handle)),
                    Err(err) => {
                        self.reporter.error(err);
                        return;
                    }
                }
            }

            if self.latches.shutdown.is_cancelled() {
                return;
            }
            let entered: Vec<_> = handles
                .iter()
                .map(|handle| self.spawn_process(tasks, Arc::clone(handle)))
                .collect();
            for rx in entered {
                let _ = rx.await;
            }

            if !self.health_gate(&handles).await {
                return;
            }
        }
    }

    /// Spawns the start task and its paired stop-on-shutdown task.
    ///
    /// The returned receiver fires once `start` has been called.
    fn spawn_process(
        &self,
        tasks: &mut JoinSet<()>,
        handle: Arc<ProcessHandle<C>>,
    ) -> oneshot::Receiver<()> {
        let (entered_tx, entered_rx) = oneshot::channel();
        let subs = Arc::clone(&self.subs);
        let reporter = self.reporter.clone();
        let starting = Arc::clone(&handle);
        tasks.spawn(async move {
            subs.emit(
                Event::new(EventKind::ProcessStarting)
                    .with_name(starting.name())
                    .with_priority(starting.priority()),
            );
            let start = starting.start();
            let _ = entered_tx.send(());
            match start.await {
                Ok(()) => {
                    subs.emit(Event::new(EventKind::ProcessExited).with_name(starting.name()));
                    reporter.exited(starting.name(), starting.silent_exit());
                }
                Err(err) => {
                    subs.emit(
                        Event::new(EventKind::ProcessExited)
                            .with_name(starting.name())
                            .with_reason(err.to_string()),
                    );
                    reporter.error(err);
                }
            }
        });

        let subs = Arc::clone(&self.subs);
        let reporter = self.reporter.clone();
        let latches = self.latches.clone();
        let clock = Arc::clone(&self.clock);
        let stop_timeout = self.cfg.default_stop_timeout();
        tasks.spawn(async move {
            tokio::select! {
                biased;
                _ = latches.abort.cancelled() => return,
                _ = latches.shutdown.cancelled() => {}
            }
            subs.emit(
                Event::new(EventKind::ProcessStopping)
                    .with_name(handle.name())
                    .with_timeout_opt(handle.shutdown_timeout(stop_timeout)),
            );
            if let Err(err) = handle.stop_within(&clock, stop_timeout).await {
                reporter.error(err);
            }
        });

        entered_rx
    }

    /// Waits for the health registry to clear for every record with a start timeout.
    ///
    /// Returns `false` if later levels must not be started.
    async fn health_gate(&self, handles: &[Arc<ProcessHandle<C>>]) -> bool {
        let default_timeout = self.cfg.default_start_timeout();
        for handle in handles {
            let Some(timeout) = handle.start_timeout(default_timeout) else {
                continue;
            };
            let healthy = tokio::select! {
                biased;
                _ = self.latches.shutdown.cancelled() => return false,
                _ = self.health.wait_healthy() => true,
                _ = self.clock.sleep(timeout) => false,
            };
            if !healthy {
                self.reporter.error(RunError::HealthTimeout {
                    name: handle.name().to_string(),
                    reasons: self.health.reason_keys(),
                });
                return false;
            }
        }
        true
    }

    /// Rolls back initializers in reverse registration order.
    async fn finalize(&self, ready: Vec<InitializerRecord<C>>) {
        let default_timeout = self.cfg.default_finalize_timeout();
        for rec in ready.into_iter().rev() {
            if !rec.has_finalizer() {
                continue;
            }
            self.subs
                .emit(Event::new(EventKind::FinalizerStarting).with_name(rec.name()));
            let res = tokio::select! {
                biased;
                _ = self.latches.abort.cancelled() => return,
                res = rec.finalize(&self.clock, default_timeout) => res,
            };
            if let Err(err) = res {
                self.reporter.error(err);
            }
        }
    }
}
