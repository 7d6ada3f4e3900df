use std::sync::Arc;

use crate::{
    clock::{ClockRef, TokioClock},
    config::Config,
    core::{runner::Runner, signals::SignalStream},
    health::Health,
    inject::Dependencies,
    registry::Registry,
    subscribers::{Subscribe, SubscriberSet},
    units::AppConfig,
};

/// Builder for constructing a [`Runner`] with non-default collaborators.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use procvisor::{Config, Dependencies, Health, Registry, Runner};
///
/// let mut deps = Dependencies::new();
/// deps.provide("dsn", String::from("postgres://localhost/app"));
///
/// let cfg = Config {
///     shutdown_timeout: Duration::from_secs(10),
///     handle_signals: false,
///     ..Config::default()
/// };
///
/// let runner = Runner::builder(Registry::<()>::new())
///     .with_config(cfg)
///     .with_dependencies(Arc::new(deps))
///     .with_health(Health::new())
///     .build();
/// assert!(!runner.is_started());
/// ```
pub struct RunnerBuilder<C: AppConfig> {
    registry: Registry<C>,
    cfg: Config,
    health: Option<Health>,
    deps: Arc<Dependencies>,
    clock: ClockRef,
    subscribers: Vec<Arc<dyn Subscribe>>,
    signals: Option<SignalStream>,
}

impl<C: AppConfig> RunnerBuilder<C> {
    /// Creates a new builder for `registry` with default collaborators.
    pub fn new(registry: Registry<C>) -> Self {
        Self {
            registry,
            cfg: Config::default(),
            health: None,
            deps: Arc::new(Dependencies::new()),
            clock: Arc::new(TokioClock),
            subscribers: Vec::new(),
            signals: None,
        }
    }

    /// Sets the runner configuration.
    pub fn with_config(mut self, cfg: Config) -> Self {
        self.cfg = cfg;
        self
    }

    /// Shares an existing health registry with the runner.
    ///
    /// Without one, the runner creates its own on the configured clock.
    pub fn with_health(mut self, health: Health) -> Self {
        self.health = Some(health);
        self
    }

    /// Sets the dependencies injected into every record before its `init`.
    pub fn with_dependencies(mut self, deps: Arc<Dependencies>) -> Self {
        self.deps = deps;
        self
    }

    /// Sets the clock used for every timeout.
    pub fn with_clock(mut self, clock: ClockRef) -> Self {
        self.clock = clock;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive lifecycle events through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the OS termination signals with `signals`.
    ///
    /// Each item counts as one signal. Takes precedence over
    /// [`Config::handle_signals`].
    pub fn with_signals(mut self, signals: SignalStream) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Builds the runner.
    ///
    /// Spawns one worker per subscriber, so it must be called from within a tokio
    /// runtime when subscribers were set.
    pub fn build(self) -> Runner<C> {
        let subs = if self.subscribers.is_empty() {
            SubscriberSet::empty()
        } else {
            SubscriberSet::new(self.subscribers, self.cfg.subscriber_queue_clamped())
        };
        let health = self
            .health
            .unwrap_or_else(|| Health::with_clock(Arc::clone(&self.clock)));

        Runner::from_parts(
            self.registry,
            health,
            self.deps,
            self.clock,
            self.cfg,
            Arc::new(subs),
            self.signals,
        )
    }
}
