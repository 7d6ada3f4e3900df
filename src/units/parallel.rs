//! # Composite initializer running a sub-set of initializers concurrently.
//!
//! ```text
//! attach(clock, cfg) ─► adopt the runner's clock and defaults, hand them down
//! inject(deps) ───────► inject every sub-unit, first failure aborts (single error)
//! init(cfg):
//!   spawn init per sub-unit ─► each bounded by its own timeout
//!   wait for all
//!   any failed? ─► finalize every succeeded sub-unit concurrently
//!                  return InitErrors (init failures ∪ finalize failures)
//! ```
//!
//! Failures are collected, never short-circuited: callers get every simultaneous
//! error, each tagged with its sub-unit's name.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use crate::clock::{ClockRef, TokioClock};
use crate::config::Config;
use crate::error::{BoxError, InitErrors, InjectError};
use crate::inject::Dependencies;
use crate::units::AppConfig;
use crate::units::initializer::{Finalizer, Initializer, InitializerRecord};
use crate::units::options::Options;

/// Sub-unit defaults taken from a [`Config`].
#[derive(Clone, Copy, Debug)]
struct Timeouts {
    init: Option<Duration>,
    finalize: Option<Duration>,
}

impl Timeouts {
    fn from_config(cfg: &Config) -> Self {
        Self {
            init: cfg.default_init_timeout(),
            finalize: cfg.default_finalize_timeout(),
        }
    }
}

/// Initializer that runs its own initializers concurrently, with rollback on failure.
///
/// Registered with a [`Runner`](crate::Runner), it uses the runner's dependencies,
/// clock and default timeouts unless [`with_clock`](Self::with_clock) or
/// [`with_config`](Self::with_config) pinned its own.
///
/// ## Example
/// ```rust
/// use async_trait::async_trait;
/// use procvisor::{BoxError, Initializer, Options, ParallelInitializer, Registry};
///
/// struct Warmup;
///
/// #[async_trait]
/// impl Initializer<()> for Warmup {
///     async fn init(&mut self, _cfg: &()) -> Result<(), BoxError> { Ok(()) }
/// }
///
/// let mut caches = ParallelInitializer::new();
/// caches
///     .register(Warmup, Options::new().name("users"))
///     .register(Warmup, Options::new().name("orders"));
///
/// let mut registry = Registry::new();
/// registry.register_initializer(caches, Options::new().name("caches"));
/// ```
pub struct ParallelInitializer<C: AppConfig> {
    clock: Option<ClockRef>,
    timeouts: Option<Timeouts>,
    pending: Vec<InitializerRecord<C>>,
    ready: Vec<InitializerRecord<C>>,
}

impl<C: AppConfig> ParallelInitializer<C> {
    /// Creates an empty composite.
    pub fn new() -> Self {
        Self {
            clock: None,
            timeouts: None,
            pending: Vec::new(),
            ready: Vec::new(),
        }
    }

    /// Pins `clock` for sub-unit timeouts.
    pub fn with_clock(mut self, clock: ClockRef) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Pins the default sub-unit timeouts to those of `cfg`.
    pub fn with_config(mut self, cfg: &Config) -> Self {
        self.timeouts = Some(Timeouts::from_config(cfg));
        self
    }

    /// Adds a sub-unit.
    pub fn register(&mut self, unit: impl Initializer<C>, opts: Options) -> &mut Self {
        self.pending.push(InitializerRecord::new(unit, opts));
        self
    }

    /// Number of registered sub-units not yet initialized.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if there is nothing left to initialize.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn clock(&self) -> ClockRef {
        match &self.clock {
            Some(clock) => Arc::clone(clock),
            None => Arc::new(TokioClock),
        }
    }

    fn timeouts(&self) -> Timeouts {
        self.timeouts
            .unwrap_or_else(|| Timeouts::from_config(&Config::default()))
    }

    /// Injects every pending sub-unit, stopping at the first failure.
    pub fn inject_all(&mut self, deps: &Dependencies) -> Result<(), InjectError> {
        self.pending
            .iter_mut()
            .try_for_each(|rec| rec.inject_unit(deps))
    }

    /// Initializes every pending sub-unit concurrently.
    ///
    /// Sub-units that need dependencies must have been injected first (the runner
    /// does this through [`Initializer::inject`]). On any failure, rolls back the
    /// sub-units that succeeded and returns every init and finalize failure.
    pub async fn init_all(&mut self, cfg: &C) -> Result<(), InitErrors> {
        let clock = self.clock();
        let timeout = self.timeouts().init;
        let runs = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|rec| rec.init(cfg.clone(), &clock, timeout, None));

        let mut errs = InitErrors::new();
        for res in join_all(runs).await {
            match res {
                Ok(rec) => self.ready.push(rec),
                Err(err) => errs.push(err),
            }
        }

        if errs.is_empty() {
            return Ok(());
        }
        if let Err(rollback) = self.finalize_all().await {
            errs.extend(rollback);
        }
        Err(errs)
    }

    /// Runs the rollback hook of every successfully initialized sub-unit concurrently.
    pub async fn finalize_all(&mut self) -> Result<(), InitErrors> {
        let clock = self.clock();
        let timeout = self.timeouts().finalize;
        let runs = std::mem::take(&mut self.ready)
            .into_iter()
            .map(|rec| rec.finalize(&clock, timeout));

        let mut errs = InitErrors::new();
        for res in join_all(runs).await {
            match res {
                Ok(rec) => self.ready.push(rec),
                Err(err) => errs.push(err),
            }
        }
        if errs.is_empty() { Ok(()) } else { Err(errs) }
    }
}

impl<C: AppConfig> Default for ParallelInitializer<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<C: AppConfig> Initializer<C> for ParallelInitializer<C> {
    fn attach(&mut self, clock: &ClockRef, cfg: &Config) {
        let clock = Arc::clone(self.clock.get_or_insert_with(|| Arc::clone(clock)));
        if self.timeouts.is_none() {
            self.timeouts = Some(Timeouts::from_config(cfg));
        }
        for rec in &mut self.pending {
            rec.attach(&clock, cfg);
        }
    }

    fn inject(&mut self, deps: &Dependencies) -> Result<(), InjectError> {
        self.inject_all(deps)
    }

    async fn init(&mut self, cfg: &C) -> Result<(), BoxError> {
        self.init_all(cfg).await.map_err(|errs| Box::new(errs) as BoxError)
    }

    fn as_finalizer(&mut self) -> Option<&mut dyn Finalizer> {
        Some(self)
    }
}

#[async_trait]
impl<C: AppConfig> Finalizer for ParallelInitializer<C> {
    async fn finalize(&mut self) -> Result<(), BoxError> {
        self.finalize_all()
            .await
            .map_err(|errs| Box::new(errs) as BoxError)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::error::{InjectError, RunError};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Step {
        name: &'static str,
        fail: bool,
        hang: bool,
        log: Log,
    }

    impl Step {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                fail: false,
                hang: false,
                log: log.clone(),
            }
        }
    }

    #[async_trait]
    impl Initializer<()> for Step {
        async fn init(&mut self, _cfg: &()) -> Result<(), BoxError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail {
                return Err(format!("{} failed", self.name).into());
            }
            self.log.lock().unwrap().push(format!("init {}", self.name));
            Ok(())
        }

        fn as_finalizer(&mut self) -> Option<&mut dyn Finalizer> {
            Some(self)
        }
    }

    #[async_trait]
    impl Finalizer for Step {
        async fn finalize(&mut self) -> Result<(), BoxError> {
            self.log.lock().unwrap().push(format!("finalize {}", self.name));
            Ok(())
        }
    }

    fn names(errs: &InitErrors) -> Vec<String> {
        let mut v: Vec<String> = errs
            .iter()
            .filter_map(|e| e.name().map(str::to_string))
            .collect();
        v.sort();
        v
    }

    #[tokio::test]
    async fn all_succeed() {
        let log = Log::default();
        let mut par = ParallelInitializer::new();
        par.register(Step::new("a", &log), Options::new().name("a"))
            .register(Step::new("b", &log), Options::new().name("b"));

        par.init_all(&()).await.unwrap();

        let mut got = log.lock().unwrap().clone();
        got.sort();
        assert_eq!(got, vec!["init a", "init b"]);
        assert!(par.is_empty());
    }

    #[tokio::test]
    async fn failure_rolls_back_successes_and_reports_all() {
        let log = Log::default();
        let mut par = ParallelInitializer::new();
        let mut bad1 = Step::new("x", &log);
        bad1.fail = true;
        let mut bad2 = Step::new("y", &log);
        bad2.fail = true;
        par.register(Step::new("ok", &log), Options::new().name("ok"))
            .register(bad1, Options::new().name("x"))
            .register(bad2, Options::new().name("y"));

        let errs = par.init_all(&()).await.unwrap_err();
        assert_eq!(errs.len(), 2);
        assert_eq!(names(&errs), vec!["x", "y"]);
        assert!(errs.iter().all(|e| matches!(e, RunError::Init { .. })));

        let got = log.lock().unwrap().clone();
        assert!(got.contains(&"init ok".to_string()));
        assert!(got.contains(&"finalize ok".to_string()));
        assert!(!got.iter().any(|l| l == "finalize x" || l == "finalize y"));
    }

    #[tokio::test]
    async fn timed_out_sub_unit_is_reported() {
        let log = Log::default();
        let manual = ManualClock::new();
        let mut par = ParallelInitializer::new()
            .with_clock(Arc::new(manual.clone()));
        let mut slow = Step::new("slow", &log);
        slow.hang = true;
        par.register(
            slow,
            Options::new()
                .name("slow")
                .init_timeout(Duration::from_secs(10)),
        )
        .register(
            Step::new("fast", &log),
            Options::new().name("fast").init_timeout(Duration::ZERO),
        );

        let running = tokio::spawn(async move { par.init_all(&()).await });
        manual.block_until(1).await;
        manual.advance(Duration::from_secs(10));

        let errs = running.await.unwrap().unwrap_err();
        assert_eq!(errs.len(), 1);
        let err = errs.into_vec().remove(0);
        assert!(matches!(err, RunError::InitTimeout { ref name, .. } if name == "slow"));
        assert!(log.lock().unwrap().contains(&"finalize fast".to_string()));
    }

    struct NeedsDb;

    #[async_trait]
    impl Initializer<()> for NeedsDb {
        fn inject(&mut self, deps: &Dependencies) -> Result<(), InjectError> {
            deps.resolve::<Arc<String>>("db").map(|_| ())
        }

        async fn init(&mut self, _cfg: &()) -> Result<(), BoxError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn injection_stops_at_first_failure() {
        let log = Log::default();
        let mut par = ParallelInitializer::new();
        par.register(Step::new("a", &log), Options::new().name("a"))
            .register(NeedsDb, Options::new().name("needs-db"));

        let err = par.inject(&Dependencies::new()).unwrap_err();
        assert!(matches!(err, InjectError::Missing { ref key, .. } if key == "db"));
        assert_eq!(par.len(), 2);
        assert!(log.lock().unwrap().is_empty());

        let mut deps = Dependencies::new();
        deps.provide("db", Arc::new(String::from("postgres://localhost/app")));
        par.inject(&deps).unwrap();
        par.init_all(&()).await.unwrap();
        assert!(par.is_empty());
    }

    #[tokio::test]
    async fn attach_supplies_clock_and_default_timeouts() {
        let log = Log::default();
        let manual = ManualClock::new();
        let clock: ClockRef = Arc::new(manual.clone());
        let cfg = Config {
            init_timeout: Duration::from_secs(7),
            ..Config::default()
        };

        let mut par = ParallelInitializer::new();
        let mut slow = Step::new("slow", &log);
        slow.hang = true;
        par.register(slow, Options::new().name("slow"));
        Initializer::<()>::attach(&mut par, &clock, &cfg);

        let running = tokio::spawn(async move { par.init_all(&()).await });
        manual.block_until(1).await;
        manual.advance(Duration::from_secs(7));

        let errs = running.await.unwrap().unwrap_err();
        let err = errs.into_vec().remove(0);
        assert!(matches!(
            err,
            RunError::InitTimeout { ref name, timeout } if name == "slow" && timeout == Duration::from_secs(7)
        ));
    }

    #[test]
    fn attach_keeps_pinned_clock() {
        let pinned = ManualClock::new();
        let mut par: ParallelInitializer<()> =
            ParallelInitializer::new().with_clock(Arc::new(pinned.clone()));
        let other: ClockRef = Arc::new(TokioClock);
        par.attach(&other, &Config::default());

        let before = pinned.now();
        pinned.advance(Duration::from_secs(3));
        assert_eq!(par.clock().now() - before, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn finalize_all_can_be_rerun_by_external_callers() {
        let log = Log::default();
        let mut par = ParallelInitializer::new();
        par.register(Step::new("a", &log), Options::new().name("a"));
        par.init_all(&()).await.unwrap();

        par.finalize_all().await.unwrap();
        par.finalize_all().await.unwrap();
        let finals = log
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.as_str() == "finalize a")
            .count();
        assert_eq!(finals, 2);
    }
}
