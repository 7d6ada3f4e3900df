//! # Initializers: one-shot setup units with an optional rollback hook.
//!
//! An [`Initializer`] runs once, before any process is started. Units that can undo
//! their setup expose a [`Finalizer`] through [`Initializer::as_finalizer`]; the runner
//! uses it to roll back in reverse registration order once every process has exited.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use procvisor::{BoxError, Finalizer, Initializer};
//!
//! struct Migrations;
//!
//! #[async_trait]
//! impl Initializer<()> for Migrations {
//!     async fn init(&mut self, _cfg: &()) -> Result<(), BoxError> {
//!         // apply migrations...
//!         Ok(())
//!     }
//!
//!     fn as_finalizer(&mut self) -> Option<&mut dyn Finalizer> {
//!         Some(self)
//!     }
//! }
//!
//! #[async_trait]
//! impl Finalizer for Migrations {
//!     async fn finalize(&mut self) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//! }
//! ```

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::clock::ClockRef;
use crate::config::Config;
use crate::core::phase::{Outcome, race};
use crate::error::{BoxError, InjectError, RunError};
use crate::inject::Dependencies;
use crate::units::AppConfig;
use crate::units::options::{Options, UNNAMED, resolve};

/// # One-shot setup unit.
#[async_trait]
pub trait Initializer<C: AppConfig>: Send + 'static {
    /// Receives the runner's clock and defaults before `inject`.
    ///
    /// Composite units hand them down to their members; leaf units ignore them.
    fn attach(&mut self, _clock: &ClockRef, _cfg: &Config) {}

    /// Pulls dependencies before `init`. Defaults to needing none.
    fn inject(&mut self, _deps: &Dependencies) -> Result<(), InjectError> {
        Ok(())
    }

    /// Performs the setup.
    async fn init(&mut self, cfg: &C) -> Result<(), BoxError>;

    /// Returns the rollback hook if this unit has one.
    fn as_finalizer(&mut self) -> Option<&mut dyn Finalizer> {
        None
    }
}

/// # Rollback hook for an [`Initializer`].
#[async_trait]
pub trait Finalizer: Send {
    /// Undoes what `init` did.
    async fn finalize(&mut self) -> Result<(), BoxError>;
}

/// An [`Initializer`] wrapped with its registration metadata.
pub struct InitializerRecord<C: AppConfig> {
    unit: Box<dyn Initializer<C>>,
    name: Cow<'static, str>,
    init_timeout: Option<Duration>,
    finalize_timeout: Option<Duration>,
    finalizes: bool,
}

impl<C: AppConfig> InitializerRecord<C> {
    /// Wraps `unit` with `opts`.
    pub fn new(unit: impl Initializer<C>, opts: Options) -> Self {
        let mut unit: Box<dyn Initializer<C>> = Box::new(unit);
        let finalizes = unit.as_finalizer().is_some();
        Self {
            unit,
            name: opts.name.unwrap_or(Cow::Borrowed(UNNAMED)),
            init_timeout: opts.init_timeout,
            finalize_timeout: opts.finalize_timeout.filter(|_| finalizes),
            finalizes,
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Init timeout set at registration (`None` = runner default).
    pub fn init_timeout(&self) -> Option<Duration> {
        self.init_timeout
    }

    /// Finalize timeout set at registration; always `None` without a rollback hook.
    pub fn finalize_timeout(&self) -> Option<Duration> {
        self.finalize_timeout
    }

    /// True if the unit exposes a [`Finalizer`].
    pub fn has_finalizer(&self) -> bool {
        self.finalizes
    }

    pub(crate) fn attach(&mut self, clock: &ClockRef, cfg: &Config) {
        self.unit.attach(clock, cfg);
    }

    pub(crate) fn inject_unit(&mut self, deps: &Dependencies) -> Result<(), InjectError> {
        self.unit.inject(deps)
    }

    pub(crate) fn inject(&mut self, deps: &Dependencies) -> Result<(), RunError> {
        self.inject_unit(deps).map_err(|source| RunError::Inject {
            name: self.name.to_string(),
            source,
        })
    }

    /// Runs `init` under `default_timeout` (unless the record set its own) and `abort`.
    ///
    /// Returns the record on success so it can be finalized later; a record whose call
    /// timed out or was aborted is abandoned together with its task.
    pub(crate) async fn init(
        self,
        cfg: C,
        clock: &ClockRef,
        default_timeout: Option<Duration>,
        abort: Option<&CancellationToken>,
    ) -> Result<Self, RunError> {
        let timeout = resolve(self.init_timeout, default_timeout);
        let name = self.name.to_string();
        let Self {
            mut unit,
            name: display,
            init_timeout,
            finalize_timeout,
            finalizes,
        } = self;

        let call = async move {
            let res = unit.init(&cfg).await;
            (unit, res)
        };
        match race(call, clock, timeout, abort).await {
            Outcome::Done((unit, Ok(()))) => Ok(Self {
                unit,
                name: display,
                init_timeout,
                finalize_timeout,
                finalizes,
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

    /// Runs the rollback hook, if any, under `default_timeout` (unless the record set its own).
    pub(crate) async fn finalize(
        self,
        clock: &ClockRef,
        default_timeout: Option<Duration>,
    ) -> Result<Self, RunError> {
        if !self.finalizes {
            return Ok(self);
        }
        let timeout = resolve(self.finalize_timeout, default_timeout);
        let name = self.name.to_string();
        let Self {
            mut unit,
            name: display,
            init_timeout,
            finalize_timeout,
            finalizes,
        } = self;

        let call = async move {
            let res = match unit.as_finalizer() {
                Some(f) => f.finalize().await,
                None => Ok(()),
            };
            (unit, res)
        };
        match race(call, clock, timeout, None).await {
            Outcome::Done((unit, Ok(()))) => Ok(Self {
                unit,
                name: display,
                init_timeout,
                finalize_timeout,
                finalizes,
            }),
            Outcome::Done((_, Err(source))) => Err(RunError::Finalize { name, source }),
            Outcome::TimedOut(timeout) => Err(RunError::FinalizeTimeout { name, timeout }),
            // No abort token is passed, so only a panic lands here.
            Outcome::Aborted | Outcome::Panicked => Err(RunError::Panicked {
                name,
                phase: "finalize",
            }),
        }
    }
}

impl<C: AppConfig> std::fmt::Debug for InitializerRecord<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializerRecord")
            .field("name", &self.name)
            .field("init_timeout", &self.init_timeout)
            .field("finalize_timeout", &self.finalize_timeout)
            .field("finalizes", &self.finalizes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::TokioClock;

    struct Plain;

    #[async_trait]
    impl Initializer<()> for Plain {
        async fn init(&mut self, _cfg: &()) -> Result<(), BoxError> {
            Ok(())
        }
    }

    struct Rollback;

    #[async_trait]
    impl Initializer<()> for Rollback {
        async fn init(&mut self, _cfg: &()) -> Result<(), BoxError> {
            Err("disk full".into())
        }

        fn as_finalizer(&mut self) -> Option<&mut dyn Finalizer> {
            Some(self)
        }
    }

    #[async_trait]
    impl Finalizer for Rollback {
        async fn finalize(&mut self) -> Result<(), BoxError> {
            Ok(())
        }
    }

    #[test]
    fn metadata_defaults() {
        let rec = InitializerRecord::new(
            Plain,
            Options::new().finalize_timeout(Duration::from_secs(1)),
        );
        assert_eq!(rec.name(), UNNAMED);
        assert!(!rec.has_finalizer());
        assert_eq!(rec.finalize_timeout(), None);

        let rec = InitializerRecord::new(
            Rollback,
            Options::new().name("fs").finalize_timeout(Duration::from_secs(1)),
        );
        assert_eq!(rec.name(), "fs");
        assert!(rec.has_finalizer());
        assert_eq!(rec.finalize_timeout(), Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn init_error_is_wrapped_with_name() {
        let clock: ClockRef = Arc::new(TokioClock);
        let rec = InitializerRecord::new(Rollback, Options::new().name("fs"));
        assert!(rec.has_finalizer());
        let err = rec.init((), &clock, None, None).await.unwrap_err();
        assert_eq!(err.to_string(), "could not initialize fs: disk full");
    }

    #[tokio::test]
    async fn finalize_without_hook_is_a_no_op() {
        let clock: ClockRef = Arc::new(TokioClock);
        let rec = InitializerRecord::new(Plain, Options::new());
        let rec = rec.init((), &clock, None, None).await.unwrap();
        assert!(rec.finalize(&clock, None).await.is_ok());
    }
}
