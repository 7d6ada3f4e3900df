//! Runtime core: orchestration and lifecycle.
//!
//! This module contains the supervision engine. The public API from this module is
//! [`Runner`] (with [`RunnerBuilder`] and [`ShutdownHandle`]) and the [`ErrorStream`]
//! it returns.
//!
//! Internal modules:
//! - [`runner`]: sequences initializers and priority levels, spawns start/stop tasks;
//! - [`watcher`]: folds shutdown triggers into the shutdown and abort latches;
//! - [`phase`]: races one lifecycle call against its timeout and the shutdown latch;
//! - [`signals`]: cross-platform termination signal source;
//! - [`stream`]: the public error stream;
//! - [`builder`]: runner construction.

mod builder;
pub(crate) mod phase;
mod runner;
mod signals;
mod stream;
mod watcher;

pub use builder::RunnerBuilder;
pub use runner::{Runner, ShutdownHandle};
pub use signals::SignalStream;
pub use stream::ErrorStream;
