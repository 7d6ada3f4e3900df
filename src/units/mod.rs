//! # Supervised units and their metadata records.
//!
//! This module provides the unit-related types:
//! - [`Initializer`] / [`Finalizer`] - one-shot setup with an optional rollback hook
//! - [`Process`] - long-running unit with `init` / `start` / `stop`
//! - [`Options`] - registration-time metadata (name, priority, timeouts, silent exit)
//! - [`InitializerRecord`], [`ProcessRecord`], [`ProcessHandle`] - units wrapped with metadata
//! - [`ParallelInitializer`] - composite initializer running a sub-set concurrently

mod initializer;
mod options;
mod parallel;
mod process;

pub use initializer::{Finalizer, Initializer, InitializerRecord};
pub use options::{Options, UNNAMED};
pub(crate) use options::resolve;
pub use parallel::ParallelInitializer;
pub use process::{Process, ProcessHandle, ProcessRecord};

/// Bound for the application configuration handed to every `init`.
///
/// The runtime never inspects the value; it clones it into each `init` task.
/// Wrap large configurations in an `Arc`.
pub trait AppConfig: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> AppConfig for T {}
