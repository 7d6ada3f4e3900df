//! Runtime events: the lifecycle data model handed to subscribers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//!
//! ## Quick reference
//! - **Publishers**: the runner's supervision task (initializer, process and finalizer
//!   phases) and the watcher (shutdown/abort triggers, reported errors).
//! - **Consumers**: [`SubscriberSet`](crate::SubscriberSet), which fans events out to
//!   user subscribers such as [`LogWriter`](crate::LogWriter).

mod event;

pub use event::{Event, EventKind};
