//! # Keyed, typed dependency registry.
//!
//! [`Dependencies`] replaces tag-driven field assignment with explicit pulls: the
//! application provides values under string keys during setup, and every unit resolves
//! what it needs in its `inject` hook before `init` runs.
//!
//! ```rust
//! use std::sync::Arc;
//! use procvisor::Dependencies;
//!
//! struct Pool;
//!
//! let mut deps = Dependencies::new();
//! deps.provide("db", Arc::new(Pool));
//!
//! let pool: Arc<Pool> = deps.resolve("db").unwrap();
//! assert!(deps.resolve::<Arc<String>>("db").is_err());
//! assert!(deps.resolve::<Arc<Pool>>("cache").is_err());
//! # let _ = pool;
//! ```

use std::any::Any;
use std::collections::HashMap;

use crate::error::InjectError;

struct Entry {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// Registry of dependencies keyed by name.
///
/// Values are cloned out on resolution; share heavy values behind an `Arc`.
#[derive(Default)]
pub struct Dependencies {
    entries: HashMap<String, Entry>,
}

impl Dependencies {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn provide<T>(&mut self, key: impl Into<String>, value: T) -> &mut Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.entries.insert(
            key.into(),
            Entry {
                value: Box::new(value),
                type_name: std::any::type_name::<T>(),
            },
        );
        self
    }

    /// Returns a clone of the value stored under `key`.
    ///
    /// Fails with [`InjectError::Missing`] if nothing is stored under the key and with
    /// [`InjectError::Mismatch`] if the stored value is not a `T`.
    pub fn resolve<T>(&self, key: &str) -> Result<T, InjectError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let expected = std::any::type_name::<T>();
        let entry = self.entries.get(key).ok_or_else(|| InjectError::Missing {
            key: key.to_string(),
            expected,
        })?;
        entry
            .value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| InjectError::Mismatch {
                key: key.to_string(),
                expected,
                found: entry.type_name,
            })
    }

    /// True if something is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of stored dependencies.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<(&str, &str)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.as_str(), e.type_name))
            .collect();
        keys.sort_unstable();
        f.debug_map().entries(keys).finish()
    }
}
