//! # Registry of initializers and prioritized processes.
//!
//! [`Registry`] is filled before the runner starts and consumed by
//! [`Runner::run`](crate::Runner::run).
//!
//! ```text
//! initializers: [i0, i1, i2]                 (registration order)
//! processes:    { -1: [p3], 0: [p0, p2], 5: [p1] }   (ascending priority, then registration order)
//! ```
//!
//! Priority levels are densely indexed: index `0` is the lowest priority registered.

use std::collections::BTreeMap;

use crate::units::{
    AppConfig, Initializer, InitializerRecord, Options, Process, ProcessRecord,
};

/// Registration container for one runner.
///
/// ## Example
/// ```rust
/// use async_trait::async_trait;
/// use procvisor::{BoxError, Options, Process, Registry};
///
/// struct Idle;
///
/// #[async_trait]
/// impl Process<()> for Idle {
///     async fn start(&self) -> Result<(), BoxError> { Ok(()) }
///     async fn stop(&self) -> Result<(), BoxError> { Ok(()) }
/// }
///
/// let mut registry = Registry::new();
/// registry
///     .register_process(Idle, Options::new().name("late").priority(5))
///     .register_process(Idle, Options::new().name("early").priority(-1));
///
/// assert_eq!(registry.num_processes(), 2);
/// assert_eq!(registry.priorities(), vec![-1, 5]);
/// assert_eq!(registry.processes_at_priority_index(0)[0].name(), "early");
/// ```
pub struct Registry<C: AppConfig> {
    initializers: Vec<InitializerRecord<C>>,
    processes: BTreeMap<i32, Vec<ProcessRecord<C>>>,
}

impl<C: AppConfig> Registry<C> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            initializers: Vec::new(),
            processes: BTreeMap::new(),
        }
    }

    /// Appends an initializer; initializers run in registration order.
    pub fn register_initializer(&mut self, unit: impl Initializer<C>, opts: Options) -> &mut Self {
        self.initializers.push(InitializerRecord::new(unit, opts));
        self
    }

    /// Adds a process to the bucket of its priority.
    pub fn register_process(&mut self, unit: impl Process<C>, opts: Options) -> &mut Self {
        let rec = ProcessRecord::new(unit, opts);
        self.processes.entry(rec.priority()).or_default().push(rec);
        self
    }

    /// Registered initializers, in registration order.
    pub fn initializers(&self) -> &[InitializerRecord<C>] {
        &self.initializers
    }

    /// Total number of registered processes.
    pub fn num_processes(&self) -> usize {
        self.processes.values().map(Vec::len).sum()
    }

    /// Number of distinct priority levels.
    pub fn num_priorities(&self) -> usize {
        self.processes.len()
    }

    /// Distinct priority levels, ascending.
    pub fn priorities(&self) -> Vec<i32> {
        self.processes.keys().copied().collect()
    }

    /// Processes of the `index`-th lowest priority level, in registration order.
    ///
    /// Out-of-range indexes yield an empty slice.
    pub fn processes_at_priority_index(&self, index: usize) -> &[ProcessRecord<C>] {
        self.processes
            .values()
            .nth(index)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Splits into initializers and process levels (ascending priority).
    pub(crate) fn into_parts(self) -> (Vec<InitializerRecord<C>>, Vec<Vec<ProcessRecord<C>>>) {
        (self.initializers, self.processes.into_values().collect())
    }
}

impl<C: AppConfig> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: AppConfig> std::fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("initializers", &self.initializers)
            .field("processes", &self.processes)
            .finish()
    }
}
