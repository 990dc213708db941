//! Per-run context handed to every module stage.
//!
//! Anything a module learns during a run lives here, not in the module's
//! own fields, so one module value can serve several runs at once.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use timewolf_core::{
    AttributeContainer, ContainerHandle, ContainerStore, MessageSink, RunCache, Severity,
};

/// Aggregate result of a module's Process stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    /// Items that were started.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items never started because the run was cancelled.
    pub skipped: usize,
}

impl ProcessOutcome {
    /// True when at least one item ran and none of them succeeded.
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.succeeded == 0
    }

    pub fn any_succeeded(&self) -> bool {
        self.succeeded > 0
    }
}

pub struct ModuleContext {
    name: String,
    store: Arc<ContainerStore>,
    cache: Arc<RunCache>,
    sink: Arc<dyn MessageSink>,
    memory: DashMap<String, Value>,
    outcome: RwLock<Option<ProcessOutcome>>,
}

impl ModuleContext {
    pub fn new(
        name: impl Into<String>,
        store: Arc<ContainerStore>,
        cache: Arc<RunCache>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            cache,
            sink,
            memory: DashMap::new(),
            outcome: RwLock::new(None),
        }
    }

    /// Runtime name of the module this context belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<ContainerStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<RunCache> {
        &self.cache
    }

    pub fn sink(&self) -> &Arc<dyn MessageSink> {
        &self.sink
    }

    pub fn add_container(&self, container: AttributeContainer) -> ContainerHandle {
        self.store.add(container)
    }

    pub fn publish_message(&self, text: &str, is_error: bool) {
        self.sink
            .publish(&self.name, text, Severity::from_is_error(is_error));
    }

    /// Stores a value in this module's private memory for later stages.
    pub fn remember<T: Serialize>(&self, key: impl Into<String>, value: &T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.memory.insert(key.into(), v);
        }
    }

    pub fn recall<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.memory
            .get(key)
            .and_then(|v| serde_json::from_value(v.value().clone()).ok())
    }

    /// Outcome of the Process stage. Set by the runner before PostProcess.
    pub fn outcome(&self) -> ProcessOutcome {
        self.outcome
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .unwrap_or_default()
    }

    pub fn set_outcome(&self, outcome: ProcessOutcome) {
        *self.outcome.write().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }
}
