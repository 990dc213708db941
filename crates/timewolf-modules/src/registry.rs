//! Module registry and the lifecycle trait
//!
//! Each module is a self-contained unit implementing the Module trait.
//! Modules can be added/removed by editing the modules/ directory and
//! create_default_registry() in lib.rs.

use crate::config::ModuleConfig;
use crate::context::ModuleContext;
use std::collections::HashMap;
use std::sync::Arc;
use timewolf_core::{ContainerHandle, ModuleResult};

/// The Module trait - implement this to add a new pipeline stage.
///
/// The runner drives every module through the same lifecycle:
/// `set_up` → `pre_process` → `process` (per item, in parallel) →
/// `post_process`. Only `process` runs concurrently; the other stages run
/// once, on their own.
#[async_trait::async_trait]
pub trait Module: Send + Sync {
    /// Module class name (e.g. "FilesystemCollector").
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Validates and stores configuration. Must not touch external systems.
    fn set_up(&mut self, config: &ModuleConfig) -> ModuleResult<()>;

    /// Discovery; seeds the store with the units of work.
    async fn pre_process(&self, _ctx: &ModuleContext) -> ModuleResult<()> {
        Ok(())
    }

    /// Per-item work. `item` is `None` when the module declares no
    /// thread-on type, in which case this runs exactly once.
    async fn process(&self, ctx: &ModuleContext, item: Option<ContainerHandle>) -> ModuleResult<()>;

    /// Judges the aggregate outcome, available through `ctx.outcome()`.
    async fn post_process(&self, _ctx: &ModuleContext) -> ModuleResult<()> {
        Ok(())
    }

    /// Container tag fanned out one item per worker.
    fn thread_on(&self) -> Option<&str> {
        None
    }

    /// Whether the thread-on containers stay in the store once the Process
    /// stage has taken its snapshot of them.
    fn keep_thread_on_containers(&self) -> bool {
        true
    }

    /// Upper bound on this module's worker pool. The runtime pool size
    /// still applies.
    fn thread_pool_size(&self) -> Option<usize> {
        None
    }
}

type ModuleFactory = Arc<dyn Fn() -> Box<dyn Module> + Send + Sync>;

/// Maps module class names to factories producing fresh instances.
pub struct ModuleRegistry {
    factories: HashMap<String, ModuleFactory>,
}

impl Default for ModuleRegistry {
    fn default() -> Self { Self::new() }
}

impl ModuleRegistry {
    pub fn new() -> Self { Self { factories: HashMap::new() } }

    /// Register a module factory. Replaces any existing one with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Remove a module by name.
    pub fn remove(&mut self, name: &str) -> bool {
        self.factories.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Fresh, unconfigured instance of the named module.
    pub fn create(&self, name: &str) -> Option<Box<dyn Module>> {
        self.factories.get(name).map(|f| f())
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}
