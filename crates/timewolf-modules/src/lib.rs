//! Timewolf Modules - the module lifecycle and the built-in modules
//!
//! Each module is a self-contained file in src/modules/.
//! To add a module: create the file, implement the Module trait, register below.
//! To remove a module: delete the file, remove from mod.rs and the registry below.

pub mod config;
pub mod context;
pub mod modules;
pub mod registry;

pub use config::ModuleConfig;
pub use context::{ModuleContext, ProcessOutcome};
pub use modules::disk_copy::{ComputeProvider, DiskCopy, ProviderError};
pub use modules::filesystem::FilesystemCollector;
pub use modules::report_export::LocalReportExporter;
pub use registry::{Module, ModuleRegistry};

use std::sync::Arc;

/// Registry with every built-in module that needs no external service.
pub fn create_default_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();

    // --- Collectors ---
    registry.register("FilesystemCollector", || Box::new(FilesystemCollector::new()));

    // --- Exporters ---
    registry.register("LocalReportExporter", || Box::new(LocalReportExporter::new()));

    registry
}

/// Default registry plus the modules backed by a compute provider.
pub fn create_default_registry_with_compute(provider: Arc<dyn ComputeProvider>) -> ModuleRegistry {
    let mut registry = create_default_registry();
    registry.register("DiskCopy", move || Box::new(DiskCopy::new(provider.clone())));
    registry
}
