//! Timewolf - forensic pipeline orchestration kernel
//!
//! Facade over the workspace crates plus the binary's config and logging.

pub mod config;
pub mod logging;

pub use timewolf_core;
pub use timewolf_modules;
pub use timewolf_runner;

pub use config::KernelConfig;
