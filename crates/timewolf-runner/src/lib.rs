//! Timewolf Runner - module lifecycle execution and the pipeline graph

pub mod escalation;
pub mod pipeline;
pub mod runner;
pub mod state;

pub use escalation::{escalate, Escalation, Stage};
pub use pipeline::{Pipeline, PipelineError, RunSummary};
pub use runner::{ModuleRunner, RunnerConfig, DEFAULT_POOL_SIZE};
pub use state::{ItemError, ModuleReport, ModuleState, StageError};
