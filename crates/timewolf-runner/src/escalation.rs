//! Error escalation: where a module error stops.

use serde::{Deserialize, Serialize};
use std::fmt;
use timewolf_core::ModuleError;

/// Lifecycle stage an error was raised in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SetUp,
    PreProcess,
    Process,
    PostProcess,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::SetUp => "set_up",
            Stage::PreProcess => "pre_process",
            Stage::Process => "process",
            Stage::PostProcess => "post_process",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Escalation {
    /// Cancel the whole run.
    AbortRun,
    /// The module fails; the run goes on.
    ModuleFailed,
    /// Only this item fails.
    ItemFailed,
}

/// Decides how far an error raised in `stage` propagates.
///
/// SetUp failures and configuration errors always abort. Otherwise the
/// single-threaded stages abort unless the error was explicitly softened,
/// and Process confines the error to its item unless it is marked fatal.
pub fn escalate(stage: Stage, error: &ModuleError) -> Escalation {
    match stage {
        Stage::SetUp => Escalation::AbortRun,
        _ if error.is_fatal() || error.is_configuration() => Escalation::AbortRun,
        Stage::PreProcess | Stage::PostProcess if error.is_soft() => Escalation::ModuleFailed,
        Stage::PreProcess | Stage::PostProcess => Escalation::AbortRun,
        Stage::Process => Escalation::ItemFailed,
    }
}
