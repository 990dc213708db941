//! Module run state and the report handed back by the runner.

use crate::escalation::{Escalation, Stage};
use serde::{Deserialize, Serialize};
use std::fmt;
use timewolf_core::ModuleError;
use timewolf_modules::ProcessOutcome;

/// Where a module is in its lifecycle.
///
/// `Created → SetUp → PreProcessed → Processing → PostProcessed →
/// Succeeded`, with `Failed` reachable from any non-terminal state.
/// `Skipped` is only ever assigned by the pipeline, to modules that never
/// started.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Created,
    SetUp,
    PreProcessed,
    Processing,
    PostProcessed,
    Succeeded,
    Failed,
    Skipped,
}

impl ModuleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModuleState::Succeeded | ModuleState::Failed | ModuleState::Skipped)
    }

    pub fn can_transition_to(&self, next: ModuleState) -> bool {
        use ModuleState::*;
        match (self, next) {
            (Created, SetUp) | (Created, Skipped) => true,
            (SetUp, PreProcessed) => true,
            (PreProcessed, Processing) => true,
            (Processing, PostProcessed) => true,
            (PostProcessed, Succeeded) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleState::Created => "created",
            ModuleState::SetUp => "set_up",
            ModuleState::PreProcessed => "pre_processed",
            ModuleState::Processing => "processing",
            ModuleState::PostProcessed => "post_processed",
            ModuleState::Succeeded => "succeeded",
            ModuleState::Failed => "failed",
            ModuleState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// A failed Process invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    /// Display form of the item, or the module name when it ran without one.
    pub item: String,
    pub error: ModuleError,
}

/// A failed single-threaded stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageError {
    pub stage: Stage,
    pub error: ModuleError,
    pub escalation: Escalation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleReport {
    pub name: String,
    pub state: ModuleState,
    pub outcome: ProcessOutcome,
    pub item_errors: Vec<ItemError>,
    pub stage_errors: Vec<StageError>,
    /// The error that aborted the run, if this module raised one.
    pub fatal_error: Option<ModuleError>,
    /// The run was cancelled while this module was running.
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl ModuleReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ModuleState::Created,
            outcome: ProcessOutcome::default(),
            item_errors: Vec::new(),
            stage_errors: Vec::new(),
            fatal_error: None,
            cancelled: false,
            elapsed_ms: 0,
        }
    }

    /// Report for a module that never started.
    pub fn skipped(name: impl Into<String>) -> Self {
        let mut report = Self::new(name);
        report.state = ModuleState::Skipped;
        report
    }

    pub(crate) fn advance(&mut self, next: ModuleState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }

    pub(crate) fn fail_stage(&mut self, stage: Stage, error: ModuleError, escalation: Escalation) {
        if escalation == Escalation::AbortRun && self.fatal_error.is_none() {
            self.fatal_error = Some(error.clone());
        }
        self.stage_errors.push(StageError { stage, error, escalation });
        self.advance(ModuleState::Failed);
    }

    pub fn succeeded(&self) -> bool {
        self.state == ModuleState::Succeeded
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal_error.is_some()
    }
}
