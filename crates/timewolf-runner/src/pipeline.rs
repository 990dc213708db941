//! Pipeline - runs a set of modules as a dependency graph.
//!
//! Every module becomes a tokio task that waits for the modules it wants.
//! Independent modules run concurrently; all of them share one container
//! store, one run cache and one cancellation token.

use crate::runner::{ModuleRunner, RunnerConfig};
use crate::state::{ModuleReport, ModuleState};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use timewolf_core::{ContainerStore, MessageSink, ModuleError, RunCache, Severity};
use timewolf_modules::{Module, ModuleConfig};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Sink source name for pipeline-level messages.
const PIPELINE_SOURCE: &str = "pipeline";

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The module graph is invalid; nothing ran.
    #[error("{0}")]
    Configuration(String),

    /// A fatal error cancelled the run.
    #[error("{}", aborted_message(.0))]
    Aborted(Box<RunSummary>),
}

impl PipelineError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            PipelineError::Aborted(summary) => Some(summary),
            PipelineError::Configuration(_) => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    /// One report per module, in the order the modules were added.
    pub reports: Vec<ModuleReport>,
    pub succeeded: bool,
    /// First error that aborted the run.
    pub fatal: Option<ModuleError>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn report(&self, name: &str) -> Option<&ModuleReport> {
        self.reports.iter().find(|r| r.name == name)
    }

    fn fatal_message(&self) -> &str {
        self.fatal.as_ref().map(|e| e.message()).unwrap_or("unknown error")
    }
}

fn aborted_message(summary: &RunSummary) -> String {
    format!("run {} aborted: {}", summary.run_id, summary.fatal_message())
}

struct PipelineEntry {
    name: String,
    module: Box<dyn Module>,
    config: ModuleConfig,
    wants: Vec<String>,
}

pub struct Pipeline {
    entries: Vec<PipelineEntry>,
    config: RunnerConfig,
    store: Arc<ContainerStore>,
    cache: Arc<RunCache>,
    sink: Arc<dyn MessageSink>,
}

impl Pipeline {
    pub fn new(config: RunnerConfig, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            entries: Vec::new(),
            config,
            store: Arc::new(ContainerStore::new()),
            cache: Arc::new(RunCache::new()),
            sink,
        }
    }

    /// Runs against an existing store, e.g. one seeded by the caller.
    pub fn with_store(mut self, store: Arc<ContainerStore>) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &Arc<ContainerStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<RunCache> {
        &self.cache
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds a module under `name`, to start once every module in `wants`
    /// has succeeded.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        module: Box<dyn Module>,
        config: ModuleConfig,
        wants: &[&str],
    ) -> &mut Self {
        self.entries.push(PipelineEntry {
            name: name.into(),
            module,
            config,
            wants: wants.iter().map(|w| w.to_string()).collect(),
        });
        self
    }

    /// Checks names and dependencies; returns the module names in a valid
    /// execution order.
    pub fn validate(&self) -> Result<Vec<String>, PipelineError> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if index.insert(entry.name.as_str(), i).is_some() {
                return Err(PipelineError::Configuration(format!(
                    "Duplicate module name: {}",
                    entry.name
                )));
            }
        }

        let mut in_degree = vec![0usize; self.entries.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.entries.len()];
        for (i, entry) in self.entries.iter().enumerate() {
            let mut seen = HashSet::new();
            for want in entry.wants.iter().filter(|w| seen.insert(w.as_str())) {
                let dep = *index.get(want.as_str()).ok_or_else(|| {
                    PipelineError::Configuration(format!(
                        "Module {} wants unknown module {}",
                        entry.name, want
                    ))
                })?;
                in_degree[i] += 1;
                dependents[dep].push(i);
            }
        }

        let mut queue: VecDeque<usize> = (0..self.entries.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.entries.len());
        while let Some(i) = queue.pop_front() {
            order.push(self.entries[i].name.clone());
            for &d in &dependents[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    queue.push_back(d);
                }
            }
        }

        if order.len() != self.entries.len() {
            let mut cyclic: Vec<&str> = in_degree
                .iter()
                .enumerate()
                .filter(|(_, &deg)| deg > 0)
                .map(|(i, _)| self.entries[i].name.as_str())
                .collect();
            cyclic.sort_unstable();
            return Err(PipelineError::Configuration(format!(
                "Dependency cycle between modules: {}",
                cyclic.join(", ")
            )));
        }
        Ok(order)
    }

    pub async fn run(self) -> Result<RunSummary, PipelineError> {
        if let Err(err) = self.validate() {
            self.sink.publish(PIPELINE_SOURCE, &err.to_string(), Severity::Error);
            return Err(err);
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        let cancel = CancellationToken::new();
        let runner = Arc::new(
            ModuleRunner::new(self.config.clone(), self.store.clone(), self.sink.clone())
                .with_cache(self.cache.clone())
                .with_cancellation(cancel.clone()),
        );
        let first_fatal: Arc<Mutex<Option<ModuleError>>> = Arc::new(Mutex::new(None));
        info!(run_id = %run_id, modules = self.entries.len(), "run starting");

        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for entry in &self.entries {
            let (tx, rx) = watch::channel(None::<bool>);
            senders.insert(entry.name.clone(), tx);
            receivers.insert(entry.name.clone(), rx);
        }

        let mut names = Vec::with_capacity(self.entries.len());
        let mut handles = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            let deps: Vec<(String, watch::Receiver<Option<bool>>)> = entry
                .wants
                .iter()
                .filter_map(|w| receivers.get(w).map(|rx| (w.clone(), rx.clone())))
                .collect();
            let done = senders.remove(&entry.name);
            let runner = runner.clone();
            let cancel = cancel.clone();
            let first_fatal = first_fatal.clone();
            names.push(entry.name.clone());

            handles.push(tokio::spawn(async move {
                let report = run_entry(&runner, entry, deps, &cancel).await;
                if let Some(err) = &report.fatal_error {
                    let mut slot = first_fatal.lock().unwrap_or_else(PoisonError::into_inner);
                    if slot.is_none() {
                        *slot = Some(err.clone());
                    }
                }
                if let Some(tx) = done {
                    let _ = tx.send(Some(report.succeeded()));
                }
                report
            }));
        }
        drop(receivers);

        let mut reports = Vec::with_capacity(handles.len());
        for (name, result) in names.into_iter().zip(futures::future::join_all(handles).await) {
            match result {
                Ok(report) => reports.push(report),
                Err(join_err) => {
                    let err =
                        ModuleError::internal(format!("module task failed: {}", join_err)).fatal();
                    self.sink.publish(&name, err.message(), Severity::Error);
                    cancel.cancel();
                    let mut slot = first_fatal.lock().unwrap_or_else(PoisonError::into_inner);
                    if slot.is_none() {
                        *slot = Some(err.clone());
                    }
                    let mut report = ModuleReport::new(name);
                    report.state = ModuleState::Failed;
                    report.fatal_error = Some(err);
                    reports.push(report);
                }
            }
        }

        let fatal = first_fatal.lock().unwrap_or_else(PoisonError::into_inner).take();
        let summary = RunSummary {
            succeeded: fatal.is_none() && reports.iter().all(|r| r.succeeded()),
            run_id,
            reports,
            fatal,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            run_id = %summary.run_id,
            succeeded = summary.succeeded,
            elapsed_ms = summary.elapsed_ms,
            "run finished"
        );

        if summary.fatal.is_some() {
            Err(PipelineError::Aborted(Box::new(summary)))
        } else {
            Ok(summary)
        }
    }
}

async fn run_entry(
    runner: &ModuleRunner,
    entry: PipelineEntry,
    deps: Vec<(String, watch::Receiver<Option<bool>>)>,
    cancel: &CancellationToken,
) -> ModuleReport {
    for (dep, mut rx) in deps {
        let ok = match rx.wait_for(|v| v.is_some()).await {
            Ok(v) => (*v).unwrap_or(false),
            Err(_) => false,
        };
        if !ok {
            warn!(module = %entry.name, dependency = %dep, "dependency did not succeed, skipping");
            return ModuleReport::skipped(entry.name);
        }
    }
    if cancel.is_cancelled() {
        info!(module = %entry.name, "run cancelled, skipping");
        return ModuleReport::skipped(entry.name);
    }
    runner.run(&entry.name, entry.module, &entry.config).await
}
