//! Module runner - drives one module through its lifecycle.
//!
//! SetUp, PreProcess and PostProcess run once, inline. Process fans the
//! thread-on snapshot out over a semaphore-bounded pool of tokio tasks; each
//! item's result is captured and classified so that one bad item never takes
//! down its siblings.

use crate::escalation::{escalate, Escalation, Stage};
use crate::state::{ItemError, ModuleReport, ModuleState};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use timewolf_core::{ContainerHandle, ContainerStore, MessageSink, ModuleError, RunCache};
use timewolf_modules::{Module, ModuleConfig, ModuleContext, ProcessOutcome};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

pub const DEFAULT_POOL_SIZE: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Upper bound on concurrent Process invocations per module.
    pub pool_size: usize,
    /// Per-item deadline. `None` lets items run as long as they need.
    pub item_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            item_timeout: None,
        }
    }
}

impl RunnerConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = Some(timeout);
        self
    }
}

enum ItemResult {
    Succeeded,
    Failed(ItemError),
}

pub struct ModuleRunner {
    config: RunnerConfig,
    store: Arc<ContainerStore>,
    cache: Arc<RunCache>,
    sink: Arc<dyn MessageSink>,
    cancel: CancellationToken,
}

impl ModuleRunner {
    pub fn new(config: RunnerConfig, store: Arc<ContainerStore>, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            config,
            store,
            cache: Arc::new(RunCache::new()),
            sink,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<RunCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Shares a run-wide cancellation token. A fatal error in this runner
    /// cancels it; a cancelled token stops this runner from starting work.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ContainerStore> {
        &self.store
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs `module` under the runtime name `name`.
    pub async fn run(
        &self,
        name: &str,
        module: Box<dyn Module>,
        config: &ModuleConfig,
    ) -> ModuleReport {
        let span = tracing::info_span!("module", module = %name);
        self.run_inner(name, module, config).instrument(span).await
    }

    async fn run_inner(
        &self,
        name: &str,
        mut module: Box<dyn Module>,
        config: &ModuleConfig,
    ) -> ModuleReport {
        let started = Instant::now();
        let mut report = ModuleReport::new(name);
        let ctx = Arc::new(ModuleContext::new(
            name,
            self.store.clone(),
            self.cache.clone(),
            self.sink.clone(),
        ));

        if self.cancel.is_cancelled() {
            report.cancelled = true;
            report.advance(ModuleState::Failed);
            return finish(report, started);
        }

        // --- SetUp ---
        debug!(stage = %Stage::SetUp, "starting");
        if let Err(err) = module.set_up(config) {
            self.stage_failed(&mut report, &ctx, Stage::SetUp, err);
            return finish(report, started);
        }
        report.advance(ModuleState::SetUp);

        let module: Arc<dyn Module> = Arc::from(module);
        let pool_size = match self.validate(module.as_ref()) {
            Ok(n) => n,
            Err(err) => {
                self.stage_failed(&mut report, &ctx, Stage::SetUp, err);
                return finish(report, started);
            }
        };

        // --- PreProcess ---
        if self.stopped(&mut report) {
            return finish(report, started);
        }
        debug!(stage = %Stage::PreProcess, "starting");
        if let Err(err) = module.pre_process(&ctx).await {
            self.stage_failed(&mut report, &ctx, Stage::PreProcess, err);
            return finish(report, started);
        }
        report.advance(ModuleState::PreProcessed);

        // --- Process ---
        if self.stopped(&mut report) {
            return finish(report, started);
        }
        report.advance(ModuleState::Processing);
        let taken_from = module
            .thread_on()
            .filter(|_| !module.keep_thread_on_containers());
        let items: Vec<Option<ContainerHandle>> = match module.thread_on() {
            Some(tag) if taken_from.is_some() => {
                self.store.take_by_type(tag).into_iter().map(Some).collect()
            }
            Some(tag) => self.store.get_by_type(tag).into_iter().map(Some).collect(),
            None => vec![None],
        };
        info!(
            stage = %Stage::Process,
            tag = module.thread_on().unwrap_or("-"),
            items = items.len(),
            pool = pool_size,
            "processing"
        );

        let (outcome, item_errors) = self
            .process_items(&module, &ctx, items, pool_size, taken_from)
            .await;
        report.outcome = outcome;
        for item_error in &item_errors {
            if escalate(Stage::Process, &item_error.error) == Escalation::AbortRun
                && report.fatal_error.is_none()
            {
                report.fatal_error = Some(item_error.error.clone());
            }
        }
        report.item_errors = item_errors;
        ctx.set_outcome(outcome);

        if report.is_fatal() {
            report.cancelled = true;
            report.advance(ModuleState::Failed);
            return finish(report, started);
        }
        if self.stopped(&mut report) {
            return finish(report, started);
        }
        report.advance(ModuleState::PostProcessed);

        // --- PostProcess ---
        debug!(
            stage = %Stage::PostProcess,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "starting"
        );
        if let Err(err) = module.post_process(&ctx).await {
            self.stage_failed(&mut report, &ctx, Stage::PostProcess, err);
            return finish(report, started);
        }
        report.advance(ModuleState::Succeeded);
        finish(report, started)
    }

    /// Effective pool size, or the configuration error that forbids running.
    fn validate(&self, module: &dyn Module) -> Result<usize, ModuleError> {
        if let Some(tag) = module.thread_on() {
            if tag.trim().is_empty() {
                return Err(ModuleError::configuration(format!(
                    "{} declares an empty thread-on container type",
                    module.name()
                )));
            }
        }
        let pool = match module.thread_pool_size() {
            Some(cap) => cap.min(self.config.pool_size),
            None => self.config.pool_size,
        };
        if pool == 0 {
            return Err(ModuleError::configuration(format!(
                "Invalid worker pool size 0 for {}",
                module.name()
            )));
        }
        Ok(pool)
    }

    /// Fans `items` out over the pool. Items never started because the run
    /// was cancelled are put back in the store when they were taken from it.
    async fn process_items(
        &self,
        module: &Arc<dyn Module>,
        ctx: &Arc<ModuleContext>,
        items: Vec<Option<ContainerHandle>>,
        pool_size: usize,
        taken_from: Option<&str>,
    ) -> (ProcessOutcome, Vec<ItemError>) {
        let semaphore = Arc::new(Semaphore::new(pool_size));
        let total = items.len();
        let mut handles = Vec::with_capacity(total);
        let mut unstarted = Vec::new();
        let mut pending = items.into_iter();

        while let Some(item) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let permit = match permit {
                Some(p) if !self.cancel.is_cancelled() => p,
                _ => {
                    unstarted.push(item);
                    unstarted.extend(pending.by_ref());
                    break;
                }
            };

            let label = item_label(ctx, item.as_ref());
            let module = module.clone();
            let ctx = ctx.clone();
            let cancel = self.cancel.clone();
            let timeout = self.config.item_timeout;
            let task_label = label.clone();
            let task = tokio::spawn(
                async move {
                    let _permit = permit;
                    run_item(module, ctx, item, task_label, timeout, cancel).await
                }
                .in_current_span(),
            );
            handles.push((label, task));
        }

        let mut outcome = ProcessOutcome {
            attempted: handles.len(),
            skipped: unstarted.len(),
            ..Default::default()
        };
        let mut errors = Vec::new();
        for (label, handle) in handles {
            match handle.await {
                Ok(ItemResult::Succeeded) => outcome.succeeded += 1,
                Ok(ItemResult::Failed(item_error)) => {
                    outcome.failed += 1;
                    errors.push(item_error);
                }
                Err(join_err) => {
                    outcome.failed += 1;
                    errors.push(ItemError {
                        item: label,
                        error: ModuleError::internal(format!("worker task failed: {}", join_err)),
                    });
                }
            }
        }

        if outcome.skipped > 0 {
            warn!(skipped = outcome.skipped, "run cancelled, items not started");
            if let Some(tag) = taken_from {
                self.store.restore(tag, unstarted.into_iter().flatten().collect());
            }
        }
        (outcome, errors)
    }

    /// Records and publishes a stage failure, cancelling the run when the
    /// error escalates that far.
    fn stage_failed(&self, report: &mut ModuleReport, ctx: &ModuleContext, stage: Stage, err: ModuleError) {
        let escalation = escalate(stage, &err);
        error!(stage = %stage, kind = %err.kind, fatality = ?err.fatality, "{}", err.message);
        ctx.publish_message(err.message(), true);
        if escalation == Escalation::AbortRun {
            self.cancel.cancel();
        }
        report.fail_stage(stage, err, escalation);
    }

    /// True (and the report is closed) when the run was cancelled elsewhere.
    fn stopped(&self, report: &mut ModuleReport) -> bool {
        if self.cancel.is_cancelled() {
            info!("run cancelled, not starting next stage");
            report.cancelled = true;
            report.advance(ModuleState::Failed);
            true
        } else {
            false
        }
    }
}

async fn run_item(
    module: Arc<dyn Module>,
    ctx: Arc<ModuleContext>,
    item: Option<ContainerHandle>,
    label: String,
    timeout: Option<Duration>,
    cancel: CancellationToken,
) -> ItemResult {
    let call = AssertUnwindSafe(module.process(&ctx, item)).catch_unwind();
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(r) => r,
            Err(_) => Ok(Err(ModuleError::timeout(format!(
                "Processing {} timed out after {}s",
                label,
                limit.as_secs_f64()
            )))),
        },
        None => call.await,
    };
    let result = match result {
        Ok(r) => r,
        Err(panic) => Err(ModuleError::internal(format!(
            "Processing {} panicked: {}",
            label,
            panic_message(panic.as_ref())
        ))),
    };

    match result {
        Ok(()) => ItemResult::Succeeded,
        Err(err) => {
            let escalation = escalate(Stage::Process, &err);
            warn!(item = %label, kind = %err.kind, fatality = ?err.fatality, "{}", err.message);
            ctx.publish_message(err.message(), true);
            if escalation == Escalation::AbortRun {
                cancel.cancel();
            }
            ItemResult::Failed(ItemError { item: label, error: err })
        }
    }
}

/// Item identity used in logs and item errors: the container's display
/// form, or the module name when there is no thread-on item.
fn item_label(ctx: &ModuleContext, item: Option<&ContainerHandle>) -> String {
    item.map(|h| h.to_string())
        .unwrap_or_else(|| ctx.name().to_string())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn finish(mut report: ModuleReport, started: Instant) -> ModuleReport {
    report.elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        state = %report.state,
        succeeded = report.outcome.succeeded,
        failed = report.outcome.failed,
        elapsed_ms = report.elapsed_ms,
        "module finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use timewolf_core::{AttributeContainer, FsPath, RecordingSink};

    fn context(name: &str) -> ModuleContext {
        ModuleContext::new(
            name,
            Arc::new(ContainerStore::new()),
            Arc::new(RunCache::new()),
            Arc::new(RecordingSink::new()),
        )
    }

    #[test]
    fn items_are_labelled_by_container() {
        let ctx = context("collect");
        let item = ContainerHandle::new(AttributeContainer::new(FsPath::new("/evidence/a.log")));
        assert_eq!(item_label(&ctx, Some(&item)), item.to_string());
        assert_ne!(item_label(&ctx, Some(&item)), "collect");
    }

    #[test]
    fn module_name_labels_the_single_invocation() {
        let ctx = context("collect");
        assert_eq!(item_label(&ctx, None), "collect");
    }
}
