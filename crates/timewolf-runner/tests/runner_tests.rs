//! Tests for timewolf-runner: module lifecycle, worker pool, escalation, pipeline

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use timewolf_core::*;
use timewolf_modules::*;
use timewolf_runner::*;
use tokio_util::sync::CancellationToken;

// ===========================================================================
// Test module
// ===========================================================================

#[derive(Clone, Default)]
struct Counters {
    set_up_calls: Arc<AtomicUsize>,
    pre_calls: Arc<AtomicUsize>,
    process_calls: Arc<AtomicUsize>,
    post_calls: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    seen_items: Arc<Mutex<Vec<Option<String>>>>,
}

/// Seeds `seed` fspath items named `item-N` and writes one `file` per item.
#[derive(Clone, Default)]
struct Worker {
    counters: Counters,
    seed: usize,
    thread_on: Option<&'static str>,
    keep: Option<bool>,
    pool_cap: Option<usize>,
    fail_on: HashSet<usize>,
    fatal_on: HashSet<usize>,
    panic_on: HashSet<usize>,
    sleep: Option<Duration>,
    add_same_tag: bool,
    set_up_error: Option<ModuleError>,
    pre_error: Option<ModuleError>,
    post_error: Option<ModuleError>,
    require_success: bool,
}

impl Worker {
    fn seeded(seed: usize) -> Self {
        Self {
            seed,
            thread_on: Some(FsPath::TYPE_TAG),
            ..Default::default()
        }
    }

    fn boxed(self) -> Box<dyn Module> {
        Box::new(self)
    }
}

fn item_index(item: &ContainerHandle) -> Option<usize> {
    item.with::<FsPath, _>(|p| p.path.trim_start_matches("item-").parse::<usize>().ok())
        .flatten()
}

#[async_trait::async_trait]
impl Module for Worker {
    fn name(&self) -> &str {
        "Worker"
    }

    fn set_up(&mut self, _config: &ModuleConfig) -> ModuleResult<()> {
        self.counters.set_up_calls.fetch_add(1, Ordering::SeqCst);
        match self.set_up_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn pre_process(&self, ctx: &ModuleContext) -> ModuleResult<()> {
        self.counters.pre_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.pre_error.clone() {
            return Err(err);
        }
        for i in 0..self.seed {
            ctx.add_container(AttributeContainer::new(FsPath::new(format!("item-{}", i))));
        }
        Ok(())
    }

    async fn process(&self, ctx: &ModuleContext, item: Option<ContainerHandle>) -> ModuleResult<()> {
        self.counters.process_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_active.fetch_max(now, Ordering::SeqCst);
        self.counters
            .seen_items
            .lock()
            .unwrap()
            .push(item.as_ref().map(|h| h.to_string()));

        if let Some(d) = self.sleep {
            tokio::time::sleep(d).await;
        }
        self.counters.active.fetch_sub(1, Ordering::SeqCst);

        let index = item.as_ref().and_then(item_index).unwrap_or(0);
        if self.panic_on.contains(&index) {
            panic!("worker exploded on item {}", index);
        }
        if self.fatal_on.contains(&index) {
            return Err(ModuleError::creation(format!("fatal on item-{}", index)).fatal());
        }
        if self.fail_on.contains(&index) {
            return Err(ModuleError::creation(format!("failed item-{}", index)));
        }

        if self.add_same_tag {
            ctx.add_container(AttributeContainer::new(FsPath::new(format!("late-{}", index))));
        }
        ctx.add_container(AttributeContainer::new(File::new(
            format!("out-{}", index),
            format!("/out/out-{}", index),
        )));
        Ok(())
    }

    async fn post_process(&self, ctx: &ModuleContext) -> ModuleResult<()> {
        self.counters.post_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.post_error.clone() {
            return Err(err);
        }
        if self.require_success && ctx.outcome().all_failed() {
            return Err(ModuleError::aggregate("Nothing succeeded"));
        }
        Ok(())
    }

    fn thread_on(&self) -> Option<&str> {
        self.thread_on
    }

    fn keep_thread_on_containers(&self) -> bool {
        self.keep.unwrap_or(true)
    }

    fn thread_pool_size(&self) -> Option<usize> {
        self.pool_cap
    }
}

fn make_runner(pool_size: usize) -> (ModuleRunner, Arc<ContainerStore>, Arc<RecordingSink>) {
    let store = Arc::new(ContainerStore::new());
    let sink = Arc::new(RecordingSink::new());
    let runner = ModuleRunner::new(
        RunnerConfig::default().with_pool_size(pool_size),
        store.clone(),
        sink.clone(),
    );
    (runner, store, sink)
}

// ===========================================================================
// Lifecycle and fan-out
// ===========================================================================

#[tokio::test]
async fn happy_path_reaches_succeeded() {
    let (runner, store, sink) = make_runner(4);
    let worker = Worker::seeded(3);
    let counters = worker.counters.clone();

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.state, ModuleState::Succeeded);
    assert_eq!(report.name, "worker");
    assert_eq!(report.outcome.attempted, 3);
    assert_eq!(report.outcome.succeeded, 3);
    assert!(report.item_errors.is_empty());
    assert!(!report.is_fatal());
    assert_eq!(counters.post_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.count("file"), 3);
    assert!(sink.errors().is_empty());
}

#[tokio::test]
async fn snapshot_fan_out_ignores_items_added_during_process() {
    let (runner, store, _) = make_runner(3);
    let mut worker = Worker::seeded(5);
    worker.add_same_tag = true;
    let counters = worker.counters.clone();

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.state, ModuleState::Succeeded);
    assert_eq!(counters.process_calls.load(Ordering::SeqCst), 5);
    assert_eq!(store.count("fspath"), 10);
}

#[tokio::test]
async fn no_lost_or_duplicated_outputs_for_any_pool_size() {
    for pool in [1, 2, 3, 7, 64] {
        let (runner, store, _) = make_runner(pool);
        let mut worker = Worker::seeded(25);
        worker.sleep = Some(Duration::from_millis(1));

        let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

        assert_eq!(report.outcome.succeeded, 25, "pool {}", pool);
        let names: HashSet<String> = store.values::<File>().into_iter().map(|f| f.name).collect();
        assert_eq!(names.len(), 25, "pool {}", pool);
        assert_eq!(store.count("file"), 25, "pool {}", pool);
    }
}

#[tokio::test]
async fn pool_of_one_serializes_in_order() {
    let (runner, _, _) = make_runner(1);
    let mut worker = Worker::seeded(4);
    worker.sleep = Some(Duration::from_millis(2));
    let counters = worker.counters.clone();

    runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(counters.max_active.load(Ordering::SeqCst), 1);
    let seen: Vec<String> = counters.seen_items.lock().unwrap().iter().flatten().cloned().collect();
    assert_eq!(seen, vec!["item-0", "item-1", "item-2", "item-3"]);
}

#[tokio::test]
async fn module_cap_bounds_the_pool() {
    let (runner, _, _) = make_runner(8);
    let mut worker = Worker::seeded(8);
    worker.pool_cap = Some(2);
    worker.sleep = Some(Duration::from_millis(10));
    let counters = worker.counters.clone();

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.outcome.succeeded, 8);
    assert!(counters.max_active.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn without_thread_on_process_runs_once_without_item() {
    let (runner, store, _) = make_runner(4);
    let mut worker = Worker::seeded(3);
    worker.thread_on = None;
    let counters = worker.counters.clone();

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.state, ModuleState::Succeeded);
    assert_eq!(counters.process_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*counters.seen_items.lock().unwrap(), vec![None]);
    assert_eq!(store.count("file"), 1);
}

#[tokio::test]
async fn consumed_items_leave_store_when_not_kept() {
    let (runner, store, _) = make_runner(2);
    let mut worker = Worker::seeded(3);
    worker.keep = Some(false);

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.outcome.succeeded, 3);
    assert_eq!(store.count("fspath"), 0);
    assert_eq!(store.count("file"), 3);
}

// ===========================================================================
// Failures and escalation
// ===========================================================================

#[tokio::test]
async fn failing_item_is_isolated() {
    let (runner, store, sink) = make_runner(2);
    let mut worker = Worker::seeded(5);
    worker.fail_on.insert(2);

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.state, ModuleState::Succeeded);
    assert_eq!(report.outcome.succeeded, 4);
    assert_eq!(report.outcome.failed, 1);
    assert_eq!(report.item_errors.len(), 1);
    assert_eq!(report.item_errors[0].item, "item-2");
    assert_eq!(report.item_errors[0].error.kind, ErrorKind::ResourceCreation);
    assert_eq!(store.count("file"), 4);
    assert!(sink.contains("failed item-2", Severity::Error));
    assert!(!runner.cancellation().is_cancelled());
}

#[tokio::test]
async fn all_failed_items_promote_to_aggregate_failure() {
    let (runner, _, sink) = make_runner(3);
    let mut worker = Worker::seeded(3);
    worker.fail_on = (0..3).collect();
    worker.require_success = true;

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.state, ModuleState::Failed);
    assert_eq!(report.outcome.failed, 3);
    assert_eq!(report.stage_errors.len(), 1);
    assert_eq!(report.stage_errors[0].stage, Stage::PostProcess);
    assert_eq!(report.stage_errors[0].error.kind, ErrorKind::AggregateFailure);
    assert_eq!(report.stage_errors[0].escalation, Escalation::AbortRun);
    assert!(report.is_fatal());
    assert!(sink.contains("Nothing succeeded", Severity::Error));
    assert!(runner.cancellation().is_cancelled());
}

#[tokio::test]
async fn one_success_avoids_aggregate_failure() {
    let (runner, _, _) = make_runner(3);
    let mut worker = Worker::seeded(3);
    worker.fail_on = [0, 1].into_iter().collect();
    worker.require_success = true;

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.state, ModuleState::Succeeded);
    assert_eq!(report.outcome.succeeded, 1);
    assert_eq!(report.outcome.failed, 2);
}

#[tokio::test]
async fn configuration_failure_never_reaches_pre_process() {
    let (runner, _, sink) = make_runner(2);
    let mut worker = Worker::seeded(2);
    worker.set_up_error = Some(ModuleError::configuration("You need to specify something"));
    let counters = worker.counters.clone();

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.state, ModuleState::Failed);
    assert_eq!(report.stage_errors[0].stage, Stage::SetUp);
    assert!(report.is_fatal());
    assert_eq!(counters.pre_calls.load(Ordering::SeqCst), 0);
    assert_eq!(counters.process_calls.load(Ordering::SeqCst), 0);
    assert!(sink.contains("You need to specify something", Severity::Error));
}

#[tokio::test]
async fn pre_process_error_aborts_the_run_by_default() {
    let (runner, _, sink) = make_runner(2);
    let mut worker = Worker::seeded(2);
    worker.pre_error = Some(ModuleError::not_found("no instances found"));
    let counters = worker.counters.clone();

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.state, ModuleState::Failed);
    assert_eq!(report.stage_errors[0].stage, Stage::PreProcess);
    assert_eq!(report.stage_errors[0].escalation, Escalation::AbortRun);
    assert!(report.is_fatal());
    assert!(runner.cancellation().is_cancelled());
    assert_eq!(counters.process_calls.load(Ordering::SeqCst), 0);
    assert!(sink.contains("no instances found", Severity::Error));
}

#[tokio::test]
async fn softened_pre_process_error_fails_only_the_module() {
    let (runner, _, _) = make_runner(2);
    let mut worker = Worker::seeded(2);
    worker.pre_error = Some(ModuleError::not_found("nothing there").non_fatal());
    let counters = worker.counters.clone();

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.state, ModuleState::Failed);
    assert_eq!(report.stage_errors[0].escalation, Escalation::ModuleFailed);
    assert!(!report.is_fatal());
    assert!(!runner.cancellation().is_cancelled());
    assert_eq!(counters.process_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn post_process_error_aborts_the_run_by_default() {
    let (runner, _, _) = make_runner(2);
    let mut worker = Worker::seeded(2);
    worker.post_error = Some(ModuleError::creation("could not finalize"));

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.state, ModuleState::Failed);
    assert_eq!(report.outcome.succeeded, 2);
    assert_eq!(report.stage_errors[0].stage, Stage::PostProcess);
    assert_eq!(report.stage_errors[0].escalation, Escalation::AbortRun);
    assert!(runner.cancellation().is_cancelled());
}

#[tokio::test]
async fn zero_pool_size_is_a_configuration_error() {
    let (runner, _, _) = make_runner(0);
    let worker = Worker::seeded(2);
    let counters = worker.counters.clone();

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.state, ModuleState::Failed);
    assert!(report.stage_errors[0].error.is_configuration());
    assert_eq!(counters.pre_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_thread_on_tag_is_a_configuration_error() {
    let (runner, _, _) = make_runner(2);
    let mut worker = Worker::seeded(2);
    worker.thread_on = Some("  ");
    let counters = worker.counters.clone();

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert!(report.stage_errors[0].error.is_configuration());
    assert_eq!(counters.process_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn panicking_item_counts_as_internal_failure() {
    let (runner, store, _) = make_runner(2);
    let mut worker = Worker::seeded(3);
    worker.panic_on.insert(1);

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.state, ModuleState::Succeeded);
    assert_eq!(report.outcome.succeeded, 2);
    assert_eq!(report.outcome.failed, 1);
    assert_eq!(report.item_errors[0].error.kind, ErrorKind::Internal);
    assert!(report.item_errors[0].error.message.contains("worker exploded on item 1"));
    assert_eq!(store.count("file"), 2);
}

#[tokio::test]
async fn slow_item_times_out() {
    let store = Arc::new(ContainerStore::new());
    let sink = Arc::new(RecordingSink::new());
    let runner = ModuleRunner::new(
        RunnerConfig::default()
            .with_pool_size(2)
            .with_item_timeout(Duration::from_millis(20)),
        store.clone(),
        sink.clone(),
    );
    let mut worker = Worker::seeded(2);
    worker.sleep = Some(Duration::from_millis(500));

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.outcome.failed, 2);
    assert!(report.item_errors.iter().all(|e| e.error.kind == ErrorKind::Timeout));
    assert_eq!(store.count("file"), 0);
}

#[tokio::test]
async fn fatal_item_stops_new_items() {
    let (runner, _, _) = make_runner(1);
    let mut worker = Worker::seeded(5);
    worker.fatal_on.insert(0);
    let counters = worker.counters.clone();

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.state, ModuleState::Failed);
    assert!(report.cancelled);
    assert_eq!(report.outcome.attempted, 1);
    assert_eq!(report.outcome.skipped, 4);
    assert_eq!(report.fatal_error.as_ref().unwrap().message(), "fatal on item-0");
    assert_eq!(counters.post_calls.load(Ordering::SeqCst), 0);
    assert!(runner.cancellation().is_cancelled());
}

#[tokio::test]
async fn consumed_items_not_started_go_back_to_the_store() {
    let (runner, store, _) = make_runner(1);
    let mut worker = Worker::seeded(5);
    worker.keep = Some(false);
    worker.fatal_on.insert(0);

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.state, ModuleState::Failed);
    assert_eq!(report.outcome.attempted, 1);
    assert_eq!(report.outcome.skipped, 4);
    let left: Vec<String> = store.values::<FsPath>().into_iter().map(|p| p.path).collect();
    assert_eq!(left, vec!["item-1", "item-2", "item-3", "item-4"]);
}

#[tokio::test]
async fn cancelled_run_starts_nothing() {
    let (runner, _, _) = make_runner(2);
    let cancel = CancellationToken::new();
    let runner = runner.with_cancellation(cancel.clone());
    cancel.cancel();
    let worker = Worker::seeded(2);
    let counters = worker.counters.clone();

    let report = runner.run("worker", worker.boxed(), &ModuleConfig::new()).await;

    assert_eq!(report.state, ModuleState::Failed);
    assert!(report.cancelled);
    assert_eq!(counters.set_up_calls.load(Ordering::SeqCst), 0);
}

// ===========================================================================
// Disk copy scenario
// ===========================================================================

struct TwoDiskCompute;

#[async_trait::async_trait]
impl ComputeProvider for TwoDiskCompute {
    async fn get_instance(&self, _: &str, _: &str, name: &str) -> Result<(), ProviderError> {
        if name == "vm1" {
            Ok(())
        } else {
            Err(ProviderError::NotFound(name.to_string()))
        }
    }

    async fn boot_disk(&self, _: &str, _: &str, _: &str) -> Result<String, ProviderError> {
        Ok("vm1-boot".to_string())
    }

    async fn list_disks(&self, _: &str, _: &str, _: &str) -> Result<Vec<String>, ProviderError> {
        Ok(vec!["vm1-boot".to_string(), "vm1-data".to_string()])
    }

    async fn copy_disk(&self, _: &str, _: &str, _: &str, disk: &str) -> Result<String, ProviderError> {
        Ok(format!("{}-copy", disk))
    }

    async fn stop_instance(&self, _: &str, _: &str, _: &str) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[tokio::test]
async fn disk_copy_all_disks_into_source_project() {
    let (runner, store, sink) = make_runner(2);
    let config = ModuleConfig::new()
        .with("source_project", "proj-A")
        .with("zone", "zone-1")
        .with("remote_instance_names", "vm1")
        .with("all_disks", true);

    let report = runner
        .run("DiskCopy", Box::new(DiskCopy::new(Arc::new(TwoDiskCompute))), &config)
        .await;

    assert_eq!(report.state, ModuleState::Succeeded);
    assert_eq!(report.outcome.succeeded, 2);
    assert_eq!(report.outcome.failed, 0);

    let disks = store.values::<GceDisk>();
    assert_eq!(disks.len(), 4);
    assert!(disks.iter().all(|d| d.project == "proj-A"));
    let copies: HashSet<String> = disks
        .iter()
        .filter(|d| d.name.ends_with("-copy"))
        .map(|d| d.name.clone())
        .collect();
    assert_eq!(copies, ["vm1-boot-copy", "vm1-data-copy"].iter().map(|s| s.to_string()).collect());
    assert!(sink.contains("Disk vm1-boot successfully copied to vm1-boot-copy", Severity::Info));
    assert!(sink.errors().is_empty());
}

// ===========================================================================
// Pipeline
// ===========================================================================

fn pipeline(pool: usize) -> (Pipeline, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    (Pipeline::new(RunnerConfig::default().with_pool_size(pool), sink.clone()), sink)
}

/// Turns every fspath into a report.
struct Reporter;

#[async_trait::async_trait]
impl Module for Reporter {
    fn name(&self) -> &str {
        "Reporter"
    }

    fn set_up(&mut self, _config: &ModuleConfig) -> ModuleResult<()> {
        Ok(())
    }

    fn thread_on(&self) -> Option<&str> {
        Some(FsPath::TYPE_TAG)
    }

    async fn process(&self, ctx: &ModuleContext, item: Option<ContainerHandle>) -> ModuleResult<()> {
        let path = item
            .and_then(|h| h.with::<FsPath, _>(|p| p.path.clone()))
            .ok_or_else(|| ModuleError::internal("no item"))?;
        ctx.add_container(AttributeContainer::new(Report::new(ctx.name(), path)));
        Ok(())
    }
}

#[test]
fn pipeline_rejects_duplicate_names() {
    let (mut p, _) = pipeline(2);
    p.add("a", Worker::seeded(1).boxed(), ModuleConfig::new(), &[]);
    p.add("a", Worker::seeded(1).boxed(), ModuleConfig::new(), &[]);
    let err = p.validate().unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(err.to_string(), "Duplicate module name: a");
}

#[test]
fn pipeline_rejects_unknown_dependency() {
    let (mut p, _) = pipeline(2);
    p.add("a", Worker::seeded(1).boxed(), ModuleConfig::new(), &["ghost"]);
    let err = p.validate().unwrap_err();
    assert_eq!(err.to_string(), "Module a wants unknown module ghost");
}

#[test]
fn pipeline_orders_by_dependencies() {
    let (mut p, _) = pipeline(2);
    p.add("export", Worker::seeded(0).boxed(), ModuleConfig::new(), &["process"]);
    p.add("process", Worker::seeded(0).boxed(), ModuleConfig::new(), &["collect"]);
    p.add("collect", Worker::seeded(0).boxed(), ModuleConfig::new(), &[]);
    assert_eq!(p.validate().unwrap(), vec!["collect", "process", "export"]);
}

#[tokio::test]
async fn pipeline_cycle_runs_nothing() {
    let (mut p, sink) = pipeline(2);
    let a = Worker::seeded(1);
    let counters = a.counters.clone();
    p.add("a", a.boxed(), ModuleConfig::new(), &["b"]);
    p.add("b", Worker::seeded(1).boxed(), ModuleConfig::new(), &["a"]);

    let err = p.run().await.unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(err.to_string(), "Dependency cycle between modules: a, b");
    assert_eq!(counters.set_up_calls.load(Ordering::SeqCst), 0);
    assert_eq!(sink.errors().len(), 1);
}

#[tokio::test]
async fn pipeline_feeds_dependents() {
    let (mut p, _) = pipeline(4);
    p.add("report", Box::new(Reporter), ModuleConfig::new(), &["collect"]);
    p.add("collect", Worker::seeded(3).boxed(), ModuleConfig::new(), &[]);
    let store = p.store().clone();

    let summary = p.run().await.unwrap();

    assert!(summary.succeeded);
    assert_eq!(summary.run_id.len(), 36);
    assert_eq!(summary.reports[0].name, "report");
    assert_eq!(summary.report("report").unwrap().outcome.succeeded, 3);
    let reports = store.values::<Report>();
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.module_name == "report"));
}

#[tokio::test]
async fn pipeline_skips_dependents_of_failed_module() {
    let (mut p, _) = pipeline(2);
    let mut broken = Worker::seeded(1);
    broken.pre_error = Some(ModuleError::not_found("nothing to collect").non_fatal());
    let downstream = Worker::seeded(1);
    let downstream_counters = downstream.counters.clone();
    p.add("collect", broken.boxed(), ModuleConfig::new(), &[]);
    p.add("process", downstream.boxed(), ModuleConfig::new(), &["collect"]);
    p.add("other", Worker::seeded(2).boxed(), ModuleConfig::new(), &[]);

    let summary = p.run().await.unwrap();

    assert!(!summary.succeeded);
    assert!(summary.fatal.is_none());
    assert_eq!(summary.report("collect").unwrap().state, ModuleState::Failed);
    assert_eq!(summary.report("process").unwrap().state, ModuleState::Skipped);
    assert_eq!(summary.report("other").unwrap().state, ModuleState::Succeeded);
    assert_eq!(downstream_counters.set_up_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pipeline_aborts_when_pre_process_fails() {
    let (mut p, _) = pipeline(2);
    let mut broken = Worker::seeded(1);
    broken.pre_error = Some(ModuleError::not_found("no instances found"));
    let mut independent = Worker::seeded(1);
    independent.sleep = Some(Duration::from_millis(200));
    p.add("a", broken.boxed(), ModuleConfig::new(), &[]);
    p.add("b", independent.boxed(), ModuleConfig::new(), &[]);

    let err = p.run().await.unwrap_err();
    let summary = err.summary().unwrap();

    assert!(!summary.succeeded);
    let fatal = summary.fatal.as_ref().unwrap();
    assert_eq!(fatal.kind, ErrorKind::ResourceNotFound);
    assert_eq!(fatal.message(), "no instances found");
    let b = summary.report("b").unwrap();
    assert!(matches!(b.state, ModuleState::Skipped | ModuleState::Failed), "{:?}", b.state);
}

#[tokio::test]
async fn pipeline_aborts_on_fatal_error() {
    let (mut p, sink) = pipeline(2);
    let mut broken = Worker::seeded(1);
    broken.set_up_error = Some(ModuleError::configuration("bad recipe"));
    p.add("collect", broken.boxed(), ModuleConfig::new(), &[]);
    p.add("process", Worker::seeded(1).boxed(), ModuleConfig::new(), &["collect"]);

    let err = p.run().await.unwrap_err();
    let summary = err.summary().unwrap();

    assert!(!summary.succeeded);
    assert_eq!(summary.fatal.as_ref().unwrap().message(), "bad recipe");
    assert_eq!(summary.report("process").unwrap().state, ModuleState::Skipped);
    assert!(err.to_string().ends_with("aborted: bad recipe"));
    assert!(sink.contains("bad recipe", Severity::Error));
}
