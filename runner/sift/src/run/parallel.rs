//! Master side of the parallel runner.
//!
//! The master forces the suite tree once to plan tasks, hands each task
//! to a pool of workers over byte channels, and merges the records they
//! ship back, replaying outcome hooks so master-side plugins see one
//! coherent run. A watchdog retires workers whose current task exceeds
//! the process timeout; retired generations are fenced so a late result
//! from an abandoned worker cannot corrupt the aggregate. Interrupts are
//! two-stage: the first settles everything still pending as skipped and
//! lets in-flight tasks finish being accounted, the second aborts.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use sift_model::entity::ParallelMark;
use sift_model::outcome::TestError;
use sift_model::{Config, ScopeKind};

use crate::case::Case;
use crate::import::{base_dir_of, ModuleSource};
use crate::load::Loader;
use crate::plugin::PluginManager;
use crate::result::{OutcomeRecord, RecordKind, ResultProxy, RunResult};
use crate::run::worker::{decode, encode, worker_loop, ResultMsg, TaskMsg, WorkerSpec, WorkerStatus};
use crate::suite::{ContextEngine, Suite};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Interrupt state shared with whatever installs the signal handler.
#[derive(Default)]
pub struct Signals {
    interrupts: AtomicUsize,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called from the signal handler. First call asks for a graceful
    /// stop, second for an abort.
    pub fn interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }
}

struct WorkerHandle {
    id: usize,
    /// Bumped when the worker is retired; results from older generations
    /// are discarded.
    generation: u64,
    status: Arc<WorkerStatus>,
}

pub struct ParallelRunner {
    config: Arc<Config>,
    plugins: Arc<PluginManager>,
    source: Arc<dyn ModuleSource>,
    signals: Arc<Signals>,
}

impl ParallelRunner {
    pub fn new(
        config: Arc<Config>,
        plugins: Arc<PluginManager>,
        source: Arc<dyn ModuleSource>,
    ) -> Self {
        ParallelRunner {
            config,
            plugins,
            source,
            signals: Arc::new(Signals::new()),
        }
    }

    /// The interrupt cell to wire into a signal handler.
    pub fn signals(&self) -> Arc<Signals> {
        self.signals.clone()
    }

    pub fn run(&self, loader: &Loader, suite: Suite) -> RunResult {
        self.plugins.prepare_test_runner(&self.config);
        self.plugins.begin();
        let mut result = RunResult::new();

        let (tasks, local) = self.collect_tasks(loader, suite);
        tracing::debug!(tasks = tasks.len(), local = local.len(), "task plan");

        // Cases with no remote address (load failures, mostly) run here.
        if !local.is_empty() {
            let engine = ContextEngine::new();
            let capture = sift_model::capture::CaptureStack::new(self.config.spec.capture);
            let mut proxy = ResultProxy::new(
                &mut result,
                &self.plugins,
                capture,
                self.config.spec.stop_on_error,
                self.config.spec.verbosity,
            );
            proxy.install_observer();
            for case in local {
                case.run(&engine, &mut proxy);
            }
        }

        self.dispatch(&tasks, &mut result);
        self.plugins.finalize(&result);
        result
    }

    /// Force the tree and group its cases into worker tasks.
    ///
    /// The grouping unit is the innermost module (or package `__init__`)
    /// scope. A `CanSplit` module produces one task per top-level
    /// callable; a module under a `Shared` package collapses into a
    /// single task for the whole package, so its fixtures set up once.
    /// Cases without a module scope cannot be re-addressed and run on
    /// the master.
    fn collect_tasks(&self, loader: &Loader, suite: Suite) -> (Vec<TaskMsg>, Vec<Case>) {
        let mut tasks: Vec<TaskMsg> = Vec::new();
        let mut local = Vec::new();

        for case in suite.flatten() {
            let scope = case
                .chain()
                .innermost_of(ScopeKind::Module)
                .or_else(|| case.chain().innermost_of(ScopeKind::Package));
            let Some(scope) = scope else {
                local.push(case);
                continue;
            };
            let module_name = scope.id.as_str().to_string();
            let Some(module) = loader.importer().loaded(&module_name) else {
                local.push(case);
                continue;
            };
            let Some(mut dir) = base_dir_of(&module) else {
                local.push(case);
                continue;
            };

            let mut addr = module_name.clone();
            if module.parallel == ParallelMark::CanSplit {
                if let Some(callable) = top_level_callable(case.id(), &module_name) {
                    addr = format!("{module_name}:{callable}");
                }
            }

            // A shared package overrides everything under it.
            for ancestor in case.chain().iter() {
                if ancestor.kind != ScopeKind::Package {
                    continue;
                }
                if let Some(pkg) = loader.importer().loaded(ancestor.id.as_str()) {
                    if pkg.parallel == ParallelMark::Shared {
                        if let Some(pkg_dir) = base_dir_of(&pkg) {
                            addr = ancestor.id.as_str().to_string();
                            dir = pkg_dir;
                        }
                        break;
                    }
                }
            }

            if !tasks.iter().any(|t| t.addr == addr) {
                tasks.push(TaskMsg { dir, addr });
            }
        }
        (tasks, local)
    }

    fn dispatch(&self, tasks: &[TaskMsg], result: &mut RunResult) {
        if tasks.is_empty() {
            return;
        }
        let spec = WorkerSpec {
            config: self.config.spec.clone(),
            plugins: self
                .plugins
                .plugin_names()
                .iter()
                .map(|n| (*n).to_string())
                .collect(),
        };
        let spec_bytes = match encode(&spec) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "worker spec encoding failed");
                return;
            }
        };

        let (task_tx, task_rx) = unbounded::<Vec<u8>>();
        let (result_tx, result_rx) = unbounded::<Vec<u8>>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let total = tasks.len();
        for task in tasks {
            match encode(task) {
                Ok(bytes) => {
                    let _ = task_tx.send(bytes);
                }
                Err(e) => tracing::error!(error = %e, "task encoding failed"),
            }
        }
        // Workers exit when the queue runs dry.
        drop(task_tx);

        let mut next_id = 0;
        let mut next_generation = 0;
        let mut workers: Vec<WorkerHandle> = (0..self.config.spec.processes.max(1))
            .map(|_| {
                self.spawn_worker(
                    &mut next_id,
                    &mut next_generation,
                    &spec_bytes,
                    &task_rx,
                    &result_tx,
                    &shutdown,
                )
            })
            .collect();
        // Kept only if retired workers may be replaced; otherwise the
        // channel disconnecting tells us every worker is gone.
        let restart_tx = self.config.spec.restart_workers.then(|| result_tx.clone());
        drop(result_tx);

        let mut completed = 0;
        let mut drained = false;
        while completed < total {
            if self.signals.count() >= 2 {
                tracing::warn!("second interrupt; aborting");
                result.aborted = true;
                break;
            }
            if self.signals.count() == 1 && !drained {
                drained = true;
                tracing::warn!("interrupt; settling pending tasks");
                completed += self.settle(&task_rx, &mut workers, result, "interrupted");
                continue;
            }
            if result.should_stop() && !drained {
                drained = true;
                completed += self.settle(&task_rx, &mut workers, result, "stopped early");
                continue;
            }

            match result_rx.recv_timeout(POLL_INTERVAL) {
                Ok(bytes) => {
                    let Ok(msg) = decode::<ResultMsg>(&bytes) else {
                        tracing::error!("undecodable worker result");
                        continue;
                    };
                    let current = workers
                        .iter()
                        .find(|w| w.id == msg.worker)
                        .map(|w| w.generation);
                    if current != Some(msg.generation) {
                        tracing::debug!(worker = msg.worker, addr = %msg.addr, "stale result discarded");
                        continue;
                    }
                    self.merge(result, msg);
                    completed += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    completed += self.check_timeouts(
                        &mut workers,
                        &mut next_id,
                        &mut next_generation,
                        &spec_bytes,
                        &task_rx,
                        restart_tx.as_ref(),
                        &shutdown,
                        result,
                    );
                }
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!(completed, total, "workers exited with tasks unaccounted");
                    break;
                }
            }
        }
        shutdown.store(true, Ordering::SeqCst);
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_worker(
        &self,
        next_id: &mut usize,
        next_generation: &mut u64,
        spec_bytes: &[u8],
        task_rx: &Receiver<Vec<u8>>,
        result_tx: &Sender<Vec<u8>>,
        shutdown: &Arc<AtomicBool>,
    ) -> WorkerHandle {
        let id = *next_id;
        *next_id += 1;
        let generation = *next_generation;
        *next_generation += 1;

        let status = Arc::new(WorkerStatus::new());
        let handle = WorkerHandle {
            id,
            generation,
            status: status.clone(),
        };

        let spec_bytes = spec_bytes.to_vec();
        let source = self.source.clone();
        let tasks = task_rx.clone();
        let results = result_tx.clone();
        let shutdown = shutdown.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("sift-worker-{id}"))
            .spawn(move || {
                worker_loop(
                    id,
                    generation,
                    &spec_bytes,
                    source,
                    &tasks,
                    &results,
                    &status,
                    &shutdown,
                );
            });
        if let Err(e) = spawned {
            tracing::error!(worker = id, error = %e, "worker thread failed to start");
        }
        handle
    }

    /// Wind the run down without an abort: every pending task becomes a
    /// skip record, every in-flight task an error, and the workers
    /// running them are fenced.
    fn settle(
        &self,
        task_rx: &Receiver<Vec<u8>>,
        workers: &mut [WorkerHandle],
        result: &mut RunResult,
        reason: &str,
    ) -> usize {
        let mut settled = 0;
        for worker in workers.iter_mut() {
            if let Some((addr, _)) = worker.status.snapshot() {
                self.record_error(result, &addr, reason.to_string());
                worker.status.retire();
                worker.generation += 1;
                settled += 1;
            } else {
                worker.status.retire();
            }
        }
        while let Ok(bytes) = task_rx.try_recv() {
            if let Ok(task) = decode::<TaskMsg>(&bytes) {
                self.record_skip(result, &task.addr, reason);
                settled += 1;
            }
        }
        settled
    }

    /// Watchdog pass: time out workers stuck past the process timeout.
    #[allow(clippy::too_many_arguments)]
    fn check_timeouts(
        &self,
        workers: &mut Vec<WorkerHandle>,
        next_id: &mut usize,
        next_generation: &mut u64,
        spec_bytes: &[u8],
        task_rx: &Receiver<Vec<u8>>,
        restart_tx: Option<&Sender<Vec<u8>>>,
        shutdown: &Arc<AtomicBool>,
        result: &mut RunResult,
    ) -> usize {
        let Some(timeout) = self.config.process_timeout else {
            return 0;
        };
        let mut settled = 0;
        let mut replacements = 0;
        for worker in workers.iter_mut() {
            if worker.status.is_retired() {
                continue;
            }
            let Some((addr, started)) = worker.status.snapshot() else {
                continue;
            };
            if started.elapsed() <= timeout {
                continue;
            }
            tracing::warn!(worker = worker.id, addr = %addr, "worker timed out");
            self.record_error(
                result,
                &addr,
                format!(
                    "TimedOutException: task did not complete within {}s",
                    timeout.as_secs()
                ),
            );
            worker.status.retire();
            worker.generation += 1;
            settled += 1;
            replacements += 1;
        }
        if let Some(result_tx) = restart_tx {
            for _ in 0..replacements {
                workers.push(self.spawn_worker(
                    next_id,
                    next_generation,
                    spec_bytes,
                    task_rx,
                    result_tx,
                    shutdown,
                ));
            }
        }
        settled
    }

    /// Fold a completed task back into the aggregate, replaying the
    /// outcome hooks so master-side plugins observe the records.
    fn merge(&self, result: &mut RunResult, msg: ResultMsg) {
        tracing::debug!(worker = msg.worker, addr = %msg.addr, tests = msg.tests_run, "task done");
        result.tests_run += msg.tests_run;
        for record in msg.records {
            self.replay(&record);
            self.emit(&record);
            result.record(record);
        }
        if self.config.spec.stop_on_error
            && (!result.failures.is_empty() || !result.errors.is_empty())
        {
            result.stop();
        }
    }

    fn replay(&self, record: &OutcomeRecord) {
        let message = record.message.clone().unwrap_or_default();
        match &record.kind {
            RecordKind::Success => self.plugins.add_success(&record.id),
            RecordKind::Failure => self
                .plugins
                .add_failure(&record.id, &TestError::failure(message)),
            RecordKind::Error => self
                .plugins
                .add_error(&record.id, &TestError::error(message)),
            RecordKind::Class(class) => self
                .plugins
                .add_error(&record.id, &TestError::marked(class.class.clone(), message)),
        }
    }

    fn emit(&self, record: &OutcomeRecord) {
        if self.config.verbosity() != 1 {
            return;
        }
        let mark = match &record.kind {
            RecordKind::Success => ".".to_string(),
            RecordKind::Failure => "F".to_string(),
            RecordKind::Error => "E".to_string(),
            RecordKind::Class(c) => c.label.chars().take(1).collect(),
        };
        eprint!("{mark}");
    }

    fn record_error(&self, result: &mut RunResult, addr: &str, message: String) {
        result.tests_run += 1;
        let record = OutcomeRecord {
            id: addr.to_string(),
            kind: RecordKind::Error,
            message: Some(message),
            captured: None,
        };
        self.replay(&record);
        self.emit(&record);
        result.record(record);
    }

    fn record_skip(&self, result: &mut RunResult, addr: &str, reason: &str) {
        let message = Some(format!("not run: {reason}"));
        let record = match self.plugins.error_classes().lookup("skip") {
            Some(class) => OutcomeRecord {
                id: addr.to_string(),
                kind: RecordKind::Class(class.clone()),
                message,
                captured: None,
            },
            None => OutcomeRecord {
                id: addr.to_string(),
                kind: RecordKind::Error,
                message,
                captured: None,
            },
        };
        self.replay(&record);
        self.emit(&record);
        result.record(record);
    }
}

/// The callable segment of a case id relative to its module: the piece
/// after `module.`, cut at the first `.` or `:`. For a method case that
/// is the class name; generator variants of one function dedup to it.
fn top_level_callable<'a>(case_id: &'a str, module: &str) -> Option<&'a str> {
    let tail = case_id.strip_prefix(module)?.strip_prefix('.')?;
    let tail = tail.split(':').next().unwrap_or(tail);
    tail.split('.').next().filter(|s| !s.is_empty())
}
