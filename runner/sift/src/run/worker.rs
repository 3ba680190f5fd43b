//! Worker side of the parallel runner, and the wire schema.
//!
//! Workers are OS threads, but everything they exchange with the master
//! is byte-serialized (`WorkerSpec` in, `TaskMsg` stream in, `ResultMsg`
//! stream out), so the worker side could move out of process without
//! changing the schema. Each worker rebuilds its own config, plugins,
//! loader, and runner from the spec; nothing live is shared but the
//! module source and the channels.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sift_model::{Config, ConfigSpec};

use crate::import::ModuleSource;
use crate::load::Loader;
use crate::plugin::{registry, PluginManager};
use crate::result::OutcomeRecord;
use crate::run::Runner;

/// Everything a worker needs to reconstruct its environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub config: ConfigSpec,
    /// Plugin names; workers re-instantiate from the builtin registry.
    pub plugins: Vec<String>,
}

/// One unit of work: a module (or callable within one) plus the
/// directory its import resolves from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMsg {
    pub dir: PathBuf,
    /// `dotted_module` or `dotted_module:callable`.
    pub addr: String,
}

/// A completed task's outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMsg {
    pub worker: usize,
    /// Stamped so results from abandoned workers can be discarded.
    pub generation: u64,
    pub addr: String,
    pub tests_run: usize,
    pub records: Vec<OutcomeRecord>,
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(value)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}

/// What the master can see of a worker: the address it is on and when it
/// started, plus the retirement flag the watchdog sets.
#[derive(Default)]
pub struct WorkerStatus {
    current: Mutex<Option<(String, Instant)>>,
    retired: AtomicBool,
}

impl WorkerStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, addr: &str) {
        *self.current.lock() = Some((addr.to_string(), Instant::now()));
    }

    pub fn finish(&self) {
        *self.current.lock() = None;
    }

    pub fn snapshot(&self) -> Option<(String, Instant)> {
        self.current.lock().clone()
    }

    /// A retired worker stops taking tasks after its current one.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }
}

/// Body of a worker thread: rebuild the environment, then pull tasks
/// until the queue closes, shutdown is requested, or the watchdog
/// retires this worker.
#[allow(clippy::too_many_arguments)]
pub fn worker_loop(
    id: usize,
    generation: u64,
    spec_bytes: &[u8],
    source: Arc<dyn ModuleSource>,
    tasks: &Receiver<Vec<u8>>,
    results: &Sender<Vec<u8>>,
    status: &Arc<WorkerStatus>,
    shutdown: &Arc<AtomicBool>,
) {
    let Ok(spec) = decode::<WorkerSpec>(spec_bytes) else {
        tracing::error!(worker = id, "bad worker spec");
        return;
    };
    // Progress output belongs to the master.
    let mut config_spec = spec.config;
    config_spec.verbosity = 0;
    let Ok(config) = Config::from_spec(config_spec) else {
        tracing::error!(worker = id, "worker config failed to compile");
        return;
    };
    let config = Arc::new(config);

    let mut manager = PluginManager::new(registry::from_names(&spec.plugins));
    if let Err(e) = manager.configure(&config) {
        tracing::error!(worker = id, error = %e, "worker plugin configuration failed");
        return;
    }
    let plugins = Arc::new(manager);
    let loader = Loader::new(config.clone(), plugins.clone(), source);
    let runner = Runner::new(config, plugins);

    tracing::debug!(worker = id, generation, "worker ready");
    loop {
        if shutdown.load(Ordering::SeqCst) || status.is_retired() {
            break;
        }
        let Ok(bytes) = tasks.recv() else {
            break;
        };
        let Ok(task) = decode::<TaskMsg>(&bytes) else {
            continue;
        };
        status.begin(&task.addr);
        tracing::debug!(worker = id, addr = %task.addr, "task started");

        let (module, call) = match task.addr.split_once(':') {
            Some((module, call)) => (module, Some(call)),
            None => (task.addr.as_str(), None),
        };
        let suite = loader.load_module(&task.dir, module, call);
        let result = runner.run(suite);
        status.finish();

        let msg = ResultMsg {
            worker: id,
            generation,
            addr: task.addr.clone(),
            tests_run: result.tests_run,
            records: result.records,
        };
        match encode(&msg) {
            Ok(bytes) => {
                if results.send(bytes).is_err() {
                    break;
                }
            }
            Err(e) => tracing::error!(worker = id, error = %e, "result encoding failed"),
        }
    }
    tracing::debug!(worker = id, "worker done");
}
