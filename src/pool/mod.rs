//! Fixed-size compilation pool
//!
//! Architecture: Resource Ownership - The pool is an explicitly owned, injected resource
//! - A long-lived rayon thread pool compiles rule sets submitted by the registry
//! - Every submission returns a `CompilationHandle` waiters can await with a bound
//! - `shutdown` cancels outstanding handles and releases the worker threads

mod handle;

pub use handle::{CompilationHandle, HandleState};

use crate::domain::{WardenError, WardenResult};
use crate::pipeline::{RuleSetCompiler, RuleSetSource, StageError, StagePipeline};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Default number of compilation workers
pub const DEFAULT_POOL_SIZE: usize = 16;

/// Worker pool settings
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads
    pub size: usize,
    /// Prefix for worker thread names
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { size: DEFAULT_POOL_SIZE, thread_name: "warden-compile".to_string() }
    }
}

impl PoolConfig {
    pub fn with_size(size: usize) -> Self {
        Self { size, ..Default::default() }
    }
}

type Outstanding = Arc<Mutex<HashMap<u64, CompilationHandle>>>;

/// Long-lived pool running rule-set compilations
pub struct CompilationPool {
    workers: Mutex<Option<rayon::ThreadPool>>,
    compiler: Arc<dyn RuleSetCompiler>,
    outstanding: Outstanding,
    next_id: AtomicU64,
    size: usize,
}

impl CompilationPool {
    /// Start a pool that compiles with the given compiler
    pub fn start(config: PoolConfig, compiler: Arc<dyn RuleSetCompiler>) -> WardenResult<Self> {
        if config.size == 0 {
            return Err(WardenError::config("Compilation pool size must be at least 1"));
        }

        let prefix = config.thread_name.clone();
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(config.size)
            .thread_name(move |index| format!("{}-{}", prefix, index))
            .build()
            .map_err(|e| WardenError::config(format!("Failed to start compilation pool: {}", e)))?;

        tracing::debug!("Started compilation pool with {} workers", config.size);

        Ok(Self {
            workers: Mutex::new(Some(workers)),
            compiler,
            outstanding: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            size: config.size,
        })
    }

    /// Start a pool backed by the three-stage pipeline
    pub fn with_pipeline(config: PoolConfig) -> WardenResult<Self> {
        Self::start(config, Arc::new(StagePipeline::new()))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of submitted compilations that have not finished yet
    pub fn outstanding(&self) -> usize {
        lock(&self.outstanding).len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Queue a compilation of `source` tagged with `generation`
    pub fn submit(&self, source: RuleSetSource, generation: u64) -> WardenResult<CompilationHandle> {
        let workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(workers) = workers.as_ref() else {
            return Err(WardenError::PoolShutdown);
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = CompilationHandle::new(id, source, generation);
        lock(&self.outstanding).insert(id, handle.clone());

        let job = handle.clone();
        let compiler = Arc::clone(&self.compiler);
        let outstanding = Arc::clone(&self.outstanding);
        workers.spawn(move || {
            run_job(&job, compiler.as_ref());
            lock(&outstanding).remove(&job.id());
        });

        tracing::debug!(
            "Submitted compilation {} of {} (generation {})",
            id,
            handle.source(),
            generation
        );
        Ok(handle)
    }

    /// Cancel outstanding handles, reject new work and release the workers
    pub fn shutdown(&self) {
        let workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner).take();
        if workers.is_none() {
            return;
        }

        let cancelled: Vec<CompilationHandle> =
            lock(&self.outstanding).drain().map(|(_, handle)| handle).collect();
        for handle in &cancelled {
            handle.cancel();
        }

        tracing::debug!(
            "Compilation pool shut down, {} outstanding handle(s) cancelled",
            cancelled.len()
        );
        drop(workers);
    }
}

impl Drop for CompilationPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CompilationPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilationPool")
            .field("size", &self.size)
            .field("outstanding", &self.outstanding())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn lock(outstanding: &Outstanding) -> std::sync::MutexGuard<'_, HashMap<u64, CompilationHandle>> {
    outstanding.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_job(handle: &CompilationHandle, compiler: &dyn RuleSetCompiler) {
    if !handle.mark_running() {
        tracing::debug!(
            "Skipping compilation {} of {}: {}",
            handle.id(),
            handle.source(),
            handle.state().name()
        );
        return;
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        compiler.compile(handle.source(), handle.cancel_signal())
    }));

    match result {
        Ok(Ok(outcome)) => handle.succeed(outcome.validator, outcome.warnings),
        Ok(Err(error)) => handle.fail(error),
        Err(payload) => handle.fail(StageError::Panicked { message: panic_message(payload.as_ref()) }),
    }

    tracing::debug!(
        "Compilation {} of {} finished: {}",
        handle.id(),
        handle.source(),
        handle.state().name()
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
