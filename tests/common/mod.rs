//! Shared fixtures for the integration tests

#![allow(dead_code)]

use schema_warden::{
    CancelSignal, CompileOutcome, CompiledValidator, Document, ExecutableValidator, OutputRecord,
    RuleSetCompiler, RuleSetSource, StageError, StagePipeline, WardenResult,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Write `content` under `dir`, creating parent directories
pub fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// A latch compilations block on until it is opened
#[derive(Default)]
pub struct Latch {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Latch {
    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.changed.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.changed.wait(open).unwrap();
        }
    }
}

/// Runs the real pipeline once its latch opens
pub struct GatedCompiler {
    pub latch: Arc<Latch>,
}

impl GatedCompiler {
    pub fn new() -> (Self, Arc<Latch>) {
        let latch = Arc::new(Latch::default());
        (Self { latch: latch.clone() }, latch)
    }
}

impl RuleSetCompiler for GatedCompiler {
    fn compile(
        &self,
        source: &RuleSetSource,
        cancel: &CancelSignal,
    ) -> Result<CompileOutcome, StageError> {
        self.latch.wait();
        StagePipeline::new().compile(source, cancel)
    }
}

/// Validator that emits fixed records and counts its runs
#[derive(Debug)]
pub struct CountingValidator {
    origin: PathBuf,
    records: Vec<OutputRecord>,
    runs: Arc<AtomicUsize>,
}

impl ExecutableValidator for CountingValidator {
    fn origin(&self) -> &Path {
        &self.origin
    }

    fn execute(&self, _document: &Document) -> WardenResult<Vec<OutputRecord>> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }
}

/// Compiles every source into a `CountingValidator` sharing one run counter
pub struct CountingCompiler {
    pub records: Vec<OutputRecord>,
    pub runs: Arc<AtomicUsize>,
}

impl CountingCompiler {
    pub fn new(records: Vec<OutputRecord>) -> (Self, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        (Self { records, runs: runs.clone() }, runs)
    }
}

impl RuleSetCompiler for CountingCompiler {
    fn compile(
        &self,
        source: &RuleSetSource,
        _cancel: &CancelSignal,
    ) -> Result<CompileOutcome, StageError> {
        let validator = CountingValidator {
            origin: source.path().to_path_buf(),
            records: self.records.clone(),
            runs: self.runs.clone(),
        };
        Ok(CompileOutcome { validator: CompiledValidator::new(validator), warnings: Vec::new() })
    }
}
