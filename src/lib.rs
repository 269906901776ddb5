//! Schema Warden - Rule-set compilation and structural document validation
//!
//! Architecture: Clean Architecture - Library interface serves as the application layer
//! - Rule sets compile through a three-stage pipeline on a fixed worker pool
//! - A generation-tracking registry hands consistent snapshots to the report engine
//! - The facade turns reports into pass/fail decisions for hosts

pub mod config;
pub mod domain;
pub mod engine;
pub mod pipeline;
pub mod pool;
pub mod registry;
pub mod report;
pub mod validator;

// Re-export main types for convenient access
pub use domain::{
    sanitize, Diagnostic, Document, Severity, ValidationReport, ValidationSummary, Violation,
    WardenError, WardenResult, METADATA_ATTRIBUTE,
};

pub use config::{ConfigBuilder, WardenConfig};

pub use engine::{EngineOptions, ReportEngine, DEFAULT_COMPILE_TIMEOUT};

pub use pipeline::{
    CancelSignal, CompileOutcome, RuleSetCompiler, RuleSetSource, Stage, StageError,
    StagePipeline, StageWarning,
};

pub use pool::{CompilationHandle, CompilationPool, HandleState, PoolConfig, DEFAULT_POOL_SIZE};

pub use registry::{Generation, ValidatorRegistry};

pub use report::{DocumentReport, OutputFormat, ReportFormatter, ReportOptions};

pub use validator::{CompiledValidator, ExecutableValidator, OutputRecord, RecordKind};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Main validation facade used by hosts
#[derive(Debug)]
pub struct SchemaWarden {
    id: Option<String>,
    priority: i64,
    suppress_warnings: AtomicBool,
    engine: ReportEngine,
}

impl SchemaWarden {
    /// Start a warden backed by the three-stage pipeline and configure its rule sets
    pub fn start(config: WardenConfig) -> WardenResult<Self> {
        let pool = CompilationPool::with_pipeline(config.pool_config())?;
        Self::with_pool(config, Arc::new(pool))
    }

    /// Start a warden that compiles with `compiler` instead of the pipeline
    pub fn start_with(config: WardenConfig, compiler: Arc<dyn RuleSetCompiler>) -> WardenResult<Self> {
        let pool = CompilationPool::start(config.pool_config(), compiler)?;
        Self::with_pool(config, Arc::new(pool))
    }

    /// Build a warden on an existing pool
    pub fn with_pool(config: WardenConfig, pool: Arc<CompilationPool>) -> WardenResult<Self> {
        config.validate()?;

        let registry = Arc::new(ValidatorRegistry::new(pool));
        let warden = Self {
            id: config.id.clone(),
            priority: config.effective_priority(),
            suppress_warnings: AtomicBool::new(config.suppress_warnings),
            engine: ReportEngine::new(registry, config.engine_options()),
        };

        let sources = config.resolve_rule_sets();
        if !sources.is_empty() {
            warden.configure(sources)?;
        }

        tracing::debug!(
            "Started schema warden {} (config fingerprint {})",
            warden.id().unwrap_or("<unnamed>"),
            config.fingerprint()
        );
        Ok(warden)
    }

    /// Replace the configured rule sets; compilations of the old set are superseded
    pub fn configure(&self, sources: Vec<RuleSetSource>) -> WardenResult<u64> {
        self.engine.registry().configure(sources)
    }

    pub fn set_namespace(&self, namespace: Option<String>) {
        self.engine.set_namespace(namespace);
    }

    pub fn set_suppress_warnings(&self, suppress: bool) {
        self.suppress_warnings.store(suppress, Ordering::SeqCst);
    }

    pub fn suppress_warnings(&self) -> bool {
        self.suppress_warnings.load(Ordering::SeqCst)
    }

    /// Build the full violation report for a document
    pub async fn generate_report(&self, document: &Document) -> WardenResult<ValidationReport> {
        self.engine.evaluate(document).await
    }

    /// Validate a document, failing on errors and, unless suppressed, on warnings
    pub async fn validate(&self, document: &Document) -> WardenResult<()> {
        let report = self.engine.evaluate(document).await?;
        self.enforce(&report)
    }

    /// Report-only query: failures are logged and yield `None`
    pub async fn validate_report_only(&self, document: &Document) -> Option<ValidationReport> {
        match self.engine.evaluate(document).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!("Exception validating document ID {}: {}", document.display_id(), e);
                None
            }
        }
    }

    /// Turn a report into a pass/fail decision under the current warning policy
    pub fn enforce(&self, report: &ValidationReport) -> WardenResult<()> {
        let errors = report.messages(Severity::Error);
        let warnings = report.messages(Severity::Warning);

        if !errors.is_empty() || (!self.suppress_warnings() && !warnings.is_empty()) {
            return Err(WardenError::ValidationFailed { errors, warnings });
        }

        Ok(())
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Priority clamped to 1..=100
    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn generation(&self) -> u64 {
        self.engine.registry().generation()
    }

    pub fn engine(&self) -> &ReportEngine {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<ValidatorRegistry> {
        self.engine.registry()
    }

    /// Cancel outstanding compilations and release the worker pool
    pub fn shutdown(&self) {
        self.engine.registry().pool().shutdown();
    }
}
