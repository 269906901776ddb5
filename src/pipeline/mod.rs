//! Three-stage rule-set compiler
//!
//! Architectural Principle: Service Layer - The pipeline orchestrates the stage transformations
//! - Inclusion expansion assembles one self-contained schema from its fragments
//! - Abstract expansion rewrites parameterized patterns into concrete ones
//! - Executable compilation turns the expanded schema into an immutable validator
//!
//! Every compilation owns its own `StageDiagnostics`; nothing collected during
//! one invocation is visible to another, so compilations may run concurrently.

pub mod abstract_expand;
pub mod compile;
pub mod include;
pub mod schema;

use crate::validator::CompiledValidator;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use compile::CompiledRuleSet;

/// Location of one rule-set file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleSetSource {
    path: PathBuf,
}

impl RuleSetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve a configured location: absolute paths are kept, relative ones
    /// are joined onto `base_dir`.
    pub fn resolve(location: impl AsRef<Path>, base_dir: &Path) -> Self {
        let location = location.as_ref();
        if location.is_absolute() {
            Self::new(location)
        } else {
            Self::new(base_dir.join(location))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn display_name(&self) -> String {
        self.path.display().to_string()
    }
}

impl fmt::Display for RuleSetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// The ordered compilation stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Inclusion,
    AbstractExpansion,
    Compilation,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inclusion => "inclusion expansion",
            Self::AbstractExpansion => "abstract expansion",
            Self::Compilation => "executable compilation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a rule set could not be compiled
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error("could not locate rule set file {}", path.display())]
    MissingSource { path: PathBuf },

    #[error("{stage} failed: {message}")]
    Failed { stage: Stage, message: String },

    #[error("compilation cancelled before {stage}")]
    Cancelled { stage: Stage },

    #[error("compiler panicked: {message}")]
    Panicked { message: String },
}

impl StageError {
    pub fn failed(stage: Stage, message: impl Into<String>) -> Self {
        Self::Failed { stage, message: message.into() }
    }
}

/// A warning raised while one stage processed one rule set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWarning {
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for StageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

/// Warnings captured during a single compilation
#[derive(Debug, Default)]
pub struct StageDiagnostics {
    warnings: Vec<StageWarning>,
}

impl StageDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, stage: Stage, message: impl Into<String>) {
        self.warnings.push(StageWarning { stage, message: message.into() });
    }

    pub fn warnings(&self) -> &[StageWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<StageWarning> {
        self.warnings
    }
}

/// Cooperative cancellation flag checked between stages
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn checkpoint(&self, next: Stage) -> Result<(), StageError> {
        if self.is_cancelled() {
            return Err(StageError::Cancelled { stage: next });
        }
        Ok(())
    }
}

/// A compiled validator together with the warnings its compilation raised
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub validator: CompiledValidator,
    pub warnings: Vec<StageWarning>,
}

/// Turns a rule-set source into an executable validator
pub trait RuleSetCompiler: Send + Sync {
    fn compile(
        &self,
        source: &RuleSetSource,
        cancel: &CancelSignal,
    ) -> Result<CompileOutcome, StageError>;
}

/// The production compiler: inclusion, abstract expansion, compilation
#[derive(Debug, Default, Clone)]
pub struct StagePipeline;

impl StagePipeline {
    pub fn new() -> Self {
        Self
    }

    /// Compile a rule set without external cancellation
    pub fn compile_source(&self, source: &RuleSetSource) -> Result<CompileOutcome, StageError> {
        self.compile(source, &CancelSignal::new())
    }

    fn run_stages(
        &self,
        path: &Path,
        cancel: &CancelSignal,
        diagnostics: &mut StageDiagnostics,
    ) -> Result<CompiledRuleSet, StageError> {
        cancel.checkpoint(Stage::Inclusion)?;
        let included = include::expand(path, diagnostics)?;

        cancel.checkpoint(Stage::AbstractExpansion)?;
        let expanded = abstract_expand::expand(included, diagnostics)?;

        cancel.checkpoint(Stage::Compilation)?;
        compile::compile(expanded, path, diagnostics)
    }
}

impl RuleSetCompiler for StagePipeline {
    fn compile(
        &self,
        source: &RuleSetSource,
        cancel: &CancelSignal,
    ) -> Result<CompileOutcome, StageError> {
        let path = source.path();
        if !path.exists() {
            return Err(StageError::MissingSource { path: path.to_path_buf() });
        }

        let mut diagnostics = StageDiagnostics::new();
        let result = self.run_stages(path, cancel, &mut diagnostics);

        for warning in diagnostics.warnings() {
            tracing::debug!(
                "Rule set warning during {}: '{}' on file: {}",
                warning.stage,
                warning.message,
                source
            );
        }

        match result {
            Ok(rule_set) => {
                tracing::debug!(
                    "Compiled rule set '{}' from {} ({} patterns)",
                    rule_set.id(),
                    source,
                    rule_set.pattern_count()
                );
                Ok(CompileOutcome {
                    validator: CompiledValidator::new(rule_set),
                    warnings: diagnostics.into_warnings(),
                })
            }
            Err(e) => {
                tracing::info!("Rule set error (file = {}): {}", source, e);
                Err(e)
            }
        }
    }
}
