//! Report engine: runs compiled validators against one document
//!
//! CDD Principle: Domain Services - The engine turns validator output into violations
//! - Applicability is decided before any validator is awaited
//! - Records are classified by their flavor tag, sanitized, and kept in order
//! - The first timeout, compilation or execution failure aborts the whole report
//! - Validators run on the blocking thread pool; they match regexes and read vocabulary files

use crate::domain::{
    Diagnostic, Document, Severity, ValidationReport, Violation, WardenError, WardenResult,
};
use crate::registry::ValidatorRegistry;
use crate::validator::{CompiledValidator, OutputRecord, RecordKind};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Default bound on waiting for one compilation
pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(600);

/// Options controlling evaluation
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Only documents whose root namespace equals this are validated
    pub namespace: Option<String>,
    /// How long to wait for each compilation
    pub compile_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { namespace: None, compile_timeout: DEFAULT_COMPILE_TIMEOUT }
    }
}

/// Severity a record's flavor tag implies
pub fn classify(record: &OutputRecord) -> Severity {
    let flag = record.flag.as_deref().map(|f| f.trim().to_ascii_lowercase());
    match flag.as_deref() {
        Some("error" | "fatal") => Severity::Error,
        Some("warning" | "warn" | "info") => Severity::Warning,
        _ => match record.kind {
            RecordKind::FailedAssert => Severity::Error,
            RecordKind::SuccessfulReport => Severity::Warning,
        },
    }
}

/// Classify a validator's records, preserving emission order
pub fn parse_output(records: &[OutputRecord]) -> Vec<Diagnostic> {
    records.iter().map(|record| Diagnostic::new(record.text.clone(), classify(record))).collect()
}

/// Evaluates documents against the registry's current generation
#[derive(Debug)]
pub struct ReportEngine {
    registry: Arc<ValidatorRegistry>,
    namespace: RwLock<Option<String>>,
    compile_timeout: Duration,
}

impl ReportEngine {
    pub fn new(registry: Arc<ValidatorRegistry>, options: EngineOptions) -> Self {
        Self {
            registry,
            namespace: RwLock::new(normalize(options.namespace)),
            compile_timeout: options.compile_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ValidatorRegistry> {
        &self.registry
    }

    pub fn compile_timeout(&self) -> Duration {
        self.compile_timeout
    }

    pub fn namespace(&self) -> Option<String> {
        self.namespace.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Set or clear the namespace filter; blank values clear it
    pub fn set_namespace(&self, namespace: Option<String>) {
        *self.namespace.write().unwrap_or_else(PoisonError::into_inner) = normalize(namespace);
    }

    /// Whether `document` should be run through the validators at all
    pub fn is_applicable(&self, document: &Document) -> bool {
        if document.is_empty() {
            return false;
        }
        match self.namespace.read().unwrap_or_else(PoisonError::into_inner).as_deref() {
            Some(filter) => document.namespace() == Some(filter),
            None => true,
        }
    }

    /// Build the violation report for one document
    pub async fn evaluate(&self, document: &Document) -> WardenResult<ValidationReport> {
        let start = Instant::now();
        let mut report = ValidationReport::new();

        if !self.is_applicable(document) {
            tracing::debug!("Skipping document {}: not applicable", document.display_id());
            return Ok(report);
        }

        let generation = self.registry.snapshot();
        report.set_generation(generation.number());

        let shared = Arc::new(document.clone());
        for handle in generation.handles() {
            let validator = handle.wait(self.compile_timeout).await?;
            let records = execute_blocking(validator, Arc::clone(&shared)).await?;

            for diagnostic in parse_output(&records) {
                report.add_violation(Violation::from_diagnostic(&diagnostic));
            }
        }

        report.set_rule_sets_evaluated(generation.handles().len());
        report.set_execution_time(start.elapsed().as_millis() as u64);

        tracing::debug!(
            "Evaluated document {} against {} rule set(s): {} violation(s)",
            document.display_id(),
            generation.handles().len(),
            report.violations.len()
        );
        Ok(report)
    }
}

async fn execute_blocking(
    validator: CompiledValidator,
    document: Arc<Document>,
) -> WardenResult<Vec<OutputRecord>> {
    let origin = validator.origin().display().to_string();
    tokio::task::spawn_blocking(move || validator.execute(&document))
        .await
        .map_err(|e| WardenError::execution(origin, format!("validator task failed: {}", e)))?
}

fn normalize(namespace: Option<String>) -> Option<String> {
    namespace.map(|ns| ns.trim().to_string()).filter(|ns| !ns.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{WardenError, METADATA_ATTRIBUTE};
    use crate::pipeline::{CancelSignal, CompileOutcome, RuleSetCompiler, RuleSetSource, StageError};
    use crate::pool::{CompilationPool, PoolConfig};
    use crate::validator::{CompiledValidator, ExecutableValidator};
    use rstest::rstest;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Emits fixed records; "broken" sources fail to execute and "panicking" ones panic
    #[derive(Debug)]
    struct Canned {
        origin: PathBuf,
        records: Vec<OutputRecord>,
        calls: Arc<AtomicUsize>,
    }

    impl ExecutableValidator for Canned {
        fn origin(&self) -> &Path {
            &self.origin
        }

        fn execute(&self, _document: &Document) -> WardenResult<Vec<OutputRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.origin.to_string_lossy().contains("panicking") {
                panic!("validator blew up");
            }
            if self.origin.to_string_lossy().contains("broken") {
                return Err(WardenError::execution(self.origin.display().to_string(), "bad input"));
            }
            Ok(self.records.clone())
        }
    }

    /// Compiles every source to a `Canned` validator; "missing" sources fail
    struct CannedCompiler {
        records: Vec<OutputRecord>,
        calls: Arc<AtomicUsize>,
    }

    impl RuleSetCompiler for CannedCompiler {
        fn compile(
            &self,
            source: &RuleSetSource,
            _cancel: &CancelSignal,
        ) -> Result<CompileOutcome, StageError> {
            if source.display_name().contains("missing") {
                return Err(StageError::MissingSource { path: source.path().to_path_buf() });
            }
            let origin = source.path().to_path_buf();
            let records = self
                .records
                .iter()
                .map(|r| OutputRecord { text: format!("{} from {}", r.text, origin.display()), ..r.clone() })
                .collect();
            Ok(CompileOutcome {
                validator: CompiledValidator::new(Canned { origin, records, calls: self.calls.clone() }),
                warnings: Vec::new(),
            })
        }
    }

    fn engine(records: Vec<OutputRecord>, sources: &[&str]) -> (ReportEngine, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let compiler = CannedCompiler { records, calls: calls.clone() };
        let pool = CompilationPool::start(PoolConfig::with_size(2), Arc::new(compiler)).unwrap();
        let registry = Arc::new(ValidatorRegistry::new(Arc::new(pool)));
        registry.configure(sources.iter().map(|s| RuleSetSource::new(*s)).collect()).unwrap();

        let options = EngineOptions { compile_timeout: Duration::from_secs(10), ..Default::default() };
        (ReportEngine::new(registry, options), calls)
    }

    #[rstest]
    #[case(OutputRecord::failed_assert("p", "m"), Severity::Error)]
    #[case(OutputRecord::successful_report("p", "m"), Severity::Warning)]
    #[case(OutputRecord::failed_assert("p", "m").with_flag("warning"), Severity::Warning)]
    #[case(OutputRecord::failed_assert("p", "m").with_flag("INFO"), Severity::Warning)]
    #[case(OutputRecord::successful_report("p", "m").with_flag("error"), Severity::Error)]
    #[case(OutputRecord::successful_report("p", "m").with_flag(" Fatal "), Severity::Error)]
    #[case(OutputRecord::successful_report("p", "m").with_flag("style"), Severity::Warning)]
    #[case(OutputRecord::failed_assert("p", "m").with_flag("style"), Severity::Error)]
    fn test_classify(#[case] record: OutputRecord, #[case] expected: Severity) {
        assert_eq!(classify(&record), expected);
    }

    #[tokio::test]
    async fn test_violations_keep_validator_then_emission_order() {
        let records = vec![
            OutputRecord::successful_report("p", "first"),
            OutputRecord::failed_assert("p", "second\n\t line"),
        ];
        let (engine, _) = engine(records, &["a.yaml", "b.yaml"]);

        let report = engine.evaluate(&Document::new("<r/>")).await.unwrap();
        let messages: Vec<&str> = report.violations.iter().map(|v| v.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "first from a.yaml",
                "second line from a.yaml",
                "first from b.yaml",
                "second line from b.yaml"
            ]
        );
        assert_eq!(report.violations[0].severity, Severity::Warning);
        assert_eq!(report.violations[1].severity, Severity::Error);
        assert!(report.violations.iter().all(|v| v.attributes.contains(METADATA_ATTRIBUTE)));
        assert_eq!(report.summary.rule_sets_evaluated, 2);
        assert_eq!(report.generation, Some(1));
    }

    #[tokio::test]
    async fn test_namespace_mismatch_never_runs_validators() {
        let (engine, calls) = engine(vec![OutputRecord::failed_assert("p", "m")], &["a.yaml"]);
        engine.set_namespace(Some("urn:catalog".into()));

        let report = engine.evaluate(&Document::new(r#"<r xmlns="urn:other"/>"#)).await.unwrap();
        assert!(!report.has_violations());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let report = engine.evaluate(&Document::new(r#"<r xmlns="urn:catalog"/>"#)).await.unwrap();
        assert_eq!(report.violations.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_content_is_not_applicable() {
        let (engine, calls) = engine(vec![OutputRecord::failed_assert("p", "m")], &["a.yaml"]);
        let report = engine.evaluate(&Document::new("")).await.unwrap();

        assert!(!report.has_violations());
        assert_eq!(report.generation, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_compilation_failure_aborts_report() {
        let (engine, _) = engine(vec![OutputRecord::failed_assert("p", "m")], &["a.yaml", "missing.yaml"]);
        let err = engine.evaluate(&Document::new("<r/>")).await.unwrap_err();

        assert!(matches!(err, WardenError::Compilation { .. }));
        assert!(err.to_string().contains("missing.yaml"));
    }

    #[tokio::test]
    async fn test_execution_failure_stops_later_validators() {
        let (engine, calls) = engine(Vec::new(), &["broken.yaml", "b.yaml"]);
        let err = engine.evaluate(&Document::new("<r/>")).await.unwrap_err();

        assert!(matches!(err, WardenError::Execution { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_validator_is_execution_error() {
        let (failing, calls) = engine(Vec::new(), &["panicking.yaml", "b.yaml"]);
        let (healthy, _) = engine(vec![OutputRecord::failed_assert("p", "m")], &["b.yaml"]);

        let err = failing.evaluate(&Document::new("<r/>")).await.unwrap_err();
        assert!(matches!(err, WardenError::Execution { .. }));
        assert!(err.to_string().contains("panicking.yaml"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(healthy.evaluate(&Document::new("<r/>")).await.unwrap().violations.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_namespace_clears_filter() {
        let (engine, calls) = engine(vec![OutputRecord::failed_assert("p", "m")], &["a.yaml"]);
        engine.set_namespace(Some("  ".into()));
        assert_eq!(engine.namespace(), None);
        assert!(engine.is_applicable(&Document::new("<r/>")));

        let namespaced = Document::new(r#"<r xmlns="urn:catalog"/>"#);
        assert!(engine.is_applicable(&namespaced));
        let report = engine.evaluate(&namespaced).await.unwrap();
        assert_eq!(report.violations.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
