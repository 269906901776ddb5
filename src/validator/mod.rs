//! Executable validators and their structured output
//!
//! Architecture: Ports and Adapters - The engine depends only on `ExecutableValidator`
//! - A validator, given a document, yields assert/report records with a flavor tag
//! - The rule-set technology behind a validator is fully substitutable
//! - `CompiledValidator` is the shared, immutable handle the engine passes around

use crate::domain::{Document, WardenResult};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Which kind of check produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// An assert whose condition did not hold
    FailedAssert,
    /// A report whose condition held
    SuccessfulReport,
}

/// One entry of a validator's structured output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    pub kind: RecordKind,
    /// Pattern that emitted the record
    pub pattern: String,
    /// Rendered message text, not yet sanitized
    pub text: String,
    /// Flavor tag the rule declared, if any
    pub flag: Option<String>,
}

impl OutputRecord {
    pub fn failed_assert(pattern: impl Into<String>, text: impl Into<String>) -> Self {
        Self { kind: RecordKind::FailedAssert, pattern: pattern.into(), text: text.into(), flag: None }
    }

    pub fn successful_report(pattern: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::SuccessfulReport,
            pattern: pattern.into(),
            text: text.into(),
            flag: None,
        }
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flag = Some(flag.into());
        self
    }
}

/// Something that can be run against a document
pub trait ExecutableValidator: Send + Sync + fmt::Debug {
    /// File the validator was compiled from; relative references resolve against it
    fn origin(&self) -> &Path;

    /// Human-readable title declared by the rule set
    fn title(&self) -> Option<&str> {
        None
    }

    /// Run against one document, returning records in emission order
    fn execute(&self, document: &Document) -> WardenResult<Vec<OutputRecord>>;
}

/// Immutable, shareable compiled validator
#[derive(Clone)]
pub struct CompiledValidator {
    inner: Arc<dyn ExecutableValidator>,
}

impl CompiledValidator {
    pub fn new(validator: impl ExecutableValidator + 'static) -> Self {
        Self { inner: Arc::new(validator) }
    }

    pub fn origin(&self) -> &Path {
        self.inner.origin()
    }

    pub fn title(&self) -> Option<&str> {
        self.inner.title()
    }

    pub fn execute(&self, document: &Document) -> WardenResult<Vec<OutputRecord>> {
        self.inner.execute(document)
    }
}

impl fmt::Debug for CompiledValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledValidator").field("origin", &self.origin()).finish()
    }
}
