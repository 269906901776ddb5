//! Core domain models for validation violations and reports
//!
//! Architecture: Rich Domain Models - Violations are entities with behavior, not just data
//! - Diagnostics are sanitized into violations exactly once, at construction
//! - ValidationReport acts as an aggregate root managing the ordered violation list
//! - WardenError carries the full taxonomy callers are expected to react to

use crate::pipeline::StageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Document attribute every violation produced by this engine refers to
pub const METADATA_ATTRIBUTE: &str = "metadata";

/// Severity levels for validation violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Findings that fail validation unless warnings are suppressed
    Warning,
    /// Findings that always fail validation
    Error,
}

impl Severity {
    /// Whether this severity level always causes validation to fail
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Error)
    }

    /// Convert to string for display
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Collapse runs of tabs, spaces, carriage returns and newlines into a single
/// space and trim both ends.
pub fn sanitize(input: &str) -> String {
    input
        .split(['\t', ' ', '\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A raw message emitted by a validator run, already classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self { message: message.into(), severity }
    }
}

/// A sanitized diagnostic tagged with the document attributes it pertains to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Document attributes this violation refers to
    pub attributes: BTreeSet<String>,
    /// Sanitized, human-readable description
    pub message: String,
    /// Severity level of this violation
    pub severity: Severity,
}

impl Violation {
    /// Create a violation, sanitizing the message
    pub fn new(
        attributes: impl IntoIterator<Item = impl Into<String>>,
        message: &str,
        severity: Severity,
    ) -> Self {
        Self {
            attributes: attributes.into_iter().map(Into::into).collect(),
            message: sanitize(message),
            severity,
        }
    }

    /// Create a violation for the document content attribute
    pub fn from_diagnostic(diagnostic: &Diagnostic) -> Self {
        Self::new([METADATA_ATTRIBUTE], &diagnostic.message, diagnostic.severity)
    }
}

/// Summary statistics for a validation report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Number of compiled rule sets the document was run against
    pub rule_sets_evaluated: usize,
    /// Number of violations by severity level
    pub violations_by_severity: ViolationCounts,
    /// Total execution time in milliseconds
    pub execution_time_ms: u64,
    /// Timestamp when validation was performed
    pub validated_at: DateTime<Utc>,
}

/// Count of violations by severity level
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViolationCounts {
    pub error: usize,
    pub warning: usize,
}

impl ViolationCounts {
    /// Total number of violations across all severities
    pub fn total(&self) -> usize {
        self.error + self.warning
    }

    /// Whether there are any blocking violations
    pub fn has_blocking(&self) -> bool {
        self.error > 0
    }

    /// Add a violation to the counts
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Error => self.error += 1,
            Severity::Warning => self.warning += 1,
        }
    }
}

/// Ordered violations gathered across all validators for one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Violations in validator order, then emission order
    pub violations: Vec<Violation>,
    /// Summary statistics
    pub summary: ValidationSummary,
    /// Registry generation the report was produced from
    pub generation: Option<u64>,
}

impl ValidationReport {
    /// Create a new empty validation report
    pub fn new() -> Self {
        Self {
            violations: Vec::new(),
            summary: ValidationSummary { validated_at: Utc::now(), ..Default::default() },
            generation: None,
        }
    }

    /// Add a violation to the report
    pub fn add_violation(&mut self, violation: Violation) {
        self.summary.violations_by_severity.add(violation.severity);
        self.violations.push(violation);
    }

    /// Whether the report contains any violations
    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    /// Whether the report contains blocking violations (errors)
    pub fn has_errors(&self) -> bool {
        self.summary.violations_by_severity.has_blocking()
    }

    /// Whether the report contains warnings
    pub fn has_warnings(&self) -> bool {
        self.summary.violations_by_severity.warning > 0
    }

    /// Get violations of a specific severity
    pub fn violations_by_severity(&self, severity: Severity) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.severity == severity)
    }

    /// Messages of a specific severity, in report order
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.violations_by_severity(severity).map(|v| v.message.clone()).collect()
    }

    pub fn set_rule_sets_evaluated(&mut self, count: usize) {
        self.summary.rule_sets_evaluated = count;
    }

    pub fn set_execution_time(&mut self, duration_ms: u64) {
        self.summary.execution_time_ms = duration_ms;
    }

    pub fn set_generation(&mut self, generation: u64) {
        self.generation = Some(generation);
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Error types that can occur while compiling rule sets or validating documents
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// Configuration file could not be loaded, parsed or is inconsistent
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// File could not be read or accessed
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Rule set is missing or one of the compilation stages failed
    #[error("Compilation error in {source_path}: {source}")]
    Compilation { source_path: String, source: StageError },

    /// Compilation did not finish within the wait bound
    #[error("Timed out after {timeout:?} waiting for rule set {source_path} to compile")]
    Timeout { source_path: String, timeout: Duration },

    /// Handle was invalidated because the rule-set list was reconfigured
    #[error("Rule set {source_path} was superseded by reconfiguration (generation {generation})")]
    Superseded { source_path: String, generation: u64 },

    /// Handle was cancelled, typically because the pool shut down
    #[error("Compilation of rule set {source_path} was cancelled")]
    Cancelled { source_path: String },

    /// A compiled validator failed while running against a document
    #[error("Execution error in {source_path}: {message}")]
    Execution { source_path: String, message: String },

    /// Document failed structural validation
    #[error("Schema validation failed: {} error(s), {} warning(s)", errors.len(), warnings.len())]
    ValidationFailed { errors: Vec<String>, warnings: Vec<String> },

    /// The compilation pool no longer accepts work
    #[error("Compilation pool has been shut down")]
    PoolShutdown,
}

impl WardenError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a compilation error
    pub fn compilation(source_path: impl Into<String>, source: StageError) -> Self {
        Self::Compilation { source_path: source_path.into(), source }
    }

    /// Create an execution error
    pub fn execution(source_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution { source_path: source_path.into(), message: message.into() }
    }

    /// Whether the caller should retry against the current generation
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }
}

/// Result type for Schema Warden operations
pub type WardenResult<T> = Result<T, WardenError>;
