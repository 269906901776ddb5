//! Report generation with multiple output formats
//!
//! CDD Principle: Anti-Corruption Layer - Formatters translate domain objects to external formats
//! - ValidationReport (domain) is converted to various external representations
//! - Each formatter encapsulates the rules for its specific output format
//! - Domain logic remains pure while supporting multiple presentation needs

use crate::domain::{Severity, ValidationReport, Violation, WardenError, WardenResult};
use serde_json::Value as JsonValue;
use std::io::Write;

/// Supported output formats for validation reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable format with colors
    Human,
    /// JSON format for programmatic consumption
    Json,
    /// JUnit XML format for CI/CD integration
    Junit,
}

/// Options for customizing report output
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Whether to use colored output (for human format)
    pub use_colors: bool,
    /// Whether warnings alone count as a failed document
    pub suppress_warnings: bool,
    /// Maximum number of violations to include per document
    pub max_violations: Option<usize>,
    /// Minimum severity level to include
    pub min_severity: Option<Severity>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self { use_colors: true, suppress_warnings: false, max_violations: None, min_severity: None }
    }
}

/// The report produced for one named document
#[derive(Debug, Clone)]
pub struct DocumentReport {
    /// Label shown for the document, usually its path
    pub document: String,
    pub report: ValidationReport,
}

impl DocumentReport {
    pub fn new(document: impl Into<String>, report: ValidationReport) -> Self {
        Self { document: document.into(), report }
    }

    /// Whether the document passes under the given warning policy
    pub fn passed(&self, suppress_warnings: bool) -> bool {
        !self.report.has_errors() && (suppress_warnings || !self.report.has_warnings())
    }
}

#[derive(Clone, Copy)]
enum Tone {
    Error,
    Warning,
    Success,
    Dim,
    Bold,
}

/// Main report formatter that dispatches to specific formatters
pub struct ReportFormatter {
    options: ReportOptions,
}

impl ReportFormatter {
    /// Create a new report formatter with options
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }

    /// Format reports for several documents in the specified format
    pub fn format_reports(&self, reports: &[DocumentReport], format: OutputFormat) -> WardenResult<String> {
        match format {
            OutputFormat::Human => Ok(self.format_human(reports)),
            OutputFormat::Json => self.format_json(reports),
            OutputFormat::Junit => Ok(self.format_junit(reports)),
        }
    }

    /// Format a single document's report
    pub fn format_report(
        &self,
        document: &str,
        report: &ValidationReport,
        format: OutputFormat,
    ) -> WardenResult<String> {
        self.format_reports(&[DocumentReport::new(document, report.clone())], format)
    }

    /// Write formatted reports to a writer
    pub fn write_reports<W: Write>(
        &self,
        reports: &[DocumentReport],
        format: OutputFormat,
        mut writer: W,
    ) -> WardenResult<()> {
        let formatted = self.format_reports(reports, format)?;
        writer.write_all(formatted.as_bytes())?;
        if !formatted.ends_with('\n') {
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Filter violations based on report options
    fn filter_violations<'a>(&self, violations: &'a [Violation]) -> Vec<&'a Violation> {
        let mut filtered: Vec<&Violation> = violations
            .iter()
            .filter(|v| self.options.min_severity.map_or(true, |min| v.severity >= min))
            .collect();

        if let Some(max) = self.options.max_violations {
            filtered.truncate(max);
        }

        filtered
    }

    fn paint(&self, text: &str, tone: Tone) -> String {
        if !self.options.use_colors {
            return text.to_string();
        }
        paint(text, tone)
    }

    fn format_human(&self, reports: &[DocumentReport]) -> String {
        let mut output = String::new();
        let failing: Vec<&DocumentReport> =
            reports.iter().filter(|r| r.report.has_violations()).collect();

        if failing.is_empty() {
            output.push_str(&format!("✅ {}\n", self.paint("No schema violations found", Tone::Success)));
        } else {
            let any_errors = failing.iter().any(|r| r.report.has_errors());
            let (icon, tone) = if any_errors { ("❌", Tone::Error) } else { ("⚠️", Tone::Warning) };
            output.push_str(&format!("{} {}\n\n", icon, self.paint("Schema Violations Found", tone)));

            for entry in failing {
                output.push_str(&format!("📄 {}\n", entry.document));

                for violation in self.filter_violations(&entry.report.violations) {
                    let tone = match violation.severity {
                        Severity::Error => Tone::Error,
                        Severity::Warning => Tone::Warning,
                    };
                    let attributes: Vec<&str> = violation.attributes.iter().map(String::as_str).collect();
                    output.push_str(&format!(
                        "  {} [{}] {}\n",
                        self.paint(&attributes.join(","), Tone::Dim),
                        self.paint(violation.severity.as_str(), tone),
                        violation.message
                    ));
                }
                output.push('\n');
            }
        }

        output.push_str(&self.format_summary(reports));
        output
    }

    fn format_json(&self, reports: &[DocumentReport]) -> WardenResult<String> {
        let documents: Vec<JsonValue> = reports
            .iter()
            .map(|entry| {
                let violations: Vec<JsonValue> = self
                    .filter_violations(&entry.report.violations)
                    .into_iter()
                    .map(|v| {
                        serde_json::json!({
                            "attributes": v.attributes,
                            "severity": v.severity.as_str(),
                            "message": v.message,
                        })
                    })
                    .collect();

                serde_json::json!({
                    "document": entry.document,
                    "passed": entry.passed(self.options.suppress_warnings),
                    "generation": entry.report.generation,
                    "violations": violations,
                    "summary": {
                        "rule_sets_evaluated": entry.report.summary.rule_sets_evaluated,
                        "violations_by_severity": {
                            "error": entry.report.summary.violations_by_severity.error,
                            "warning": entry.report.summary.violations_by_severity.warning
                        },
                        "execution_time_ms": entry.report.summary.execution_time_ms,
                        "validated_at": entry.report.summary.validated_at.to_rfc3339()
                    }
                })
            })
            .collect();

        let failed = reports.iter().filter(|r| !r.passed(self.options.suppress_warnings)).count();
        let json_report = serde_json::json!({
            "documents": documents,
            "summary": {
                "total_documents": reports.len(),
                "failed_documents": failed
            }
        });

        serde_json::to_string_pretty(&json_report)
            .map_err(|e| WardenError::config(format!("JSON serialization failed: {}", e)))
    }

    fn format_junit(&self, reports: &[DocumentReport]) -> String {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

        let failures = reports.iter().filter(|r| !r.passed(self.options.suppress_warnings)).count();
        let execution_ms: u64 = reports.iter().map(|r| r.report.summary.execution_time_ms).sum();

        xml.push_str(&format!(
            "<testsuite name=\"schema-warden\" tests=\"{}\" failures=\"{}\" errors=\"0\" time=\"{:.3}\">\n",
            reports.len(),
            failures,
            execution_ms as f64 / 1000.0
        ));

        for entry in reports {
            xml.push_str(&format!(
                "  <testcase classname=\"schema-warden\" name=\"{}\">\n",
                escape_xml(&entry.document)
            ));

            let violations = self.filter_violations(&entry.report.violations);
            if !entry.passed(self.options.suppress_warnings) {
                let counts = &entry.report.summary.violations_by_severity;
                xml.push_str(&format!(
                    "    <failure message=\"{} error(s), {} warning(s)\">\n",
                    counts.error, counts.warning
                ));
                for violation in &violations {
                    xml.push_str(&format!(
                        "      [{}] {}\n",
                        violation.severity.as_str(),
                        escape_xml(&violation.message)
                    ));
                }
                xml.push_str("    </failure>\n");
            } else if !violations.is_empty() {
                xml.push_str("    <system-out>\n");
                for violation in &violations {
                    xml.push_str(&format!(
                        "      [{}] {}\n",
                        violation.severity.as_str(),
                        escape_xml(&violation.message)
                    ));
                }
                xml.push_str("    </system-out>\n");
            }

            xml.push_str("  </testcase>\n");
        }

        xml.push_str("</testsuite>\n");
        xml
    }

    fn format_summary(&self, reports: &[DocumentReport]) -> String {
        let counts = reports.iter().map(|r| &r.report.summary.violations_by_severity);
        let total: usize = counts.clone().map(|c| c.total()).sum();
        let errors: usize = counts.clone().map(|c| c.error).sum();
        let warnings: usize = counts.map(|c| c.warning).sum();
        let execution_ms: u64 = reports.iter().map(|r| r.report.summary.execution_time_ms).sum();
        let documents = format!("{} document{}", reports.len(), if reports.len() == 1 { "" } else { "s" });

        let mut summary = format!("📊 {} ", self.paint("Summary:", Tone::Bold));

        if total == 0 {
            summary.push_str(&format!(
                "{} in {} ({:.1}s)\n",
                self.paint("0 violations", Tone::Success),
                documents,
                execution_ms as f64 / 1000.0
            ));
            return summary;
        }

        let mut parts = Vec::new();
        if errors > 0 {
            let text = format!("{} error{}", errors, if errors == 1 { "" } else { "s" });
            parts.push(self.paint(&text, Tone::Error));
        }
        if warnings > 0 {
            let text = format!("{} warning{}", warnings, if warnings == 1 { "" } else { "s" });
            parts.push(self.paint(&text, Tone::Warning));
        }

        summary.push_str(&format!(
            "{} in {} ({:.1}s)\n",
            parts.join(", "),
            documents,
            execution_ms as f64 / 1000.0
        ));
        summary
    }
}

impl Default for ReportFormatter {
    fn default() -> Self {
        Self::new(ReportOptions::default())
    }
}

#[cfg(feature = "colors")]
fn paint(text: &str, tone: Tone) -> String {
    use colored::Colorize;

    match tone {
        Tone::Error => text.red().to_string(),
        Tone::Warning => text.yellow().to_string(),
        Tone::Success => text.green().to_string(),
        Tone::Dim => text.dimmed().to_string(),
        Tone::Bold => text.bold().to_string(),
    }
}

#[cfg(not(feature = "colors"))]
fn paint(text: &str, _tone: Tone) -> String {
    text.to_string()
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::METADATA_ATTRIBUTE;

    fn plain() -> ReportFormatter {
        ReportFormatter::new(ReportOptions { use_colors: false, ..Default::default() })
    }

    fn create_test_reports() -> Vec<DocumentReport> {
        let mut failing = ValidationReport::new();
        failing.add_violation(Violation::new([METADATA_ATTRIBUTE], "title <b> is empty", Severity::Error));
        failing.add_violation(Violation::new([METADATA_ATTRIBUTE], "unknown language", Severity::Warning));
        failing.set_rule_sets_evaluated(2);
        failing.set_execution_time(1200);

        let mut warning_only = ValidationReport::new();
        warning_only.add_violation(Violation::new([METADATA_ATTRIBUTE], "draft status", Severity::Warning));

        vec![
            DocumentReport::new("records/a.xml", failing),
            DocumentReport::new("records/b.xml", warning_only),
            DocumentReport::new("records/c.xml", ValidationReport::new()),
        ]
    }

    #[test]
    fn test_human_format() {
        let output = plain().format_reports(&create_test_reports(), OutputFormat::Human).unwrap();

        assert!(output.contains("Schema Violations Found"));
        assert!(output.contains("records/a.xml"));
        assert!(output.contains("metadata [error] title <b> is empty"));
        assert!(!output.contains("records/c.xml"));
        assert!(output.contains("1 error, 2 warnings in 3 documents"));
    }

    #[test]
    fn test_json_format() {
        let output = plain().format_reports(&create_test_reports(), OutputFormat::Json).unwrap();
        let json: JsonValue = serde_json::from_str(&output).unwrap();

        assert_eq!(json["documents"].as_array().unwrap().len(), 3);
        assert_eq!(json["documents"][0]["violations"][0]["severity"], "error");
        assert_eq!(json["documents"][0]["violations"][0]["attributes"][0], "metadata");
        assert_eq!(json["documents"][0]["summary"]["rule_sets_evaluated"], 2);
        assert_eq!(json["documents"][1]["passed"], false);
        assert_eq!(json["summary"]["failed_documents"], 2);
    }

    #[test]
    fn test_suppressed_warnings_pass() {
        let formatter = ReportFormatter::new(ReportOptions {
            use_colors: false,
            suppress_warnings: true,
            ..Default::default()
        });
        let output = formatter.format_reports(&create_test_reports(), OutputFormat::Json).unwrap();
        let json: JsonValue = serde_json::from_str(&output).unwrap();

        assert_eq!(json["documents"][1]["passed"], true);
        assert_eq!(json["summary"]["failed_documents"], 1);
    }

    #[test]
    fn test_junit_format() {
        let output = plain().format_reports(&create_test_reports(), OutputFormat::Junit).unwrap();

        assert!(output.contains("<?xml version=\"1.0\""));
        assert!(output.contains("tests=\"3\" failures=\"2\""));
        assert!(output.contains("<failure message=\"1 error(s), 1 warning(s)\">"));
        assert!(output.contains("title &lt;b&gt; is empty"));
    }

    #[test]
    fn test_empty_report() {
        let output = plain().format_report("doc.xml", &ValidationReport::new(), OutputFormat::Human).unwrap();
        assert!(output.contains("No schema violations found"));
        assert!(output.contains("0 violations in 1 document "));
    }

    #[test]
    fn test_severity_filtering() {
        let formatter = ReportFormatter::new(ReportOptions {
            min_severity: Some(Severity::Error),
            ..Default::default()
        });
        let output = formatter.format_reports(&create_test_reports()[..1], OutputFormat::Json).unwrap();
        let json: JsonValue = serde_json::from_str(&output).unwrap();

        let violations = json["documents"][0]["violations"].as_array().unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0]["message"], "title <b> is empty");
    }

    #[test]
    fn test_max_violations_truncates() {
        let formatter = ReportFormatter::new(ReportOptions {
            use_colors: false,
            max_violations: Some(1),
            ..Default::default()
        });
        let output = formatter.format_reports(&create_test_reports()[..1], OutputFormat::Human).unwrap();

        assert!(output.contains("title <b> is empty"));
        assert!(!output.contains("unknown language"));
        assert!(output.contains("1 error, 1 warning in 1 document "));
    }

    #[test]
    fn test_write_reports_ends_with_newline() {
        let mut buffer = Vec::new();
        plain()
            .write_reports(&create_test_reports(), OutputFormat::Json, &mut buffer)
            .unwrap();

        let written = String::from_utf8(buffer).unwrap();
        assert!(written.ends_with("}\n"));
        let json: JsonValue = serde_json::from_str(written.trim_end()).unwrap();
        assert_eq!(json["summary"]["total_documents"], 3);
    }
}
