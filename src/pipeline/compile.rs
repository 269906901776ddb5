//! Stage 3: executable compilation
//!
//! Compiles the expanded schema's regexes into an immutable `CompiledRuleSet`.
//! The rule set keeps its origin so vocabulary files referenced by `values`
//! resolve relative to the rule-set file when the validator runs.

use super::abstract_expand::ExpandedSchema;
use super::schema::CheckDef;
use super::{Stage, StageDiagnostics, StageError};
use crate::domain::{Document, WardenError, WardenResult};
use crate::validator::{ExecutableValidator, OutputRecord, RecordKind};
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// The executable form of one rule set
#[derive(Debug)]
pub struct CompiledRuleSet {
    id: String,
    title: Option<String>,
    origin: PathBuf,
    patterns: Vec<CompiledPattern>,
}

#[derive(Debug)]
struct CompiledPattern {
    id: String,
    rules: Vec<CompiledRule>,
}

#[derive(Debug)]
struct CompiledRule {
    context: Option<Regex>,
    checks: Vec<CompiledCheck>,
}

#[derive(Debug)]
struct CompiledCheck {
    kind: RecordKind,
    test: Option<Regex>,
    values: Option<String>,
    message: String,
    flag: Option<String>,
}

pub fn compile(
    schema: ExpandedSchema,
    origin: &Path,
    diagnostics: &mut StageDiagnostics,
) -> Result<CompiledRuleSet, StageError> {
    let mut patterns = Vec::with_capacity(schema.patterns.len());

    for pattern in schema.patterns {
        let mut rules = Vec::with_capacity(pattern.rules.len());

        for (index, rule) in pattern.rules.iter().enumerate() {
            let context = rule
                .context
                .as_deref()
                .map(|source| build_regex(source, &pattern.id, "context"))
                .transpose()?;

            if rule.asserts.is_empty() && rule.reports.is_empty() {
                diagnostics.warn(
                    Stage::Compilation,
                    format!("rule {} of pattern '{}' has no asserts or reports", index + 1, pattern.id),
                );
            }

            let asserts = rule.asserts.iter().map(|c| (RecordKind::FailedAssert, c));
            let reports = rule.reports.iter().map(|c| (RecordKind::SuccessfulReport, c));
            let checks = asserts
                .chain(reports)
                .map(|(kind, check)| compile_check(kind, check, &pattern.id))
                .collect::<Result<Vec<_>, _>>()?;

            rules.push(CompiledRule { context, checks });
        }

        patterns.push(CompiledPattern { id: pattern.id, rules });
    }

    if patterns.iter().all(|p| p.rules.is_empty()) {
        diagnostics.warn(Stage::Compilation, format!("rule set '{}' defines no rules", schema.id));
    }

    Ok(CompiledRuleSet { id: schema.id, title: schema.title, origin: origin.to_path_buf(), patterns })
}

fn compile_check(kind: RecordKind, check: &CheckDef, pattern: &str) -> Result<CompiledCheck, StageError> {
    if check.test.is_none() && check.values.is_none() {
        return Err(StageError::failed(
            Stage::Compilation,
            format!("check '{}' in pattern '{}' has neither test nor values", check.message, pattern),
        ));
    }

    Ok(CompiledCheck {
        kind,
        test: check.test.as_deref().map(|source| build_regex(source, pattern, "test")).transpose()?,
        values: check.values.clone(),
        message: check.message.clone(),
        flag: check.flag.clone(),
    })
}

fn build_regex(source: &str, pattern: &str, what: &str) -> Result<Regex, StageError> {
    Regex::new(source).map_err(|e| {
        StageError::failed(
            Stage::Compilation,
            format!("invalid {} regex '{}' in pattern '{}': {}", what, source, pattern, e),
        )
    })
}

impl CompiledRuleSet {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    fn resolve(&self, reference: &str) -> PathBuf {
        let base = self.origin.parent().unwrap_or_else(|| Path::new(""));
        base.join(reference)
    }

    fn load_vocabulary(&self, reference: &str) -> WardenResult<HashSet<String>> {
        let path = self.resolve(reference);
        let content = fs::read_to_string(&path).map_err(|e| {
            WardenError::execution(
                self.origin.display().to_string(),
                format!("failed to read vocabulary {}: {}", path.display(), e),
            )
        })?;

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect())
    }
}

/// The value a context match contributes to checks
fn node_value<'h>(caps: &Captures<'h>) -> &'h str {
    caps.name("value")
        .or_else(|| caps.get(1))
        .or_else(|| caps.get(0))
        .map_or("", |m| m.as_str())
}

fn render(template: &str, value: &str, pattern: &str) -> String {
    template.replace("{value}", value).replace("{pattern}", pattern)
}

impl ExecutableValidator for CompiledRuleSet {
    fn origin(&self) -> &Path {
        &self.origin
    }

    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    fn execute(&self, document: &Document) -> WardenResult<Vec<OutputRecord>> {
        let content = document.content();
        let mut vocabularies: HashMap<&str, HashSet<String>> = HashMap::new();
        let mut records = Vec::new();

        for pattern in &self.patterns {
            for rule in &pattern.rules {
                let nodes: Vec<&str> = match &rule.context {
                    Some(context) => context.captures_iter(content).map(|c| node_value(&c)).collect(),
                    None => vec![content],
                };

                for node in nodes {
                    for check in &rule.checks {
                        let mut holds = check.test.as_ref().map_or(true, |re| re.is_match(node));

                        if holds {
                            if let Some(reference) = check.values.as_deref() {
                                if !vocabularies.contains_key(reference) {
                                    let loaded = self.load_vocabulary(reference)?;
                                    vocabularies.insert(reference, loaded);
                                }
                                holds = vocabularies
                                    .get(reference)
                                    .is_some_and(|values| values.contains(node.trim()));
                            }
                        }

                        let fires = match check.kind {
                            RecordKind::FailedAssert => !holds,
                            RecordKind::SuccessfulReport => holds,
                        };
                        if fires {
                            records.push(OutputRecord {
                                kind: check.kind,
                                pattern: pattern.id.clone(),
                                text: render(&check.message, node, &pattern.id),
                                flag: check.flag.clone(),
                            });
                        }
                    }
                }
            }
        }

        Ok(records)
    }
}
