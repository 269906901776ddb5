//! Serialized rule-set model
//!
//! Architecture: Anti-Corruption Layer - Raw YAML rule sets are parsed into these
//! structures and never leave the pipeline; later stages produce their own types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A rule-set file or fragment as written on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDocument {
    /// Rule-set identifier; the file stem is used when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Fragment files, relative to the file that references them
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub abstract_patterns: Vec<AbstractPattern>,
    #[serde(default)]
    pub patterns: Vec<PatternDef>,
}

impl SchemaDocument {
    /// Whether the document contributes nothing once included
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.abstract_patterns.is_empty() && self.patterns.is_empty()
    }
}

/// A parameterized pattern instantiated through `is_a`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AbstractPattern {
    pub id: String,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

/// A concrete pattern, or an instance of an abstract one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternDef {
    pub id: String,
    /// Abstract pattern this pattern instantiates
    #[serde(default)]
    pub is_a: Option<String>,
    /// Values substituted for `$name` references in the abstract pattern
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

/// Checks applied to every node selected by `context`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDef {
    /// Regex selecting nodes; the whole document when absent
    #[serde(default)]
    pub context: Option<String>,
    /// Fire when the condition does not hold
    #[serde(default)]
    pub asserts: Vec<CheckDef>,
    /// Fire when the condition holds
    #[serde(default)]
    pub reports: Vec<CheckDef>,
}

/// One assert or report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckDef {
    /// Regex matched against the node value
    #[serde(default)]
    pub test: Option<String>,
    /// Vocabulary file the trimmed node value must appear in
    #[serde(default)]
    pub values: Option<String>,
    pub message: String,
    /// Flavor tag deciding severity
    #[serde(default)]
    pub flag: Option<String>,
}

impl RuleDef {
    /// Apply `f` to every string the rule carries that may hold parameters
    pub fn map_strings(&self, mut f: impl FnMut(&str) -> String) -> RuleDef {
        let context = self.context.as_deref().map(&mut f);
        let asserts = self.asserts.iter().map(|check| check.map_strings(&mut f)).collect();
        let reports = self.reports.iter().map(|check| check.map_strings(&mut f)).collect();
        RuleDef { context, asserts, reports }
    }

    /// Every parameterizable string in the rule
    pub fn strings(&self) -> impl Iterator<Item = &str> {
        self.context.as_deref().into_iter().chain(
            self.asserts.iter().chain(self.reports.iter()).flat_map(|check| {
                check
                    .test
                    .as_deref()
                    .into_iter()
                    .chain(check.values.as_deref())
                    .chain(std::iter::once(check.message.as_str()))
            }),
        )
    }
}

impl CheckDef {
    fn map_strings<F: FnMut(&str) -> String>(&self, f: &mut F) -> CheckDef {
        CheckDef {
            test: self.test.as_deref().map(&mut *f),
            values: self.values.as_deref().map(&mut *f),
            message: f(&self.message),
            flag: self.flag.clone(),
        }
    }
}
