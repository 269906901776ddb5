//! Stage 2: abstract-pattern expansion
//!
//! Every pattern declaring `is_a` is replaced by a copy of the named abstract
//! pattern's rules with `$name` references substituted from `params`.
//! A backslash-escaped `\$` is left for the regex engine and `$$` stands for a
//! literal `$`.

use super::include::IncludedSchema;
use super::schema::{AbstractPattern, PatternDef, RuleDef};
use super::{Stage, StageDiagnostics, StageError};
use regex::{Captures, Regex};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;

/// A schema containing only concrete patterns
#[derive(Debug, Clone)]
pub struct ExpandedSchema {
    pub id: String,
    pub title: Option<String>,
    pub patterns: Vec<ConcretePattern>,
}

#[derive(Debug, Clone)]
pub struct ConcretePattern {
    pub id: String,
    pub rules: Vec<RuleDef>,
}

fn parameter_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\\.|\$\$|\$([A-Za-z_][A-Za-z0-9_\-]*)")
            .expect("static parameter pattern is valid")
    })
}

pub fn expand(
    schema: IncludedSchema,
    diagnostics: &mut StageDiagnostics,
) -> Result<ExpandedSchema, StageError> {
    let mut abstracts: HashMap<&str, &AbstractPattern> = HashMap::new();
    for pattern in &schema.abstract_patterns {
        if abstracts.insert(pattern.id.as_str(), pattern).is_some() {
            return Err(StageError::failed(
                Stage::AbstractExpansion,
                format!("abstract pattern '{}' is defined more than once", pattern.id),
            ));
        }
    }

    let mut instantiated = HashSet::new();
    let mut patterns = Vec::with_capacity(schema.patterns.len());

    for pattern in &schema.patterns {
        match pattern.is_a.as_deref() {
            None => {
                if !pattern.params.is_empty() {
                    diagnostics.warn(
                        Stage::AbstractExpansion,
                        format!(
                            "pattern '{}' has params but does not instantiate an abstract pattern",
                            pattern.id
                        ),
                    );
                }
                patterns.push(ConcretePattern { id: pattern.id.clone(), rules: pattern.rules.clone() });
            }
            Some(name) => {
                let template = abstracts.get(name).ok_or_else(|| {
                    StageError::failed(
                        Stage::AbstractExpansion,
                        format!("pattern '{}' refers to unknown abstract pattern '{}'", pattern.id, name),
                    )
                })?;
                instantiated.insert(name);
                patterns.push(instantiate(pattern, template, diagnostics)?);
            }
        }
    }

    for pattern in &schema.abstract_patterns {
        if !instantiated.contains(pattern.id.as_str()) {
            diagnostics.warn(
                Stage::AbstractExpansion,
                format!("abstract pattern '{}' is never instantiated", pattern.id),
            );
        }
    }

    Ok(ExpandedSchema { id: schema.id, title: schema.title, patterns })
}

fn instantiate(
    pattern: &PatternDef,
    template: &AbstractPattern,
    diagnostics: &mut StageDiagnostics,
) -> Result<ConcretePattern, StageError> {
    if !pattern.rules.is_empty() {
        return Err(StageError::failed(
            Stage::AbstractExpansion,
            format!("pattern '{}' declares both is_a and its own rules", pattern.id),
        ));
    }

    let referenced: BTreeSet<&str> = template
        .rules
        .iter()
        .flat_map(|rule| rule.strings())
        .flat_map(|text| parameter_reference().captures_iter(text))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();

    if let Some(missing) = referenced.iter().find(|name| !pattern.params.contains_key(**name)) {
        return Err(StageError::failed(
            Stage::AbstractExpansion,
            format!(
                "pattern '{}' does not supply parameter '{}' required by '{}'",
                pattern.id, missing, template.id
            ),
        ));
    }

    for name in pattern.params.keys() {
        if !referenced.contains(name.as_str()) {
            diagnostics.warn(
                Stage::AbstractExpansion,
                format!(
                    "parameter '{}' of pattern '{}' is not used by '{}'",
                    name, pattern.id, template.id
                ),
            );
        }
    }

    let substitute = |text: &str| {
        parameter_reference()
            .replace_all(text, |caps: &Captures| {
                match caps.get(1) {
                    Some(name) => pattern
                        .params
                        .get(name.as_str())
                        .cloned()
                        .unwrap_or_else(|| caps[0].to_string()),
                    None if &caps[0] == "$$" => "$".to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    };

    Ok(ConcretePattern {
        id: pattern.id.clone(),
        rules: template.rules.iter().map(|rule| rule.map_strings(substitute)).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::schema::CheckDef;
    use std::collections::BTreeMap;

    fn required_element() -> AbstractPattern {
        AbstractPattern {
            id: "required".into(),
            rules: vec![RuleDef {
                context: Some("<$element>(.*?)</$element>".into()),
                asserts: vec![CheckDef {
                    test: Some(r"\S".into()),
                    message: "$element must not be empty".into(),
                    ..Default::default()
                }],
                reports: Vec::new(),
            }],
        }
    }

    fn instance(id: &str, is_a: &str, params: &[(&str, &str)]) -> PatternDef {
        PatternDef {
            id: id.into(),
            is_a: Some(is_a.into()),
            params: params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            rules: Vec::new(),
        }
    }

    fn schema(abstracts: Vec<AbstractPattern>, patterns: Vec<PatternDef>) -> IncludedSchema {
        IncludedSchema { id: "s".into(), title: None, abstract_patterns: abstracts, patterns }
    }

    #[test]
    fn test_parameters_substituted() {
        let input = schema(
            vec![required_element()],
            vec![instance("title", "required", &[("element", "title")])],
        );

        let mut diagnostics = StageDiagnostics::new();
        let expanded = expand(input, &mut diagnostics).unwrap();

        let rule = &expanded.patterns[0].rules[0];
        assert_eq!(rule.context.as_deref(), Some("<title>(.*?)</title>"));
        assert_eq!(rule.asserts[0].message, "title must not be empty");
        assert!(diagnostics.warnings().is_empty());
    }

    #[test]
    fn test_longer_parameter_names_not_clobbered() {
        let template = AbstractPattern {
            id: "pair".into(),
            rules: vec![RuleDef {
                context: Some("$el/$element".into()),
                ..Default::default()
            }],
        };
        let input = schema(
            vec![template],
            vec![instance("p", "pair", &[("el", "short"), ("element", "long")])],
        );

        let expanded = expand(input, &mut StageDiagnostics::new()).unwrap();
        assert_eq!(expanded.patterns[0].rules[0].context.as_deref(), Some("short/long"));
    }

    #[test]
    fn test_escaped_and_doubled_dollar_are_literal() {
        let template = AbstractPattern {
            id: "price".into(),
            rules: vec![RuleDef {
                context: Some("<$element>(.*?)</$element>".into()),
                asserts: vec![CheckDef {
                    test: Some(r"^\$amount\d+$".into()),
                    message: "$element must look like $$amount<n>".into(),
                    ..Default::default()
                }],
                reports: Vec::new(),
            }],
        };
        let input = schema(vec![template], vec![instance("p", "price", &[("element", "cost")])]);

        let mut diagnostics = StageDiagnostics::new();
        let expanded = expand(input, &mut diagnostics).unwrap();

        let check = &expanded.patterns[0].rules[0].asserts[0];
        assert_eq!(check.test.as_deref(), Some(r"^\$amount\d+$"));
        assert_eq!(check.message, "cost must look like $amount<n>");
        assert!(diagnostics.warnings().is_empty());
    }

    #[test]
    fn test_unknown_abstract_pattern() {
        let input = schema(vec![], vec![instance("p", "nope", &[])]);
        let err = expand(input, &mut StageDiagnostics::new()).unwrap_err();
        assert!(err.to_string().contains("unknown abstract pattern 'nope'"));
    }

    #[test]
    fn test_missing_parameter() {
        let input = schema(vec![required_element()], vec![instance("p", "required", &[])]);
        let err = expand(input, &mut StageDiagnostics::new()).unwrap_err();
        assert!(err.to_string().contains("parameter 'element'"));
    }

    #[test]
    fn test_unused_parameter_and_abstract_warn() {
        let unused = AbstractPattern { id: "unused".into(), rules: Vec::new() };
        let input = schema(
            vec![required_element(), unused],
            vec![instance("p", "required", &[("element", "x"), ("extra", "y")])],
        );

        let mut diagnostics = StageDiagnostics::new();
        expand(input, &mut diagnostics).unwrap();

        let messages: Vec<&str> = diagnostics.warnings().iter().map(|w| w.message.as_str()).collect();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().any(|m| m.contains("'extra'")));
        assert!(messages.iter().any(|m| m.contains("'unused' is never instantiated")));
    }

    #[test]
    fn test_is_a_with_rules_rejected() {
        let mut pattern = instance("p", "required", &[("element", "x")]);
        pattern.rules.push(RuleDef::default());
        let input = schema(vec![required_element()], vec![pattern]);

        assert!(expand(input, &mut StageDiagnostics::new()).is_err());
    }

    #[test]
    fn test_concrete_patterns_pass_through() {
        let concrete = PatternDef {
            id: "c".into(),
            is_a: None,
            params: BTreeMap::new(),
            rules: vec![RuleDef { context: Some("end$".into()), ..Default::default() }],
        };
        let expanded = expand(schema(vec![], vec![concrete]), &mut StageDiagnostics::new()).unwrap();

        assert_eq!(expanded.patterns[0].rules[0].context.as_deref(), Some("end$"));
    }
}
