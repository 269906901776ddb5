//! Stage 1: inclusion expansion
//!
//! Resolves `include` references recursively, relative to the file that
//! declares them, and merges every fragment into one self-contained schema.
//! Fragment content is placed ahead of the including file's own patterns.

use super::schema::{AbstractPattern, PatternDef, SchemaDocument};
use super::{Stage, StageDiagnostics, StageError};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// A schema with every fragment reference resolved
#[derive(Debug, Clone)]
pub struct IncludedSchema {
    pub id: String,
    pub title: Option<String>,
    pub abstract_patterns: Vec<AbstractPattern>,
    pub patterns: Vec<PatternDef>,
}

/// Load `root` and inline all of its fragments
pub fn expand(root: &Path, diagnostics: &mut StageDiagnostics) -> Result<IncludedSchema, StageError> {
    let document = load(root)?;
    let id = document.id.clone().unwrap_or_else(|| {
        root.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default()
    });

    let mut schema = IncludedSchema {
        id,
        title: document.title.clone(),
        abstract_patterns: Vec::new(),
        patterns: Vec::new(),
    };

    let mut stack = Vec::new();
    inline(root, document, &mut stack, &mut schema, diagnostics)?;

    let mut seen = HashSet::new();
    for pattern in &schema.patterns {
        if !seen.insert(pattern.id.as_str()) {
            diagnostics.warn(
                Stage::Inclusion,
                format!("pattern id '{}' is defined more than once", pattern.id),
            );
        }
    }

    Ok(schema)
}

fn inline(
    path: &Path,
    document: SchemaDocument,
    stack: &mut Vec<PathBuf>,
    schema: &mut IncludedSchema,
    diagnostics: &mut StageDiagnostics,
) -> Result<(), StageError> {
    let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if stack.contains(&key) {
        return Err(StageError::failed(
            Stage::Inclusion,
            format!("include cycle through {}", path.display()),
        ));
    }
    stack.push(key);

    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    for reference in &document.include {
        let fragment_path = base.join(reference);
        if !fragment_path.exists() {
            return Err(StageError::failed(
                Stage::Inclusion,
                format!(
                    "could not locate fragment '{}' referenced from {}",
                    reference,
                    path.display()
                ),
            ));
        }

        let fragment = load(&fragment_path)?;
        if fragment.is_empty() {
            diagnostics.warn(
                Stage::Inclusion,
                format!("fragment {} contributes no patterns", fragment_path.display()),
            );
        }
        inline(&fragment_path, fragment, stack, schema, diagnostics)?;
    }

    schema.abstract_patterns.extend(document.abstract_patterns);
    schema.patterns.extend(document.patterns);

    stack.pop();
    Ok(())
}

fn load(path: &Path) -> Result<SchemaDocument, StageError> {
    let content = fs::read_to_string(path).map_err(|e| {
        StageError::failed(Stage::Inclusion, format!("failed to read {}: {}", path.display(), e))
    })?;

    if content.trim().is_empty() {
        return Ok(SchemaDocument::default());
    }

    serde_yaml::from_str(&content).map_err(|e| {
        StageError::failed(Stage::Inclusion, format!("failed to parse {}: {}", path.display(), e))
    })
}
