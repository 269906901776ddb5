//! Configuration loading and management for Schema Warden
//!
//! Architecture: Anti-Corruption Layer - Configuration translates external YAML into engine settings
//! - Raw YAML structures are converted to resolved rule-set sources and pool settings
//! - Defaults live here, next to the keys they belong to
//! - A fingerprint identifies the effective configuration in logs

use crate::domain::{WardenError, WardenResult};
use crate::engine::{EngineOptions, DEFAULT_COMPILE_TIMEOUT};
use crate::pipeline::RuleSetSource;
use crate::pool::{PoolConfig, DEFAULT_POOL_SIZE};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lowest and highest accepted priority
pub const PRIORITY_RANGE: (i64, i64) = (1, 100);

/// Main configuration structure for Schema Warden
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WardenConfig {
    /// Configuration format version
    pub version: String,
    /// Identifier of this validator instance
    pub id: Option<String>,
    /// Rule-set locations, absolute or relative to `base_dir`
    pub rule_sets: Vec<String>,
    /// Directory relative rule-set locations resolve against
    pub base_dir: PathBuf,
    /// Only validate documents whose root namespace equals this
    pub namespace: Option<String>,
    /// Whether warnings alone still let a document pass
    pub suppress_warnings: bool,
    /// Number of compilation workers
    pub pool_size: usize,
    /// Upper bound on waiting for one compilation, in seconds
    pub compile_timeout_secs: u64,
    /// Ordering hint for hosts running several validators
    pub priority: i64,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            id: None,
            rule_sets: Vec::new(),
            base_dir: PathBuf::from("schematron"),
            namespace: None,
            suppress_warnings: false,
            pool_size: DEFAULT_POOL_SIZE,
            compile_timeout_secs: DEFAULT_COMPILE_TIMEOUT.as_secs(),
            priority: 10,
        }
    }
}

impl WardenConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> WardenResult<Self> {
        let contents = fs::read_to_string(&path).map_err(|e| {
            WardenError::config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            WardenError::config(format!(
                "Failed to parse config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from string content
    pub fn load_from_str(content: &str) -> WardenResult<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| WardenError::config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> WardenResult<()> {
        if !["1.0"].contains(&self.version.as_str()) {
            return Err(WardenError::config(format!(
                "Unsupported configuration version: {}. Supported versions: 1.0",
                self.version
            )));
        }

        if self.pool_size == 0 {
            return Err(WardenError::config("pool_size must be at least 1"));
        }

        if self.compile_timeout_secs == 0 {
            return Err(WardenError::config("compile_timeout_secs must be at least 1"));
        }

        if let Some(blank) = self.rule_sets.iter().find(|location| location.trim().is_empty()) {
            return Err(WardenError::config(format!("Blank rule set location: '{}'", blank)));
        }

        Ok(())
    }

    /// Rule-set sources in configured order
    pub fn resolve_rule_sets(&self) -> Vec<RuleSetSource> {
        self.rule_sets
            .iter()
            .map(|location| RuleSetSource::resolve(location.trim(), &self.base_dir))
            .collect()
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::with_size(self.pool_size)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions { namespace: self.namespace.clone(), compile_timeout: self.compile_timeout() }
    }

    /// Priority clamped into the accepted range
    pub fn effective_priority(&self) -> i64 {
        self.priority.clamp(PRIORITY_RANGE.0, PRIORITY_RANGE.1)
    }

    /// Convert to JSON for serialization
    pub fn to_json(&self) -> WardenResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| WardenError::config(format!("Failed to serialize config: {e}")))
    }

    /// SHA-256 over the settings that change validation results
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update(self.version.as_bytes());
        hasher.update(self.base_dir.to_string_lossy().as_bytes());
        for location in &self.rule_sets {
            hasher.update([0u8]);
            hasher.update(location.as_bytes());
        }
        hasher.update([0xffu8]);
        hasher.update(self.namespace.as_deref().unwrap_or_default().as_bytes());
        hasher.update([u8::from(self.suppress_warnings)]);

        format!("{:x}", hasher.finalize())
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: WardenConfig,
}

impl ConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self { config: WardenConfig::default() }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = Some(id.into());
        self
    }

    /// Add a rule-set location
    pub fn add_rule_set(mut self, location: impl Into<String>) -> Self {
        self.config.rule_sets.push(location.into());
        self
    }

    pub fn base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.config.base_dir = base_dir.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = Some(namespace.into());
        self
    }

    pub fn suppress_warnings(mut self, suppress: bool) -> Self {
        self.config.suppress_warnings = suppress;
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    pub fn compile_timeout_secs(mut self, secs: u64) -> Self {
        self.config.compile_timeout_secs = secs;
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.config.priority = priority;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> WardenResult<WardenConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = WardenConfig::default();
        assert_eq!(config.pool_size, 16);
        assert_eq!(config.compile_timeout(), Duration::from_secs(600));
        assert_eq!(config.base_dir, PathBuf::from("schematron"));
        assert!(!config.suppress_warnings);
        assert_eq!(config.effective_priority(), 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_yaml() {
        let config = WardenConfig::load_from_str(
            "id: catalog\nrule_sets:\n  - basics.yaml\n  - /opt/rules/extra.yaml\nbase_dir: /etc/rules\nsuppress_warnings: true\n",
        )
        .unwrap();

        assert_eq!(config.id.as_deref(), Some("catalog"));
        assert!(config.suppress_warnings);
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);

        let sources = config.resolve_rule_sets();
        assert_eq!(sources[0].path(), Path::new("/etc/rules/basics.yaml"));
        assert_eq!(sources[1].path(), Path::new("/opt/rules/extra.yaml"));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("warden.yaml");
        fs::write(&path, "namespace: urn:catalog\npool_size: 4\n").unwrap();

        let config = WardenConfig::load_from_file(&path).unwrap();
        assert_eq!(config.namespace.as_deref(), Some("urn:catalog"));
        assert_eq!(config.pool_config().size, 4);

        let missing = WardenConfig::load_from_file(temp_dir.path().join("absent.yaml"));
        assert!(matches!(missing, Err(WardenError::Configuration { .. })));
    }

    #[rstest]
    #[case("version: '2.0'\n", "Unsupported configuration version")]
    #[case("pool_size: 0\n", "pool_size")]
    #[case("compile_timeout_secs: 0\n", "compile_timeout_secs")]
    #[case("rule_sets: ['  ']\n", "Blank rule set")]
    #[case("unknown_key: 1\n", "Failed to parse")]
    fn test_invalid_config(#[case] yaml: &str, #[case] expected: &str) {
        let err = WardenConfig::load_from_str(yaml).unwrap_err();
        assert!(err.to_string().contains(expected), "{}", err);
    }

    #[rstest]
    #[case(-5, 1)]
    #[case(0, 1)]
    #[case(42, 42)]
    #[case(250, 100)]
    fn test_priority_clamped(#[case] priority: i64, #[case] expected: i64) {
        let config = ConfigBuilder::new().priority(priority).build().unwrap();
        assert_eq!(config.effective_priority(), expected);
    }

    #[test]
    fn test_fingerprint_tracks_rule_sets() {
        let base = ConfigBuilder::new().add_rule_set("a.yaml").build().unwrap();
        let same = ConfigBuilder::new().add_rule_set("a.yaml").priority(90).build().unwrap();
        let other = ConfigBuilder::new().add_rule_set("b.yaml").build().unwrap();

        assert_eq!(base.fingerprint(), same.fingerprint());
        assert_ne!(base.fingerprint(), other.fingerprint());
        assert_eq!(base.fingerprint().len(), 64);
    }

    #[test]
    fn test_json_round_trip() {
        let config = ConfigBuilder::new().id("v").namespace("urn:x").build().unwrap();
        let parsed: WardenConfig = serde_json::from_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
