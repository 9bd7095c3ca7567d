//! Configuration loading for prodmap.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.prodmap/config.toml`)
//! 3. User config (`~/.prodmap/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. Learning and translation run with the
//! defaults below when no config exists.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ProdmapError, Result};

/// Main configuration struct for prodmap.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Key resolution tuning.
    pub learning: LearningConfig,
    /// Translation placeholders and null handling.
    pub translation: TranslationConfig,
    /// External suggestion gateway.
    pub gateway: GatewayConfig,
    /// Mapping document storage.
    pub storage: StorageConfig,
}

/// Key resolution tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LearningConfig {
    /// A candidate rule is accepted only if its score is strictly above this.
    pub acceptance_threshold: f64,
    /// Output keys present in fewer than this fraction of a category's pairs
    /// are reported as low coverage.
    pub min_key_coverage: f64,
    /// A source key must be present in at least this fraction of the pairs
    /// carrying the output key to be considered as a candidate.
    pub min_source_support: f64,
    /// Absolute tolerance for `scale10` verification.
    pub scale_tolerance: f64,
    /// Optional upper bound on distinct source values per evaluated pair for
    /// a `lookup` candidate. The default `1.0` accepts any consistent table.
    pub max_lookup_cardinality: f64,
    /// Learn categories and output keys on the rayon thread pool.
    pub parallel: bool,
}

/// Default acceptance threshold for candidate rules.
pub const DEFAULT_ACCEPTANCE_THRESHOLD: f64 = 0.60;

impl LearningConfig {
    /// Check if a fraction value is valid (finite and within [0.0, 1.0]).
    pub fn is_valid_fraction(value: f64) -> bool {
        value.is_finite() && (0.0..=1.0).contains(&value)
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: DEFAULT_ACCEPTANCE_THRESHOLD,
            min_key_coverage: 0.5,
            min_source_support: 0.5,
            scale_tolerance: 1e-6,
            max_lookup_cardinality: 1.0,
            parallel: true,
        }
    }
}

/// Translation placeholders and null handling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslationConfig {
    /// Emitted for null or unknown values. Distinct from the empty string.
    pub null_placeholder: String,
    /// Emitted for values awaiting manual input.
    pub manual_placeholder: String,
    /// Input values treated as absent.
    pub null_tokens: Vec<String>,
    /// Ask the gateway about unresolved keys while translating and persist
    /// the answers.
    pub suggest_on_translate: bool,
    /// Ask the gateway to propose a whole mapping for a record whose category
    /// has no training data. The proposal is stored for review.
    pub propose_unknown_categories: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            null_placeholder: "-".to_string(),
            manual_placeholder: "?".to_string(),
            null_tokens: vec![
                String::new(),
                "<NULL>".to_string(),
                "<NONE>".to_string(),
                "None".to_string(),
            ],
            suggest_on_translate: false,
            propose_unknown_categories: true,
        }
    }
}

/// Valid values for the gateway kind field.
pub const VALID_GATEWAY_KINDS: &[&str] = &["disabled", "command", "openai"];

/// External suggestion gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// One of [`VALID_GATEWAY_KINDS`].
    pub kind: String,
    /// Program and arguments for the `command` gateway.
    pub command: Vec<String>,
    /// Base URL for the `openai` gateway.
    pub base_url: String,
    /// Model name for the `openai` gateway.
    pub model: String,
    /// Per-call timeout. `0` disables the timeout.
    pub timeout_secs: u64,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Initial backoff between attempts, doubled on every retry.
    pub backoff_ms: u64,
}

impl GatewayConfig {
    /// Check if a gateway kind is valid.
    pub fn is_valid_kind(value: &str) -> bool {
        VALID_GATEWAY_KINDS.contains(&value)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: "disabled".to_string(),
            command: Vec::new(),
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            backoff_ms: 500,
        }
    }
}

/// Mapping document storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one mapping document per category.
    ///
    /// Defaults to `<prodmap_home>/mappings` when unset.
    pub mappings_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration with full precedence chain.
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Load user config from `~/.prodmap/config.toml`.
    fn load_user_config() -> Option<Config> {
        let home = prodmap_home()?;
        Self::load_from_file(&home.join("config.toml")).ok()
    }

    /// Load project config from `.prodmap/config.toml` in the given directory.
    fn load_project_config(cwd: &Path) -> Option<Config> {
        let config_path = cwd.join(".prodmap").join("config.toml");
        if !config_path.exists() {
            return None;
        }
        match Self::load_from_file(&config_path) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("ignoring project config: {}", e);
                None
            }
        }
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| ProdmapError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| ProdmapError::config(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("PRODMAP_THRESHOLD") {
            match val.parse::<f64>() {
                Ok(n) if LearningConfig::is_valid_fraction(n) => {
                    self.learning.acceptance_threshold = n;
                }
                _ => tracing::warn!(
                    "invalid PRODMAP_THRESHOLD value '{}', expected a number in [0.0, 1.0]; keeping {}",
                    val,
                    self.learning.acceptance_threshold
                ),
            }
        }

        if let Ok(val) = env::var("PRODMAP_MAPPINGS_DIR") {
            if val.trim().is_empty() {
                tracing::warn!("PRODMAP_MAPPINGS_DIR is empty, ignoring");
            } else {
                self.storage.mappings_dir = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = env::var("PRODMAP_GATEWAY") {
            if GatewayConfig::is_valid_kind(&val) {
                self.gateway.kind = val;
            } else {
                tracing::warn!(
                    "invalid PRODMAP_GATEWAY value '{}', valid values: {:?}; keeping '{}'",
                    val,
                    VALID_GATEWAY_KINDS,
                    self.gateway.kind
                );
            }
        }

        if let Ok(val) = env::var("PRODMAP_GATEWAY_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(n) => self.gateway.timeout_secs = n,
                Err(_) => tracing::warn!(
                    "invalid PRODMAP_GATEWAY_TIMEOUT_SECS value '{}', expected integer seconds; keeping {}",
                    val,
                    self.gateway.timeout_secs
                ),
            }
        }

        if let Ok(val) = env::var("PRODMAP_GATEWAY_RETRIES") {
            match val.parse::<u32>() {
                Ok(n) => self.gateway.max_retries = n,
                Err(_) => tracing::warn!(
                    "invalid PRODMAP_GATEWAY_RETRIES value '{}', expected a non-negative integer; keeping {}",
                    val,
                    self.gateway.max_retries
                ),
            }
        }
    }

    /// Merge another config into this one.
    ///
    /// Field-by-field: every non-default value in `other` wins. A layer cannot
    /// reset a value back to its default once a lower layer changed it.
    fn merge(mut self, other: Config) -> Self {
        let learning = LearningConfig::default();
        if other.learning.acceptance_threshold != learning.acceptance_threshold {
            self.learning.acceptance_threshold = other.learning.acceptance_threshold;
        }
        if other.learning.min_key_coverage != learning.min_key_coverage {
            self.learning.min_key_coverage = other.learning.min_key_coverage;
        }
        if other.learning.min_source_support != learning.min_source_support {
            self.learning.min_source_support = other.learning.min_source_support;
        }
        if other.learning.scale_tolerance != learning.scale_tolerance {
            self.learning.scale_tolerance = other.learning.scale_tolerance;
        }
        if other.learning.max_lookup_cardinality != learning.max_lookup_cardinality {
            self.learning.max_lookup_cardinality = other.learning.max_lookup_cardinality;
        }
        if other.learning.parallel != learning.parallel {
            self.learning.parallel = other.learning.parallel;
        }

        let translation = TranslationConfig::default();
        if other.translation.null_placeholder != translation.null_placeholder {
            self.translation.null_placeholder = other.translation.null_placeholder;
        }
        if other.translation.manual_placeholder != translation.manual_placeholder {
            self.translation.manual_placeholder = other.translation.manual_placeholder;
        }
        if other.translation.null_tokens != translation.null_tokens {
            self.translation.null_tokens = other.translation.null_tokens;
        }
        if other.translation.suggest_on_translate != translation.suggest_on_translate {
            self.translation.suggest_on_translate = other.translation.suggest_on_translate;
        }
        if other.translation.propose_unknown_categories != translation.propose_unknown_categories
        {
            self.translation.propose_unknown_categories =
                other.translation.propose_unknown_categories;
        }

        let gateway = GatewayConfig::default();
        if other.gateway.kind != gateway.kind {
            self.gateway.kind = other.gateway.kind;
        }
        if other.gateway.command != gateway.command {
            self.gateway.command = other.gateway.command;
        }
        if other.gateway.base_url != gateway.base_url {
            self.gateway.base_url = other.gateway.base_url;
        }
        if other.gateway.model != gateway.model {
            self.gateway.model = other.gateway.model;
        }
        if other.gateway.timeout_secs != gateway.timeout_secs {
            self.gateway.timeout_secs = other.gateway.timeout_secs;
        }
        if other.gateway.max_retries != gateway.max_retries {
            self.gateway.max_retries = other.gateway.max_retries;
        }
        if other.gateway.backoff_ms != gateway.backoff_ms {
            self.gateway.backoff_ms = other.gateway.backoff_ms;
        }

        if other.storage.mappings_dir.is_some() {
            self.storage.mappings_dir = other.storage.mappings_dir;
        }

        self
    }

    /// Validate values that serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        let fractions = [
            ("learning.acceptance_threshold", self.learning.acceptance_threshold),
            ("learning.min_key_coverage", self.learning.min_key_coverage),
            ("learning.min_source_support", self.learning.min_source_support),
            (
                "learning.max_lookup_cardinality",
                self.learning.max_lookup_cardinality,
            ),
        ];
        for (name, value) in fractions {
            if !LearningConfig::is_valid_fraction(value) {
                return Err(ProdmapError::config(format!(
                    "{} must be in [0.0, 1.0], got {}",
                    name, value
                )));
            }
        }
        if !(self.learning.scale_tolerance.is_finite() && self.learning.scale_tolerance >= 0.0) {
            return Err(ProdmapError::config(format!(
                "learning.scale_tolerance must be a non-negative number, got {}",
                self.learning.scale_tolerance
            )));
        }
        if !GatewayConfig::is_valid_kind(&self.gateway.kind) {
            return Err(ProdmapError::config(format!(
                "gateway.kind '{}' is not one of {:?}",
                self.gateway.kind, VALID_GATEWAY_KINDS
            )));
        }
        if self.gateway.kind == "command" && self.gateway.command.is_empty() {
            return Err(ProdmapError::config(
                "gateway.kind = \"command\" requires gateway.command",
            ));
        }
        if self.translation.null_placeholder == self.translation.manual_placeholder {
            return Err(ProdmapError::config(
                "translation.null_placeholder and translation.manual_placeholder must differ",
            ));
        }
        Ok(())
    }

    /// Resolve the mappings directory.
    pub fn mappings_dir(&self) -> Option<PathBuf> {
        self.storage
            .mappings_dir
            .clone()
            .or_else(|| prodmap_home().map(|h| h.join("mappings")))
    }
}

/// Get the prodmap home directory.
///
/// Checks `PRODMAP_HOME` first, then falls back to `~/.prodmap`.
pub fn prodmap_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("PRODMAP_HOME") {
        if home.is_empty() {
            tracing::warn!("PRODMAP_HOME is empty, using default");
        } else {
            return Some(PathBuf::from(home));
        }
    }

    dirs::home_dir().map(|home| home.join(".prodmap"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!((config.learning.acceptance_threshold - 0.60).abs() < f64::EPSILON);
        assert!((config.learning.min_key_coverage - 0.5).abs() < f64::EPSILON);
        assert!(config.learning.parallel);

        assert_eq!(config.translation.null_placeholder, "-");
        assert_eq!(config.translation.manual_placeholder, "?");
        assert!(config.translation.null_tokens.contains(&"<NULL>".to_string()));
        assert!(!config.translation.suggest_on_translate);
        assert!(config.translation.propose_unknown_categories);

        assert_eq!(config.gateway.kind, "disabled");
        assert_eq!(config.gateway.max_retries, 3);
        assert_eq!(config.gateway.timeout_secs, 30);

        assert!(config.storage.mappings_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        let toml_content = r#"
[learning]
acceptance_threshold = 0.75

[gateway]
kind = "command"
command = ["suggest-mapping", "--json"]
max_retries = 1
"#;
        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();

        assert!((config.learning.acceptance_threshold - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.gateway.kind, "command");
        assert_eq!(config.gateway.command, vec!["suggest-mapping", "--json"]);
        assert_eq!(config.gateway.max_retries, 1);
        // Untouched sections keep defaults
        assert_eq!(config.translation.null_placeholder, "-");
        assert_eq!(config.gateway.timeout_secs, 30);
    }

    #[test]
    fn test_load_from_file_missing() {
        let result = Config::load_from_file(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "this is not valid toml [[[").unwrap();

        assert!(Config::load_from_file(&config_path).is_err());
    }

    #[test]
    #[serial]
    fn test_project_config_precedence() {
        let dir = TempDir::new().unwrap();
        let project_dir = dir.path().join(".prodmap");
        fs::create_dir_all(&project_dir).unwrap();
        fs::write(
            project_dir.join("config.toml"),
            "[translation]\nmanual_placeholder = \"??\"\n",
        )
        .unwrap();

        let config = Config::load_from_cwd(dir.path());

        assert_eq!(config.translation.manual_placeholder, "??");
        assert_eq!(config.translation.null_placeholder, "-");
    }

    #[test]
    #[serial]
    fn test_env_var_precedence() {
        let dir = TempDir::new().unwrap();
        let project_dir = dir.path().join(".prodmap");
        fs::create_dir_all(&project_dir).unwrap();
        fs::write(
            project_dir.join("config.toml"),
            "[learning]\nacceptance_threshold = 0.7\n",
        )
        .unwrap();

        env::set_var("PRODMAP_THRESHOLD", "0.8");
        let config = Config::load_from_cwd(dir.path());
        env::remove_var("PRODMAP_THRESHOLD");

        assert!((config.learning.acceptance_threshold - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    #[serial]
    fn test_invalid_env_values_are_ignored() {
        let dir = TempDir::new().unwrap();

        env::set_var("PRODMAP_THRESHOLD", "1.5");
        env::set_var("PRODMAP_GATEWAY", "carrier-pigeon");
        env::set_var("PRODMAP_GATEWAY_RETRIES", "many");
        let config = Config::load_from_cwd(dir.path());
        env::remove_var("PRODMAP_THRESHOLD");
        env::remove_var("PRODMAP_GATEWAY");
        env::remove_var("PRODMAP_GATEWAY_RETRIES");

        assert!((config.learning.acceptance_threshold - 0.60).abs() < f64::EPSILON);
        assert_eq!(config.gateway.kind, "disabled");
        assert_eq!(config.gateway.max_retries, 3);
    }

    #[test]
    #[serial]
    fn test_env_mappings_dir() {
        let dir = TempDir::new().unwrap();
        env::set_var("PRODMAP_MAPPINGS_DIR", "/srv/prodmap/mappings");
        let config = Config::load_from_cwd(dir.path());
        env::remove_var("PRODMAP_MAPPINGS_DIR");

        assert_eq!(
            config.mappings_dir(),
            Some(PathBuf::from("/srv/prodmap/mappings"))
        );
    }

    #[test]
    #[serial]
    fn test_prodmap_home_env() {
        env::set_var("PRODMAP_HOME", "/opt/prodmap");
        let home = prodmap_home();
        let config = Config::default();
        let mappings = config.mappings_dir();
        env::remove_var("PRODMAP_HOME");

        assert_eq!(home, Some(PathBuf::from("/opt/prodmap")));
        assert_eq!(mappings, Some(PathBuf::from("/opt/prodmap/mappings")));
    }

    #[test]
    fn test_merge_field_by_field() {
        let mut user = Config::default();
        user.gateway.kind = "openai".to_string();
        user.learning.scale_tolerance = 0.01;

        let mut project = Config::default();
        project.gateway.max_retries = 0;

        let merged = Config::default().merge(user).merge(project);

        assert_eq!(merged.gateway.kind, "openai");
        assert_eq!(merged.gateway.max_retries, 0);
        assert!((merged.learning.scale_tolerance - 0.01).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.learning.acceptance_threshold = 1.2;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.gateway.kind = "command".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.translation.manual_placeholder = "-".to_string();
        assert!(config.validate().is_err());
    }
}
