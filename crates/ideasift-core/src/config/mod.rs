//! Configuration system for ideasift.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{SiftError, SiftResult};
use crate::stats::SignificanceMethod;
use crate::types::StrategyKind;

/// Preference learning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceConfig {
    /// How many recent events feed a preference vector.
    pub history_limit: usize,
    /// Rebuild the user's vector in the background after each tracked event.
    pub refresh_on_track: bool,
}

impl Default for PreferenceConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            refresh_on_track: true,
        }
    }
}

/// Strategy tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Strategy used when the caller does not name one.
    pub default_strategy: StrategyKind,
    pub trending_window_days: i64,
    /// Content-based candidates must score strictly above this.
    pub content_threshold: f64,
    /// Similar users must overlap strictly above this.
    pub similarity_threshold: f64,
    pub similar_user_limit: usize,
    /// Oversampling multiplier for hybrid's sub-strategies.
    pub hybrid_oversample: usize,
    /// Oversampling multiplier for the MMR candidate pool.
    pub diversity_oversample: usize,
    /// Recent public items scanned by content-style strategies.
    pub candidate_pool_size: usize,
    pub serendipity_threshold: f64,
    pub quality_threshold: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            default_strategy: StrategyKind::Hybrid,
            trending_window_days: 7,
            content_threshold: 0.3,
            similarity_threshold: 0.1,
            similar_user_limit: 10,
            hybrid_oversample: 2,
            diversity_oversample: 5,
            candidate_pool_size: 200,
            serendipity_threshold: 0.3,
            quality_threshold: 0.5,
        }
    }
}

impl StrategyConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.trending_window_days < 1 {
            return Err("trending_window_days must be at least 1");
        }
        if !(0.0..1.0).contains(&self.content_threshold) {
            return Err("content_threshold must be in [0, 1)");
        }
        if !(0.0..1.0).contains(&self.similarity_threshold) {
            return Err("similarity_threshold must be in [0, 1)");
        }
        if self.similar_user_limit == 0 {
            return Err("similar_user_limit must be at least 1");
        }
        if self.hybrid_oversample == 0 || self.diversity_oversample == 0 {
            return Err("oversample factors must be at least 1");
        }
        if self.candidate_pool_size == 0 {
            return Err("candidate_pool_size must be at least 1");
        }
        Ok(())
    }
}

/// Experiment defaults applied when an operator leaves a field unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub default_traffic_split: f64,
    pub default_min_sample_size: u64,
    pub default_confidence_level: f64,
    pub default_power_target: f64,
    pub significance_method: SignificanceMethod,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            default_traffic_split: 0.5,
            default_min_sample_size: 100,
            default_confidence_level: 0.95,
            default_power_target: 0.8,
            significance_method: SignificanceMethod::default(),
        }
    }
}

/// Data store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// SQLite database file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let sift_dir = dirs::home_dir()
            .map(|h| h.join(".ideasift"))
            .unwrap_or_else(|| PathBuf::from(".ideasift"));

        Self {
            backend: StoreBackend::Sqlite,
            path: sift_dir.join("ideasift.db"),
        }
    }
}

/// Main engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub preferences: PreferenceConfig,
    pub strategies: StrategyConfig,
    pub experiments: ExperimentConfig,
    pub store: StoreConfig,
    /// Upper bound on recommendations per request.
    pub max_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preferences: PreferenceConfig::default(),
            strategies: StrategyConfig::default(),
            experiments: ExperimentConfig::default(),
            store: StoreConfig::default(),
            max_limit: 50,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> SiftResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| SiftError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| SiftError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| SiftError::Configuration(e.to_string()))?,
            _ => {
                return Err(SiftError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(strategy) = std::env::var("IDEASIFT_DEFAULT_STRATEGY") {
            match strategy.parse() {
                Ok(kind) => config.strategies.default_strategy = kind,
                Err(_) => tracing::warn!(%strategy, "ignoring unknown IDEASIFT_DEFAULT_STRATEGY"),
            }
        }
        if let Some(days) = env_parse("IDEASIFT_TRENDING_WINDOW_DAYS") {
            config.strategies.trending_window_days = days;
        }
        if let Some(limit) = env_parse("IDEASIFT_HISTORY_LIMIT") {
            config.preferences.history_limit = limit;
        }
        if let Some(limit) = env_parse("IDEASIFT_MAX_LIMIT") {
            config.max_limit = limit;
        }
        if let Ok(method) = std::env::var("IDEASIFT_SIGNIFICANCE_METHOD") {
            config.experiments.significance_method = match method.to_lowercase().as_str() {
                "normal" | "normal_approximation" => SignificanceMethod::NormalApproximation,
                _ => SignificanceMethod::LegacyBands,
            };
        }

        // Store configuration
        if let Ok(backend) = std::env::var("IDEASIFT_STORE") {
            config.store.backend = match backend.to_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                _ => StoreBackend::Sqlite,
            };
        }
        if let Ok(path) = std::env::var("IDEASIFT_DB_PATH") {
            config.store.path = PathBuf::from(path);
        }

        config
    }

    /// Validate every section.
    pub fn validate(&self) -> SiftResult<()> {
        self.strategies
            .validate()
            .map_err(|e| SiftError::Configuration(e.to_string()))?;
        if self.preferences.history_limit == 0 {
            return Err(SiftError::Configuration(
                "preferences.history_limit must be at least 1".to_string(),
            ));
        }
        if self.max_limit == 0 {
            return Err(SiftError::Configuration(
                "max_limit must be at least 1".to_string(),
            ));
        }
        let split = self.experiments.default_traffic_split;
        if !(split > 0.0 && split < 1.0) {
            return Err(SiftError::Configuration(
                "experiments.default_traffic_split must be in (0, 1)".to_string(),
            ));
        }
        Ok(())
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment variable");
            None
        }
    }
}

/// Builder for EngineConfig.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn preferences(mut self, config: PreferenceConfig) -> Self {
        self.config.preferences = config;
        self
    }

    pub fn strategies(mut self, config: StrategyConfig) -> Self {
        self.config.strategies = config;
        self
    }

    pub fn experiments(mut self, config: ExperimentConfig) -> Self {
        self.config.experiments = config;
        self
    }

    /// Use the in-process store.
    pub fn in_memory(mut self) -> Self {
        self.config.store.backend = StoreBackend::Memory;
        self
    }

    /// Use a SQLite database at `path`.
    pub fn sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store.backend = StoreBackend::Sqlite;
        self.config.store.path = path.into();
        self
    }

    pub fn significance_method(mut self, method: SignificanceMethod) -> Self {
        self.config.experiments.significance_method = method;
        self
    }

    pub fn refresh_on_track(mut self, enabled: bool) -> Self {
        self.config.preferences.refresh_on_track = enabled;
        self
    }

    pub fn max_limit(mut self, limit: usize) -> Self {
        self.config.max_limit = limit;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.preferences.history_limit, 100);
        assert_eq!(config.strategies.trending_window_days, 7);
        assert_eq!(config.strategies.default_strategy, StrategyKind::Hybrid);
        assert_eq!(
            config.experiments.significance_method,
            SignificanceMethod::LegacyBands
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_file_partial() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "max_limit = 20\n[strategies]\ntrending_window_days = 3\n[experiments]\nsignificance_method = \"normal_approximation\""
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_limit, 20);
        assert_eq!(config.strategies.trending_window_days, 3);
        assert_eq!(config.strategies.similar_user_limit, 10);
        assert_eq!(
            config.experiments.significance_method,
            SignificanceMethod::NormalApproximation
        );
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "store:\n  backend: memory\npreferences:\n  history_limit: 25").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.preferences.history_limit, 25);
    }

    #[test]
    fn test_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = EngineConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, SiftError::Configuration(_)));
    }

    #[test]
    fn test_invalid_strategy_config() {
        let config = StrategyConfig {
            similar_user_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::builder()
            .in_memory()
            .max_limit(10)
            .refresh_on_track(false)
            .build();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.max_limit, 10);
        assert!(!config.preferences.refresh_on_track);
    }
}
