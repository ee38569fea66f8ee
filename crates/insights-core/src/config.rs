//! Layered configuration for an analysis run.
//!
//! Sources, highest priority first:
//! 1. Environment variables (`INSIGHTS_*`, `__` separates nested sections;
//!    `OPENAI_API_KEY` is also accepted for the key)
//! 2. Secret store `.insights/secrets.toml`
//! 3. Project file `insights.toml` (or the file passed explicitly)
//! 4. Built-in defaults
//!
//! `INSIGHTS_RETRY__MAX_RETRIES=5` maps to `retry.max_retries`.
//! The config is built once and handed down; nothing below the CLI reads the
//! environment.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const PROJECT_CONFIG_FILE: &str = "insights.toml";
pub const SECRETS_FILE: &str = ".insights/secrets.toml";
pub const ENV_PREFIX: &str = "INSIGHTS_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Figment(#[from] figment::Error),

    #[error("config file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Retry controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Added to the temperature on each varied retry.
    pub temperature_increment: f64,
    pub max_retry_temperature: f64,
    /// Allow temperature perturbation for deterministic configurations.
    pub vary_temperature: bool,
    /// Extra attempts granted after a malformed response.
    pub max_parse_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            temperature_increment: 0.1,
            max_retry_temperature: 0.3,
            vary_temperature: true,
            max_parse_retries: 1,
        }
    }
}

/// When and how wide to fan batches out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    pub enabled: bool,
    pub min_batches: usize,
    pub min_comments: usize,
    pub max_workers: usize,
    /// Upper bound for one batch including all of its retries.
    pub batch_timeout_secs: u64,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_batches: 3,
            min_comments: 60,
            max_workers: 3,
            batch_timeout_secs: 600,
        }
    }
}

/// Everything an analysis run needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub api_base_url: String,
    /// Configured output token limit per call.
    pub max_tokens: u32,
    pub batch_size: usize,
    pub temperature: f64,
    pub seed: Option<u64>,
    pub confidence_threshold: f64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub request_timeout_secs: u64,
    pub max_comments: usize,
    /// Synthesize neutral results when every batch of a file fails.
    pub fallback_on_total_failure: bool,
    pub retry: RetryConfig,
    pub parallel: ParallelConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            api_base_url: "https://api.openai.com/v1".to_string(),
            max_tokens: 12_000,
            batch_size: 20,
            temperature: 0.0,
            seed: Some(42),
            confidence_threshold: 0.6,
            cache_ttl_secs: 3_600,
            cache_capacity: 256,
            request_timeout_secs: 120,
            max_comments: 5_000,
            fallback_on_total_failure: true,
            retry: RetryConfig::default(),
            parallel: ParallelConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load from the working directory's files and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load with an explicit project file instead of `./insights.toml`.
    pub fn load_from(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(config_file)?.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.env` from the working directory first, then [`AnalysisConfig::load_from`].
    pub fn load_with_dotenv(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load_from(config_file)
    }

    /// Build the provider chain; public so callers can layer more providers on top.
    pub fn figment(config_file: Option<&Path>) -> Result<Figment, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        match config_file {
            Some(path) if !path.exists() => {
                return Err(ConfigError::MissingFile {
                    path: path.to_path_buf(),
                })
            }
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => {
                let project = PathBuf::from(PROJECT_CONFIG_FILE);
                if project.exists() {
                    figment = figment.merge(Toml::file(project));
                }
            }
        }

        let secrets = PathBuf::from(SECRETS_FILE);
        if secrets.exists() {
            figment = figment.merge(Toml::file(secrets));
        }

        figment = figment
            .merge(Env::raw().only(&["OPENAI_API_KEY"]).map(|_| "api_key".into()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Ok(figment)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid("model", "must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be at least 1"));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::invalid("max_tokens", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::invalid(
                "confidence_threshold",
                format!("{} is outside [0, 1]", self.confidence_threshold),
            ));
        }
        for (field, value) in [
            ("temperature", self.temperature),
            ("retry.max_retry_temperature", self.retry.max_retry_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::invalid(field, format!("{value} is outside [0, 2]")));
            }
        }
        if self.retry.temperature_increment < 0.0 {
            return Err(ConfigError::invalid(
                "retry.temperature_increment",
                "must not be negative",
            ));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::invalid(
                "retry.max_delay_ms",
                "must be at least retry.base_delay_ms",
            ));
        }
        if self.parallel.max_workers == 0 {
            return Err(ConfigError::invalid("parallel.max_workers", "must be at least 1"));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::invalid("cache_capacity", "must be at least 1"));
        }
        if self.max_comments == 0 {
            return Err(ConfigError::invalid("max_comments", "must be at least 1"));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// The key with everything but its last four characters hidden.
    pub fn redacted_api_key(&self) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return "<unset>".to_string();
        }
        let chars: Vec<char> = key.chars().collect();
        if chars.len() <= 8 {
            return "sk-…".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("sk-…{tail}")
    }

    /// Temperature ≈ 0 with a fixed seed.
    pub fn is_deterministic(&self) -> bool {
        self.temperature <= crate::retry::DETERMINISTIC_EPSILON && self.seed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.is_deterministic());
        assert!(!config.has_api_key());
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let config = AnalysisConfig {
            batch_size: 0,
            ..AnalysisConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_validate_rejects_threshold_above_one() {
        let config = AnalysisConfig {
            confidence_threshold: 1.5,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "confidence_threshold"
        ));
    }

    #[test]
    fn test_redacted_key_keeps_last_four() {
        let config = AnalysisConfig {
            api_key: "sk-proj-abcdefghijklmnop1234".to_string(),
            ..AnalysisConfig::default()
        };
        assert_eq!(config.redacted_api_key(), "sk-…1234");
        assert_eq!(AnalysisConfig::default().redacted_api_key(), "<unset>");
    }

    #[test]
    fn test_serialized_config_omits_key() {
        let config = AnalysisConfig {
            api_key: "sk-secret-value-9999".to_string(),
            ..AnalysisConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
