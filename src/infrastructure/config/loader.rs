use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::adapters::backends::BackendRegistry;
use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid calls_per_hour: {0}. Must be at least 1")]
    InvalidCallsPerHour(u32),

    #[error("Invalid {field}: {value}. Must be between 1 and 100")]
    InvalidPercent { field: &'static str, value: u8 },

    #[error(
        "Invalid circuit breaker thresholds: half_open_threshold ({half_open}) must be between 1 and no_progress_threshold ({no_progress})"
    )]
    InvalidBreakerThresholds { half_open: u32, no_progress: u32 },

    #[error("Invalid same_error_threshold: {0}. Must be at least 1")]
    InvalidSameErrorThreshold(u32),

    #[error("Invalid confidence threshold: {0}. Must be at most 100")]
    InvalidConfidenceThreshold(u8),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error("Invalid verification budget for {phase}: cannot be 0")]
    InvalidVerificationBudget { phase: String },

    #[error("Phase {0} is listed more than once")]
    DuplicatePhase(String),

    #[error("Phase {0} has a zero timeout")]
    ZeroPhaseTimeout(String),

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the project in the current directory
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .drover/config.yaml (project config)
    /// 3. .drover/local.yaml (local overrides, optional)
    /// 4. Environment variables (DROVER_* prefix, `__` separates nested keys)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`ConfigLoader::load`], rooted at `project_dir`
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Config> {
        let root = project_dir.as_ref().join(".drover");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(root.join("config.yaml")))
            .merge(Yaml::file(root.join("local.yaml")))
            .merge(Env::prefixed("DROVER_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file; environment overrides still apply
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.is_file() {
            anyhow::bail!("Config file {} does not exist", path.display());
        }
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("DROVER_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let rate = &config.rate_limit;
        if rate.calls_per_hour == 0 {
            return Err(ConfigError::InvalidCallsPerHour(rate.calls_per_hour));
        }
        check_percent("warning_threshold_percent", rate.warning_threshold_percent)?;

        let breaker = &config.circuit_breaker;
        check_percent("decline_percent", breaker.decline_percent)?;
        if breaker.half_open_threshold == 0 || breaker.half_open_threshold > breaker.no_progress_threshold {
            return Err(ConfigError::InvalidBreakerThresholds {
                half_open: breaker.half_open_threshold,
                no_progress: breaker.no_progress_threshold,
            });
        }
        if breaker.same_error_threshold == 0 {
            return Err(ConfigError::InvalidSameErrorThreshold(breaker.same_error_threshold));
        }

        if config.confidence.threshold > 100 {
            return Err(ConfigError::InvalidConfidenceThreshold(config.confidence.threshold));
        }
        check_percent("timeout_warning_percent", config.liveness.timeout_warning_percent)?;

        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }

        // Pipeline
        if config.pipeline.verification_retry_budget == 0 {
            return Err(ConfigError::InvalidVerificationBudget {
                phase: "pipeline".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for phase in &config.pipeline.phases {
            if phase.name.trim().is_empty() {
                return Err(ConfigError::ValidationFailed("phase name cannot be empty".to_string()));
            }
            if !seen.insert(phase.name.as_str()) {
                return Err(ConfigError::DuplicatePhase(phase.name.clone()));
            }
            if phase.timeout_secs == Some(0) {
                return Err(ConfigError::ZeroPhaseTimeout(phase.name.clone()));
            }
            if phase.verification_retry_budget == Some(0) {
                return Err(ConfigError::InvalidVerificationBudget {
                    phase: phase.name.clone(),
                });
            }
        }

        // Backends
        for spec in &config.backends {
            if spec.id.trim().is_empty() || spec.command.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "custom backends need an id and a command".to_string(),
                ));
            }
        }
        let registry = BackendRegistry::new().with_custom(config.backends.iter().cloned());
        if !registry.contains(&config.agent.backend) {
            return Err(ConfigError::UnknownBackend(config.agent.backend.clone()));
        }

        // Logging
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}

fn check_percent(field: &'static str, value: u8) -> Result<(), ConfigError> {
    if (1..=100).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidPercent { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::{Autonomy, PhaseConfig};
    use std::fs;

    fn phase(name: &str) -> PhaseConfig {
        PhaseConfig {
            name: name.to_string(),
            timeout_secs: None,
            skip: false,
            verification_retry_budget: None,
            prompt_template: None,
            gates: None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.agent.backend, "claude");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_validate_zero_calls_per_hour() {
        let mut config = Config::default();
        config.rate_limit.calls_per_hour = 0;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidCallsPerHour(0))
        );
    }

    #[test]
    fn test_validate_percentages() {
        let mut config = Config::default();
        config.rate_limit.warning_threshold_percent = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidPercent {
                field: "warning_threshold_percent",
                ..
            })
        ));

        let mut config = Config::default();
        config.circuit_breaker.decline_percent = 101;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidPercent {
                field: "decline_percent",
                value: 101
            })
        ));
    }

    #[test]
    fn test_validate_breaker_thresholds() {
        let mut config = Config::default();
        config.circuit_breaker.half_open_threshold = 4;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBreakerThresholds {
                half_open: 4,
                no_progress: 3
            })
        );

        let mut config = Config::default();
        config.circuit_breaker.same_error_threshold = 0;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidSameErrorThreshold(0))
        );
    }

    #[test]
    fn test_validate_confidence_and_retry() {
        let mut config = Config::default();
        config.confidence.threshold = 101;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidConfidenceThreshold(101))
        );

        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert_eq!(ConfigLoader::validate(&config), Err(ConfigError::InvalidMaxAttempts(0)));
    }

    #[test]
    fn test_validate_pipeline() {
        let mut config = Config::default();
        config.pipeline.phases = vec![phase("plan"), phase("plan")];
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::DuplicatePhase("plan".to_string()))
        );

        let mut config = Config::default();
        let mut zero = phase("implement");
        zero.timeout_secs = Some(0);
        config.pipeline.phases = vec![zero];
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroPhaseTimeout("implement".to_string()))
        );

        let mut config = Config::default();
        config.pipeline.verification_retry_budget = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidVerificationBudget { .. })
        ));
    }

    #[test]
    fn test_validate_unknown_backend() {
        let mut config = Config::default();
        config.agent.backend = "cursor".to_string();
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::UnknownBackend("cursor".to_string()))
        );
    }

    #[test]
    fn test_validate_logging() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel("invalid".to_string()))
        );

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat("xml".to_string()))
        );
    }

    #[test]
    fn test_hierarchical_merging() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".drover")).unwrap();
        fs::write(
            dir.path().join(".drover/config.yaml"),
            "agent:\n  backend: codex\nlogging:\n  level: info\n  format: json\n",
        )
        .unwrap();
        fs::write(dir.path().join(".drover/local.yaml"), "logging:\n  level: debug\n").unwrap();

        temp_env::with_vars_unset(["DROVER_LOGGING__LEVEL", "DROVER_AGENT__AUTONOMY"], || {
            let config = ConfigLoader::load_from_dir(dir.path()).unwrap();
            assert_eq!(config.agent.backend, "codex");
            assert_eq!(config.logging.level, "debug", "Override should win");
            assert_eq!(config.logging.format, "json", "Base value should persist");
        });
    }

    #[test]
    fn test_env_override() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".drover")).unwrap();
        fs::write(dir.path().join(".drover/config.yaml"), "logging:\n  level: info\n").unwrap();

        temp_env::with_vars(
            [
                ("DROVER_LOGGING__LEVEL", Some("warn")),
                ("DROVER_AGENT__AUTONOMY", Some("supervised")),
                ("DROVER_RATE_LIMIT__CALLS_PER_HOUR", Some("40")),
            ],
            || {
                let config = ConfigLoader::load_from_dir(dir.path()).unwrap();
                assert_eq!(config.logging.level, "warn");
                assert_eq!(config.agent.autonomy, Autonomy::Supervised);
                assert_eq!(config.rate_limit.calls_per_hour, 40);
            },
        );
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drover.yaml");
        fs::write(&path, "rate_limit:\n  calls_per_hour: 0\n").unwrap();
        assert!(ConfigLoader::load_from_file(&path).is_err());
        assert!(ConfigLoader::load_from_file(dir.path().join("missing.yaml")).is_err());
    }
}
