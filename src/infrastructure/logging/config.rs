use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::models::config::{LoggingConfig, PathsConfig};

/// Resolved logger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Console output format
    pub format: LogFormat,

    /// Directory for log files (if None logs only to the console)
    pub log_dir: Option<PathBuf>,

    /// Log rotation policy
    pub rotation: RotationPolicy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl LogConfig {
    /// Build from the validated `logging` and `paths` sections
    pub fn from_settings(logging: &LoggingConfig, paths: &PathsConfig) -> Self {
        let format = if logging.format == "json" {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        };
        let rotation = match logging.rotation.as_str() {
            "hourly" => RotationPolicy::Hourly,
            "never" => RotationPolicy::Never,
            _ => RotationPolicy::Daily,
        };
        Self {
            level: logging.level.clone(),
            format,
            log_dir: logging.log_to_file.then(|| paths.state_dir.join("logs")),
            rotation,
        }
    }

    /// Override the level, e.g. from `--verbose`
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from_settings(&LoggingConfig::default(), &PathsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings() {
        let logging = LoggingConfig {
            level: "debug".to_string(),
            format: "json".to_string(),
            log_to_file: true,
            rotation: "hourly".to_string(),
        };
        let config = LogConfig::from_settings(&logging, &PathsConfig::default());
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.rotation, RotationPolicy::Hourly);
        assert_eq!(config.log_dir, Some(PathBuf::from(".drover/logs")));

        let default = LogConfig::default();
        assert_eq!(default.format, LogFormat::Pretty);
        assert!(default.log_dir.is_none());
    }
}
