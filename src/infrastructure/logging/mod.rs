//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output on stderr
//! - Optional rolling JSON log files under the state directory

pub mod config;
pub mod logger;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
