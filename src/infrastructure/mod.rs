//! Infrastructure layer module
//!
//! - Configuration management
//! - Logging infrastructure
//! - Supervised subprocess execution

pub mod config;
pub mod logging;
pub mod process;
