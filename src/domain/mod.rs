//! Domain layer for the drover engine
//!
//! Core models, errors and the port traits that adapters implement.

pub mod errors;
pub mod interrupt;
pub mod models;
pub mod ports;

pub use errors::{DomainResult, EngineError, Interrupted};
pub use interrupt::Interrupt;
