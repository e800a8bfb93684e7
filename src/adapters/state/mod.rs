//! State store implementations.

pub mod file_store;
pub mod memory_store;

pub use file_store::{sanitize_identity, FileStateStore};
pub use memory_store::MemoryStateStore;
