//! Clock port - wall time source.

use chrono::{DateTime, Utc};

/// Source of wall-clock time for persisted timestamps and windows.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
