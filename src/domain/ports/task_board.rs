//! Task board port.

/// External task storage, consulted for whether a task was moved to done.
pub trait TaskBoard: Send + Sync {
    fn is_done(&self, task_id: &str) -> bool;
}
