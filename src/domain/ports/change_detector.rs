//! Change detector port - version-control view of the working tree.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::domain::errors::DomainResult;

/// Working-tree state captured before an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSnapshot {
    pub head: Option<String>,
    /// Paths already modified or untracked when the snapshot was taken
    pub dirty: BTreeSet<String>,
}

#[async_trait]
pub trait ChangeDetector: Send + Sync {
    async fn snapshot(&self) -> DomainResult<ChangeSnapshot>;

    /// Files committed or newly modified since `snapshot`.
    async fn changed_files_since(&self, snapshot: &ChangeSnapshot) -> DomainResult<Vec<String>>;

    /// The last `count` commits, one line each.
    async fn recent_log(&self, count: usize) -> DomainResult<String>;
}
