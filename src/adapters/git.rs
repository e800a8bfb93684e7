//! Git-backed change detector.
//!
//! Progress detection only needs to know whether the agent touched any
//! files, so this stays a thin wrapper around a few `git` calls.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::errors::{DomainResult, EngineError};
use crate::domain::ports::{ChangeDetector, ChangeSnapshot};

/// Change detector for a git working tree.
#[derive(Debug, Clone)]
pub struct GitChangeDetector {
    workdir: PathBuf,
}

impl GitChangeDetector {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Run git, returning stdout on success and `None` when git reports an
    /// error (not a repository, no commits yet) or is not installed.
    async fn run(&self, args: &[&str]) -> DomainResult<Option<String>> {
        let output = match Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("git is not installed; change detection disabled");
                return Ok(None);
            }
            Err(e) => {
                return Err(EngineError::SpawnFailed {
                    program: "git".to_string(),
                    reason: e.to_string(),
                })
            }
        };

        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            debug!(
                args = ?args,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "git command failed"
            );
            Ok(None)
        }
    }

    async fn head(&self) -> DomainResult<Option<String>> {
        Ok(self
            .run(&["rev-parse", "HEAD"])
            .await?
            .map(|out| out.trim().to_string())
            .filter(|sha| !sha.is_empty()))
    }

    async fn dirty_paths(&self) -> DomainResult<BTreeSet<String>> {
        let out = self
            .run(&["status", "--porcelain=v1", "-uall"])
            .await?
            .unwrap_or_default();
        Ok(out.lines().filter_map(parse_status_path).collect())
    }
}

/// Path from a `git status --porcelain` line; renames yield the new path.
fn parse_status_path(line: &str) -> Option<String> {
    let path = line.get(3..)?.trim();
    if path.is_empty() {
        return None;
    }
    let path = path.rsplit(" -> ").next().unwrap_or(path);
    Some(path.trim_matches('"').to_string())
}

#[async_trait]
impl ChangeDetector for GitChangeDetector {
    async fn snapshot(&self) -> DomainResult<ChangeSnapshot> {
        Ok(ChangeSnapshot {
            head: self.head().await?,
            dirty: self.dirty_paths().await?,
        })
    }

    async fn changed_files_since(&self, snapshot: &ChangeSnapshot) -> DomainResult<Vec<String>> {
        let mut changed = BTreeSet::new();

        let head = self.head().await?;
        match (&snapshot.head, &head) {
            (Some(base), Some(now)) if base != now => {
                let range = format!("{base}..{now}");
                match self.run(&["diff", "--name-only", &range]).await? {
                    Some(out) => changed.extend(out.lines().map(str::to_string)),
                    None => warn!(range = %range, "could not diff commits; counting HEAD move as a change"),
                }
                if changed.is_empty() {
                    changed.insert(format!("<commits {range}>"));
                }
            }
            (None, Some(now)) => {
                changed.insert(format!("<first commit {now}>"));
            }
            _ => {}
        }

        let dirty = self.dirty_paths().await?;
        changed.extend(dirty.difference(&snapshot.dirty).cloned());

        Ok(changed.into_iter().filter(|p| !p.is_empty()).collect())
    }

    async fn recent_log(&self, count: usize) -> DomainResult<String> {
        let limit = format!("-{count}");
        Ok(self
            .run(&["log", "--oneline", &limit])
            .await?
            .unwrap_or_default()
            .trim_end()
            .to_string())
    }
}
