//! File-backed state store.
//!
//! Layout under the state directory:
//!
//! ```text
//! agents/<identity>/circuit.json
//! agents/<identity>/rate_window.json
//! agents/<identity>/checkpoint.json
//! ```
//!
//! Each file holds a versioned envelope and is replaced atomically.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::domain::errors::{DomainResult, EngineError};
use crate::domain::models::{CircuitBreakerState, RateLimiterWindow, ResumeCheckpoint};
use crate::domain::ports::StateStore;

/// Newest envelope version this build reads and the one it writes.
pub const SCHEMA_VERSION: u32 = 1;

const CIRCUIT_KIND: &str = "circuit";
const RATE_WINDOW_KIND: &str = "rate_window";
const CHECKPOINT_KIND: &str = "checkpoint";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    schema_version: u32,
    kind: String,
    written_at: DateTime<Utc>,
    data: T,
}

#[derive(Debug, Deserialize)]
struct EnvelopeHeader {
    schema_version: u32,
    kind: String,
}

/// Map an identity onto a safe directory name.
pub fn sanitize_identity(identity: &str) -> String {
    let cleaned: String = identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// State store writing JSON envelopes under a directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: state_dir.into(),
        }
    }

    pub fn agent_dir(&self, identity: &str) -> PathBuf {
        self.root.join("agents").join(sanitize_identity(identity))
    }

    fn path(&self, identity: &str, kind: &str) -> PathBuf {
        self.agent_dir(identity).join(format!("{kind}.json"))
    }

    fn load<T: DeserializeOwned>(&self, identity: &str, kind: &str) -> DomainResult<Option<T>> {
        let path = self.path(identity, kind);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let header: EnvelopeHeader = serde_json::from_str(&contents)?;
        if header.schema_version > SCHEMA_VERSION {
            return Err(EngineError::UnsupportedSchema {
                kind: kind.to_string(),
                found: header.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        if header.kind != kind {
            return Err(EngineError::State(format!(
                "{} holds a {} record, expected {kind}",
                path.display(),
                header.kind
            )));
        }

        let envelope: Envelope<T> = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), written_at = %envelope.written_at, "loaded state record");
        Ok(Some(envelope.data))
    }

    fn save<T: Serialize>(&self, identity: &str, kind: &str, data: &T) -> DomainResult<()> {
        let path = self.path(identity, kind);
        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            kind: kind.to_string(),
            written_at: Utc::now(),
            data,
        };
        let mut buf = serde_json::to_string_pretty(&envelope)?;
        buf.push('\n');
        write_atomic(&path, &buf)?;
        debug!(path = %path.display(), "saved state record");
        Ok(())
    }

    fn clear(&self, identity: &str, kind: &str) -> DomainResult<()> {
        match fs::remove_file(self.path(identity, kind)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write via a temp file in the target directory, fsync, then rename.
fn write_atomic(path: &Path, contents: &str) -> DomainResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| EngineError::State(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| EngineError::Io(e.error))?;
    Ok(())
}

impl StateStore for FileStateStore {
    fn load_circuit(&self, identity: &str) -> DomainResult<Option<CircuitBreakerState>> {
        self.load(identity, CIRCUIT_KIND)
    }

    fn save_circuit(&self, identity: &str, state: &CircuitBreakerState) -> DomainResult<()> {
        self.save(identity, CIRCUIT_KIND, state)
    }

    fn clear_circuit(&self, identity: &str) -> DomainResult<()> {
        self.clear(identity, CIRCUIT_KIND)
    }

    fn load_rate_window(&self, identity: &str) -> DomainResult<Option<RateLimiterWindow>> {
        self.load(identity, RATE_WINDOW_KIND)
    }

    fn save_rate_window(&self, identity: &str, window: &RateLimiterWindow) -> DomainResult<()> {
        self.save(identity, RATE_WINDOW_KIND, window)
    }

    fn clear_rate_window(&self, identity: &str) -> DomainResult<()> {
        self.clear(identity, RATE_WINDOW_KIND)
    }

    fn load_checkpoint(&self, identity: &str) -> DomainResult<Option<ResumeCheckpoint>> {
        self.load(identity, CHECKPOINT_KIND)
    }

    fn save_checkpoint(&self, identity: &str, checkpoint: &ResumeCheckpoint) -> DomainResult<()> {
        self.save(identity, CHECKPOINT_KIND, checkpoint)
    }

    fn clear_checkpoint(&self, identity: &str) -> DomainResult<()> {
        self.clear(identity, CHECKPOINT_KIND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CircuitState;

    fn checkpoint() -> ResumeCheckpoint {
        ResumeCheckpoint {
            task_id: "t-9".to_string(),
            last_completed_phase_index: 3,
            last_completed_phase_name: "implement".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_checkpoint_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());

        assert!(store.load_checkpoint("claude").unwrap().is_none());
        let cp = checkpoint();
        store.save_checkpoint("claude", &cp).unwrap();
        assert_eq!(store.load_checkpoint("claude").unwrap(), Some(cp));

        store.clear_checkpoint("claude").unwrap();
        assert!(store.load_checkpoint("claude").unwrap().is_none());
        // clearing twice is fine
        store.clear_checkpoint("claude").unwrap();
    }

    #[test]
    fn test_envelope_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        let mut state = CircuitBreakerState::new(Utc::now());
        state.state = CircuitState::Open;
        state.open_since = Some(Utc::now());
        store.save_circuit("claude", &state).unwrap();

        let raw = fs::read_to_string(dir.path().join("agents/claude/circuit.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["schema_version"], 1);
        assert_eq!(value["kind"], "circuit");
        assert_eq!(value["data"]["state"], "open");

        // no temp files left behind
        let entries = fs::read_dir(dir.path().join("agents/claude")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        let agent_dir = store.agent_dir("claude");
        fs::create_dir_all(&agent_dir).unwrap();
        fs::write(
            agent_dir.join("rate_window.json"),
            r#"{"schema_version": 9, "kind": "rate_window", "written_at": "2026-01-01T00:00:00Z", "data": {"calls": []}}"#,
        )
        .unwrap();

        let err = store.load_rate_window("claude").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedSchema { found: 9, .. }));
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        let agent_dir = store.agent_dir("claude");
        fs::create_dir_all(&agent_dir).unwrap();
        fs::write(
            agent_dir.join("checkpoint.json"),
            r#"{"schema_version": 1, "kind": "circuit", "written_at": "2026-01-01T00:00:00Z", "data": {}}"#,
        )
        .unwrap();
        assert!(matches!(store.load_checkpoint("claude"), Err(EngineError::State(_))));
    }

    #[test]
    fn test_identities_are_isolated_and_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        store.save_checkpoint("team/agent one", &checkpoint()).unwrap();
        assert!(dir.path().join("agents/team_agent_one/checkpoint.json").exists());
        assert!(store.load_checkpoint("other").unwrap().is_none());

        assert_eq!(sanitize_identity(".."), "_");
        assert_eq!(sanitize_identity("claude-2.x"), "claude-2.x");
    }
}
