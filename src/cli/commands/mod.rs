//! CLI command implementations.

pub mod backends;
pub mod reset;
pub mod run;
pub mod status;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::adapters::state::FileStateStore;
use crate::domain::models::Config;
use crate::domain::ports::StateStore;
use crate::infrastructure::config::ConfigLoader;

/// Load from an explicit file, or from `.drover/` in the current directory.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// The `--identity` flag, or the configured identity.
pub(crate) fn resolve_identity(config: &Config, identity: Option<String>) -> String {
    identity.unwrap_or_else(|| config.identity())
}

pub(crate) fn open_store(config: &Config) -> Arc<dyn StateStore> {
    Arc::new(FileStateStore::new(&config.paths.state_dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_identity() {
        let mut config = Config::default();
        assert_eq!(resolve_identity(&config, None), "claude");
        config.agent.identity = Some("nightly".into());
        assert_eq!(resolve_identity(&config, None), "nightly");
        assert_eq!(resolve_identity(&config, Some("codex".into())), "codex");
    }

    #[test]
    fn test_load_config_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.yaml"))).is_err());
    }
}
