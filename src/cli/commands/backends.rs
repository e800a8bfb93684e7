//! `drover backends`

use serde::Serialize;

use crate::adapters::backends::BackendRegistry;
use crate::cli::output::{list_table, output, CommandOutput};
use crate::domain::models::{BackendSpec, Config};

#[derive(Debug, Serialize)]
pub struct BackendListOutput {
    pub active: String,
    pub backends: Vec<BackendSpec>,
}

impl CommandOutput for BackendListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["", "id", "command", "default model", "fallback chain"]);
        for spec in &self.backends {
            let marker = if spec.id == self.active { "*" } else { "" };
            let chain = if spec.fallback_chain.is_empty() {
                "-".to_string()
            } else {
                spec.fallback_chain.join(" > ")
            };
            table.add_row(vec![
                marker.to_string(),
                spec.id.clone(),
                spec.command.clone(),
                spec.default_model.clone(),
                chain,
            ]);
        }
        table.to_string()
    }
}

pub fn list(config: &Config) -> BackendListOutput {
    let registry = BackendRegistry::new().with_custom(config.backends.clone());
    BackendListOutput {
        active: config.agent.backend.clone(),
        backends: registry.list().cloned().collect(),
    }
}

pub fn execute(config: &Config, json_mode: bool) {
    output(&list(config), json_mode);
}
