mod health;
mod snapshot;
mod sources;
mod watch;

use std::sync::Arc;

use gridpulse_core::{
    AggregationEngine, EngineConfig, HttpClient, ReqwestHttpClient, StaticHttpClient,
};
use serde_json::Value;
use tracing::info;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Output of a one-shot command.
pub struct CommandResult {
    pub data: Value,
    /// Human-readable rendering for `--format table`.
    pub table: Vec<String>,
    /// Set when the payload carries simulated values.
    pub simulated: bool,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            table: Vec::new(),
            simulated: false,
        }
    }

    pub fn with_table(mut self, table: Vec<String>) -> Self {
        self.table = table;
        self
    }

    pub fn with_simulated(mut self, simulated: bool) -> Self {
        self.simulated = simulated;
        self
    }
}

/// Runs the selected command. Streaming commands print as they go and return `None`.
pub async fn run(cli: &Cli) -> Result<Option<CommandResult>, CliError> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::builtin(),
    };
    info!(
        sources = config.sources.len(),
        offline = cli.offline,
        "configuration loaded"
    );

    let engine = match &cli.command {
        Command::Sources => return sources::run(&config).map(Some),
        _ => AggregationEngine::from_config(&config, http_client(cli.offline))?,
    };

    match &cli.command {
        Command::Snapshot(args) => snapshot::run(args, &engine).await.map(Some),
        Command::Health => health::run(&engine).await.map(Some),
        Command::Watch(args) => {
            watch::run(args, &engine, cli).await?;
            Ok(None)
        }
        Command::Sources => sources::run(&config).map(Some),
    }
}

fn http_client(offline: bool) -> Arc<dyn HttpClient> {
    if offline {
        Arc::new(StaticHttpClient::new())
    } else {
        Arc::new(ReqwestHttpClient::new())
    }
}

fn format_value(value: Option<f64>) -> String {
    value.map_or_else(|| String::from("-"), |value| format!("{value:.2}"))
}
