//! Structured logging setup.
//!
//! Logs go to stderr so stdout carries only command output. `RUST_LOG` wins over
//! `--log-level`.

use tracing_subscriber::EnvFilter;

use crate::error::CliError;

pub fn init_tracing(json: bool, level: &str) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|error| CliError::Telemetry(error.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|error| CliError::Telemetry(error.to_string()))
}
