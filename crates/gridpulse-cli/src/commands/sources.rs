use serde::Serialize;

use gridpulse_core::{EngineConfig, SourceDescriptor};

use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfiguredSource {
    #[serde(flatten)]
    descriptor: SourceDescriptor,
    /// Whether the configured API key variable is set; the key itself is never printed.
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key_present: Option<bool>,
}

#[derive(Debug, Serialize)]
struct SourcesResponseData {
    sources: Vec<ConfiguredSource>,
}

pub fn run(config: &EngineConfig) -> Result<CommandResult, CliError> {
    let mut sources = config
        .sources
        .iter()
        .map(|source| {
            Ok(ConfiguredSource {
                descriptor: source.descriptor()?,
                api_key_present: source
                    .api_key_env
                    .as_ref()
                    .map(|_| source.api_key().is_some()),
            })
        })
        .collect::<Result<Vec<_>, CliError>>()?;
    sources.sort_by(|left, right| {
        (left.descriptor.priority, &left.descriptor.name)
            .cmp(&(right.descriptor.priority, &right.descriptor.name))
    });

    let table = sources
        .iter()
        .map(|source| {
            format!(
                "{:<16} p{:<3} {:<14} timeout_ms={} retry_budget={} {}",
                source.descriptor.name,
                source.descriptor.priority,
                source.descriptor.kind.as_str(),
                source.descriptor.timeout.as_millis(),
                source.descriptor.retry_budget,
                source.descriptor.endpoint
            )
        })
        .collect();

    let data = serde_json::to_value(SourcesResponseData { sources })?;
    Ok(CommandResult::ok(data).with_table(table))
}
