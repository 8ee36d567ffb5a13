use gridpulse_core::AggregationEngine;

use crate::error::CliError;

use super::CommandResult;

pub async fn run(engine: &AggregationEngine) -> Result<CommandResult, CliError> {
    let snapshot = engine.refresh().await;
    let health = engine.health();

    let mut table = Vec::with_capacity(health.sources.len() + 1);
    for source in &health.sources {
        table.push(format!(
            "{:<16} p{:<3} {:<10} failures={} success_rate={} cooldown_ms={}",
            source.name,
            source.priority,
            source.state.as_str(),
            source.consecutive_failures,
            source
                .success_rate
                .map_or_else(|| String::from("-"), |rate| format!("{rate:.2}")),
            source
                .cooldown_remaining_ms
                .map_or_else(|| String::from("-"), |ms| ms.to_string()),
        ));
    }
    table.push(format!(
        "cache            refreshing={} expires_in_ms={}",
        health.cache.refreshing,
        health
            .cache
            .expires_in_ms
            .map_or_else(|| String::from("-"), |ms| ms.to_string()),
    ));

    let data = serde_json::to_value(&health)?;
    Ok(CommandResult::ok(data)
        .with_table(table)
        .with_simulated(snapshot.is_simulated()))
}
