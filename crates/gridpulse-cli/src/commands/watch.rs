use std::time::Duration;

use gridpulse_core::AggregationEngine;
use tracing::info;

use crate::cli::{Cli, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::snapshot;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Prints every snapshot the background refresher stores until `--count` is reached or
/// the process is interrupted.
pub async fn run(args: &WatchArgs, engine: &AggregationEngine, cli: &Cli) -> Result<(), CliError> {
    let refresher = engine.spawn_auto_refresh(Duration::from_secs(args.interval_secs));
    let mut poll = tokio::time::interval(POLL_INTERVAL);
    let mut last_seen = None;
    let mut printed = 0u32;

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; stopping watch");
                break Ok(());
            }
            _ = poll.tick() => {}
        }

        let refreshed_at = engine.health().cache.last_refresh_at;
        if refreshed_at.is_none() || refreshed_at == last_seen {
            continue;
        }
        last_seen = refreshed_at;

        let current = engine.get_snapshot().await;
        let printed_line = match cli.format {
            OutputFormat::Json => output::print_json(&serde_json::to_value(&*current)?, false),
            OutputFormat::Table => {
                output::print_table(&snapshot::table(&current));
                println!();
                Ok(())
            }
        };
        if let Err(error) = printed_line {
            break Err(error);
        }

        printed += 1;
        if args.count.is_some_and(|count| printed >= count) {
            break Ok(());
        }
    };

    refresher.abort();
    outcome
}
