use gridpulse_core::{AggregationEngine, FusedSnapshot, MarketMetric};

use crate::cli::SnapshotArgs;
use crate::error::CliError;

use super::{format_value, CommandResult};

pub async fn run(args: &SnapshotArgs, engine: &AggregationEngine) -> Result<CommandResult, CliError> {
    let snapshot = if args.fresh {
        engine.refresh().await
    } else {
        engine.get_snapshot().await
    };

    let data = serde_json::to_value(&*snapshot)?;
    Ok(CommandResult::ok(data)
        .with_table(table(&snapshot))
        .with_simulated(snapshot.is_simulated()))
}

pub(super) fn table(snapshot: &FusedSnapshot) -> Vec<String> {
    let quality = &snapshot.data.data_quality;
    let mut lines = vec![
        format!("timestamp   : {}", snapshot.timestamp),
        format!("sources     : {}", snapshot.data_source.join(",")),
        format!("live        : {}", snapshot.live_data_enabled),
        format!(
            "quality     : reliability={} success={} used={}/{}",
            quality.reliability_score,
            quality.success_rate,
            quality.sources_used,
            quality.sources_configured
        ),
    ];

    for metric in MarketMetric::ALL {
        lines.push(format!(
            "{:<12}: {}",
            metric.as_str(),
            format_value(snapshot.market(metric))
        ));
    }

    for (region, values) in &snapshot.data.regional_data {
        lines.push(format!(
            "{region:<12}: price={} demand={} generation={} interchange={}",
            format_value(values.price),
            format_value(values.demand),
            format_value(values.generation),
            format_value(values.net_interchange)
        ));
    }
    lines
}
