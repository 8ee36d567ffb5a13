//! CLI argument definitions for GridPulse.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `snapshot` | Print the current fused snapshot |
//! | `health` | Run one cycle and print breaker and cache health |
//! | `sources` | List configured sources |
//! | `watch` | Refresh on an interval and print each snapshot |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | built-in | TOML config file (`GRIDPULSE_CONFIG`) |
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Fail when only simulated data is available |
//! | `--offline` | `false` | Never touch the network |
//! | `--log-level` | `warn` | Log filter when `RUST_LOG` is unset |
//! | `--log-json` | `false` | Emit logs as JSON lines |
//!
//! # Examples
//!
//! ```bash
//! gridpulse snapshot --pretty
//! gridpulse --config config/gridpulse.toml health --format table
//! gridpulse watch --interval-secs 60 --count 5
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// GridPulse - resilient energy market snapshot aggregator
#[derive(Debug, Parser)]
#[command(
    name = "gridpulse",
    author,
    version,
    about = "Resilient multi-source energy market snapshots",
    long_about = "GridPulse polls several energy market data sources concurrently, fuses their \
values field by field with provenance, and falls back to clearly labeled simulated data when \
no source is reachable.\n\
\n\
Use 'gridpulse <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Engine configuration file.
    #[arg(long, global = true, env = "GRIDPULSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Exit with code 5 when the snapshot is simulated.
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Use an in-process transport that reaches no upstream.
    #[arg(long, global = true, default_value_t = false)]
    pub offline: bool,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the current fused snapshot.
    Snapshot(SnapshotArgs),
    /// Run one cycle, then print per-source breaker state and cache status.
    Health,
    /// List configured sources in priority order.
    Sources,
    /// Refresh periodically and print each new snapshot as one JSON line.
    Watch(WatchArgs),
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Bypass the cache and run a fresh cycle.
    #[arg(long, default_value_t = false)]
    pub fresh: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Seconds between refreshes.
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_secs: u64,

    /// Stop after this many snapshots.
    #[arg(long)]
    pub count: Option<u32>,
}
