//! Behavior-driven tests for CLI user journeys.
//!
//! Each test runs the `gridpulse` binary as a user would and checks what they observe:
//! stdout payloads, table lines, and exit codes. Sources are either served by the offline
//! transport or point at a closed loopback port, so no test depends on a live upstream.

use std::io::Write;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::NamedTempFile;

const TWO_SOURCES: &str = r#"
[engine]
global_deadline_ms = 1500
fetch_grace_ms = 100

[[sources]]
name = "backup-feed"
kind = "generic"
endpoint = "http://127.0.0.1:1/backup.json"
priority = 5
timeout_ms = 500
retry_budget = 1

[[sources]]
name = "primary-feed"
kind = "aemo"
endpoint = "http://127.0.0.1:1/summary"
priority = 1
timeout_ms = 500
retry_budget = 4
api_key_env = "GRIDPULSE_JOURNEY_KEY"
"#;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gridpulse"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("GRIDPULSE_CONFIG")
        .env_remove("GRIDPULSE_JOURNEY_KEY")
        .output()
        .unwrap_or_else(|err| panic!("failed to execute gridpulse: {err}"))
}

fn run_with_config(config: &NamedTempFile, args: &[&str]) -> Output {
    let path = config.path().to_str().expect("utf-8 temp path");
    let mut full = vec!["--config", path];
    full.extend_from_slice(args);
    run_cli(&full)
}

fn parse_stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not valid JSON: {e}\nstdout={}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_owned)
        .collect()
}

// =============================================================================
// CLI User Journey: Snapshots
// =============================================================================

#[test]
fn user_gets_a_labeled_simulated_snapshot_when_offline() {
    // Given: A user with no reachable upstream
    // When: They ask for a snapshot
    let output = run_cli(&["--offline", "snapshot"]);

    // Then: The command succeeds with a simulated snapshot that says so
    assert_eq!(output.status.code(), Some(0));
    let snapshot = parse_stdout_json(&output);
    assert_eq!(snapshot["liveDataEnabled"], Value::Bool(false));
    assert_eq!(snapshot["dataSource"], serde_json::json!(["Simulated Data"]));
    assert!(snapshot["data"]["marketOverview"]["currentPrice"].is_number());
    assert!(snapshot["timestamp"].is_string());
}

#[test]
fn strict_mode_fails_with_code_5_on_simulated_data() {
    // Given: A user who refuses simulated values
    // When: No source can deliver
    let output = run_cli(&["--offline", "--strict", "snapshot"]);

    // Then: The snapshot is still printed, but the exit code flags it
    assert_eq!(output.status.code(), Some(5));
    let snapshot = parse_stdout_json(&output);
    assert_eq!(snapshot["liveDataEnabled"], Value::Bool(false));
    assert!(String::from_utf8_lossy(&output.stderr).contains("strict mode"));
}

#[test]
fn table_format_prints_labeled_lines() {
    // Given: A user reading the terminal
    // When: They request the table rendering
    let output = run_cli(&["--offline", "--format", "table", "snapshot", "--fresh"]);

    // Then: Each line is labeled and nothing is JSON
    assert_eq!(output.status.code(), Some(0));
    let lines = stdout_lines(&output);
    assert!(lines.iter().any(|line| line.starts_with("sources     : Simulated Data")));
    assert!(lines.iter().any(|line| line.starts_with("live        : false")));
    assert!(lines.iter().any(|line| line.starts_with("currentPrice")));
    assert!(serde_json::from_slice::<Value>(&output.stdout).is_err());
}

#[test]
fn unreachable_endpoints_fall_back_without_failing() {
    // Given: Sources configured against a closed local port
    let config = config_file(TWO_SOURCES);

    // When: The user asks for a snapshot over the real transport
    let output = run_with_config(&config, &["snapshot"]);

    // Then: Both sources were attempted and the simulated snapshot is served
    assert_eq!(output.status.code(), Some(0));
    let snapshot = parse_stdout_json(&output);
    assert_eq!(snapshot["liveDataEnabled"], Value::Bool(false));
    assert_eq!(snapshot["data"]["dataQuality"]["sourcesConfigured"], 2);
    assert_eq!(snapshot["data"]["dataQuality"]["sourcesUsed"], 0);
}

#[test]
fn watch_stops_after_the_requested_count() {
    // Given: A user watching for a single refresh
    // When: The watch runs offline
    let output = run_cli(&["--offline", "watch", "--interval-secs", "1", "--count", "1"]);

    // Then: Exactly one snapshot line is printed and the command exits cleanly
    assert_eq!(output.status.code(), Some(0));
    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 1);
    let snapshot: Value = serde_json::from_str(&lines[0]).expect("json line");
    assert_eq!(snapshot["liveDataEnabled"], Value::Bool(false));
}

// =============================================================================
// CLI User Journey: Sources and Health
// =============================================================================

#[test]
fn sources_are_listed_in_priority_order_with_their_call_policy() {
    // Given: A config listing the backup before the primary
    let config = config_file(TWO_SOURCES);

    // When: The user lists sources
    let output = run_with_config(&config, &["sources"]);

    // Then: The primary comes first and key presence is reported without the key
    assert_eq!(output.status.code(), Some(0));
    let listing = parse_stdout_json(&output);
    let sources = listing["sources"].as_array().expect("sources array");
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0]["name"], "primary-feed");
    assert_eq!(sources[0]["retryBudget"], 4);
    assert_eq!(sources[0]["timeoutMs"], 500);
    assert_eq!(sources[0]["apiKeyPresent"], Value::Bool(false));
    assert_eq!(sources[1]["name"], "backup-feed");
    assert!(sources[1].get("apiKeyPresent").is_none());
}

#[test]
fn sources_table_shows_timeout_and_retry_budget() {
    // Given: The same config
    let config = config_file(TWO_SOURCES);

    // When: The user lists sources as a table
    let output = run_with_config(&config, &["--format", "table", "sources"]);

    // Then: One line per source carries its call policy
    assert_eq!(output.status.code(), Some(0));
    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("primary-feed"));
    assert!(lines[0].contains("timeout_ms=500"));
    assert!(lines[0].contains("retry_budget=4"));
    assert!(lines[1].contains("retry_budget=1"));
}

#[test]
fn health_reports_every_configured_source_after_one_cycle() {
    // Given: Two sources that cannot be reached
    let config = config_file(TWO_SOURCES);

    // When: The user checks health
    let output = run_with_config(&config, &["--offline", "health"]);

    // Then: Each source shows its failure and the cache holds the fallback
    assert_eq!(output.status.code(), Some(0));
    let health = parse_stdout_json(&output);
    let sources = health["sources"].as_array().expect("sources array");
    assert_eq!(sources.len(), 2);
    for source in sources {
        assert_eq!(source["state"], "closed");
        assert_eq!(source["consecutiveFailures"], 1);
    }
    assert_eq!(health["cache"]["refreshing"], Value::Bool(false));
}

// =============================================================================
// CLI User Journey: Failures
// =============================================================================

#[test]
fn missing_config_file_exits_with_code_2() {
    // Given: A config path that does not exist
    // When: The user runs any command with it
    let output = run_cli(&["--config", "/nonexistent/gridpulse.toml", "sources"]);

    // Then: Nothing is printed to stdout and the error names the file
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("gridpulse.toml"));
}

#[test]
fn invalid_config_exits_with_code_2() {
    // Given: A config listing the same source twice
    let duplicated = format!(
        "{}\n[[sources]]\nname = \"primary-feed\"\nkind = \"generic\"\nendpoint = \"http://127.0.0.1:1/\"\n",
        TWO_SOURCES
    );
    let config = config_file(&duplicated);

    // When / Then
    let output = run_with_config(&config, &["--offline", "snapshot"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
}

#[test]
fn unusable_log_filter_exits_with_code_6() {
    // Given: A log filter that names a level that does not exist
    // When: The user runs a command with it
    let output = run_cli(&["--offline", "--log-level", "gridpulse=loudest", "sources"]);

    // Then: Logging setup fails before any command output
    assert_eq!(output.status.code(), Some(6));
    assert!(output.stdout.is_empty());
}
