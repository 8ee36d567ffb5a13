use serde_json::Value;

use crate::cli::OutputFormat;
use crate::commands::CommandResult;
use crate::error::CliError;

pub fn render(result: &CommandResult, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => print_json(&result.data, pretty)?,
        OutputFormat::Table if result.table.is_empty() => print_json(&result.data, true)?,
        OutputFormat::Table => print_table(&result.table),
    }

    Ok(())
}

pub fn print_json(value: &Value, pretty: bool) -> Result<(), CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{payload}");
    Ok(())
}

pub fn print_table(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}
