mod cli;
mod commands;
mod error;
mod output;
mod telemetry;

use clap::Parser;
use std::process::ExitCode;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json, &cli.log_level)?;

    let Some(result) = commands::run(&cli).await? else {
        return Ok(ExitCode::SUCCESS);
    };
    output::render(&result, cli.format, cli.pretty)?;

    if cli.strict && result.simulated {
        return Err(CliError::StrictModeViolation {
            reason: String::from("no live source delivered; snapshot is simulated"),
        });
    }

    Ok(ExitCode::SUCCESS)
}
