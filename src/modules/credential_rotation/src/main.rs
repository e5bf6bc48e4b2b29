/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/modules/credential_rotation/src/main.rs
 *
 * Entrypoint of the `credential-rotation` binary run by the scheduled task.
 * Parses the configuration (cli.rs), installs the log subscriber, runs one
 * rotation and prints the report. The process exit code tells the scheduler
 * how the run ended:
 *
 *   0  rotated (or dry run completed)
 *   1  setup problem (AWS CLI missing, logging could not start)
 *   2  failed before the runtime config was touched
 *   3  failed after the flip and rolled back to the previous slot
 *   4  rollback did not complete, manual intervention required
 *   5  new slot is live but could not be recorded in the secret
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::error;

mod cli;

use cli::{Cli, OutputFormat};
use credential_rotation::RotationReport;

fn print_report(report: &RotationReport, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Text => println!("{}", report),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report).context("Failed to serialize the rotation report")?;
            println!("{}", json);
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = tracing_layer::init(cli.log_format) {
        eprintln!("Error: failed to initialize logging: {}", e);
        return ExitCode::from(1);
    }

    match credential_rotation::run(cli.context(), cli.settings()).await {
        Ok(report) => match print_report(&report, cli.output) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %format!("{:#}", e), "rotation finished but the report could not be printed");
                ExitCode::from(1)
            }
        },
        Err(e) => {
            let code = e.exit_code();
            error!(error = %e, exit_code = code, requires_operator = e.requires_operator(), "credential rotation failed");
            eprintln!("Error: {}", e);
            ExitCode::from(code)
        }
    }
}
