// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Font compile CLI
//!
//! Compiles a `.babelfont` JSON file to a font binary on a child-process
//! worker.
//!
//! Usage:
//!
//! ```text
//! fontshell-compile --input <path> [--output <path>] [--worker <command>] [--timeout-ms <n>]
//! ```
//!
//! Example:
//!
//! ```text
//! fontshell-compile --input MyFont.babelfont --worker "fontc-worker --stdio"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use fontshell_core::{CompileJob, ProcessSpawner, ShellConfig, WorkerManager, telemetry};

fn print_usage() {
    eprintln!(
        r#"Usage: fontshell-compile [OPTIONS]

Compile a .babelfont JSON file to a font binary.

OPTIONS:
    --input <path>         Path to the .babelfont JSON file (required)
    --output <path>        Output path (default: <input stem>.ttf next to the input)
    --worker <command>     Worker command line (default: $FONTSHELL_WORKER_COMMAND)
    --timeout-ms <n>       Worker boot timeout (default: $FONTSHELL_BOOT_TIMEOUT_MS or 30000)
    --help                 Show this help message

ENVIRONMENT:
    FONTSHELL_WORKER_COMMAND     Worker command line
    FONTSHELL_BOOT_TIMEOUT_MS    Worker boot timeout in milliseconds

EXAMPLES:
    fontshell-compile --input MyFont.babelfont --worker "fontc-worker --stdio"
    fontshell-compile --input MyFont.babelfont --output dist/MyFont.ttf
"#
    );
}

struct Args {
    input_path: PathBuf,
    output_path: Option<PathBuf>,
    worker_command: Option<String>,
    boot_timeout_ms: Option<u64>,
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = std::env::args().collect();

    let mut input_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut worker_command: Option<String> = None;
    let mut boot_timeout_ms: Option<u64> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--input" => {
                i += 1;
                let value = args.get(i).ok_or("--input requires a path")?;
                input_path = Some(PathBuf::from(value));
            }
            "--output" => {
                i += 1;
                let value = args.get(i).ok_or("--output requires a path")?;
                output_path = Some(PathBuf::from(value));
            }
            "--worker" => {
                i += 1;
                let value = args.get(i).ok_or("--worker requires a command")?;
                worker_command = Some(value.clone());
            }
            "--timeout-ms" => {
                i += 1;
                let value = args.get(i).ok_or("--timeout-ms requires a number")?;
                boot_timeout_ms = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid timeout: {}", value))?,
                );
            }
            arg => {
                return Err(format!("Unknown argument: {}", arg));
            }
        }
        i += 1;
    }

    let input_path = input_path.ok_or("--input is required")?;

    Ok(Args {
        input_path,
        output_path,
        worker_command,
        boot_timeout_ms,
    })
}

fn source_filename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn run(args: Args) -> anyhow::Result<PathBuf> {
    let mut config = ShellConfig::from_env()?;
    if let Some(command) = args.worker_command {
        config = config.with_worker_command(command);
    }
    if let Some(timeout_ms) = args.boot_timeout_ms {
        config = config.with_boot_timeout_ms(timeout_ms);
    }
    config.validate()?;

    let Some(command) = config.worker_command.as_deref() else {
        bail!("no worker command given (use --worker or FONTSHELL_WORKER_COMMAND)");
    };
    let spawner = ProcessSpawner::from_command_line(command)?;

    let source = fs::read_to_string(&args.input_path)
        .with_context(|| format!("reading {}", args.input_path.display()))?;
    serde_json::from_str::<serde_json::Value>(&source)
        .with_context(|| format!("{} is not valid JSON", args.input_path.display()))?;

    let job = CompileJob::new(source, source_filename(&args.input_path));
    let output_path = args
        .output_path
        .unwrap_or_else(|| args.input_path.with_file_name(job.output_filename()));

    eprintln!("Compiling {} with {}", args.input_path.display(), command);

    let worker = WorkerManager::builder(Arc::new(spawner))
        .boot_timeout(config.boot_timeout())
        .build::<()>();
    let outcome = worker.submit(job, ()).await;
    worker.shutdown();
    let completion = outcome.context("compilation failed")?;

    fs::write(&output_path, &completion.value.font.bytes)
        .with_context(|| format!("writing {}", output_path.display()))?;

    eprintln!("Compilation successful:");
    eprintln!("  Font size: {} bytes", completion.value.font.len());
    eprintln!("  Worker time: {} ms", completion.value.time_taken_ms);

    Ok(output_path)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Initialize minimal logging (default to warn if RUST_LOG not set)
    if let Err(e) = telemetry::init_subscriber_with_default("warn") {
        eprintln!("Warning: {}", e);
    }

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(output_path) => {
            // Print final path to stdout for scripts to capture
            println!("{}", output_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
