// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Paceline - humanized multi-account chat orchestrator.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod driver;
mod serve;

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveTime};
use clap::{Parser, Subcommand};
use paceline_config::PacelineConfig;
use paceline_config::model::parse_time_of_day;
use paceline_engine::is_within_window;

/// Paceline - humanized multi-account chat orchestrator.
#[derive(Parser, Debug)]
#[command(name = "paceline", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the default hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the orchestration engine.
    Serve,
    /// Load and validate the configuration, then exit.
    CheckConfig,
    /// Evaluate an activation window.
    Window {
        /// Window start, `HH:MM`.
        start: String,
        /// Window end, `HH:MM`. Wraps past midnight when earlier than start.
        end: String,
        /// Time to evaluate, `HH:MM`. Defaults to the local time.
        #[arg(long)]
        at: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve) => {
            let config = load_or_exit(cli.config.as_deref());
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig) => {
            let config = load_or_exit(cli.config.as_deref());
            println!("{}", config_summary(&config));
        }
        Some(Commands::Window { start, end, at }) => {
            match window_report(&start, &end, at.as_deref(), Local::now().time()) {
                Ok(report) => println!("{report}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(2);
                }
            }
        }
        None => {
            println!("paceline: use --help for available commands");
        }
    }
}

/// Loads and validates configuration, rendering diagnostics and exiting on error.
fn load_or_exit(path: Option<&Path>) -> PacelineConfig {
    let loaded = match path {
        Some(path) => paceline_config::load_and_validate_path(path),
        None => paceline_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            paceline_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

fn config_summary(config: &PacelineConfig) -> String {
    let scheduled = config
        .accounts
        .iter()
        .filter(|a| a.schedule.is_some())
        .count();
    let proxied = config.accounts.iter().filter(|a| a.proxy.is_some()).count();
    format!(
        "config ok: {} account(s), {scheduled} scheduled, {proxied} behind a proxy",
        config.accounts.len()
    )
}

/// Describes whether `at` (or `now`) falls inside the `start`..`end` window.
fn window_report(
    start: &str,
    end: &str,
    at: Option<&str>,
    now: NaiveTime,
) -> Result<String, String> {
    let parse = |label: &str, value: &str| {
        parse_time_of_day(value).map_err(|e| format!("invalid {label} time `{value}`: {e}"))
    };
    let start_time = parse("start", start)?;
    let end_time = parse("end", end)?;
    let at_time = match at {
        Some(value) => parse("--at", value)?,
        None => now,
    };

    let verdict = if is_within_window(at_time, start_time, end_time) {
        "inside"
    } else {
        "outside"
    };
    Ok(format!(
        "{} is {verdict} the window {}-{}",
        at_time.format("%H:%M"),
        start_time.format("%H:%M"),
        end_time.format("%H:%M"),
    ))
}
