// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `paceline serve` command implementation.
//!
//! Builds the engine from the loaded configuration, registers every account,
//! starts the ones without an activation window and runs the tick loops until
//! SIGINT/SIGTERM.

use std::sync::Arc;

use paceline_config::PacelineConfig;
use paceline_core::PacelineError;
use paceline_engine::shutdown;
use paceline_engine::{ConfigStore, Engine, HttpWebhook};
use tracing::{info, warn};

use crate::driver::DryRunFactory;

/// Runs the `paceline serve` command.
pub async fn run_serve(config: PacelineConfig) -> Result<(), PacelineError> {
    init_tracing(&config.engine.log_level);

    let store = Arc::new(ConfigStore::new(&config));
    let webhook = Arc::new(HttpWebhook::new()?);
    let engine = Engine::new(
        config.engine.clone(),
        Arc::new(DryRunFactory),
        store,
        webhook,
    );

    for account in config.accounts {
        let scheduled = account.schedule.is_some();
        let id = engine.register_account(account)?;
        if scheduled {
            continue;
        }
        // Scheduled accounts wait for their window; the rest start now.
        if let Err(e) = engine.start(&id).await {
            warn!(account = %id, error = %e, "account failed to start");
        }
    }

    let cancel = shutdown::install_signal_handler();
    engine.run(cancel).await;

    match serde_json::to_string(&engine.stats()) {
        Ok(stats) => info!(stats = %stats, "final statistics"),
        Err(e) => warn!(error = %e, "failed to serialize statistics"),
    }
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "paceline={log_level},paceline_engine={log_level},warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
