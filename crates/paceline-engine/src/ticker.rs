// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-interval tick loop shared by the coordinators.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use paceline_core::PacelineError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Calls `tick` every `period` until `cancel` fires.
///
/// A tick that returns an error or panics is logged and the loop carries on
/// with the next tick. The first tick runs immediately.
pub async fn run_ticker<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), PacelineError>>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(ticker = name, period = ?period, "ticker started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match AssertUnwindSafe(tick()).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!(ticker = name, error = %e, "tick failed");
                    }
                    Err(panic) => {
                        let message = panic
                            .downcast_ref::<&str>()
                            .map(|s| (*s).to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "non-string panic payload".to_string());
                        error!(ticker = name, panic = %message, "tick panicked");
                    }
                }
            }
            _ = cancel.cancelled() => {
                info!(ticker = name, "ticker shutting down");
                break;
            }
        }
    }
}
