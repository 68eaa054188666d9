// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pre-activation webhook trigger (typically rotates the proxy's egress IP).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::PacelineError;

#[async_trait]
pub trait WebhookTrigger: Send + Sync + 'static {
    /// Fires the webhook. A dropped connection counts as success.
    async fn invoke(&self, url: &str, method: &str, timeout: Duration)
    -> Result<(), PacelineError>;
}
