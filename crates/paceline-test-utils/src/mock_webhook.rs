// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock webhook trigger recording invocations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use paceline_core::{PacelineError, WebhookTrigger};

#[derive(Default)]
pub struct MockWebhook {
    calls: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl MockWebhook {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(url, method)` of every invocation, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl WebhookTrigger for MockWebhook {
    async fn invoke(
        &self,
        url: &str,
        method: &str,
        _timeout: Duration,
    ) -> Result<(), PacelineError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((url.to_string(), method.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            Err(PacelineError::Webhook("mock webhook failure".into()))
        } else {
            Ok(())
        }
    }
}
