// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dry-run session driver.
//!
//! Stands in for the remote chat driver: every session reports ready at once
//! and each primitive is logged instead of performed, so a configuration can
//! be exercised end to end without touching a real account.

use std::sync::Arc;

use async_trait::async_trait;
use paceline_core::{
    AccountId, ChatSession, DriverEvent, MediaPayload, PacelineError, ProxyDescriptor,
    SessionFactory,
};
use tokio::sync::mpsc;
use tracing::info;

pub struct DryRunFactory;

#[async_trait]
impl SessionFactory for DryRunFactory {
    async fn open(
        &self,
        account: &AccountId,
        proxy: Option<&ProxyDescriptor>,
        events: mpsc::Sender<DriverEvent>,
    ) -> Result<Arc<dyn ChatSession>, PacelineError> {
        let route = proxy.map_or_else(|| "direct".to_string(), ProxyDescriptor::endpoint);
        info!(account = %account, route = %route, "dry-run session opened");
        events
            .send(DriverEvent::Ready { own_id: None })
            .await
            .map_err(|_| PacelineError::driver("event receiver dropped"))?;
        Ok(Arc::new(DryRunSession {
            account: account.clone(),
            _events: events,
        }))
    }
}

/// Logs every primitive. Holding the event sender keeps the pump alive.
pub struct DryRunSession {
    account: AccountId,
    _events: mpsc::Sender<DriverEvent>,
}

#[async_trait]
impl ChatSession for DryRunSession {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), PacelineError> {
        info!(account = %self.account, to, text, "send text");
        Ok(())
    }

    async fn send_media(&self, to: &str, media: &MediaPayload) -> Result<(), PacelineError> {
        info!(
            account = %self.account,
            to,
            file = media.file_name.as_deref().unwrap_or("-"),
            mime = %media.mime_type,
            bytes = media.bytes.len(),
            "send media"
        );
        Ok(())
    }

    async fn mark_seen(&self, chat_id: &str) -> Result<(), PacelineError> {
        info!(account = %self.account, chat_id, "mark seen");
        Ok(())
    }

    async fn mark_played(&self, chat_id: &str, message_id: &str) -> Result<(), PacelineError> {
        info!(account = %self.account, chat_id, message_id, "mark played");
        Ok(())
    }

    async fn set_typing(&self, chat_id: &str, on: bool) -> Result<(), PacelineError> {
        info!(account = %self.account, chat_id, on, "typing");
        Ok(())
    }

    async fn set_recording(&self, chat_id: &str, on: bool) -> Result<(), PacelineError> {
        info!(account = %self.account, chat_id, on, "recording");
        Ok(())
    }

    async fn pause(&self) -> Result<(), PacelineError> {
        info!(account = %self.account, "session paused");
        Ok(())
    }

    async fn resume(&self) -> Result<(), PacelineError> {
        info!(account = %self.account, "session resumed");
        Ok(())
    }

    async fn close(&self) -> Result<(), PacelineError> {
        info!(account = %self.account, "session closed");
        Ok(())
    }
}
