// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote session driver traits (one session per account).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::PacelineError;
use crate::types::{AccountId, DriverEvent, MediaPayload, ProxyDescriptor};

/// Opens remote chat sessions.
///
/// The factory hands the new session an event sender; lifecycle signals and
/// inbound messages for the account are pushed through it.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    async fn open(
        &self,
        account: &AccountId,
        proxy: Option<&ProxyDescriptor>,
        events: mpsc::Sender<DriverEvent>,
    ) -> Result<Arc<dyn ChatSession>, PacelineError>;
}

/// A live, authenticated-or-authenticating chat session for one account.
#[async_trait]
pub trait ChatSession: Send + Sync + 'static {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), PacelineError>;

    async fn send_media(&self, to: &str, media: &MediaPayload) -> Result<(), PacelineError>;

    async fn mark_seen(&self, chat_id: &str) -> Result<(), PacelineError>;

    /// Marks a voice message as played.
    async fn mark_played(&self, chat_id: &str, message_id: &str) -> Result<(), PacelineError>;

    async fn set_typing(&self, chat_id: &str, on: bool) -> Result<(), PacelineError>;

    async fn set_recording(&self, chat_id: &str, on: bool) -> Result<(), PacelineError>;

    /// Suspends the session and releases its network resources.
    async fn pause(&self) -> Result<(), PacelineError>;

    /// Reconnects a paused session in place.
    async fn resume(&self) -> Result<(), PacelineError>;

    /// Tears the session down for good.
    async fn close(&self) -> Result<(), PacelineError>;
}
