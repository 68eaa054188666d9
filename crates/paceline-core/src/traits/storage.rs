// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence contract for templates, media pools, and statistics.

use async_trait::async_trait;

use crate::error::PacelineError;
use crate::types::{AccountId, MediaPayload, MediaSlot, ReplyContext, StatKind};

/// Read/write access to per-account persisted data.
///
/// Callers treat every error as transient and fall back to their last
/// in-memory snapshot.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Message templates for one reply context.
    async fn templates(
        &self,
        account: &AccountId,
        context: ReplyContext,
    ) -> Result<Vec<String>, PacelineError>;

    /// Picks a media file from the account's pool, if any is configured.
    async fn pick_media(
        &self,
        account: &AccountId,
        slot: MediaSlot,
    ) -> Result<Option<MediaPayload>, PacelineError>;

    /// Increments a persisted statistics counter.
    async fn increment_stat(&self, account: &AccountId, stat: StatKind)
    -> Result<(), PacelineError>;
}
