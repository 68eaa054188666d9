// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`AccountStore`] backed by the loaded configuration.
//!
//! Templates come from each account's `[accounts.templates]`, media files
//! are read from the paths in `[accounts.media]`, and statistics are kept in
//! memory for the lifetime of the process.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use paceline_config::PacelineConfig;
use paceline_config::model::AccountConfig;
use paceline_core::{
    AccountId, AccountStore, MediaPayload, MediaSlot, PacelineError, ReplyContext, StatKind,
};
use rand::seq::SliceRandom;

use crate::{lock, read, write};

#[derive(Default)]
pub struct ConfigStore {
    accounts: RwLock<HashMap<AccountId, AccountConfig>>,
    counters: Mutex<HashMap<(AccountId, StatKind), u64>>,
}

impl ConfigStore {
    pub fn new(config: &PacelineConfig) -> Self {
        let store = Self::default();
        for account in &config.accounts {
            store.upsert(account.clone());
        }
        store
    }

    /// Adds or replaces an account's stored configuration.
    pub fn upsert(&self, account: AccountConfig) {
        write(&self.accounts).insert(account.account_id(), account);
    }

    /// Persisted value of one counter.
    pub fn count(&self, account: &AccountId, stat: StatKind) -> u64 {
        lock(&self.counters)
            .get(&(account.clone(), stat))
            .copied()
            .unwrap_or(0)
    }

    fn account(&self, id: &AccountId) -> Result<AccountConfig, PacelineError> {
        read(&self.accounts)
            .get(id)
            .cloned()
            .ok_or_else(|| PacelineError::AccountNotFound(id.to_string()))
    }
}

/// MIME type from a file extension; unknown extensions are sent as binary.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "ogg" | "opus" => "audio/ogg",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "pdf" => "application/pdf",
        "vcf" => "text/vcard",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl AccountStore for ConfigStore {
    async fn templates(
        &self,
        account: &AccountId,
        context: ReplyContext,
    ) -> Result<Vec<String>, PacelineError> {
        Ok(self.account(account)?.templates.for_context(context).to_vec())
    }

    async fn pick_media(
        &self,
        account: &AccountId,
        slot: MediaSlot,
    ) -> Result<Option<MediaPayload>, PacelineError> {
        let config = self.account(account)?;
        let pool = match slot {
            MediaSlot::Media => &config.media.files,
            MediaSlot::Document => &config.media.documents,
        };
        let Some(path) = pool.choose(&mut rand::thread_rng()).cloned() else {
            return Ok(None);
        };
        let path = Path::new(&path);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PacelineError::Storage {
                source: Box::new(e),
            })?;
        Ok(Some(MediaPayload {
            bytes,
            mime_type: mime_for(path).to_string(),
            file_name: path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string),
            caption: None,
        }))
    }

    async fn increment_stat(
        &self,
        account: &AccountId,
        stat: StatKind,
    ) -> Result<(), PacelineError> {
        *lock(&self.counters)
            .entry((account.clone(), stat))
            .or_insert(0) += 1;
        Ok(())
    }
}
