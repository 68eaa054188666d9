// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory [`AccountStore`] with failure injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use paceline_core::{
    AccountId, AccountStore, MediaPayload, MediaSlot, PacelineError, ReplyContext, StatKind,
};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock store for testing.
///
/// Templates default to empty, so the engine falls back to the account's
/// configured templates unless a test sets some here.
#[derive(Default)]
pub struct MockStore {
    templates: Mutex<HashMap<(AccountId, ReplyContext), Vec<String>>>,
    media: Mutex<HashMap<(AccountId, MediaSlot), MediaPayload>>,
    stats: Mutex<Vec<(AccountId, StatKind)>>,
    fail_templates: AtomicBool,
    fail_stats: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_templates(&self, account: &AccountId, context: ReplyContext, templates: &[&str]) {
        guard(&self.templates).insert(
            (account.clone(), context),
            templates.iter().map(|t| t.to_string()).collect(),
        );
    }

    pub fn set_media(&self, account: &AccountId, slot: MediaSlot, payload: MediaPayload) {
        guard(&self.media).insert((account.clone(), slot), payload);
    }

    /// Makes `templates` fail until switched off.
    pub fn fail_templates(&self, fail: bool) {
        self.fail_templates.store(fail, Ordering::SeqCst);
    }

    /// Makes `increment_stat` fail until switched off.
    pub fn fail_stats(&self, fail: bool) {
        self.fail_stats.store(fail, Ordering::SeqCst);
    }

    /// How many times `stat` was incremented for `account`.
    pub fn stat_count(&self, account: &AccountId, stat: StatKind) -> usize {
        guard(&self.stats)
            .iter()
            .filter(|(id, s)| id == account && *s == stat)
            .count()
    }

    /// Every increment, in order.
    pub fn stat_log(&self) -> Vec<(AccountId, StatKind)> {
        guard(&self.stats).clone()
    }
}

#[async_trait]
impl AccountStore for MockStore {
    async fn templates(
        &self,
        account: &AccountId,
        context: ReplyContext,
    ) -> Result<Vec<String>, PacelineError> {
        if self.fail_templates.load(Ordering::SeqCst) {
            return Err(PacelineError::Storage {
                source: "mock template read failure".into(),
            });
        }
        Ok(guard(&self.templates)
            .get(&(account.clone(), context))
            .cloned()
            .unwrap_or_default())
    }

    async fn pick_media(
        &self,
        account: &AccountId,
        slot: MediaSlot,
    ) -> Result<Option<MediaPayload>, PacelineError> {
        Ok(guard(&self.media).get(&(account.clone(), slot)).cloned())
    }

    async fn increment_stat(
        &self,
        account: &AccountId,
        stat: StatKind,
    ) -> Result<(), PacelineError> {
        if self.fail_stats.load(Ordering::SeqCst) {
            return Err(PacelineError::Storage {
                source: "mock stat write failure".into(),
            });
        }
        guard(&self.stats).push((account.clone(), stat));
        Ok(())
    }
}
