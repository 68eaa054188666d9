// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message statistics.
//!
//! Counters are kept in memory for `stats()`, mirrored to the metrics-rs
//! facade, and forwarded to the store. Store failures are logged only.

use std::collections::BTreeMap;
use std::sync::Mutex;

use metrics::describe_counter;
use paceline_core::{AccountId, AccountStore, StatKind};
use serde::Serialize;
use tracing::warn;

use crate::lock;

/// Counters for one account (or the fleet total).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccountStats {
    /// Inbound messages accepted by the ingest gate.
    pub messages_received: u64,
    /// Replies delivered, whatever their kind.
    pub messages_sent: u64,
    pub sent_text: u64,
    /// Images and videos.
    pub sent_media: u64,
    pub sent_document: u64,
    /// Voice notes and audio files.
    pub sent_audio: u64,
    /// Synthetic auto-warm sends. Not counted in `messages_sent`.
    pub sent_warm: u64,
}

impl AccountStats {
    fn bump(&mut self, stat: StatKind) {
        let counter = match stat {
            StatKind::MessagesReceived => &mut self.messages_received,
            StatKind::MessagesSent => &mut self.messages_sent,
            StatKind::SentText => &mut self.sent_text,
            StatKind::SentMedia => &mut self.sent_media,
            StatKind::SentDocument => &mut self.sent_document,
            StatKind::SentAudio => &mut self.sent_audio,
            StatKind::SentWarm => &mut self.sent_warm,
        };
        *counter += 1;
    }

    fn add(&mut self, other: &AccountStats) {
        self.messages_received += other.messages_received;
        self.messages_sent += other.messages_sent;
        self.sent_text += other.sent_text;
        self.sent_media += other.sent_media;
        self.sent_document += other.sent_document;
        self.sent_audio += other.sent_audio;
        self.sent_warm += other.sent_warm;
    }
}

/// Serializable view returned by `Engine::stats()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total: AccountStats,
    pub accounts: BTreeMap<String, AccountStats>,
}

/// Register metric descriptions. Safe to call before a recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "paceline_messages_total",
        "Messages received and sent, by account and kind"
    );
}

#[derive(Default)]
pub struct EngineStats {
    accounts: Mutex<BTreeMap<AccountId, AccountStats>>,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments in memory and in the metrics facade.
    pub fn bump(&self, account: &AccountId, stat: StatKind) {
        lock(&self.accounts)
            .entry(account.clone())
            .or_default()
            .bump(stat);
        metrics::counter!(
            "paceline_messages_total",
            "account" => account.to_string(),
            "kind" => stat.to_string()
        )
        .increment(1);
    }

    /// Increments locally and forwards to the store.
    pub async fn record(&self, store: &dyn AccountStore, account: &AccountId, stat: StatKind) {
        self.bump(account, stat);
        if let Err(e) = store.increment_stat(account, stat).await {
            warn!(account = %account, stat = %stat, error = %e, "failed to persist stat");
        }
    }

    pub fn account(&self, account: &AccountId) -> AccountStats {
        lock(&self.accounts)
            .get(account)
            .copied()
            .unwrap_or_default()
    }

    pub fn forget(&self, account: &AccountId) {
        lock(&self.accounts).remove(account);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let accounts = lock(&self.accounts);
        let mut snapshot = StatsSnapshot::default();
        for (id, stats) in accounts.iter() {
            snapshot.total.add(stats);
            snapshot.accounts.insert(id.to_string(), *stats);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_sums_accounts() {
        let stats = EngineStats::new();
        let a = AccountId::from("a");
        let b = AccountId::from("b");
        stats.bump(&a, StatKind::MessagesSent);
        stats.bump(&a, StatKind::SentText);
        stats.bump(&b, StatKind::MessagesSent);
        stats.bump(&b, StatKind::SentMedia);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total.messages_sent, 2);
        assert_eq!(snapshot.total.sent_media, 1);
        assert_eq!(snapshot.accounts["a"].sent_text, 1);
        assert_eq!(stats.account(&b).sent_media, 1);
    }

    #[test]
    fn snapshot_serializes_with_snake_case_keys() {
        let stats = EngineStats::new();
        stats.bump(&AccountId::from("a"), StatKind::MessagesReceived);
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["total"]["messages_received"], 1);
        assert_eq!(json["accounts"]["a"]["messages_sent"], 0);
    }
}
