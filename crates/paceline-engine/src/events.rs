// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Driver event pump: lifecycle signals into the status FSM, messages into
//! the ingest gate.

use std::sync::Arc;

use chrono::Utc;
use paceline_core::{AccountStatus, AccountStore, DriverEvent, InboundEvent, StatKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ingest::{self, Admission, FilterReason};
use crate::registry::AccountSlot;
use crate::stats::EngineStats;

/// Capacity of the per-session driver event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Admits one inbound event and counts it as received unless it was our own.
pub(crate) async fn receive(
    slot: &AccountSlot,
    event: InboundEvent,
    stats: &EngineStats,
    store: &dyn AccountStore,
) -> Admission {
    let admission = ingest::admit(slot, event, Utc::now());
    if !matches!(admission, Admission::Filtered(FilterReason::OwnMessage)) {
        stats
            .record(store, slot.id(), StatKind::MessagesReceived)
            .await;
    }
    admission
}

/// Applies one driver event to the account.
///
/// `generation` identifies the session that emitted the event (see
/// [`AccountSlot::install_session`]). Events from a session that has since
/// been replaced or detached are dropped.
pub async fn handle_driver_event(
    slot: &AccountSlot,
    generation: u64,
    event: DriverEvent,
    stats: &EngineStats,
    store: &dyn AccountStore,
) {
    if slot.session_generation() != generation {
        debug!(account = %slot.id(), generation, ?event, "event from a replaced session dropped");
        return;
    }
    let paused = slot.status() == AccountStatus::Paused;
    match event {
        DriverEvent::Message(inbound) => {
            receive(slot, inbound, stats, store).await;
        }
        // Identity is kept even while paused; only activation leaves `Paused`.
        DriverEvent::Ready { own_id } if paused => {
            slot.set_reported_own_id(own_id);
            debug!(account = %slot.id(), "ready ignored while paused");
        }
        _ if paused => {
            debug!(account = %slot.id(), ?event, "lifecycle event ignored while paused");
        }
        DriverEvent::QrIssued => {
            slot.try_set_status(AccountStatus::QrPending);
            info!(account = %slot.id(), "login code issued, waiting for scan");
        }
        DriverEvent::Authenticated => {
            slot.try_set_status(AccountStatus::Authenticated);
        }
        DriverEvent::Ready { own_id } => {
            slot.set_reported_own_id(own_id);
            slot.try_set_status(AccountStatus::Ready);
            info!(account = %slot.id(), own_id = ?slot.own_id(), "session ready");
        }
        DriverEvent::Disconnected { reason } => {
            if !slot.detach_session(generation) {
                debug!(account = %slot.id(), "session replaced before disconnect was handled");
                return;
            }
            slot.try_set_status(AccountStatus::Disconnected);
            warn!(account = %slot.id(), reason = %reason, "session disconnected");
        }
    }
}

/// Spawns the task draining the driver events of session `generation`.
///
/// The task ends when the driver drops its sender.
pub fn spawn_event_pump(
    slot: Arc<AccountSlot>,
    generation: u64,
    mut events: mpsc::Receiver<DriverEvent>,
    stats: Arc<EngineStats>,
    store: Arc<dyn AccountStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            handle_driver_event(&slot, generation, event, &stats, store.as_ref()).await;
        }
        debug!(account = %slot.id(), generation, "driver event stream closed");
    })
}

#[cfg(test)]
mod tests {
    use paceline_config::model::AccountConfig;
    use paceline_core::MessageKind;
    use paceline_test_utils::MockStore;

    use super::*;

    fn slot() -> AccountSlot {
        let mut config = AccountConfig::new("a");
        config.own_id = Some("me".into());
        AccountSlot::new(config, Utc::now())
    }

    fn message(sender: &str) -> DriverEvent {
        DriverEvent::Message(InboundEvent {
            message_id: "m1".into(),
            chat_id: sender.into(),
            sender_id: sender.into(),
            sender_name: None,
            chat_name: None,
            is_group: false,
            kind: MessageKind::Text { body: "oi".into() },
            timestamp_secs: 1,
        })
    }

    #[tokio::test]
    async fn lifecycle_events_drive_the_fsm() {
        let slot = slot();
        let stats = EngineStats::new();
        let store = MockStore::new();
        slot.set_status(AccountStatus::Initializing).unwrap();

        handle_driver_event(&slot, 0, DriverEvent::QrIssued, &stats, &store).await;
        assert_eq!(slot.status(), AccountStatus::QrPending);
        handle_driver_event(&slot, 0, DriverEvent::Authenticated, &stats, &store).await;
        assert_eq!(slot.status(), AccountStatus::Authenticated);
        handle_driver_event(
            &slot,
            0,
            DriverEvent::Ready {
                own_id: Some("5511@c.us".into()),
            },
            &stats,
            &store,
        )
        .await;
        assert_eq!(slot.status(), AccountStatus::Ready);
        assert_eq!(slot.own_id().as_deref(), Some("5511@c.us"));

        handle_driver_event(
            &slot,
            0,
            DriverEvent::Disconnected {
                reason: "logout".into(),
            },
            &stats,
            &store,
        )
        .await;
        assert_eq!(slot.status(), AccountStatus::Disconnected);
    }

    #[tokio::test]
    async fn paused_account_ignores_late_lifecycle_events() {
        let slot = slot();
        let stats = EngineStats::new();
        let store = MockStore::new();
        slot.set_status(AccountStatus::Initializing).unwrap();
        slot.set_status(AccountStatus::Ready).unwrap();
        slot.set_status(AccountStatus::Paused).unwrap();

        handle_driver_event(
            &slot,
            0,
            DriverEvent::Disconnected {
                reason: "paused".into(),
            },
            &stats,
            &store,
        )
        .await;
        handle_driver_event(
            &slot,
            0,
            DriverEvent::Ready {
                own_id: Some("late@c.us".into()),
            },
            &stats,
            &store,
        )
        .await;
        assert_eq!(slot.status(), AccountStatus::Paused);
        assert_eq!(slot.own_id().as_deref(), Some("late@c.us"));
    }

    #[tokio::test]
    async fn messages_are_admitted_and_counted() {
        let slot = slot();
        let stats = EngineStats::new();
        let store = MockStore::new();

        handle_driver_event(&slot, 0, message("x"), &stats, &store).await;
        handle_driver_event(&slot, 0, message("me"), &stats, &store).await;

        assert_eq!(slot.with_runtime(|rt| rt.queue.depth()), 1);
        assert_eq!(stats.account(slot.id()).messages_received, 1);
        assert_eq!(store.stat_count(slot.id(), StatKind::MessagesReceived), 1);
    }

    #[tokio::test]
    async fn replaced_session_events_are_dropped() {
        use paceline_test_utils::MockSession;

        let slot = slot();
        let stats = EngineStats::new();
        let store = MockStore::new();
        slot.set_status(AccountStatus::Initializing).unwrap();
        let stale = slot.install_session(Arc::new(MockSession::new(slot.id().clone())));
        let live = slot.install_session(Arc::new(MockSession::new(slot.id().clone())));
        handle_driver_event(&slot, live, DriverEvent::Ready { own_id: None }, &stats, &store).await;

        handle_driver_event(
            &slot,
            stale,
            DriverEvent::Disconnected {
                reason: "closed".into(),
            },
            &stats,
            &store,
        )
        .await;
        handle_driver_event(&slot, stale, message("x"), &stats, &store).await;

        assert_eq!(slot.status(), AccountStatus::Ready);
        assert!(slot.session().is_some());
        assert_eq!(slot.with_runtime(|rt| rt.queue.depth()), 0);

        handle_driver_event(
            &slot,
            live,
            DriverEvent::Disconnected {
                reason: "logout".into(),
            },
            &stats,
            &store,
        )
        .await;
        assert_eq!(slot.status(), AccountStatus::Disconnected);
        assert!(slot.session().is_none());
    }
}
