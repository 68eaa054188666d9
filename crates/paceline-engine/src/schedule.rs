// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time windows and proxy exclusivity.
//!
//! The [`ProxyScheduleCoordinator`] starts accounts inside their configured
//! daily window and pauses them outside it. An account never starts while
//! another account holding the same `ip:port` is running. Activations are
//! serialized only across the conflict check and the claim of the proxy;
//! the webhook, settle wait and session start run concurrently per account.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use futures::future::join_all;
use paceline_core::{
    AccountId, AccountStatus, AccountStore, ChatSession, PacelineError, ProxyDescriptor,
    SessionFactory, WebhookTrigger,
};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::events::{EVENT_CHANNEL_CAPACITY, spawn_event_pump};
use crate::registry::{AccountRegistry, AccountSlot};
use crate::stats::EngineStats;

/// True if `now` falls inside the daily window `[start, end)`.
///
/// `start == end` means the whole day; `start > end` spans midnight.
pub fn is_within_window(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start == end {
        true
    } else if start < end {
        start <= now && now < end
    } else {
        now >= start || now < end
    }
}

/// What a schedule tick decided for one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowAction {
    Activate,
    Pause,
}

pub struct ProxyScheduleCoordinator {
    registry: Arc<AccountRegistry>,
    factory: Arc<dyn SessionFactory>,
    webhook: Arc<dyn WebhookTrigger>,
    store: Arc<dyn AccountStore>,
    stats: Arc<EngineStats>,
    settle: Duration,
    activation: Mutex<()>,
}

impl ProxyScheduleCoordinator {
    pub fn new(
        registry: Arc<AccountRegistry>,
        factory: Arc<dyn SessionFactory>,
        webhook: Arc<dyn WebhookTrigger>,
        store: Arc<dyn AccountStore>,
        stats: Arc<EngineStats>,
        settle: Duration,
    ) -> Self {
        Self {
            registry,
            factory,
            webhook,
            store,
            stats,
            settle,
            activation: Mutex::new(()),
        }
    }

    /// One schedule tick at local time-of-day `now`.
    pub async fn tick(&self, now: NaiveTime) {
        let mut work = Vec::new();
        for slot in self.registry.all() {
            let Some(schedule) = slot.config().schedule.clone() else {
                continue;
            };
            let (start, end) = match schedule.bounds() {
                Ok(bounds) => bounds,
                Err(e) => {
                    warn!(account = %slot.id(), error = %e, "skipping account with bad schedule");
                    continue;
                }
            };
            let status = slot.status();
            let within = is_within_window(now, start, end);
            if within && !status.holds_proxy() && !slot.is_operator_stopped() {
                work.push((slot.id().clone(), WindowAction::Activate));
            } else if !within && status.is_active() {
                work.push((slot.id().clone(), WindowAction::Pause));
            }
        }

        let outcomes = join_all(work.into_iter().map(|(id, action)| async move {
            let result = match action {
                WindowAction::Activate => self.activate(&id).await,
                WindowAction::Pause => self.pause(&id).await.map(|_| ()),
            };
            (id, action, result)
        }))
        .await;

        for (id, action, result) in outcomes {
            match result {
                Ok(()) => debug!(account = %id, ?action, "schedule applied"),
                Err(e @ PacelineError::ProxyConflict { .. }) => {
                    warn!(account = %id, error = %e, "scheduled start blocked");
                }
                Err(e) => warn!(account = %id, ?action, error = %e, "schedule action failed"),
            }
        }
    }

    /// The other account currently holding `proxy`, if any.
    fn proxy_holder(&self, slot: &AccountSlot, proxy: &ProxyDescriptor) -> Option<AccountId> {
        self.registry
            .all()
            .into_iter()
            .filter(|other| other.id() != slot.id() && other.status().holds_proxy())
            .find(|other| {
                other
                    .config()
                    .proxy
                    .as_ref()
                    .is_some_and(|p| p.same_endpoint(proxy))
            })
            .map(|other| other.id().clone())
    }

    /// Starts or resumes an account.
    ///
    /// Fails with [`PacelineError::ProxyConflict`] if another running account
    /// holds the same proxy endpoint; the account is left untouched.
    pub async fn activate(&self, id: &AccountId) -> Result<(), PacelineError> {
        let slot = self.registry.get(id)?;
        let config = slot.config();

        let resume_paused = {
            let _claim = self.activation.lock().await;
            let status = slot.status();
            if status.holds_proxy() {
                debug!(account = %id, status = %status, "already active");
                return Ok(());
            }
            if let Some(proxy) = &config.proxy
                && let Some(holder) = self.proxy_holder(&slot, proxy)
            {
                return Err(PacelineError::ProxyConflict {
                    account: id.to_string(),
                    conflicting: holder.to_string(),
                    proxy: proxy.endpoint(),
                });
            }
            // Initializing holds the proxy from here on.
            slot.set_status(AccountStatus::Initializing)?;
            status == AccountStatus::Paused && slot.session().is_some()
        };

        if let Some(hook) = &config.webhook {
            let timeout = Duration::from_millis(hook.timeout_ms);
            match self.webhook.invoke(&hook.url, &hook.method, timeout).await {
                Ok(()) => debug!(account = %id, "activation webhook fired"),
                Err(e) => warn!(account = %id, error = %e, "activation webhook failed, continuing"),
            }
            tokio::time::sleep(self.settle).await;
        }

        let started = if resume_paused {
            self.resume_session(&slot).await
        } else {
            self.open_session(&slot, config.proxy.as_ref()).await
        };
        if let Err(e) = started {
            slot.try_set_status(AccountStatus::Error);
            return Err(e);
        }

        // Paused again while the session was starting.
        if slot.status() == AccountStatus::Paused
            && let Some(session) = slot.session()
            && let Err(e) = session.pause().await
        {
            warn!(account = %id, error = %e, "failed to pause freshly started session");
        }
        info!(
            account = %id,
            proxy = ?config.proxy.as_ref().map(ProxyDescriptor::endpoint),
            resumed = resume_paused,
            "account activated"
        );
        Ok(())
    }

    async fn resume_session(&self, slot: &AccountSlot) -> Result<(), PacelineError> {
        let session = slot
            .session()
            .ok_or_else(|| PacelineError::Internal("paused account lost its session".into()))?;
        session.resume().await?;
        slot.set_status(AccountStatus::Ready)?;
        Ok(())
    }

    async fn open_session(
        &self,
        slot: &Arc<AccountSlot>,
        proxy: Option<&ProxyDescriptor>,
    ) -> Result<(), PacelineError> {
        if let Some(stale) = slot.replace_session(None)
            && let Err(e) = stale.close().await
        {
            debug!(account = %slot.id(), error = %e, "failed to close stale session");
        }
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let session: Arc<dyn ChatSession> = self.factory.open(slot.id(), proxy, tx).await?;
        let generation = slot.install_session(session);
        spawn_event_pump(
            Arc::clone(slot),
            generation,
            rx,
            Arc::clone(&self.stats),
            Arc::clone(&self.store),
        );
        Ok(())
    }

    /// Pauses an account's session, releasing its proxy.
    ///
    /// Returns `false` if the account was not running. In-flight replies finish.
    pub async fn pause(&self, id: &AccountId) -> Result<bool, PacelineError> {
        let slot = self.registry.get(id)?;
        let status = slot.status();
        if !status.holds_proxy() {
            return Ok(false);
        }
        slot.set_status(AccountStatus::Paused)?;
        if let Some(session) = slot.session()
            && let Err(e) = session.pause().await
        {
            warn!(account = %id, error = %e, "driver failed to pause session");
        }
        info!(account = %id, from = %status, "account paused");
        Ok(true)
    }

    /// Pauses every other running account that shares `group_id` or the exact
    /// `ip:port`. Returns the accounts it paused.
    pub async fn pause_group_accounts(
        &self,
        group_id: Option<&str>,
        ip: &str,
        port: u16,
        exclude: &AccountId,
    ) -> Vec<AccountId> {
        let targets: Vec<AccountId> = self
            .registry
            .all()
            .into_iter()
            .filter(|slot| slot.id() != exclude && slot.status().is_active())
            .filter(|slot| {
                slot.config().proxy.as_ref().is_some_and(|p| {
                    (p.ip == ip && p.port == port)
                        || group_id.is_some_and(|g| p.group_id.as_deref() == Some(g))
                })
            })
            .map(|slot| slot.id().clone())
            .collect();

        let mut paused = Vec::new();
        for id in targets {
            match self.pause(&id).await {
                Ok(true) => paused.push(id),
                Ok(false) => {}
                Err(e) => warn!(account = %id, error = %e, "failed to pause proxy sibling"),
            }
        }
        if !paused.is_empty() {
            info!(exclude = %exclude, count = paused.len(), "paused accounts sharing the proxy");
        }
        paused
    }

    /// Swaps an account's proxy. If the account is running, siblings on the
    /// new proxy or group are paused.
    pub async fn update_proxy(
        &self,
        id: &AccountId,
        proxy: Option<ProxyDescriptor>,
    ) -> Result<Vec<AccountId>, PacelineError> {
        let slot = self.registry.get(id)?;
        slot.update_config(|config| config.proxy = proxy.clone());
        info!(account = %id, proxy = ?proxy.as_ref().map(ProxyDescriptor::endpoint), "proxy updated");
        match proxy {
            Some(p) if slot.status().is_active() => Ok(self
                .pause_group_accounts(p.group_id.as_deref(), &p.ip, p.port, id)
                .await),
            _ => Ok(Vec::new()),
        }
    }

    /// Operator stop: the schedule will not restart the account.
    pub async fn stop(&self, id: &AccountId) -> Result<bool, PacelineError> {
        self.registry.get(id)?.set_operator_stopped(true);
        self.pause(id).await
    }

    /// Clears the operator stop and activates.
    pub async fn start(&self, id: &AccountId) -> Result<(), PacelineError> {
        self.registry.get(id)?.set_operator_stopped(false);
        self.activate(id).await
    }
}

#[cfg(test)]
mod tests {
    use paceline_config::model::{AccountConfig, ScheduleConfig};
    use paceline_core::DriverEvent;
    use paceline_test_utils::{DriverCall, MockSessionFactory, MockStore, MockWebhook};
    use proptest::prelude::*;

    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn window_wraps_midnight() {
        assert!(is_within_window(t(23, 30), t(22, 0), t(6, 0)));
        assert!(is_within_window(t(3, 0), t(22, 0), t(6, 0)));
        assert!(!is_within_window(t(10, 0), t(22, 0), t(6, 0)));
        assert!(!is_within_window(t(6, 0), t(22, 0), t(6, 0)));
    }

    #[test]
    fn plain_window_is_half_open() {
        assert!(is_within_window(t(9, 0), t(9, 0), t(17, 0)));
        assert!(!is_within_window(t(17, 0), t(9, 0), t(17, 0)));
    }

    proptest! {
        #[test]
        fn equal_bounds_mean_all_day(s in 0u32..86_400, n in 0u32..86_400) {
            let start = NaiveTime::from_num_seconds_from_midnight_opt(s, 0).unwrap();
            let now = NaiveTime::from_num_seconds_from_midnight_opt(n, 0).unwrap();
            prop_assert!(is_within_window(now, start, start));
        }

        #[test]
        fn wrapped_window_is_complement_of_reverse(
            s in 0u32..86_400, e in 0u32..86_400, n in 0u32..86_400
        ) {
            prop_assume!(s != e);
            let start = NaiveTime::from_num_seconds_from_midnight_opt(s, 0).unwrap();
            let end = NaiveTime::from_num_seconds_from_midnight_opt(e, 0).unwrap();
            let now = NaiveTime::from_num_seconds_from_midnight_opt(n, 0).unwrap();
            prop_assert_ne!(
                is_within_window(now, start, end),
                is_within_window(now, end, start)
            );
        }
    }

    fn proxy() -> ProxyDescriptor {
        ProxyDescriptor {
            ip: "1.2.3.4".into(),
            port: 8080,
            username: None,
            password: None,
            group_id: Some("rack-1".into()),
        }
    }

    struct Fixture {
        registry: Arc<AccountRegistry>,
        factory: Arc<MockSessionFactory>,
        webhook: Arc<MockWebhook>,
        coordinator: ProxyScheduleCoordinator,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(AccountRegistry::new());
        let factory = Arc::new(MockSessionFactory::new());
        let webhook = Arc::new(MockWebhook::new());
        let coordinator = ProxyScheduleCoordinator::new(
            Arc::clone(&registry),
            factory.clone(),
            webhook.clone(),
            Arc::new(MockStore::new()),
            Arc::new(EngineStats::new()),
            Duration::from_secs(5),
        );
        Fixture {
            registry,
            factory,
            webhook,
            coordinator,
        }
    }

    fn account(id: &str, proxy: Option<ProxyDescriptor>) -> AccountConfig {
        let mut config = AccountConfig::new(id);
        config.proxy = proxy;
        config
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn proxy_is_exclusive_until_holder_pauses() {
        let fx = fixture();
        fx.registry.insert(account("a", Some(proxy()))).unwrap();
        fx.registry.insert(account("b", Some(proxy()))).unwrap();
        let a = AccountId::from("a");
        let b = AccountId::from("b");

        fx.coordinator.activate(&a).await.unwrap();
        settle().await;
        assert_eq!(fx.registry.get(&a).unwrap().status(), AccountStatus::Ready);

        let err = fx.coordinator.activate(&b).await.unwrap_err();
        match err {
            PacelineError::ProxyConflict { conflicting, .. } => assert_eq!(conflicting, "a"),
            other => panic!("expected proxy conflict, got {other:?}"),
        }
        assert_eq!(
            fx.registry.get(&b).unwrap().status(),
            AccountStatus::Disconnected
        );

        assert!(fx.coordinator.pause(&a).await.unwrap());
        fx.coordinator.activate(&b).await.unwrap();
        assert_eq!(fx.factory.open_count(&b), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_session_is_resumed_in_place() {
        let fx = fixture();
        fx.registry.insert(account("a", None)).unwrap();
        let a = AccountId::from("a");

        fx.coordinator.activate(&a).await.unwrap();
        settle().await;
        fx.coordinator.pause(&a).await.unwrap();
        fx.coordinator.activate(&a).await.unwrap();

        assert_eq!(fx.factory.open_count(&a), 1);
        assert_eq!(fx.registry.get(&a).unwrap().status(), AccountStatus::Ready);
        let session = fx.factory.session(&a).unwrap();
        assert_eq!(session.pause_count(), 1);
        assert_eq!(session.resume_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn webhook_fires_before_session_opens() {
        let fx = fixture();
        let mut config = account("a", None);
        config.webhook = Some(paceline_config::model::WebhookConfig {
            url: "http://rotate.local/ip".into(),
            method: "POST".into(),
            timeout_ms: 2_000,
        });
        fx.registry.insert(config).unwrap();
        let a = AccountId::from("a");

        let started = tokio::time::Instant::now();
        fx.coordinator.activate(&a).await.unwrap();

        assert_eq!(
            fx.webhook.calls(),
            vec![("http://rotate.local/ip".to_string(), "POST".to_string())]
        );
        assert!(started.elapsed() >= Duration::from_secs(5), "settle wait applied");
        assert_eq!(fx.factory.open_count(&a), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_webhook_does_not_block_activation() {
        let fx = fixture();
        fx.webhook.fail(true);
        let mut config = account("a", None);
        config.webhook = Some(paceline_config::model::WebhookConfig {
            url: "http://rotate.local/ip".into(),
            method: "GET".into(),
            timeout_ms: 2_000,
        });
        fx.registry.insert(config).unwrap();

        fx.coordinator.activate(&AccountId::from("a")).await.unwrap();
        assert_eq!(fx.factory.open_count(&AccountId::from("a")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_open_marks_error() {
        let fx = fixture();
        fx.registry.insert(account("a", Some(proxy()))).unwrap();
        let a = AccountId::from("a");
        fx.factory.fail_open(&a, true);

        assert!(fx.coordinator.activate(&a).await.is_err());
        assert_eq!(fx.registry.get(&a).unwrap().status(), AccountStatus::Error);

        // An errored account does not hold the proxy.
        fx.registry.insert(account("b", Some(proxy()))).unwrap();
        fx.coordinator.activate(&AccountId::from("b")).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn tick_follows_window_and_operator_stop() {
        let fx = fixture();
        let mut config = account("a", None);
        config.schedule = Some(ScheduleConfig {
            start: "22:00".into(),
            end: "06:00".into(),
        });
        fx.registry.insert(config).unwrap();
        let a = AccountId::from("a");

        fx.coordinator.tick(t(23, 30)).await;
        settle().await;
        assert_eq!(fx.registry.get(&a).unwrap().status(), AccountStatus::Ready);

        fx.coordinator.tick(t(10, 0)).await;
        assert_eq!(fx.registry.get(&a).unwrap().status(), AccountStatus::Paused);

        fx.coordinator.stop(&a).await.unwrap();
        fx.coordinator.tick(t(23, 30)).await;
        assert_eq!(fx.registry.get(&a).unwrap().status(), AccountStatus::Paused);

        fx.coordinator.start(&a).await.unwrap();
        assert_eq!(fx.registry.get(&a).unwrap().status(), AccountStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn proxy_change_pauses_siblings() {
        let fx = fixture();
        let other_endpoint = ProxyDescriptor {
            ip: "5.6.7.8".into(),
            port: 3128,
            group_id: Some("rack-1".into()),
            ..proxy()
        };
        fx.registry.insert(account("a", None)).unwrap();
        fx.registry.insert(account("b", Some(other_endpoint))).unwrap();
        fx.registry.insert(account("c", None)).unwrap();
        for id in ["a", "b", "c"] {
            fx.coordinator.activate(&AccountId::from(id)).await.unwrap();
        }
        settle().await;

        let paused = fx
            .coordinator
            .update_proxy(&AccountId::from("a"), Some(proxy()))
            .await
            .unwrap();

        assert_eq!(paused, vec![AccountId::from("b")], "same group id");
        assert_eq!(
            fx.registry.get(&AccountId::from("c")).unwrap().status(),
            AccountStatus::Ready
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exact_endpoint_match_pauses_without_shared_group() {
        let fx = fixture();
        let same_endpoint = ProxyDescriptor {
            group_id: None,
            ..proxy()
        };
        let elsewhere = ProxyDescriptor {
            ip: "9.9.9.9".into(),
            port: 1080,
            group_id: Some("rack-2".into()),
            ..proxy()
        };
        fx.registry.insert(account("a", None)).unwrap();
        fx.registry.insert(account("b", Some(same_endpoint))).unwrap();
        fx.registry.insert(account("c", Some(elsewhere))).unwrap();
        for id in ["a", "b", "c"] {
            fx.coordinator.activate(&AccountId::from(id)).await.unwrap();
        }
        settle().await;

        let moved = ProxyDescriptor {
            group_id: Some("rack-9".into()),
            ..proxy()
        };
        let paused = fx
            .coordinator
            .update_proxy(&AccountId::from("a"), Some(moved))
            .await
            .unwrap();
        assert_eq!(paused, vec![AccountId::from("b")], "same ip:port");
        assert_eq!(
            fx.registry.get(&AccountId::from("c")).unwrap().status(),
            AccountStatus::Ready
        );

        // Endpoint alone, no group to match on.
        let paused = fx
            .coordinator
            .pause_group_accounts(None, "9.9.9.9", 1080, &AccountId::from("a"))
            .await;
        assert_eq!(paused, vec![AccountId::from("c")]);
    }

    #[tokio::test(start_paused = true)]
    async fn late_disconnect_from_replaced_session_keeps_live_one() {
        let fx = fixture();
        fx.registry.insert(account("a", Some(proxy()))).unwrap();
        fx.registry.insert(account("b", Some(proxy()))).unwrap();
        let a = AccountId::from("a");

        fx.coordinator.activate(&a).await.unwrap();
        settle().await;
        let first = fx.factory.session(&a).unwrap();

        fx.registry.get(&a).unwrap().try_set_status(AccountStatus::Error);
        fx.coordinator.activate(&a).await.unwrap();
        settle().await;
        assert_eq!(fx.factory.open_count(&a), 2);
        assert_eq!(first.calls().last(), Some(&DriverCall::Close));

        assert!(
            first
                .emit(DriverEvent::Disconnected {
                    reason: "closed".into()
                })
                .await
        );
        settle().await;

        let slot = fx.registry.get(&a).unwrap();
        assert_eq!(slot.status(), AccountStatus::Ready);
        assert!(slot.session().is_some());
        let err = fx
            .coordinator
            .activate(&AccountId::from("b"))
            .await
            .unwrap_err();
        assert!(matches!(err, PacelineError::ProxyConflict { .. }), "{err}");
    }
}
