// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account orchestration engine.
//!
//! Sits between "an event arrived" and "a reply is sent": inbound events pass
//! the ingest gate into a per-account two-lane queue, the [`QueueProcessor`]
//! promotes at most one item per lane per tick into a humanized reply cycle,
//! the [`ProxyScheduleCoordinator`] starts and pauses accounts by time window
//! while keeping proxies exclusive, and the [`AutoWarmScheduler`] keeps idle
//! sessions looking lived-in.
//!
//! The three coordinators tick independently. [`Engine::run`] drives all of
//! them until its [`CancellationToken`] fires, then drains in-flight work.

pub mod autowarm;
pub mod cooldown;
pub mod events;
pub mod humanize;
pub mod ingest;
pub mod processor;
pub mod queue;
pub mod registry;
pub mod schedule;
pub mod shutdown;
pub mod spintax;
pub mod stats;
pub mod store;
pub mod ticker;
pub mod webhook;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Local, Utc};
use paceline_config::model::{AccountConfig, EngineConfig};
use paceline_config::validation::validate_account_config;
use paceline_core::{
    AccountId, AccountStatus, AccountStore, InboundEvent, PacelineError, ProxyDescriptor,
    SessionFactory, WebhookTrigger,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use autowarm::{AutoWarmScheduler, WarmBlocker, WarmOutcome};
pub use cooldown::{CooldownController, CooldownPolicy, CooldownState};
pub use humanize::{DelayPlan, HumanBehaviorEngine, MediaChoice};
pub use ingest::{Admission, FilterReason};
pub use processor::QueueProcessor;
pub use queue::{AccountQueue, EnqueueOutcome, QueueItem};
pub use registry::{AccountRegistry, AccountSlot};
pub use schedule::{ProxyScheduleCoordinator, is_within_window};
pub use stats::{AccountStats, EngineStats, StatsSnapshot};
pub use store::ConfigStore;
pub use webhook::HttpWebhook;

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Wall-clock reading `base` advanced by the tokio time elapsed since `since`.
///
/// Tasks spawned from a tick use this instead of `Utc::now()` so their view of
/// time stays consistent with the tick that launched them, including under a
/// paused test clock.
pub(crate) fn clock_since(base: DateTime<Utc>, since: tokio::time::Instant) -> DateTime<Utc> {
    base + ChronoDuration::from_std(since.elapsed()).unwrap_or_else(|_| ChronoDuration::zero())
}

/// The orchestration engine: registry plus the three ticking coordinators.
pub struct Engine {
    settings: EngineConfig,
    registry: Arc<AccountRegistry>,
    stats: Arc<EngineStats>,
    store: Arc<dyn AccountStore>,
    cooldown: CooldownController,
    processor: QueueProcessor,
    scheduler: ProxyScheduleCoordinator,
    warmer: AutoWarmScheduler,
}

impl Engine {
    pub fn new(
        settings: EngineConfig,
        factory: Arc<dyn SessionFactory>,
        store: Arc<dyn AccountStore>,
        webhook: Arc<dyn WebhookTrigger>,
    ) -> Self {
        Self::with_behavior(settings, factory, store, webhook, HumanBehaviorEngine::new())
    }

    /// Like [`new`](Self::new) with an explicit behavior engine (e.g. seeded).
    pub fn with_behavior(
        settings: EngineConfig,
        factory: Arc<dyn SessionFactory>,
        store: Arc<dyn AccountStore>,
        webhook: Arc<dyn WebhookTrigger>,
        behavior: HumanBehaviorEngine,
    ) -> Self {
        stats::register_metrics();
        let registry = Arc::new(AccountRegistry::new());
        let stats = Arc::new(EngineStats::new());
        let behavior = Arc::new(behavior);
        let cooldown = CooldownController::new(Arc::clone(&registry));
        let processor = QueueProcessor::new(
            Arc::clone(&registry),
            Arc::clone(&behavior),
            Arc::clone(&store),
            Arc::clone(&stats),
        );
        let scheduler = ProxyScheduleCoordinator::new(
            Arc::clone(&registry),
            factory,
            webhook,
            Arc::clone(&store),
            Arc::clone(&stats),
            settings.webhook_settle(),
        );
        let warmer = AutoWarmScheduler::new(
            Arc::clone(&registry),
            behavior,
            Arc::clone(&store),
            Arc::clone(&stats),
        );
        Self {
            settings,
            registry,
            stats,
            store,
            cooldown,
            processor,
            scheduler,
            warmer,
        }
    }

    /// Validates and registers an account. It starts `disconnected`.
    pub fn register_account(&self, config: AccountConfig) -> Result<AccountId, PacelineError> {
        if let Err(errors) = validate_account_config(&config) {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(PacelineError::Config(message));
        }
        let slot = self.registry.insert(config)?;
        info!(account = %slot.id(), "account registered");
        Ok(slot.id().clone())
    }

    /// Unregisters an account, discarding its queue and closing its session.
    pub async fn remove_account(&self, id: &AccountId) -> Result<(), PacelineError> {
        let slot = self
            .registry
            .remove(id)
            .ok_or_else(|| PacelineError::AccountNotFound(id.to_string()))?;
        let dropped = slot.with_runtime(|rt| rt.queue.clear());
        if let Some(session) = slot.replace_session(None)
            && let Err(e) = session.close().await
        {
            warn!(account = %id, error = %e, "failed to close session of removed account");
        }
        self.stats.forget(id);
        info!(account = %id, dropped, "account removed");
        Ok(())
    }

    /// Offers an inbound event to an account's queue.
    pub async fn enqueue(
        &self,
        id: &AccountId,
        event: InboundEvent,
    ) -> Result<Admission, PacelineError> {
        let slot = self.registry.get(id)?;
        Ok(events::receive(&slot, event, &self.stats, self.store.as_ref()).await)
    }

    /// Pauses the account's session. Returns `false` if nothing was running.
    pub async fn pause(&self, id: &AccountId) -> Result<bool, PacelineError> {
        self.scheduler.pause(id).await
    }

    /// Resumes a paused session in place, or starts a new one.
    pub async fn resume(&self, id: &AccountId) -> Result<(), PacelineError> {
        self.scheduler.activate(id).await
    }

    /// Operator stop: pauses and keeps the scheduler from restarting it.
    pub async fn stop(&self, id: &AccountId) -> Result<bool, PacelineError> {
        self.scheduler.stop(id).await
    }

    /// Operator start: clears the stop flag and activates.
    pub async fn start(&self, id: &AccountId) -> Result<(), PacelineError> {
        self.scheduler.start(id).await
    }

    /// Replaces the account's proxy; returns the accounts paused to keep it exclusive.
    pub async fn update_proxy(
        &self,
        id: &AccountId,
        proxy: Option<ProxyDescriptor>,
    ) -> Result<Vec<AccountId>, PacelineError> {
        self.scheduler.update_proxy(id, proxy).await
    }

    pub fn queue_depth(&self, id: &AccountId) -> Result<usize, PacelineError> {
        Ok(self.registry.get(id)?.with_runtime(|rt| rt.queue.depth()))
    }

    pub fn status(&self, id: &AccountId) -> Result<AccountStatus, PacelineError> {
        Ok(self.registry.get(id)?.status())
    }

    /// True while the account's response-count pause is running.
    pub fn is_paused(&self, id: &AccountId) -> Result<bool, PacelineError> {
        self.cooldown.is_paused(id)
    }

    /// Global and per-account counters as of now.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn registry(&self) -> &Arc<AccountRegistry> {
        &self.registry
    }

    pub fn processor(&self) -> &QueueProcessor {
        &self.processor
    }

    pub fn scheduler(&self) -> &ProxyScheduleCoordinator {
        &self.scheduler
    }

    /// The auto-warm scheduler, for manual ticks.
    pub fn warmer(&self) -> &AutoWarmScheduler {
        &self.warmer
    }

    /// Runs the three coordinators until `cancel` fires, then waits up to
    /// `drain_timeout_secs` for in-flight executions and closes every session.
    pub async fn run(&self, cancel: CancellationToken) {
        let processor = &self.processor;
        let scheduler = &self.scheduler;
        let warmer = &self.warmer;

        info!(
            accounts = self.registry.len(),
            queue_tick = ?self.settings.queue_tick(),
            schedule_tick = ?self.settings.schedule_tick(),
            warm_tick = ?self.settings.warm_tick(),
            "engine started"
        );

        tokio::join!(
            ticker::run_ticker(
                "queue",
                self.settings.queue_tick(),
                cancel.clone(),
                move || async move {
                    processor.tick(Utc::now());
                    Ok(())
                },
            ),
            ticker::run_ticker(
                "schedule",
                self.settings.schedule_tick(),
                cancel.clone(),
                move || async move {
                    scheduler.tick(Local::now().time()).await;
                    Ok(())
                },
            ),
            ticker::run_ticker(
                "auto-warm",
                self.settings.warm_tick(),
                cancel.clone(),
                move || async move {
                    warmer.tick(Utc::now());
                    Ok(())
                },
            ),
        );

        self.shutdown(Duration::from_secs(self.settings.drain_timeout_secs))
            .await;
    }

    /// Waits for in-flight work, then closes every session.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        let (replies, warms) = tokio::join!(
            self.processor.drain(drain_timeout),
            self.warmer.drain(drain_timeout)
        );
        if !(replies && warms) {
            warn!(timeout = ?drain_timeout, "drain timed out, abandoning in-flight work");
        }
        for slot in self.registry.all() {
            if let Some(session) = slot.replace_session(None)
                && let Err(e) = session.close().await
            {
                warn!(account = %slot.id(), error = %e, "failed to close session");
            }
            slot.try_set_status(AccountStatus::Disconnected);
        }
        info!("engine stopped");
    }
}
