// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account registry: one [`AccountSlot`] per managed account.
//!
//! A slot owns everything the coordinators need for that account (config
//! snapshot, lifecycle status, live session handle, and the lane runtime).
//! All locks are synchronous and never held across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use paceline_config::model::AccountConfig;
use paceline_core::{AccountId, AccountStatus, ChatSession, PacelineError, ReplyContext};
use tracing::{debug, warn};

use crate::cooldown::CooldownState;
use crate::humanize::TemplateRotation;
use crate::ingest::RateLimiter;
use crate::queue::AccountQueue;
use crate::{lock, read, write};

/// Idle-tracking for auto-warm.
#[derive(Debug, Clone, Default)]
pub struct WarmState {
    /// Last genuine outward private reply. Synthetic warm traffic never touches it.
    pub last_private_reply_at: Option<DateTime<Utc>>,
    /// Last successful synthetic warm send.
    pub last_warm_at: Option<DateTime<Utc>>,
    /// A warm task is waiting or sending.
    pub in_flight: bool,
}

/// Mutable per-account state touched by the queue processor and auto-warm.
#[derive(Debug, Default)]
pub struct AccountRuntime {
    pub queue: AccountQueue,
    /// Lane cooldowns and the response-count pause.
    pub cooldown: CooldownState,
    /// Prior replies per contact.
    pub interactions: HashMap<String, u32>,
    pub limiter: RateLimiter,
    /// Per-chat template cursor, so consecutive replies differ.
    pub rotation: TemplateRotation,
    /// Last templates successfully read from the store, per context.
    pub templates: HashMap<ReplyContext, Vec<String>>,
    pub warm: WarmState,
}

impl AccountRuntime {
    pub fn interaction_count(&self, contact: &str) -> u32 {
        self.interactions.get(contact).copied().unwrap_or(0)
    }

    pub fn record_interaction(&mut self, contact: &str) -> u32 {
        let count = self.interactions.entry(contact.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }
}

#[derive(Debug)]
struct Lifecycle {
    status: AccountStatus,
    operator_stopped: bool,
    /// Identity reported by the driver once ready.
    reported_own_id: Option<String>,
}

/// The live session and a counter bumped every time it is swapped.
#[derive(Default)]
struct SessionHandle {
    current: Option<Arc<dyn ChatSession>>,
    generation: u64,
}

/// Everything the engine holds for one account.
pub struct AccountSlot {
    id: AccountId,
    config: RwLock<Arc<AccountConfig>>,
    lifecycle: Mutex<Lifecycle>,
    session: Mutex<SessionHandle>,
    runtime: Mutex<AccountRuntime>,
    registered_at: DateTime<Utc>,
}

impl AccountSlot {
    pub fn new(config: AccountConfig, registered_at: DateTime<Utc>) -> Self {
        let templates = [ReplyContext::First, ReplyContext::Followup, ReplyContext::Group]
            .into_iter()
            .map(|ctx| (ctx, config.templates.for_context(ctx).to_vec()))
            .collect();
        Self {
            id: config.account_id(),
            config: RwLock::new(Arc::new(config)),
            lifecycle: Mutex::new(Lifecycle {
                status: AccountStatus::Disconnected,
                operator_stopped: false,
                reported_own_id: None,
            }),
            session: Mutex::new(SessionHandle::default()),
            runtime: Mutex::new(AccountRuntime {
                templates,
                ..AccountRuntime::default()
            }),
            registered_at,
        }
    }

    pub fn id(&self) -> &AccountId {
        &self.id
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<AccountConfig> {
        Arc::clone(&read(&self.config))
    }

    /// Applies `f` to a copy of the config and swaps it in.
    pub fn update_config(&self, f: impl FnOnce(&mut AccountConfig)) -> Arc<AccountConfig> {
        let mut guard = write(&self.config);
        let mut next = AccountConfig::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
        Arc::clone(&guard)
    }

    pub fn status(&self) -> AccountStatus {
        lock(&self.lifecycle).status
    }

    /// Moves the FSM to `next`, rejecting transitions the table does not allow.
    pub fn set_status(&self, next: AccountStatus) -> Result<AccountStatus, PacelineError> {
        let mut lifecycle = lock(&self.lifecycle);
        let previous = lifecycle.status;
        lifecycle.status = previous.transition(next)?;
        if previous != next {
            debug!(account = %self.id, from = %previous, to = %next, "account status changed");
        }
        Ok(previous)
    }

    /// Like [`set_status`](Self::set_status) but logs and ignores illegal transitions.
    pub fn try_set_status(&self, next: AccountStatus) {
        if let Err(e) = self.set_status(next) {
            warn!(account = %self.id, error = %e, "ignoring status change");
        }
    }

    pub fn is_operator_stopped(&self) -> bool {
        lock(&self.lifecycle).operator_stopped
    }

    pub fn set_operator_stopped(&self, stopped: bool) {
        lock(&self.lifecycle).operator_stopped = stopped;
    }

    /// The account's own chat identity: driver-reported, else configured.
    pub fn own_id(&self) -> Option<String> {
        lock(&self.lifecycle)
            .reported_own_id
            .clone()
            .or_else(|| self.config().own_id.clone())
    }

    pub fn set_reported_own_id(&self, own_id: Option<String>) {
        if own_id.is_some() {
            lock(&self.lifecycle).reported_own_id = own_id;
        }
    }

    pub fn session(&self) -> Option<Arc<dyn ChatSession>> {
        lock(&self.session).current.clone()
    }

    /// Installs a new session handle, returning the previous one.
    ///
    /// Every call starts a new session generation.
    pub fn replace_session(
        &self,
        session: Option<Arc<dyn ChatSession>>,
    ) -> Option<Arc<dyn ChatSession>> {
        let mut handle = lock(&self.session);
        handle.generation += 1;
        std::mem::replace(&mut handle.current, session)
    }

    /// Installs `session` and returns its generation, which the session's
    /// event pump presents with every event.
    pub fn install_session(&self, session: Arc<dyn ChatSession>) -> u64 {
        let mut handle = lock(&self.session);
        handle.generation += 1;
        handle.current = Some(session);
        handle.generation
    }

    /// Generation of the installed session.
    pub fn session_generation(&self) -> u64 {
        lock(&self.session).generation
    }

    /// Drops the session if it is still generation `generation`.
    ///
    /// Returns `false`, leaving the slot untouched, once a newer session has
    /// been installed.
    pub fn detach_session(&self, generation: u64) -> bool {
        let mut handle = lock(&self.session);
        if handle.generation != generation {
            return false;
        }
        handle.generation += 1;
        handle.current = None;
        true
    }

    /// Runs `f` with exclusive access to the lane runtime.
    pub fn with_runtime<R>(&self, f: impl FnOnce(&mut AccountRuntime) -> R) -> R {
        f(&mut lock(&self.runtime))
    }
}

/// Registry of all managed accounts, keyed by id.
#[derive(Default)]
pub struct AccountRegistry {
    slots: RwLock<BTreeMap<AccountId, Arc<AccountSlot>>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new account. Fails if the id is taken.
    pub fn insert(&self, config: AccountConfig) -> Result<Arc<AccountSlot>, PacelineError> {
        let mut slots = write(&self.slots);
        let id = config.account_id();
        if slots.contains_key(&id) {
            return Err(PacelineError::Config(format!(
                "account `{id}` is already registered"
            )));
        }
        let slot = Arc::new(AccountSlot::new(config, Utc::now()));
        slots.insert(id, Arc::clone(&slot));
        Ok(slot)
    }

    pub fn remove(&self, id: &AccountId) -> Option<Arc<AccountSlot>> {
        write(&self.slots).remove(id)
    }

    pub fn get(&self, id: &AccountId) -> Result<Arc<AccountSlot>, PacelineError> {
        read(&self.slots)
            .get(id)
            .cloned()
            .ok_or_else(|| PacelineError::AccountNotFound(id.to_string()))
    }

    /// Snapshot of all slots in id order.
    pub fn all(&self) -> Vec<Arc<AccountSlot>> {
        read(&self.slots).values().cloned().collect()
    }

    /// Slots whose status counts as active.
    pub fn active(&self) -> Vec<Arc<AccountSlot>> {
        self.all()
            .into_iter()
            .filter(|slot| slot.status().is_active())
            .collect()
    }

    pub fn len(&self) -> usize {
        read(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_rejected() {
        let registry = AccountRegistry::new();
        registry.insert(AccountConfig::new("a")).unwrap();
        assert!(registry.insert(AccountConfig::new("a")).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_missing_account() {
        let registry = AccountRegistry::new();
        let err = registry.get(&AccountId::from("nope")).err().unwrap();
        assert!(matches!(err, PacelineError::AccountNotFound(_)));
    }

    #[test]
    fn config_update_swaps_snapshot() {
        let registry = AccountRegistry::new();
        let slot = registry.insert(AccountConfig::new("a")).unwrap();
        let before = slot.config();
        slot.update_config(|c| c.media_interval = 7);
        assert_eq!(before.media_interval, 0, "old snapshot is untouched");
        assert_eq!(slot.config().media_interval, 7);
    }

    #[test]
    fn status_fsm_is_enforced() {
        let registry = AccountRegistry::new();
        let slot = registry.insert(AccountConfig::new("a")).unwrap();
        assert!(slot.set_status(AccountStatus::Ready).is_err());
        slot.set_status(AccountStatus::Initializing).unwrap();
        slot.set_status(AccountStatus::Ready).unwrap();
        assert_eq!(registry.active().len(), 1);
        slot.set_status(AccountStatus::Paused).unwrap();
        assert!(registry.active().is_empty());
    }

    #[test]
    fn reported_identity_overrides_configured() {
        let mut config = AccountConfig::new("a");
        config.own_id = Some("configured".into());
        let slot = AccountSlot::new(config, Utc::now());
        assert_eq!(slot.own_id().as_deref(), Some("configured"));
        slot.set_reported_own_id(Some("reported".into()));
        assert_eq!(slot.own_id().as_deref(), Some("reported"));
    }

    #[test]
    fn interaction_counter_increments_per_contact() {
        let slot = AccountSlot::new(AccountConfig::new("a"), Utc::now());
        slot.with_runtime(|rt| {
            assert_eq!(rt.record_interaction("x"), 1);
            assert_eq!(rt.record_interaction("x"), 2);
            assert_eq!(rt.interaction_count("y"), 0);
        });
    }

    #[test]
    fn replaced_session_cannot_detach_its_successor() {
        use paceline_test_utils::MockSession;

        let slot = AccountSlot::new(AccountConfig::new("a"), Utc::now());
        let old = slot.install_session(Arc::new(MockSession::new(slot.id().clone())));
        let new = slot.install_session(Arc::new(MockSession::new(slot.id().clone())));
        assert!(new > old);

        assert!(!slot.detach_session(old));
        assert!(slot.session().is_some());
        assert!(slot.detach_session(new));
        assert!(slot.session().is_none());
        assert!(!slot.detach_session(new), "detaching twice is a no-op");
    }
}
