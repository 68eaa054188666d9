// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auto-warm: synthetic conversations between idle running accounts.
//!
//! An account that has not sent a genuine private reply for its configured
//! idle time opens a chat with another running account. Every skip condition
//! is checked again after the random start delay, since the account may have
//! become busy, paused or genuinely active while it waited.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use paceline_core::{AccountId, AccountStore, Lane, ReplyContext, StatKind};
use tokio::time::{Instant, sleep};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::clock_since;
use crate::cooldown::minutes;
use crate::humanize::{HumanBehaviorEngine, first_name};
use crate::processor::{LaneClaim, deliver_text, refresh_templates};
use crate::registry::{AccountRegistry, AccountSlot};
use crate::stats::EngineStats;

/// Used when an account has no first-contact templates.
const FALLBACK_OPENERS: &[&str] = &[
    "{Oi|Olá|E aí}, tudo bem?",
    "{Bom dia|Boa tarde}! Como vai?",
    "Oi! {Tudo certo|Tudo tranquilo} por aí?",
    "Opa, {quanto tempo|sumido}!",
];

/// Why an account is not warmed right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarmBlocker {
    Disabled,
    Inactive,
    /// A lane is executing a reply.
    Busy,
    /// A lane cooldown or the response-count pause is running.
    CoolingDown,
    /// Not idle long enough yet.
    RecentlyActive,
    /// No other running account with a known identity.
    NoTarget,
    TargetGone,
}

/// Result of one warm attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarmOutcome {
    Sent { target: AccountId },
    Cancelled(WarmBlocker),
    /// The driver rejected the send.
    Failed,
}

/// Clears the slot's warm-in-flight flag when dropped.
struct WarmClaim(Arc<AccountSlot>);

impl Drop for WarmClaim {
    fn drop(&mut self) {
        self.0.with_runtime(|rt| rt.warm.in_flight = false);
    }
}

/// Start of the current idle period: the latest genuine private reply or
/// warm send, else registration.
fn idle_since(slot: &AccountSlot) -> DateTime<Utc> {
    slot.with_runtime(|rt| rt.warm.last_private_reply_at.max(rt.warm.last_warm_at))
        .unwrap_or_else(|| slot.registered_at())
}

/// Skip conditions for warming `slot` at `now`.
pub fn warm_blocker(slot: &AccountSlot, now: DateTime<Utc>) -> Option<WarmBlocker> {
    let config = slot.config();
    if !config.auto_warm.enabled {
        return Some(WarmBlocker::Disabled);
    }
    if !slot.status().is_active() || slot.session().is_none() {
        return Some(WarmBlocker::Inactive);
    }
    let (busy, quiet) = slot.with_runtime(|rt| (rt.queue.any_busy(), rt.cooldown.is_quiet(now)));
    if busy {
        return Some(WarmBlocker::Busy);
    }
    if !quiet {
        return Some(WarmBlocker::CoolingDown);
    }
    if now - idle_since(slot) < minutes(config.auto_warm.idle_minutes) {
        return Some(WarmBlocker::RecentlyActive);
    }
    None
}

#[derive(Clone)]
pub struct AutoWarmScheduler {
    registry: Arc<AccountRegistry>,
    behavior: Arc<HumanBehaviorEngine>,
    store: Arc<dyn AccountStore>,
    stats: Arc<EngineStats>,
    tracker: TaskTracker,
}

impl AutoWarmScheduler {
    pub fn new(
        registry: Arc<AccountRegistry>,
        behavior: Arc<HumanBehaviorEngine>,
        store: Arc<dyn AccountStore>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            registry,
            behavior,
            store,
            stats,
            tracker: TaskTracker::new(),
        }
    }

    /// One auto-warm tick. Returns the accounts that started a warm attempt.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<AccountId> {
        let active = self.registry.active();
        if active.len() < 2 {
            return Vec::new();
        }

        let mut started = Vec::new();
        for slot in &active {
            if let Some(blocker) = warm_blocker(slot, now) {
                if blocker != WarmBlocker::Disabled {
                    debug!(account = %slot.id(), ?blocker, "auto-warm skipped");
                }
                continue;
            }
            let claimed = slot.with_runtime(|rt| !std::mem::replace(&mut rt.warm.in_flight, true));
            if !claimed {
                continue;
            }
            let claim = WarmClaim(Arc::clone(slot));
            let this = self.clone();
            self.tracker.spawn(async move {
                let outcome = this.warm(&claim.0, now).await;
                match &outcome {
                    WarmOutcome::Sent { target } => {
                        info!(account = %claim.0.id(), target = %target, "auto-warm sent");
                    }
                    WarmOutcome::Cancelled(reason) => {
                        debug!(account = %claim.0.id(), ?reason, "auto-warm cancelled");
                    }
                    WarmOutcome::Failed => {}
                }
                drop(claim);
            });
            started.push(slot.id().clone());
        }
        started
    }

    /// Waits up to `timeout` for in-flight warm tasks. Returns `false` on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        self.tracker.reopen();
        drained
    }

    /// A random running account, other than `slot`, with a known identity.
    fn pick_target(&self, slot: &AccountSlot) -> Option<(AccountId, String)> {
        let candidates: Vec<(AccountId, String)> = self
            .registry
            .active()
            .into_iter()
            .filter(|other| other.id() != slot.id())
            .filter_map(|other| other.own_id().map(|own| (other.id().clone(), own)))
            .collect();
        let index = self.behavior.pick_index(candidates.len())?;
        candidates.into_iter().nth(index)
    }

    /// Runs one warm attempt for `slot`, started by the tick at `tick_at`.
    ///
    /// The private lane is held from revalidation until the send completes,
    /// so no queued reply runs on the session at the same time.
    pub async fn warm(&self, slot: &Arc<AccountSlot>, tick_at: DateTime<Utc>) -> WarmOutcome {
        let started = Instant::now();
        let config = slot.config();

        let Some((target, chat_id)) = self.pick_target(slot) else {
            return WarmOutcome::Cancelled(WarmBlocker::NoTarget);
        };
        let wait = self
            .behavior
            .jitter(Duration::from_secs(config.auto_warm.max_start_delay_secs));
        sleep(wait).await;

        if let Some(blocker) = warm_blocker(slot, clock_since(tick_at, started)) {
            return WarmOutcome::Cancelled(blocker);
        }
        let Some(_lane) = LaneClaim::try_acquire(slot, Lane::Private) else {
            return WarmOutcome::Cancelled(WarmBlocker::Busy);
        };
        let target_slot = match self.registry.get(&target) {
            Ok(t) if t.status().is_active() => t,
            _ => return WarmOutcome::Cancelled(WarmBlocker::TargetGone),
        };
        let Some(session) = slot.session() else {
            return WarmOutcome::Cancelled(WarmBlocker::Inactive);
        };

        let mut templates = refresh_templates(self.store.as_ref(), slot, ReplyContext::First).await;
        if templates.is_empty() {
            templates = FALLBACK_OPENERS.iter().map(|s| (*s).to_string()).collect();
        }
        let name = target_slot.config().display_name.clone();
        let Some(text) = slot.with_runtime(|rt| {
            self.behavior.compose(
                &mut rt.rotation,
                &chat_id,
                ReplyContext::First,
                &templates,
                name.as_deref().and_then(first_name),
            )
        }) else {
            return WarmOutcome::Cancelled(WarmBlocker::NoTarget);
        };

        let plan = self.behavior.delay_plan(ReplyContext::First, &config.delays);
        sleep(plan.read).await;
        if let Err(e) = deliver_text(
            session.as_ref(),
            &chat_id,
            &text,
            plan.typing,
            plan.response,
        )
        .await
        {
            warn!(account = %slot.id(), target = %target, error = %e, "auto-warm send failed");
            return WarmOutcome::Failed;
        }

        let now = clock_since(tick_at, started);
        slot.with_runtime(|rt| rt.warm.last_warm_at = Some(now));
        self.stats
            .record(self.store.as_ref(), slot.id(), StatKind::SentWarm)
            .await;
        WarmOutcome::Sent { target }
    }
}
