// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-lane cooldowns and the response-count circuit breaker.
//!
//! After each reply the lane is cooled down for its configured minutes; after
//! `pause_after_responses` replies both lanes pause for `pause_duration_minutes`.
//! Every timestamp here only ever moves forward.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use paceline_config::model::AccountConfig;
use paceline_core::{AccountId, Lane, PacelineError};
use tracing::info;

use crate::registry::AccountRegistry;

/// Cooldown bookkeeping for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CooldownState {
    group_until: Option<DateTime<Utc>>,
    private_until: Option<DateTime<Utc>>,
    pause_until: Option<DateTime<Utc>>,
    responses_since_pause: u32,
}

/// Cooldown-relevant slice of an account's configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CooldownPolicy {
    pub group_minutes: f64,
    pub private_minutes: f64,
    /// Replies after which the whole account pauses. `None` never pauses.
    pub pause_after: Option<u32>,
    pub pause_minutes: f64,
}

impl From<&AccountConfig> for CooldownPolicy {
    fn from(config: &AccountConfig) -> Self {
        Self {
            group_minutes: config.group_cooldown_minutes,
            private_minutes: config.private_cooldown_minutes,
            pause_after: config.pause_after_responses,
            pause_minutes: config.pause_duration_minutes,
        }
    }
}

impl CooldownPolicy {
    fn lane_minutes(&self, lane: Lane) -> f64 {
        match lane {
            Lane::Group => self.group_minutes,
            Lane::Private => self.private_minutes,
        }
    }
}

/// What `on_reply_sent` changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyBookkeeping {
    pub lane_cooldown_until: Option<DateTime<Utc>>,
    pub paused_until: Option<DateTime<Utc>>,
}

impl CooldownState {
    pub fn lane_until(&self, lane: Lane) -> Option<DateTime<Utc>> {
        match lane {
            Lane::Group => self.group_until,
            Lane::Private => self.private_until,
        }
    }

    pub fn pause_until(&self) -> Option<DateTime<Utc>> {
        self.pause_until
    }

    pub fn responses_since_pause(&self) -> u32 {
        self.responses_since_pause
    }

    /// True while the full pause triggered by the circuit breaker is running.
    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        self.pause_until.is_some_and(|until| now < until)
    }

    /// True once the lane's cooldown has expired (`now >= cooldown_until`).
    pub fn lane_ready(&self, lane: Lane, now: DateTime<Utc>) -> bool {
        self.lane_until(lane).is_none_or(|until| now >= until)
    }

    /// True if no lane cooldown or pause is running.
    pub fn is_quiet(&self, now: DateTime<Utc>) -> bool {
        !self.is_paused(now) && Lane::ALL.iter().all(|&lane| self.lane_ready(lane, now))
    }

    /// Records a successful reply on `lane`.
    pub fn on_reply_sent(
        &mut self,
        lane: Lane,
        policy: &CooldownPolicy,
        now: DateTime<Utc>,
    ) -> ReplyBookkeeping {
        let mut outcome = ReplyBookkeeping {
            lane_cooldown_until: None,
            paused_until: None,
        };

        let lane_minutes = policy.lane_minutes(lane);
        if lane_minutes > 0.0 {
            let until = after(now, lane_minutes);
            let slot = match lane {
                Lane::Group => &mut self.group_until,
                Lane::Private => &mut self.private_until,
            };
            advance(slot, until);
            outcome.lane_cooldown_until = *slot;
        }

        self.responses_since_pause = self.responses_since_pause.saturating_add(1);
        if let Some(threshold) = policy.pause_after
            && threshold > 0
            && self.responses_since_pause >= threshold
        {
            advance(&mut self.pause_until, after(now, policy.pause_minutes));
            self.responses_since_pause = 0;
            outcome.paused_until = self.pause_until;
        }

        outcome
    }
}

/// Moves `slot` forward to `until`; never backwards.
fn advance(slot: &mut Option<DateTime<Utc>>, until: DateTime<Utc>) {
    if slot.is_none_or(|current| until > current) {
        *slot = Some(until);
    }
}

/// `value` minutes as a chrono duration. Negative and NaN inputs are zero,
/// anything past the representable range saturates.
pub(crate) fn minutes(value: f64) -> ChronoDuration {
    let millis = (value.max(0.0) * 60_000.0).round() as i64;
    ChronoDuration::try_milliseconds(millis).unwrap_or(ChronoDuration::MAX)
}

/// `now` plus `value` minutes, saturating at the latest representable time.
fn after(now: DateTime<Utc>, value: f64) -> DateTime<Utc> {
    now.checked_add_signed(minutes(value))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Account-level facade over each slot's [`CooldownState`].
#[derive(Clone)]
pub struct CooldownController {
    registry: Arc<AccountRegistry>,
}

impl CooldownController {
    pub fn new(registry: Arc<AccountRegistry>) -> Self {
        Self { registry }
    }

    pub fn on_reply_sent(&self, account: &AccountId, lane: Lane) -> Result<(), PacelineError> {
        self.on_reply_sent_at(account, lane, Utc::now())
    }

    pub fn on_reply_sent_at(
        &self,
        account: &AccountId,
        lane: Lane,
        now: DateTime<Utc>,
    ) -> Result<(), PacelineError> {
        let slot = self.registry.get(account)?;
        let policy = CooldownPolicy::from(slot.config().as_ref());
        let outcome = slot.with_runtime(|rt| rt.cooldown.on_reply_sent(lane, &policy, now));
        if let Some(until) = outcome.paused_until {
            info!(account = %account, until = %until, "response threshold reached, pausing replies");
        }
        Ok(())
    }

    pub fn is_paused(&self, account: &AccountId) -> Result<bool, PacelineError> {
        self.is_paused_at(account, Utc::now())
    }

    pub fn is_paused_at(&self, account: &AccountId, now: DateTime<Utc>) -> Result<bool, PacelineError> {
        let slot = self.registry.get(account)?;
        Ok(slot.with_runtime(|rt| rt.cooldown.is_paused(now)))
    }
}
