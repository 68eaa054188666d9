// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingest gate and per-sender rate limiting in front of the account queue.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use paceline_config::model::AccountConfig;
use paceline_core::{InboundEvent, Lane, MessageKind};
use tracing::debug;

use crate::queue::EnqueueOutcome;
use crate::registry::AccountSlot;

/// Why the gate dropped an event. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    OwnMessage,
    SystemNotification,
    Blacklisted,
    GroupsDisabled,
}

/// Outcome of offering an inbound event to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Queued { depth: usize },
    Filtered(FilterReason),
    RateLimited,
    Duplicate(EnqueueOutcome),
}

impl Admission {
    pub fn is_queued(&self) -> bool {
        matches!(self, Admission::Queued { .. })
    }
}

/// Pure pre-queue predicate. `None` means accept.
pub fn gate(
    event: &InboundEvent,
    config: &AccountConfig,
    own_id: Option<&str>,
) -> Option<FilterReason> {
    if own_id.is_some_and(|own| own == event.sender_id) {
        return Some(FilterReason::OwnMessage);
    }
    if matches!(event.kind, MessageKind::SystemNotification { .. }) {
        return Some(FilterReason::SystemNotification);
    }
    if config.blacklist.iter().any(|b| b == &event.sender_id) {
        return Some(FilterReason::Blacklisted);
    }
    if event.is_group && !config.group_replies {
        return Some(FilterReason::GroupsDisabled);
    }
    None
}

/// Remembers when each sender last got through, per lane.
#[derive(Debug, Default)]
pub struct RateLimiter {
    last_accepted: HashMap<(Lane, String), i64>,
}

impl RateLimiter {
    /// Returns `true` and records the event if the sender is outside the
    /// minimum interval. `exempt` skips the interval check but still records.
    pub fn admit(&mut self, event: &InboundEvent, min_interval_secs: u64, exempt: bool) -> bool {
        let key = (event.lane(), event.sender_id.clone());
        if !exempt
            && min_interval_secs > 0
            && let Some(&previous) = self.last_accepted.get(&key)
            && event.timestamp_secs.abs_diff(previous) < min_interval_secs
        {
            return false;
        }
        self.last_accepted.insert(key, event.timestamp_secs);
        true
    }
}

fn min_interval(config: &AccountConfig, lane: Lane) -> u64 {
    match lane {
        Lane::Group => config.group_min_interval_secs,
        Lane::Private => config.private_min_interval_secs,
    }
}

/// Runs the gate, the rate limiter, and the queue for one event.
pub fn admit(slot: &AccountSlot, event: InboundEvent, now: DateTime<Utc>) -> Admission {
    let config = slot.config();
    let own_id = slot.own_id();
    if let Some(reason) = gate(&event, &config, own_id.as_deref()) {
        debug!(account = %slot.id(), sender = %event.sender_id, ?reason, "event filtered");
        return Admission::Filtered(reason);
    }

    let lane = event.lane();
    let sender = event.sender_id.clone();
    let admission = slot.with_runtime(|rt| {
        let exempt =
            !config.first_contact_rate_limit && rt.interaction_count(&event.sender_id) == 0;
        if !rt.limiter.admit(&event, min_interval(&config, lane), exempt) {
            return Admission::RateLimited;
        }
        match rt.queue.enqueue(event, now) {
            EnqueueOutcome::Queued { depth } => Admission::Queued { depth },
            duplicate => Admission::Duplicate(duplicate),
        }
    });

    match admission {
        Admission::RateLimited => {
            debug!(account = %slot.id(), sender = %sender, lane = %lane, "rate limited");
        }
        Admission::Duplicate(outcome) => {
            debug!(account = %slot.id(), sender = %sender, lane = %lane, ?outcome, "duplicate dropped");
        }
        _ => {}
    }
    admission
}
