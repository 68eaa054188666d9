// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-account two-lane queue with sender dedup and busy locks.
//!
//! Each lane keeps its items sorted by the original event timestamp so a
//! backlog replayed out of order is still answered chronologically. A lane
//! hands out at most one item at a time; the item's sender stays "in flight"
//! until the lane is released.

use chrono::{DateTime, Utc};
use paceline_core::{InboundEvent, Lane};

use crate::cooldown::CooldownState;

/// A pending inbound event owned by one lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    /// The event as admitted by the ingest gate.
    pub event: InboundEvent,
    /// Wall-clock time of admission; the lane orders by the event's own timestamp.
    pub enqueued_at: DateTime<Utc>,
}

/// Result of an enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Added to the lane, which now holds `depth` items.
    Queued { depth: usize },
    /// The sender already has an item waiting in this lane.
    AlreadyQueued,
    /// The sender's previous item is executing right now.
    InFlight,
}

#[derive(Debug, Default)]
struct LaneState {
    items: Vec<QueueItem>,
    busy: bool,
    in_flight_sender: Option<String>,
}

impl LaneState {
    fn holds_sender(&self, sender: &str) -> bool {
        self.items.iter().any(|item| item.event.sender_id == sender)
    }
}

/// The group and private lanes of one account.
#[derive(Debug, Default)]
pub struct AccountQueue {
    lanes: [LaneState; 2],
}

impl AccountQueue {
    fn lane(&self, lane: Lane) -> &LaneState {
        &self.lanes[lane.index()]
    }

    fn lane_mut(&mut self, lane: Lane) -> &mut LaneState {
        &mut self.lanes[lane.index()]
    }

    /// Adds `event` to its lane unless the sender is already queued or in flight.
    pub fn enqueue(&mut self, event: InboundEvent, now: DateTime<Utc>) -> EnqueueOutcome {
        let state = self.lane_mut(event.lane());
        if state.in_flight_sender.as_deref() == Some(event.sender_id.as_str()) {
            return EnqueueOutcome::InFlight;
        }
        if state.holds_sender(&event.sender_id) {
            return EnqueueOutcome::AlreadyQueued;
        }
        state.items.push(QueueItem {
            event,
            enqueued_at: now,
        });
        // Stable sort keeps insertion order for equal timestamps.
        state.items.sort_by_key(|item| item.event.timestamp_secs);
        EnqueueOutcome::Queued {
            depth: state.items.len(),
        }
    }

    /// Removes and returns the earliest item if the lane may run now, claiming
    /// the lane's busy lock. The caller must [`release`](Self::release) it.
    pub fn dequeue_if_free(
        &mut self,
        lane: Lane,
        cooldown: &CooldownState,
        now: DateTime<Utc>,
    ) -> Option<QueueItem> {
        if cooldown.is_paused(now) || !cooldown.lane_ready(lane, now) {
            return None;
        }
        let state = self.lane_mut(lane);
        if state.busy || state.items.is_empty() {
            return None;
        }
        let item = state.items.remove(0);
        state.busy = true;
        state.in_flight_sender = Some(item.event.sender_id.clone());
        Some(item)
    }

    /// Takes the lane's busy lock without dequeuing, for work that must not
    /// overlap a reply on this lane. Returns `false` if the lane is busy.
    pub fn try_claim(&mut self, lane: Lane) -> bool {
        let state = self.lane_mut(lane);
        !std::mem::replace(&mut state.busy, true)
    }

    /// Clears the lane's busy lock after an execution finishes.
    pub fn release(&mut self, lane: Lane) {
        let state = self.lane_mut(lane);
        state.busy = false;
        state.in_flight_sender = None;
    }

    /// True while an execution (or another claim) holds the lane.
    pub fn is_busy(&self, lane: Lane) -> bool {
        self.lane(lane).busy
    }

    pub fn any_busy(&self) -> bool {
        Lane::ALL.iter().any(|&lane| self.is_busy(lane))
    }

    pub fn lane_depth(&self, lane: Lane) -> usize {
        self.lane(lane).items.len()
    }

    /// Waiting items across both lanes, excluding in-flight ones.
    pub fn depth(&self) -> usize {
        Lane::ALL.iter().map(|&lane| self.lane_depth(lane)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    /// Drops every waiting item; in-flight executions are unaffected.
    pub fn clear(&mut self) -> usize {
        let dropped = self.depth();
        for state in &mut self.lanes {
            state.items.clear();
        }
        dropped
    }
}
