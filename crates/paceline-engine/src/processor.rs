// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue processor: promotes queued items into humanized reply cycles.
//!
//! Each tick tries both lanes of every sendable account. A dequeued item runs
//! on its own task so a reply's multi-second delay sequence never holds up the
//! tick, another lane, or another account. The lane's busy lock is released
//! by a drop guard whether the cycle succeeds, fails, or panics.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use paceline_core::{
    AccountStatus, AccountStore, ChatSession, InboundEvent, Lane, MediaPayload, MediaSlot,
    PacelineError, ReplyContext, StatKind,
};
use tokio::time::{Instant, sleep};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::clock_since;
use crate::cooldown::CooldownController;
use crate::humanize::{HumanBehaviorEngine, MediaChoice, first_name};
use crate::queue::QueueItem;
use crate::registry::{AccountRegistry, AccountSlot};
use crate::stats::EngineStats;

/// Statuses in which a session may send.
fn can_send(status: AccountStatus) -> bool {
    matches!(status, AccountStatus::Ready | AccountStatus::Authenticated)
}

/// Releases a lane's busy lock when dropped.
pub(crate) struct LaneClaim {
    slot: Arc<AccountSlot>,
    lane: Lane,
}

impl LaneClaim {
    /// Claims `lane` without dequeuing; `None` if it is already busy.
    pub(crate) fn try_acquire(slot: &Arc<AccountSlot>, lane: Lane) -> Option<Self> {
        slot.with_runtime(|rt| rt.queue.try_claim(lane))
            .then(|| LaneClaim {
                slot: Arc::clone(slot),
                lane,
            })
    }
}

impl Drop for LaneClaim {
    fn drop(&mut self) {
        let lane = self.lane;
        self.slot.with_runtime(|rt| rt.queue.release(lane));
    }
}

/// What a completed reply cycle sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sent {
    Text,
    Media { audio: bool },
    Document,
}

impl Sent {
    fn stat(self) -> StatKind {
        match self {
            Sent::Text => StatKind::SentText,
            Sent::Media { audio: true } => StatKind::SentAudio,
            Sent::Media { audio: false } => StatKind::SentMedia,
            Sent::Document => StatKind::SentDocument,
        }
    }
}

#[derive(Clone)]
pub struct QueueProcessor {
    registry: Arc<AccountRegistry>,
    behavior: Arc<HumanBehaviorEngine>,
    store: Arc<dyn AccountStore>,
    stats: Arc<EngineStats>,
    cooldown: CooldownController,
    tracker: TaskTracker,
}

impl QueueProcessor {
    pub fn new(
        registry: Arc<AccountRegistry>,
        behavior: Arc<HumanBehaviorEngine>,
        store: Arc<dyn AccountStore>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            cooldown: CooldownController::new(Arc::clone(&registry)),
            registry,
            behavior,
            store,
            stats,
            tracker: TaskTracker::new(),
        }
    }

    /// One processor tick. Returns how many executions were launched.
    pub fn tick(&self, now: DateTime<Utc>) -> usize {
        let mut launched = 0;
        for slot in self.registry.all() {
            if !can_send(slot.status()) {
                continue;
            }
            let Some(session) = slot.session() else {
                continue;
            };
            for lane in Lane::ALL {
                let item = slot.with_runtime(|rt| rt.queue.dequeue_if_free(lane, &rt.cooldown, now));
                let Some(item) = item else {
                    continue;
                };
                let claim = LaneClaim {
                    slot: Arc::clone(&slot),
                    lane,
                };
                let this = self.clone();
                let session = Arc::clone(&session);
                self.tracker.spawn(async move {
                    this.run_item(claim, session, item, now).await;
                });
                launched += 1;
            }
        }
        launched
    }

    /// Number of reply cycles currently executing.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits up to `timeout` for in-flight executions. Returns `false` on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        self.tracker.reopen();
        drained
    }

    async fn run_item(
        &self,
        claim: LaneClaim,
        session: Arc<dyn ChatSession>,
        item: QueueItem,
        tick_at: DateTime<Utc>,
    ) {
        let started = Instant::now();
        let slot = Arc::clone(&claim.slot);
        let lane = claim.lane;
        let sender = item.event.sender_id.clone();
        debug!(
            account = %slot.id(),
            lane = %lane,
            sender = %sender,
            kind = item.event.kind.label(),
            waited = ?(tick_at - item.enqueued_at),
            "executing queue item"
        );

        match self.execute(&slot, session.as_ref(), &item.event).await {
            Ok(sent) => {
                let now = clock_since(tick_at, started);
                self.on_sent(&slot, lane, &sender, sent, now).await;
                info!(account = %slot.id(), lane = %lane, sender = %sender, ?sent, "reply sent");
            }
            Err(e) => {
                warn!(
                    account = %slot.id(),
                    lane = %lane,
                    sender = %sender,
                    error = %e,
                    "reply abandoned"
                );
            }
        }
        drop(claim);
    }

    async fn execute(
        &self,
        slot: &AccountSlot,
        session: &dyn ChatSession,
        event: &InboundEvent,
    ) -> Result<Sent, PacelineError> {
        let config = slot.config();
        let contact = event.sender_id.as_str();
        let interactions = slot.with_runtime(|rt| rt.interaction_count(contact));
        let context = if event.is_group {
            ReplyContext::Group
        } else if interactions == 0 {
            ReplyContext::First
        } else {
            ReplyContext::Followup
        };

        let plan = self.behavior.delay_plan(context, &config.delays);
        let choice = HumanBehaviorEngine::media_choice(
            interactions,
            config.media_interval,
            config.document_interval,
        );

        // Content is settled before any wait so a missing template costs no time.
        let media = match choice {
            MediaChoice::Text => None,
            MediaChoice::Media => self.pick_media(slot, MediaSlot::Media).await,
            MediaChoice::Document => self.pick_media(slot, MediaSlot::Document).await,
        };
        let text = match media {
            Some(_) => None,
            None => Some(self.compose(slot, event, context).await?),
        };

        sleep(plan.read).await;
        session.mark_seen(&event.chat_id).await?;
        if event.kind.is_audio() {
            sleep(plan.listen).await;
            session.mark_played(&event.chat_id, &event.message_id).await?;
        }

        match (text, media) {
            (Some(text), _) => {
                deliver_text(session, &event.chat_id, &text, plan.typing, plan.response).await?;
                Ok(Sent::Text)
            }
            (None, Some(payload)) => {
                let audio = payload.is_audio();
                if audio {
                    session.set_recording(&event.chat_id, true).await?;
                    sleep(plan.response).await;
                    session.set_recording(&event.chat_id, false).await?;
                } else {
                    sleep(plan.response).await;
                }
                session.send_media(&event.chat_id, &payload).await?;
                Ok(match choice {
                    MediaChoice::Document => Sent::Document,
                    _ => Sent::Media { audio },
                })
            }
            (None, None) => Err(PacelineError::Internal("reply cycle without content".into())),
        }
    }

    async fn on_sent(
        &self,
        slot: &AccountSlot,
        lane: Lane,
        sender: &str,
        sent: Sent,
        now: DateTime<Utc>,
    ) {
        slot.with_runtime(|rt| {
            rt.record_interaction(sender);
            if lane == Lane::Private {
                rt.warm.last_private_reply_at = Some(now);
            }
        });
        if let Err(e) = self.cooldown.on_reply_sent_at(slot.id(), lane, now) {
            // The account was removed while the reply was in flight.
            debug!(account = %slot.id(), error = %e, "cooldown not recorded");
        }
        let store = self.store.as_ref();
        self.stats.record(store, slot.id(), StatKind::MessagesSent).await;
        self.stats.record(store, slot.id(), sent.stat()).await;
    }

    /// Rotated, rendered reply text for `context`.
    async fn compose(
        &self,
        slot: &AccountSlot,
        event: &InboundEvent,
        context: ReplyContext,
    ) -> Result<String, PacelineError> {
        let templates = refresh_templates(self.store.as_ref(), slot, context).await;
        let name = if event.is_group {
            event.chat_name.as_deref()
        } else {
            event.sender_name.as_deref().and_then(first_name)
        };
        slot.with_runtime(|rt| {
            self.behavior
                .compose(&mut rt.rotation, &event.sender_id, context, &templates, name)
        })
        .ok_or_else(|| PacelineError::Config(format!("no {context} templates configured")))
    }

    /// A file from the account's pool; `None` falls back to a text reply.
    async fn pick_media(&self, slot: &AccountSlot, pool: MediaSlot) -> Option<MediaPayload> {
        match self.store.pick_media(slot.id(), pool).await {
            Ok(Some(payload)) => Some(payload),
            Ok(None) => {
                debug!(account = %slot.id(), pool = %pool, "media pool empty, replying with text");
                None
            }
            Err(e) => {
                warn!(account = %slot.id(), pool = %pool, error = %e, "media pick failed, replying with text");
                None
            }
        }
    }
}

/// Asks the store for `context` templates, keeping the last good copy on
/// failure or when the store has none.
pub(crate) async fn refresh_templates(
    store: &dyn AccountStore,
    slot: &AccountSlot,
    context: ReplyContext,
) -> Vec<String> {
    match store.templates(slot.id(), context).await {
        Ok(fresh) if !fresh.is_empty() => {
            slot.with_runtime(|rt| rt.templates.insert(context, fresh.clone()));
            fresh
        }
        Ok(_) => cached_templates(slot, context),
        Err(e) => {
            warn!(
                account = %slot.id(),
                context = %context,
                error = %e,
                "template refresh failed, using last snapshot"
            );
            cached_templates(slot, context)
        }
    }
}

fn cached_templates(slot: &AccountSlot, context: ReplyContext) -> Vec<String> {
    slot.with_runtime(|rt| rt.templates.get(&context).cloned().unwrap_or_default())
}

/// Typing indicator for `typing`, a pause of `response`, then the send.
pub(crate) async fn deliver_text(
    session: &dyn ChatSession,
    chat_id: &str,
    text: &str,
    typing: Duration,
    response: Duration,
) -> Result<(), PacelineError> {
    session.set_typing(chat_id, true).await?;
    sleep(typing).await;
    session.set_typing(chat_id, false).await?;
    sleep(response).await;
    session.send_text(chat_id, text).await
}

#[cfg(test)]
mod tests {
    use paceline_config::model::AccountConfig;
    use paceline_core::MessageKind;
    use paceline_test_utils::{DriverCall, MockSession, MockStore};

    use super::*;

    fn setup(config: AccountConfig) -> (QueueProcessor, Arc<AccountSlot>, Arc<MockSession>, Arc<MockStore>) {
        let registry = Arc::new(AccountRegistry::new());
        let slot = registry.insert(config).unwrap();
        slot.set_status(AccountStatus::Initializing).unwrap();
        slot.set_status(AccountStatus::Ready).unwrap();
        let session = Arc::new(MockSession::new(slot.id().clone()));
        slot.replace_session(Some(session.clone() as Arc<dyn ChatSession>));
        let store = Arc::new(MockStore::new());
        let processor = QueueProcessor::new(
            registry,
            Arc::new(HumanBehaviorEngine::with_seed(7)),
            store.clone(),
            Arc::new(EngineStats::new()),
        );
        (processor, slot, session, store)
    }

    fn config() -> AccountConfig {
        let mut config = AccountConfig::new("a");
        config.templates.first = vec!["Oi {name}!".into()];
        config.templates.followup = vec!["De novo, {name}".into()];
        config.templates.group = vec!["Olá {name}".into()];
        config
    }

    fn event(sender: &str, ts: i64, kind: MessageKind) -> InboundEvent {
        InboundEvent {
            message_id: format!("m{ts}"),
            chat_id: sender.into(),
            sender_id: sender.into(),
            sender_name: Some("Ana Souza".into()),
            chat_name: None,
            is_group: false,
            kind,
            timestamp_secs: ts,
        }
    }

    fn text(body: &str) -> MessageKind {
        MessageKind::Text { body: body.into() }
    }

    #[tokio::test(start_paused = true)]
    async fn text_reply_runs_full_sequence() {
        let (processor, slot, session, _store) = setup(config());
        slot.with_runtime(|rt| rt.queue.enqueue(event("x", 1, text("oi")), Utc::now()));

        assert_eq!(processor.tick(Utc::now()), 1);
        assert!(processor.drain(Duration::from_secs(120)).await);

        assert_eq!(
            session.calls(),
            vec![
                DriverCall::MarkSeen { chat_id: "x".into() },
                DriverCall::Typing { chat_id: "x".into(), on: true },
                DriverCall::Typing { chat_id: "x".into(), on: false },
                DriverCall::SendText { to: "x".into(), text: "Oi Ana!".into() },
            ]
        );
        assert_eq!(slot.with_runtime(|rt| rt.interaction_count("x")), 1);
        assert!(slot.with_runtime(|rt| rt.warm.last_private_reply_at.is_some()));
        assert!(!slot.with_runtime(|rt| rt.queue.is_busy(Lane::Private)));
    }

    #[tokio::test(start_paused = true)]
    async fn audio_is_seen_then_played_before_reply() {
        let (processor, slot, session, _store) = setup(config());
        let voice = MessageKind::Audio {
            media_ref: "ptt-1".into(),
            duration_secs: Some(4),
        };
        slot.with_runtime(|rt| rt.queue.enqueue(event("x", 3, voice), Utc::now()));

        processor.tick(Utc::now());
        processor.drain(Duration::from_secs(120)).await;

        let calls = session.calls();
        assert_eq!(calls[0], DriverCall::MarkSeen { chat_id: "x".into() });
        assert_eq!(
            calls[1],
            DriverCall::MarkPlayed {
                chat_id: "x".into(),
                message_id: "m3".into()
            }
        );
        assert!(matches!(calls.last(), Some(DriverCall::SendText { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn due_media_skips_typing() {
        let mut config = config();
        config.media_interval = 1;
        let (processor, slot, session, store) = setup(config);
        store.set_media(
            slot.id(),
            MediaSlot::Media,
            MediaPayload {
                bytes: vec![1, 2, 3],
                mime_type: "image/jpeg".into(),
                file_name: Some("pic.jpg".into()),
                caption: None,
            },
        );
        // One prior reply makes this the first media-due interaction.
        slot.with_runtime(|rt| rt.record_interaction("x"));
        slot.with_runtime(|rt| rt.queue.enqueue(event("x", 1, text("oi")), Utc::now()));

        processor.tick(Utc::now());
        processor.drain(Duration::from_secs(120)).await;

        let calls = session.calls();
        assert!(!calls.iter().any(|c| matches!(c, DriverCall::Typing { .. })));
        assert_eq!(
            calls.last(),
            Some(&DriverCall::SendMedia {
                to: "x".into(),
                mime_type: "image/jpeg".into()
            })
        );
        assert_eq!(store.stat_count(slot.id(), StatKind::SentMedia), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn audio_media_simulates_recording() {
        let mut config = config();
        config.media_interval = 1;
        let (processor, slot, session, store) = setup(config);
        store.set_media(
            slot.id(),
            MediaSlot::Media,
            MediaPayload {
                bytes: vec![0; 8],
                mime_type: "audio/ogg".into(),
                file_name: None,
                caption: None,
            },
        );
        slot.with_runtime(|rt| rt.record_interaction("x"));
        slot.with_runtime(|rt| rt.queue.enqueue(event("x", 1, text("oi")), Utc::now()));

        processor.tick(Utc::now());
        processor.drain(Duration::from_secs(120)).await;

        let calls = session.calls();
        assert_eq!(
            &calls[1..],
            &[
                DriverCall::Recording { chat_id: "x".into(), on: true },
                DriverCall::Recording { chat_id: "x".into(), on: false },
                DriverCall::SendMedia { to: "x".into(), mime_type: "audio/ogg".into() },
            ]
        );
        assert_eq!(store.stat_count(slot.id(), StatKind::SentAudio), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_media_pool_falls_back_to_text() {
        let mut config = config();
        config.document_interval = 1;
        let (processor, slot, session, _store) = setup(config);
        slot.with_runtime(|rt| rt.record_interaction("x"));
        slot.with_runtime(|rt| rt.queue.enqueue(event("x", 1, text("oi")), Utc::now()));

        processor.tick(Utc::now());
        processor.drain(Duration::from_secs(120)).await;

        assert_eq!(
            session.calls().last(),
            Some(&DriverCall::SendText {
                to: "x".into(),
                text: "De novo, Ana".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn send_failure_abandons_item_and_frees_lane() {
        let (processor, slot, session, store) = setup(config());
        session.fail_sends(true);
        slot.with_runtime(|rt| {
            rt.queue.enqueue(event("x", 1, text("oi")), Utc::now());
            rt.queue.enqueue(event("y", 2, text("oi")), Utc::now());
        });

        processor.tick(Utc::now());
        processor.drain(Duration::from_secs(120)).await;

        assert!(!slot.with_runtime(|rt| rt.queue.is_busy(Lane::Private)));
        assert_eq!(slot.with_runtime(|rt| rt.queue.depth()), 1, "not requeued");
        assert_eq!(slot.with_runtime(|rt| rt.interaction_count("x")), 0);
        assert_eq!(store.stat_count(slot.id(), StatKind::MessagesSent), 0);

        // The account keeps processing.
        session.fail_sends(false);
        processor.tick(Utc::now());
        processor.drain(Duration::from_secs(120)).await;
        assert_eq!(store.stat_count(slot.id(), StatKind::MessagesSent), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_lane_is_not_dequeued_again() {
        let (processor, slot, _session, _store) = setup(config());
        slot.with_runtime(|rt| {
            rt.queue.enqueue(event("x", 1, text("oi")), Utc::now());
            rt.queue.enqueue(event("y", 2, text("oi")), Utc::now());
        });

        assert_eq!(processor.tick(Utc::now()), 1);
        assert_eq!(processor.tick(Utc::now()), 0, "private lane is busy");
        assert_eq!(processor.in_flight(), 1);
        processor.drain(Duration::from_secs(120)).await;
        assert_eq!(processor.tick(Utc::now()), 1);
        processor.drain(Duration::from_secs(120)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn paused_account_is_skipped() {
        let (processor, slot, session, _store) = setup(config());
        slot.set_status(AccountStatus::Paused).unwrap();
        slot.with_runtime(|rt| rt.queue.enqueue(event("x", 1, text("oi")), Utc::now()));

        assert_eq!(processor.tick(Utc::now()), 0);
        assert!(session.calls().is_empty());
        assert_eq!(slot.with_runtime(|rt| rt.queue.depth()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn store_outage_uses_snapshot() {
        let (processor, slot, session, store) = setup(config());
        store.fail_templates(true);
        slot.with_runtime(|rt| rt.queue.enqueue(event("x", 1, text("oi")), Utc::now()));

        processor.tick(Utc::now());
        processor.drain(Duration::from_secs(120)).await;

        assert_eq!(
            session.calls().last(),
            Some(&DriverCall::SendText {
                to: "x".into(),
                text: "Oi Ana!".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_templates_abandon_item() {
        let (processor, slot, session, _store) = setup(AccountConfig::new("bare"));
        slot.with_runtime(|rt| rt.queue.enqueue(event("x", 1, text("oi")), Utc::now()));

        processor.tick(Utc::now());
        processor.drain(Duration::from_secs(120)).await;

        assert!(session.calls().is_empty());
        assert!(!slot.with_runtime(|rt| rt.queue.is_busy(Lane::Private)));
    }
}
