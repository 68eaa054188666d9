// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock session driver for deterministic testing.
//!
//! `MockSessionFactory` opens a fresh [`MockSession`] per call and, unless
//! disabled, immediately reports the session ready. Every primitive the
//! engine calls on a session is captured as a [`DriverCall`] in call order.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use paceline_core::{
    AccountId, ChatSession, DriverEvent, MediaPayload, PacelineError, ProxyDescriptor,
    SessionFactory,
};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One recorded call on a [`MockSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    SendText { to: String, text: String },
    SendMedia { to: String, mime_type: String },
    MarkSeen { chat_id: String },
    MarkPlayed { chat_id: String, message_id: String },
    Typing { chat_id: String, on: bool },
    Recording { chat_id: String, on: bool },
    Pause,
    Resume,
    Close,
}

/// A mock chat session capturing calls for assertion in tests.
pub struct MockSession {
    account: AccountId,
    calls: Mutex<Vec<(Instant, DriverCall)>>,
    events: Option<mpsc::Sender<DriverEvent>>,
    fail_sends: AtomicBool,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
}

impl MockSession {
    /// A session with no event channel.
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            calls: Mutex::new(Vec::new()),
            events: None,
            fail_sends: AtomicBool::new(false),
            pauses: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
        }
    }

    fn with_events(account: AccountId, events: mpsc::Sender<DriverEvent>) -> Self {
        Self {
            events: Some(events),
            ..Self::new(account)
        }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<DriverCall> {
        guard(&self.calls).iter().map(|(_, c)| c.clone()).collect()
    }

    /// All calls with the (tokio) instant they were made.
    pub fn timed_calls(&self) -> Vec<(Instant, DriverCall)> {
        guard(&self.calls).clone()
    }

    /// Texts sent, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::SendText { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Makes `send_text` and `send_media` fail until switched off.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn pause_count(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub fn resume_count(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    /// Pushes a driver event to the engine, as the real driver would.
    pub async fn emit(&self, event: DriverEvent) -> bool {
        match &self.events {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    fn record(&self, call: DriverCall) {
        guard(&self.calls).push((Instant::now(), call));
    }

    fn check_send(&self) -> Result<(), PacelineError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            Err(PacelineError::driver("mock send failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChatSession for MockSession {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), PacelineError> {
        self.check_send()?;
        self.record(DriverCall::SendText {
            to: to.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_media(&self, to: &str, media: &MediaPayload) -> Result<(), PacelineError> {
        self.check_send()?;
        self.record(DriverCall::SendMedia {
            to: to.to_string(),
            mime_type: media.mime_type.clone(),
        });
        Ok(())
    }

    async fn mark_seen(&self, chat_id: &str) -> Result<(), PacelineError> {
        self.record(DriverCall::MarkSeen {
            chat_id: chat_id.to_string(),
        });
        Ok(())
    }

    async fn mark_played(&self, chat_id: &str, message_id: &str) -> Result<(), PacelineError> {
        self.record(DriverCall::MarkPlayed {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    async fn set_typing(&self, chat_id: &str, on: bool) -> Result<(), PacelineError> {
        self.record(DriverCall::Typing {
            chat_id: chat_id.to_string(),
            on,
        });
        Ok(())
    }

    async fn set_recording(&self, chat_id: &str, on: bool) -> Result<(), PacelineError> {
        self.record(DriverCall::Recording {
            chat_id: chat_id.to_string(),
            on,
        });
        Ok(())
    }

    async fn pause(&self) -> Result<(), PacelineError> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        self.record(DriverCall::Pause);
        Ok(())
    }

    async fn resume(&self) -> Result<(), PacelineError> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        self.record(DriverCall::Resume);
        Ok(())
    }

    async fn close(&self) -> Result<(), PacelineError> {
        self.record(DriverCall::Close);
        Ok(())
    }
}

/// A mock session factory.
///
/// Each opened session reports `Ready` with the identity `<account>@mock`
/// (or one set via [`set_own_id`](Self::set_own_id)) unless auto-ready is off.
pub struct MockSessionFactory {
    auto_ready: bool,
    own_ids: Mutex<HashMap<AccountId, String>>,
    failing: Mutex<HashSet<AccountId>>,
    opens: Mutex<Vec<(AccountId, Option<ProxyDescriptor>)>>,
    sessions: Mutex<HashMap<AccountId, Arc<MockSession>>>,
}

impl MockSessionFactory {
    pub fn new() -> Self {
        Self {
            auto_ready: true,
            own_ids: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            opens: Mutex::new(Vec::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// A factory whose sessions stay `initializing` until the test emits events.
    pub fn manual() -> Self {
        Self {
            auto_ready: false,
            ..Self::new()
        }
    }

    pub fn set_own_id(&self, account: &AccountId, own_id: &str) {
        guard(&self.own_ids).insert(account.clone(), own_id.to_string());
    }

    /// Makes `open` fail for `account` until switched off.
    pub fn fail_open(&self, account: &AccountId, fail: bool) {
        let mut failing = guard(&self.failing);
        if fail {
            failing.insert(account.clone());
        } else {
            failing.remove(account);
        }
    }

    pub fn open_count(&self, account: &AccountId) -> usize {
        guard(&self.opens)
            .iter()
            .filter(|(id, _)| id == account)
            .count()
    }

    /// Proxies passed to `open`, in order.
    pub fn opens(&self) -> Vec<(AccountId, Option<ProxyDescriptor>)> {
        guard(&self.opens).clone()
    }

    /// The most recently opened session for `account`.
    pub fn session(&self, account: &AccountId) -> Option<Arc<MockSession>> {
        guard(&self.sessions).get(account).cloned()
    }
}

impl Default for MockSessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn open(
        &self,
        account: &AccountId,
        proxy: Option<&ProxyDescriptor>,
        events: mpsc::Sender<DriverEvent>,
    ) -> Result<Arc<dyn ChatSession>, PacelineError> {
        guard(&self.opens).push((account.clone(), proxy.cloned()));
        if guard(&self.failing).contains(account) {
            return Err(PacelineError::driver(format!("mock open failure for {account}")));
        }

        if self.auto_ready {
            let own_id = guard(&self.own_ids)
                .get(account)
                .cloned()
                .unwrap_or_else(|| format!("{account}@mock"));
            events
                .send(DriverEvent::Ready {
                    own_id: Some(own_id),
                })
                .await
                .map_err(|_| PacelineError::driver("event receiver dropped"))?;
        }

        let session = Arc::new(MockSession::with_events(account.clone(), events));
        guard(&self.sessions).insert(account.clone(), Arc::clone(&session));
        Ok(session)
    }
}
