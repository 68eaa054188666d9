// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the adapter traits and the orchestration engine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::PacelineError;

/// Unique identifier for a managed account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        AccountId(value.to_string())
    }
}

/// Lifecycle state of an account's remote session.
///
/// `Paused` is a first-class state: an account is never "ready and paused"
/// at the same time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum AccountStatus {
    Disconnected,
    Initializing,
    QrPending,
    Authenticated,
    Ready,
    Paused,
    Error,
}

impl AccountStatus {
    /// Whether the account counts as running for scheduling purposes.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AccountStatus::Ready | AccountStatus::Authenticated | AccountStatus::QrPending
        )
    }

    /// Whether the account currently occupies its network egress identity.
    ///
    /// A session that is still starting already holds the proxy.
    pub fn holds_proxy(self) -> bool {
        self.is_active() || self == AccountStatus::Initializing
    }

    /// Returns true if the transition `self -> next` is allowed.
    pub fn can_transition_to(self, next: AccountStatus) -> bool {
        use AccountStatus::*;
        if self == next {
            return true;
        }
        match (self, next) {
            (_, Error) | (_, Disconnected) => true,
            (Disconnected | Error | Paused, Initializing) => true,
            (Initializing, QrPending | Authenticated | Ready) => true,
            (QrPending, Authenticated | Ready) => true,
            (Authenticated, Ready) => true,
            (Ready, Authenticated) => true,
            (QrPending | Authenticated | Ready | Initializing, Paused) => true,
            (Paused, Ready) => true,
            _ => false,
        }
    }

    /// Validates and returns the next status.
    pub fn transition(self, next: AccountStatus) -> Result<AccountStatus, PacelineError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(PacelineError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// One of the two independent sub-queues of an account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Group,
    Private,
}

impl Lane {
    pub const ALL: [Lane; 2] = [Lane::Group, Lane::Private];

    /// Stable array index for per-lane state.
    pub fn index(self) -> usize {
        match self {
            Lane::Group => 0,
            Lane::Private => 1,
        }
    }
}

/// Payload of an inbound message, resolved once at ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    Text {
        body: String,
    },
    Audio {
        media_ref: String,
        duration_secs: Option<u32>,
    },
    Image {
        media_ref: String,
        caption: Option<String>,
    },
    Sticker {
        media_ref: String,
    },
    Document {
        media_ref: String,
        file_name: Option<String>,
    },
    SystemNotification {
        detail: String,
    },
}

impl MessageKind {
    pub fn is_audio(&self) -> bool {
        matches!(self, MessageKind::Audio { .. })
    }

    /// Short label used in logs and per-type statistics.
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::Text { .. } => "text",
            MessageKind::Audio { .. } => "audio",
            MessageKind::Image { .. } => "image",
            MessageKind::Sticker { .. } => "sticker",
            MessageKind::Document { .. } => "document",
            MessageKind::SystemNotification { .. } => "system",
        }
    }
}

/// An inbound message delivered by the remote session driver. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Driver-side message id, used for seen/played receipts.
    pub message_id: String,
    /// Chat the reply goes to (the sender for private chats, the group otherwise).
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    /// Group subject for group chats.
    pub chat_name: Option<String>,
    pub is_group: bool,
    pub kind: MessageKind,
    pub timestamp_secs: i64,
}

impl InboundEvent {
    pub fn lane(&self) -> Lane {
        if self.is_group {
            Lane::Group
        } else {
            Lane::Private
        }
    }
}

/// Network egress identity shared between accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyDescriptor {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Operator-declared grouping used for bulk pause; not a conflict key.
    #[serde(default)]
    pub group_id: Option<String>,
}

impl ProxyDescriptor {
    /// The `ip:port` key two accounts conflict on.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn same_endpoint(&self, other: &ProxyDescriptor) -> bool {
        self.ip == other.ip && self.port == other.port
    }
}

/// Conversation context that selects delay ranges and templates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReplyContext {
    First,
    Followup,
    Group,
}

/// Which media pool a reply draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum MediaSlot {
    Media,
    Document,
}

/// A media file ready to hand to the driver's send primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
    pub caption: Option<String>,
}

impl MediaPayload {
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }
}

/// Counters forwarded to persistence. Incremented, never read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    MessagesReceived,
    MessagesSent,
    SentText,
    SentMedia,
    SentDocument,
    SentAudio,
    SentWarm,
}

/// Signals emitted by a session driver for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    QrIssued,
    Authenticated,
    Ready { own_id: Option<String> },
    Disconnected { reason: String },
    Message(InboundEvent),
}
