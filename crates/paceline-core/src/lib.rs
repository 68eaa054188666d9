// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Paceline account orchestrator.
//!
//! This crate provides the error type, the domain types, and the adapter
//! traits for the collaborators the engine consumes: the remote session
//! driver, persistence, and the webhook trigger.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::PacelineError;
pub use types::{
    AccountId, AccountStatus, DriverEvent, InboundEvent, Lane, MediaPayload, MediaSlot,
    MessageKind, ProxyDescriptor, ReplyContext, StatKind,
};

pub use traits::{AccountStore, ChatSession, SessionFactory, WebhookTrigger};
