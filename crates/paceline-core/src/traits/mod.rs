// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits for the collaborators the engine drives but does not own.
//!
//! All adapters use `#[async_trait]` for dynamic dispatch compatibility.

pub mod session;
pub mod storage;
pub mod webhook;

pub use session::{ChatSession, SessionFactory};
pub use storage::AccountStore;
pub use webhook::WebhookTrigger;
