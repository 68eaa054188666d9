// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Paceline engine tests.
//!
//! Provides mock collaborators for fast, deterministic tests without a real
//! chat driver, database or HTTP endpoint.
//!
//! # Components
//!
//! - [`MockSessionFactory`] / [`MockSession`] - session driver that records every call in order
//! - [`MockStore`] - in-memory templates, media pools and stat counters with failure injection
//! - [`MockWebhook`] - records webhook invocations

pub mod mock_session;
pub mod mock_store;
pub mod mock_webhook;

pub use mock_session::{DriverCall, MockSession, MockSessionFactory};
pub use mock_store::MockStore;
pub use mock_webhook::MockWebhook;
