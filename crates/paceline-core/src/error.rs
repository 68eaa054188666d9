// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Paceline account orchestrator.

use thiserror::Error;

use crate::types::AccountStatus;

/// The primary error type used across adapter traits and engine operations.
#[derive(Debug, Error)]
pub enum PacelineError {
    /// Configuration errors (invalid TOML, bad ranges, malformed times).
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence errors (template/config reads, stat writes).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Remote session driver errors (send failure, session closed).
    #[error("driver error: {message}")]
    Driver {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Webhook invocation failed for a reason other than the expected reset.
    #[error("webhook error: {0}")]
    Webhook(String),

    /// Activation aborted because another active account holds the same proxy.
    #[error("proxy {proxy} is already in use by account `{conflicting}`; `{account}` was not started")]
    ProxyConflict {
        account: String,
        conflicting: String,
        proxy: String,
    },

    /// No account registered under the given id.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// The status FSM rejected a transition.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: AccountStatus,
        to: AccountStatus,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PacelineError {
    /// Shorthand for a driver error without an underlying source.
    pub fn driver(message: impl Into<String>) -> Self {
        PacelineError::Driver {
            message: message.into(),
            source: None,
        }
    }
}
