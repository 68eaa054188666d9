// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Covers what serde attributes cannot express: ordered delay ranges,
//! parseable times of day, unique account ids, usable proxy and webhook
//! settings. Account errors are labelled with the account id.

use std::collections::HashMap;

use crate::diagnostic::ConfigError;
use crate::model::{
    AccountConfig, DelayRange, MAX_DELAY_SECS, MAX_MINUTES, PacelineConfig, PhaseDelays,
    parse_time_of_day,
};

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

/// Checks semantic constraints, collecting every error instead of failing fast.
pub fn validate_config(config: &PacelineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !matches!(
        config.engine.log_level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ConfigError::Engine {
            path: "log_level".into(),
            message: format!(
                "must be one of trace, debug, info, warn, error; got `{}`",
                config.engine.log_level
            ),
        });
    }

    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    for (i, account) in config.accounts.iter().enumerate() {
        let id = account.id.trim();
        if !id.is_empty() {
            if let Some(&first) = first_seen.get(id) {
                errors.push(ConfigError::DuplicateAccount {
                    id: id.to_string(),
                    first,
                    second: i,
                });
            } else {
                first_seen.insert(id, i);
            }
        }
        AccountCheck::new(i, account, &mut errors).run();
    }

    into_result(errors)
}

/// Validates one account; also used when accounts are registered at runtime.
pub fn validate_account_config(account: &AccountConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    AccountCheck::new(0, account, &mut errors).run();
    into_result(errors)
}

fn into_result(errors: Vec<ConfigError>) -> Result<(), Vec<ConfigError>> {
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

struct AccountCheck<'a> {
    label: String,
    account: &'a AccountConfig,
    errors: &'a mut Vec<ConfigError>,
}

impl<'a> AccountCheck<'a> {
    fn new(index: usize, account: &'a AccountConfig, errors: &'a mut Vec<ConfigError>) -> Self {
        let label = match account.id.trim() {
            "" => format!("accounts[{index}]"),
            id => id.to_string(),
        };
        Self {
            label,
            account,
            errors,
        }
    }

    fn fail(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigError::Account {
            account: self.label.clone(),
            path: path.into(),
            message: message.into(),
        });
    }

    fn run(mut self) {
        let account = self.account;

        if account.id.trim().is_empty() {
            self.fail("id", "must not be empty");
        }

        for (context, phases) in [
            ("first", &account.delays.first),
            ("followup", &account.delays.followup),
            ("group", &account.delays.group),
        ] {
            self.phases(context, phases);
        }

        for (name, value) in [
            ("private_cooldown_minutes", account.private_cooldown_minutes),
            ("group_cooldown_minutes", account.group_cooldown_minutes),
            ("pause_duration_minutes", account.pause_duration_minutes),
            ("auto_warm.idle_minutes", account.auto_warm.idle_minutes),
        ] {
            if !(0.0..=MAX_MINUTES).contains(&value) {
                self.fail(
                    name,
                    format!("must be between 0 and {MAX_MINUTES} minutes, got {value}"),
                );
            }
        }

        if account.pause_after_responses == Some(0) {
            self.fail("pause_after_responses", "must be at least 1 when set");
        }

        if let Some(proxy) = &account.proxy {
            if proxy.ip.trim().is_empty() {
                self.fail("proxy.ip", "must not be empty");
            }
            if proxy.port == 0 {
                self.fail("proxy.port", "must not be 0");
            }
        }

        if let Some(schedule) = &account.schedule {
            for (name, value) in [("start", &schedule.start), ("end", &schedule.end)] {
                if parse_time_of_day(value).is_err() {
                    self.fail(
                        format!("schedule.{name}"),
                        format!("`{value}` is not a valid HH:MM time"),
                    );
                }
            }
        }

        if let Some(webhook) = &account.webhook {
            if webhook.url.trim().is_empty() {
                self.fail("webhook.url", "must not be empty");
            }
            if !HTTP_METHODS.contains(&webhook.method.to_ascii_uppercase().as_str()) {
                self.fail(
                    "webhook.method",
                    format!("`{}` is not a supported HTTP method", webhook.method),
                );
            }
        }
    }

    fn phases(&mut self, context: &str, phases: &PhaseDelays) {
        for (phase, range) in [
            ("read", phases.read),
            ("typing", phases.typing),
            ("response", phases.response),
            ("listen", phases.listen),
        ] {
            if let Some(DelayRange { min, max }) = range
                && !(0.0 <= min && min <= max && max <= MAX_DELAY_SECS)
            {
                self.fail(
                    format!("delays.{context}.{phase}"),
                    format!(
                        "must satisfy 0 <= min <= max <= {MAX_DELAY_SECS}, got min={min} max={max}"
                    ),
                );
            }
        }
    }
}
