// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Paceline configuration system.

use paceline_config::diagnostic::ConfigError;
use paceline_config::model::DelayRange;
use paceline_config::{load_and_validate_str, load_config_from_str};
use paceline_core::ReplyContext;

/// A fully populated account deserializes into the typed model.
#[test]
fn full_account_deserializes() {
    let toml = r#"
[engine]
queue_tick_secs = 2
log_level = "debug"

[[accounts]]
id = "sales-1"
own_id = "5511999990000"
group_replies = false
blacklist = ["5511888880000"]
private_min_interval_secs = 20
private_cooldown_minutes = 1.5
pause_after_responses = 3
pause_duration_minutes = 10
media_interval = 4
document_interval = 6

[accounts.delays.first]
read = { min = 1.0, max = 2.0 }
typing = { min = 2.0, max = 4.0 }
response = { min = 0.5, max = 1.0 }
listen = { min = 3.0, max = 6.0 }

[accounts.delays.group]
read = { min = 5.0, max = 9.0 }

[accounts.templates]
first = ["{Hi|Hello} {name}!"]
group = ["Hey {name}"]

[accounts.proxy]
ip = "1.2.3.4"
port = 8080
group_id = "rack-a"

[accounts.schedule]
start = "22:00"
end = "06:00"

[accounts.webhook]
url = "http://rotate.local/ip"
method = "POST"

[accounts.auto_warm]
enabled = true
idle_minutes = 45
"#;

    let config = load_and_validate_str(toml).expect("valid config");
    assert_eq!(config.engine.queue_tick_secs, 2);
    assert_eq!(config.engine.schedule_tick_secs, 60, "defaults fill unset keys");

    let account = &config.accounts[0];
    assert_eq!(account.id, "sales-1");
    assert!(!account.group_replies);
    assert_eq!(account.pause_after_responses, Some(3));
    assert_eq!(account.delays.group.read, Some(DelayRange::new(5.0, 9.0)));
    assert_eq!(account.delays.group.typing, None);
    assert_eq!(account.templates.for_context(ReplyContext::First).len(), 1);
    let proxy = account.proxy.as_ref().unwrap();
    assert_eq!(proxy.endpoint(), "1.2.3.4:8080");
    assert_eq!(proxy.group_id.as_deref(), Some("rack-a"));
    assert_eq!(account.webhook.as_ref().unwrap().timeout_ms, 10_000);
    assert!(account.auto_warm.enabled);
    assert_eq!(account.auto_warm.max_start_delay_secs, 120);
}

#[test]
fn unknown_account_key_is_rejected() {
    let toml = r#"
[[accounts]]
id = "a"
blaklist = []
"#;
    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("blaklist"),
        "got: {err_str}"
    );
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = r#"
[engine]
queue_tik_secs = 3
"#;
    let errors = load_and_validate_str(toml).expect_err("should fail");
    match &errors[0] {
        ConfigError::UnknownKey { suggestion, .. } => {
            assert_eq!(suggestion.as_deref(), Some("queue_tick_secs"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn bad_schedule_fails_validation() {
    let toml = r#"
[[accounts]]
id = "a"

[accounts.schedule]
start = "7"
end = "18:00"
"#;
    let errors = load_and_validate_str(toml).expect_err("should fail");
    match &errors[0] {
        ConfigError::Account { account, path, .. } => {
            assert_eq!(account, "a");
            assert_eq!(path, "schedule.start");
        }
        other => panic!("expected an account error, got {other:?}"),
    }
}

#[test]
fn empty_config_is_valid() {
    let config = load_and_validate_str("").expect("empty config is valid");
    assert!(config.accounts.is_empty());
    assert_eq!(config.engine.log_level, "info");
}

#[test]
fn infinite_minutes_from_toml_fail_validation() {
    let toml = r#"
[[accounts]]
id = "a"
pause_duration_minutes = inf

[accounts.delays.first]
typing = { min = 1.0, max = 1e20 }
"#;
    let errors = load_and_validate_str(toml).expect_err("should fail");
    let paths: Vec<&str> = errors
        .iter()
        .filter_map(|e| match e {
            ConfigError::Account { path, .. } => Some(path.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(paths, ["delays.first.typing", "pause_duration_minutes"]);
}
