// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Paceline orchestrator.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use chrono::NaiveTime;
use paceline_core::{AccountId, ProxyDescriptor, ReplyContext};
use serde::{Deserialize, Serialize};

/// Top-level Paceline configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PacelineConfig {
    /// Tick intervals and process-wide settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Managed accounts (`[[accounts]]` array).
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// Coordinator tick intervals and process-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Queue processor tick in seconds.
    #[serde(default = "default_queue_tick_secs")]
    pub queue_tick_secs: u64,

    /// Proxy/schedule coordinator tick in seconds.
    #[serde(default = "default_schedule_tick_secs")]
    pub schedule_tick_secs: u64,

    /// Auto-warm scheduler tick in seconds.
    #[serde(default = "default_warm_tick_secs")]
    pub warm_tick_secs: u64,

    /// Wait after a pre-activation webhook so an IP rotation can settle.
    #[serde(default = "default_webhook_settle_secs")]
    pub webhook_settle_secs: u64,

    /// How long shutdown waits for in-flight replies.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_tick_secs: default_queue_tick_secs(),
            schedule_tick_secs: default_schedule_tick_secs(),
            warm_tick_secs: default_warm_tick_secs(),
            webhook_settle_secs: default_webhook_settle_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    pub fn queue_tick(&self) -> Duration {
        Duration::from_secs(self.queue_tick_secs.max(1))
    }

    pub fn schedule_tick(&self) -> Duration {
        Duration::from_secs(self.schedule_tick_secs.max(1))
    }

    pub fn warm_tick(&self) -> Duration {
        Duration::from_secs(self.warm_tick_secs.max(1))
    }

    pub fn webhook_settle(&self) -> Duration {
        Duration::from_secs(self.webhook_settle_secs)
    }
}

fn default_queue_tick_secs() -> u64 {
    5
}

fn default_schedule_tick_secs() -> u64 {
    60
}

fn default_warm_tick_secs() -> u64 {
    60
}

fn default_webhook_settle_secs() -> u64 {
    5
}

fn default_drain_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Per-account configuration snapshot.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// Stable account identifier.
    pub id: String,

    /// The account's own chat identity; messages from it are ignored.
    #[serde(default)]
    pub own_id: Option<String>,

    /// Operator-facing label.
    #[serde(default)]
    pub display_name: Option<String>,

    /// Reply in group chats.
    #[serde(default = "default_true")]
    pub group_replies: bool,

    /// Apply the minimum-interval check to contacts never replied to.
    /// `false` lets brand-new contacts bypass it.
    #[serde(default = "default_true")]
    pub first_contact_rate_limit: bool,

    /// Sender ids that never get a reply.
    #[serde(default)]
    pub blacklist: Vec<String>,

    /// Minimum seconds between accepted private messages from one sender.
    #[serde(default)]
    pub private_min_interval_secs: u64,

    /// Minimum seconds between accepted group messages from one sender.
    #[serde(default)]
    pub group_min_interval_secs: u64,

    /// Post-reply pause for the private lane, in minutes.
    #[serde(default)]
    pub private_cooldown_minutes: f64,

    /// Post-reply pause for the group lane, in minutes.
    #[serde(default)]
    pub group_cooldown_minutes: f64,

    /// Pause both lanes after this many replies. `None` disables the breaker.
    #[serde(default)]
    pub pause_after_responses: Option<u32>,

    /// Length of the full pause in minutes.
    #[serde(default = "default_pause_duration_minutes")]
    pub pause_duration_minutes: f64,

    /// Send media every N interactions with a contact (0 disables).
    #[serde(default)]
    pub media_interval: u32,

    /// Send a document every N interactions with a contact (0 disables).
    #[serde(default)]
    pub document_interval: u32,

    /// Humanized delay ranges per reply context.
    #[serde(default)]
    pub delays: DelayProfile,

    /// Reply templates per context.
    #[serde(default)]
    pub templates: TemplateConfig,

    /// Media and document pools.
    #[serde(default)]
    pub media: MediaConfig,

    /// Egress proxy shared with other accounts.
    #[serde(default)]
    pub proxy: Option<ProxyDescriptor>,

    /// Daily operating window.
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,

    /// Webhook fired before activation.
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,

    /// Synthetic conversations to keep an idle account warm.
    #[serde(default)]
    pub auto_warm: AutoWarmConfig,
}

impl AccountConfig {
    /// Minimal account with every optional behavior at its default.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            own_id: None,
            display_name: None,
            group_replies: true,
            first_contact_rate_limit: true,
            blacklist: Vec::new(),
            private_min_interval_secs: 0,
            group_min_interval_secs: 0,
            private_cooldown_minutes: 0.0,
            group_cooldown_minutes: 0.0,
            pause_after_responses: None,
            pause_duration_minutes: default_pause_duration_minutes(),
            media_interval: 0,
            document_interval: 0,
            delays: DelayProfile::default(),
            templates: TemplateConfig::default(),
            media: MediaConfig::default(),
            proxy: None,
            schedule: None,
            webhook: None,
            auto_warm: AutoWarmConfig::default(),
        }
    }

    pub fn account_id(&self) -> AccountId {
        AccountId(self.id.clone())
    }
}

fn default_true() -> bool {
    true
}

fn default_pause_duration_minutes() -> f64 {
    30.0
}

/// Largest accepted delay bound, in seconds (one day).
pub const MAX_DELAY_SECS: f64 = 86_400.0;

/// Largest accepted cooldown, pause or idle time, in minutes (one year).
pub const MAX_MINUTES: f64 = 525_600.0;

/// A uniform sampling range in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DelayRange {
    pub min: f64,
    pub max: f64,
}

impl DelayRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Delay ranges for the phases of one reply context.
///
/// Unset phases fall back to the first-contact profile.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseDelays {
    #[serde(default)]
    pub read: Option<DelayRange>,
    #[serde(default)]
    pub typing: Option<DelayRange>,
    #[serde(default)]
    pub response: Option<DelayRange>,
    #[serde(default)]
    pub listen: Option<DelayRange>,
}

/// Delay profiles keyed by reply context.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DelayProfile {
    #[serde(default = "default_first_delays")]
    pub first: PhaseDelays,
    #[serde(default)]
    pub followup: PhaseDelays,
    #[serde(default)]
    pub group: PhaseDelays,
}

impl Default for DelayProfile {
    fn default() -> Self {
        Self {
            first: default_first_delays(),
            followup: PhaseDelays::default(),
            group: PhaseDelays::default(),
        }
    }
}

impl DelayProfile {
    pub fn for_context(&self, context: ReplyContext) -> &PhaseDelays {
        match context {
            ReplyContext::First => &self.first,
            ReplyContext::Followup => &self.followup,
            ReplyContext::Group => &self.group,
        }
    }
}

fn default_first_delays() -> PhaseDelays {
    PhaseDelays {
        read: Some(DelayRange::new(2.0, 8.0)),
        typing: Some(DelayRange::new(3.0, 10.0)),
        response: Some(DelayRange::new(1.0, 4.0)),
        listen: Some(DelayRange::new(5.0, 15.0)),
    }
}

/// Reply templates per context. Templates may use `{a|b}` alternation and `{name}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateConfig {
    /// Openers for a contact's first private reply.
    #[serde(default)]
    pub first: Vec<String>,
    #[serde(default)]
    pub followup: Vec<String>,
    #[serde(default)]
    pub group: Vec<String>,
}

impl TemplateConfig {
    pub fn for_context(&self, context: ReplyContext) -> &[String] {
        match context {
            ReplyContext::First => &self.first,
            ReplyContext::Followup => &self.followup,
            ReplyContext::Group => &self.group,
        }
    }
}

/// File paths for the media and document pools.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Image and video paths or URLs.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub documents: Vec<String>,
}

/// Daily operating window as `HH:MM` times of day.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    pub start: String,
    pub end: String,
}

impl ScheduleConfig {
    /// Parses both bounds.
    pub fn bounds(&self) -> Result<(NaiveTime, NaiveTime), chrono::ParseError> {
        Ok((parse_time_of_day(&self.start)?, parse_time_of_day(&self.end)?))
    }
}

/// Parses an `HH:MM` time of day.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
}

/// Webhook fired before an account is activated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_webhook_method")]
    pub method: String,
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_webhook_method() -> String {
    "GET".to_string()
}

fn default_webhook_timeout_ms() -> u64 {
    10_000
}

/// Auto-warm settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AutoWarmConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Idle minutes without a genuine private reply before warming.
    #[serde(default = "default_idle_minutes")]
    pub idle_minutes: f64,

    /// Upper bound of the random wait before a warm message starts.
    #[serde(default = "default_max_start_delay_secs")]
    pub max_start_delay_secs: u64,
}

impl Default for AutoWarmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            idle_minutes: default_idle_minutes(),
            max_start_delay_secs: default_max_start_delay_secs(),
        }
    }
}

fn default_idle_minutes() -> f64 {
    30.0
}

fn default_max_start_delay_secs() -> u64 {
    120
}
