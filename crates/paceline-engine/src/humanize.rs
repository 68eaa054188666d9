// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Humanized timing and content selection.
//!
//! The [`HumanBehaviorEngine`] samples phased delays (read, typing, response,
//! listen) from per-context ranges and picks reply content:
//! - templates rotate per contact and context so the same text is not repeated
//!   until roughly 80% of the pool has been shown
//! - `{name}` is replaced by the contact's first name (or the group subject)
//!   and `{a|b}` variants are expanded
//! - every Nth interaction swaps the text reply for a media file or document

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use paceline_config::model::{DelayProfile, DelayRange, MAX_DELAY_SECS};
use paceline_core::ReplyContext;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::lock;
use crate::spintax;

/// Share of a template pool that must be shown before repeats are allowed.
const ROTATION_RESET_RATIO: f64 = 0.8;

/// Placeholder replaced by the contact or group name.
const NAME_PLACEHOLDER: &str = "{name}";

/// Sampled delays for one reply cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPlan {
    /// Before the chat is marked read.
    pub read: Duration,
    /// While the typing indicator is shown.
    pub typing: Duration,
    /// Between typing and the send.
    pub response: Duration,
    /// Playback time before an inbound voice note is marked played.
    pub listen: Duration,
}

/// What a reply cycle sends instead of (or as) text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaChoice {
    Text,
    Media,
    Document,
}

/// Per-contact, per-context record of recently used template indices.
#[derive(Debug, Default)]
pub struct TemplateRotation {
    used: HashMap<(String, ReplyContext), HashSet<usize>>,
}

impl TemplateRotation {
    pub fn recently_used(&self, contact: &str, context: ReplyContext) -> usize {
        self.used
            .get(&(contact.to_string(), context))
            .map_or(0, HashSet::len)
    }
}

/// Samples delays and selects reply content.
pub struct HumanBehaviorEngine {
    rng: Mutex<StdRng>,
}

impl Default for HumanBehaviorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanBehaviorEngine {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic engine for tests and replays.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Draws a delay uniformly from `[min, max]` seconds.
    ///
    /// Bounds are clamped to `[0, MAX_DELAY_SECS]`; a NaN bound counts as 0.
    pub fn sample(&self, range: DelayRange) -> Duration {
        let min = range.min.max(0.0).min(MAX_DELAY_SECS);
        let max = range.max.max(min).min(MAX_DELAY_SECS);
        let secs = if max <= min {
            min
        } else {
            lock(&self.rng).gen_range(min..=max)
        };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    /// Uniform random duration in `[0, max]`.
    pub fn jitter(&self, max: Duration) -> Duration {
        self.sample(DelayRange::new(0.0, max.as_secs_f64()))
    }

    /// Uniform index below `len`; `None` for an empty pool.
    pub fn pick_index(&self, len: usize) -> Option<usize> {
        (len > 0).then(|| lock(&self.rng).gen_range(0..len))
    }

    /// Samples every phase for `context`, falling back to the first-contact
    /// range for phases the context leaves unset.
    pub fn delay_plan(&self, context: ReplyContext, profile: &DelayProfile) -> DelayPlan {
        let specific = profile.for_context(context);
        let base = &profile.first;
        let pick = |own: Option<DelayRange>, fallback: Option<DelayRange>| {
            own.or(fallback)
                .map_or(Duration::ZERO, |range| self.sample(range))
        };
        DelayPlan {
            read: pick(specific.read, base.read),
            typing: pick(specific.typing, base.typing),
            response: pick(specific.response, base.response),
            listen: pick(specific.listen, base.listen),
        }
    }

    /// Decides whether this cycle sends text, media, or a document.
    ///
    /// When both intervals are due at once, the parity of
    /// `interaction_count / media_interval` alternates them (odd: media).
    pub fn media_choice(
        interaction_count: u32,
        media_interval: u32,
        document_interval: u32,
    ) -> MediaChoice {
        let due = |interval: u32| {
            interval > 0 && interaction_count > 0 && interaction_count % interval == 0
        };
        match (due(media_interval), due(document_interval)) {
            (true, true) => {
                if (interaction_count / media_interval) % 2 == 1 {
                    MediaChoice::Media
                } else {
                    MediaChoice::Document
                }
            }
            (true, false) => MediaChoice::Media,
            (false, true) => MediaChoice::Document,
            (false, false) => MediaChoice::Text,
        }
    }

    /// Picks a template index for `contact`, avoiding recent picks.
    pub fn pick_template(
        &self,
        rotation: &mut TemplateRotation,
        contact: &str,
        context: ReplyContext,
        pool_len: usize,
    ) -> Option<usize> {
        if pool_len == 0 {
            return None;
        }
        let used = rotation
            .used
            .entry((contact.to_string(), context))
            .or_default();
        used.retain(|&i| i < pool_len);
        if used.len() as f64 >= (pool_len as f64 * ROTATION_RESET_RATIO) {
            used.clear();
        }
        let fresh: Vec<usize> = (0..pool_len).filter(|i| !used.contains(i)).collect();
        let chosen = fresh[lock(&self.rng).gen_range(0..fresh.len())];
        used.insert(chosen);
        Some(chosen)
    }

    /// Substitutes the name placeholder and expands variants.
    pub fn render(&self, template: &str, name: Option<&str>) -> String {
        let with_name = template.replace(NAME_PLACEHOLDER, name.unwrap_or_default());
        let expanded = spintax::expand(&with_name, &mut *lock(&self.rng));
        tidy_whitespace(&expanded)
    }

    /// Rotates, renders, and returns reply text from `templates`.
    pub fn compose(
        &self,
        rotation: &mut TemplateRotation,
        contact: &str,
        context: ReplyContext,
        templates: &[String],
        name: Option<&str>,
    ) -> Option<String> {
        let index = self.pick_template(rotation, contact, context, templates.len())?;
        Some(self.render(&templates[index], name))
    }
}

/// First whitespace-separated token of a display name.
pub fn first_name(display_name: &str) -> Option<&str> {
    display_name.split_whitespace().next()
}

/// Collapses runs of spaces left behind by an empty placeholder.
fn tidy_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_space = false;
    for ch in text.chars() {
        if ch == ' ' {
            if !prev_space {
                out.push(ch);
            }
            prev_space = true;
        } else {
            if prev_space && matches!(ch, ',' | '!' | '?' | '.') && out.ends_with(' ') {
                out.pop();
            }
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}
