// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./paceline.toml` > `~/.config/paceline/paceline.toml` >
//! `/etc/paceline/paceline.toml` with environment variable overrides via `PACELINE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::PacelineConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/paceline/paceline.toml`
/// 3. `~/.config/paceline/paceline.toml`
/// 4. `./paceline.toml`
/// 5. `PACELINE_*` environment variables
pub fn load_config() -> Result<PacelineConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from an inline TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<PacelineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PacelineConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<PacelineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PacelineConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Config files in merge order: system, user, then working directory.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/paceline/paceline.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("paceline/paceline.toml"));
    }
    paths.push(PathBuf::from("paceline.toml"));
    paths
}

/// The layered figment behind [`load_config`].
pub fn build_figment() -> Figment {
    config_paths()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(PacelineConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Environment provider mapping `PACELINE_ENGINE_QUEUE_TICK_SECS` to `engine.queue_tick_secs`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain underscores.
/// Accounts are an array and are only configurable from files.
fn env_provider() -> Env {
    Env::prefixed("PACELINE_").map(|key| key.as_str().replacen("engine_", "engine.", 1).into())
}
