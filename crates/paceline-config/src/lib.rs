// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Paceline account orchestrator.
//!
//! TOML files layered with figment, strict key checking
//! (`deny_unknown_fields`), `PACELINE_*` environment overrides, semantic
//! validation and miette diagnostics with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use paceline_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("accounts: {}", config.accounts.len());
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::PacelineConfig;

/// Loads the layered configuration and validates it.
pub fn load_and_validate() -> Result<PacelineConfig, Vec<ConfigError>> {
    checked(loader::load_config(), || {
        loader::config_paths()
            .iter()
            .filter_map(|path| read_source(path))
            .collect()
    })
}

/// Loads one file (plus environment overrides) and validates it.
pub fn load_and_validate_path(path: &Path) -> Result<PacelineConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_path(path), || {
        read_source(path).into_iter().collect()
    })
}

/// Loads inline TOML and validates it.
pub fn load_and_validate_str(toml_content: &str) -> Result<PacelineConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

/// Validates a successful load; on a figment error, reads the sources (only
/// then) so diagnostics can point into them.
fn checked(
    loaded: Result<PacelineConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<PacelineConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

/// A config file keyed by the absolute path figment reports for it.
fn read_source(path: &Path) -> Option<(String, String)> {
    let content = std::fs::read_to_string(path).ok()?;
    let name = std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string();
    Some((name, content))
}
