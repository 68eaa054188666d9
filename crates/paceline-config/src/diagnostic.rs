// SPDX-FileCopyrightText: 2026 Paceline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Figment errors and semantic validation failures both end up as
//! [`ConfigError`], a miette diagnostic. Unknown keys carry a source span
//! into the offending file (including the right `[[accounts]]` entry) and a
//! Jaro-Winkler "did you mean" hint.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

const SUGGESTION_THRESHOLD: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in {}", table_label(section))]
    #[diagnostic(
        code(paceline::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        section: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a paceline setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: found {found}")]
    #[diagnostic(code(paceline::config::invalid_value), help("expected {expected}"))]
    InvalidValue {
        key: String,
        found: String,
        expected: String,
    },

    #[error("missing key `{key}` in {}", table_label(section))]
    #[diagnostic(code(paceline::config::missing_key))]
    MissingKey { key: String, section: String },

    /// An `[engine]` setting failed validation.
    #[error("engine.{path} {message}")]
    #[diagnostic(code(paceline::config::engine))]
    Engine { path: String, message: String },

    /// A setting of one account failed validation.
    ///
    /// `account` is the account id, or `accounts[N]` when the id is empty.
    #[error("account `{account}`: {path} {message}")]
    #[diagnostic(code(paceline::config::account))]
    Account {
        account: String,
        path: String,
        message: String,
    },

    #[error("account id `{id}` is used by more than one [[accounts]] entry")]
    #[diagnostic(
        code(paceline::config::duplicate_account),
        help("entries {first} and {second} share it; account ids must be unique")
    )]
    DuplicateAccount {
        id: String,
        first: usize,
        second: usize,
    },

    #[error("configuration error: {0}")]
    #[diagnostic(code(paceline::config::other))]
    Other(String),
}

fn table_label(section: &str) -> String {
    if section.is_empty() {
        "the top level".to_string()
    } else {
        format!("[{section}]")
    }
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Converts a figment error (which may bundle several) into diagnostics.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let path: Vec<String> = error.path.iter().map(ToString::to_string).collect();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let (span, src) = source_span(&error, &path, field, toml_sources);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        section: table_name(&path, field),
                        suggestion: suggest_key(field, expected),
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: field.to_string(),
                    section: table_name(&path, field),
                },
                Kind::InvalidType(actual, expected) => ConfigError::InvalidValue {
                    key: path.join("."),
                    found: actual.to_string(),
                    expected: expected.to_string(),
                },
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Dotted table name for an error path, without array indices or the key itself.
fn table_name(path: &[String], key: &str) -> String {
    path.iter()
        .filter(|seg| seg.parse::<usize>().is_err())
        .filter(|seg| seg.as_str() != key)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(".")
}

fn source_span(
    error: &figment::error::Error,
    path: &[String],
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Some(figment::Source::File(file)) = error.metadata.as_ref().and_then(|m| m.source.as_ref())
    else {
        return (None, None);
    };
    let file = file.display().to_string();
    let Some((name, content)) = toml_sources.iter().find(|(name, _)| *name == file) else {
        return (None, None);
    };

    match locate_key(content, path, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(name, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` inside the table named by `path`.
///
/// A numeric segment in `path` selects that `[[accounts]]` entry, so nested
/// tables such as `[accounts.schedule]` resolve to the right account.
/// Without an index the first matching table wins.
pub fn locate_key(content: &str, path: &[String], field: &str) -> Option<usize> {
    let table = table_name(path, field);
    let index = path.iter().find_map(|seg| seg.parse::<usize>().ok());

    let mut current = String::new();
    let mut account: Option<usize> = None;
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix("[[").and_then(|r| r.strip_suffix("]]")) {
            current = name.trim().to_string();
            if current == "accounts" {
                account = Some(account.map_or(0, |n| n + 1));
            }
        } else if let Some(name) = trimmed.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            current = name.trim().to_string();
        } else if current == table && (index.is_none() || index == account) {
            let body = line.trim_start();
            if let Some(rest) = body.strip_prefix(field)
                && rest.trim_start().starts_with('=')
            {
                return Some(offset + line.len() - body.len());
            }
        }
        offset += line.len();
    }
    None
}

/// The valid key closest to `unknown`, if any is similar enough.
pub fn suggest_key<S: AsRef<str>>(unknown: &str, valid_keys: &[S]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key.as_ref()), key.as_ref()))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Renders every error to stderr, graphically when the terminal allows.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    eprintln!("paceline: {} configuration error(s)", errors.len());
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("  {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn suggests_cooldown_key() {
        let valid = ["private_cooldown_minutes", "group_cooldown_minutes", "blacklist"];
        assert_eq!(
            suggest_key("private_coldown_minutes", &valid),
            Some("private_cooldown_minutes".to_string())
        );
        assert_eq!(suggest_key("zzzzzz", &["queue_tick_secs", "log_level"]), None);
    }

    #[test]
    fn locates_key_in_the_indexed_account() {
        let content = "[engine]\nlog_level = \"info\"\n\n\
            [[accounts]]\nid = \"a\"\n[accounts.schedule]\nstrat = \"08:00\"\n\n\
            [[accounts]]\nid = \"b\"\n[accounts.schedule]\nstrat = \"09:00\"\n";
        let second = locate_key(content, &path(&["accounts", "1", "schedule"]), "strat").unwrap();
        assert_eq!(&content[second..second + 16], "strat = \"09:00\"\n");
        let first = locate_key(content, &path(&["accounts", "schedule"]), "strat").unwrap();
        assert!(first < second);
        assert_eq!(&content[first..first + 15], "strat = \"08:00\"");
    }

    #[test]
    fn top_level_keys_and_labels() {
        let content = "acounts = 1\n[engine]\n";
        assert_eq!(locate_key(content, &[], "acounts"), Some(0));
        assert_eq!(table_name(&path(&["accounts", "0", "proxy", "prot"]), "prot"), "accounts.proxy");
        assert_eq!(table_label(""), "the top level");
    }

    #[test]
    fn account_errors_name_the_account() {
        let err = ConfigError::Account {
            account: "sales-1".into(),
            path: "schedule.start".into(),
            message: "`7` is not a valid HH:MM time".into(),
        };
        assert_eq!(
            err.to_string(),
            "account `sales-1`: schedule.start `7` is not a valid HH:MM time"
        );
    }
}
