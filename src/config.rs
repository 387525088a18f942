//! Configuration module for IMAP accounts, timeouts and normalization policy
//!
//! All configuration is loaded from environment variables following the pattern
//! `MAIL_IMAP_<SEGMENT>_<KEY>`. Account segments are discovered by scanning for
//! `MAIL_IMAP_*_HOST` variables.

use std::collections::BTreeMap;
use std::env;
use std::env::VarError;
use std::time::Duration;

use regex::Regex;
use secrecy::SecretString;

use crate::errors::{AppError, AppResult};
use crate::mime::{CandidateSelection, NormalizePolicy};
use crate::preference::ConfiguredHtmlPreference;

/// IMAP account configuration
///
/// Passwords are stored using `SecretString` to prevent accidental logging.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Account identifier (lowercase, used as default `account_id` parameter)
    pub account_id: String,
    /// IMAP server hostname
    pub host: String,
    /// IMAP server port (typically 993 for implicit TLS)
    pub port: u16,
    /// Username for authentication
    pub user: String,
    /// Password stored in a type that prevents accidental logging
    pub pass: SecretString,
    /// Skip certificate verification; explicit opt-in only
    pub ignore_cert_validation: bool,
}

/// Server-wide configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// All configured accounts, keyed by `account_id`
    pub accounts: BTreeMap<String, AccountConfig>,
    /// TCP connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// IMAP greeting/TLS handshake/LOGIN timeout in milliseconds
    pub greeting_timeout_ms: u64,
    /// Socket I/O timeout in milliseconds
    pub socket_timeout_ms: u64,
    /// Capacity of the channel carrying fetched messages
    pub fetch_channel_capacity: usize,
    /// Destinations that accept HTML bodies
    pub html_destinations: ConfiguredHtmlPreference,
    /// Part-walk and body selection policy
    pub normalize: NormalizePolicy,
}

impl ServerConfig {
    /// Load all configuration from environment variables
    ///
    /// Discovers accounts by scanning for `MAIL_IMAP_*_HOST` patterns.
    /// If no accounts are explicitly defined, a `default` account is required
    /// via `MAIL_IMAP_DEFAULT_HOST`, `MAIL_IMAP_DEFAULT_USER`, and
    /// `MAIL_IMAP_DEFAULT_PASS`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if required environment variables are missing
    /// or malformed.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// MAIL_IMAP_DEFAULT_HOST=imap.example.com
    /// MAIL_IMAP_DEFAULT_USER=bot@example.com
    /// MAIL_IMAP_DEFAULT_PASS=app-password
    /// MAIL_IMAP_LAB_HOST=mail.lab.internal
    /// MAIL_IMAP_LAB_USER=bot
    /// MAIL_IMAP_LAB_PASS=secret
    /// MAIL_IMAP_LAB_IGNORE_CERT=true
    /// MAIL_IMAP_HTML_DESTINATIONS=!room1:matrix.org,!room2:matrix.org
    /// MAIL_IMAP_PLAIN_CANDIDATE=first
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        let account_pattern = Regex::new(r"^MAIL_IMAP_([A-Z0-9_]+)_HOST$")
            .map_err(|e| AppError::Internal(format!("invalid account regex: {e}")))?;

        let mut account_segments: Vec<String> = env::vars()
            .filter_map(|(k, _)| {
                account_pattern
                    .captures(&k)
                    .and_then(|c| c.get(1).map(|m| m.as_str().to_owned()))
            })
            .collect();

        if account_segments.is_empty() {
            account_segments.push("DEFAULT".to_owned());
        }

        account_segments.sort();
        account_segments.dedup();

        let mut accounts = BTreeMap::new();
        for seg in account_segments {
            let account = load_account(&seg)?;
            accounts.insert(account.account_id.clone(), account);
        }

        let fetch_channel_capacity = parse_usize_env("MAIL_IMAP_FETCH_CHANNEL_CAPACITY", 16)?;
        if fetch_channel_capacity == 0 {
            return Err(AppError::invalid(
                "MAIL_IMAP_FETCH_CHANNEL_CAPACITY must be at least 1",
            ));
        }

        Ok(Self {
            accounts,
            connect_timeout_ms: parse_u64_env("MAIL_IMAP_CONNECT_TIMEOUT_MS", 30_000)?,
            greeting_timeout_ms: parse_u64_env("MAIL_IMAP_GREETING_TIMEOUT_MS", 15_000)?,
            socket_timeout_ms: parse_u64_env("MAIL_IMAP_SOCKET_TIMEOUT_MS", 300_000)?,
            fetch_channel_capacity,
            html_destinations: ConfiguredHtmlPreference::parse(
                &env::var("MAIL_IMAP_HTML_DESTINATIONS").unwrap_or_default(),
            ),
            normalize: NormalizePolicy {
                html_candidate: parse_candidate_env(
                    "MAIL_IMAP_HTML_CANDIDATE",
                    CandidateSelection::LastWins,
                )?,
                plain_candidate: parse_candidate_env(
                    "MAIL_IMAP_PLAIN_CANDIDATE",
                    CandidateSelection::LastWins,
                )?,
                unknown_inline_overrides_plain: parse_bool_env(
                    "MAIL_IMAP_UNKNOWN_INLINE_OVERRIDES_PLAIN",
                    true,
                )?,
                sanitize_html: parse_bool_env("MAIL_IMAP_SANITIZE_HTML", false)?,
            },
        })
    }

    /// Get account configuration by ID
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account ID is not configured.
    pub fn get_account(&self, account_id: &str) -> AppResult<&AccountConfig> {
        self.accounts
            .get(account_id)
            .ok_or_else(|| AppError::NotFound(format!("account '{account_id}' is not configured")))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn greeting_timeout(&self) -> Duration {
        Duration::from_millis(self.greeting_timeout_ms)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }
}

/// Load a single account configuration from environment
///
/// Reads `MAIL_IMAP_<SEGMENT>_HOST`, `_USER`, `_PASS`, `_PORT`, and
/// `_IGNORE_CERT`. Normalizes the segment name to lowercase for `account_id`.
fn load_account(segment: &str) -> AppResult<AccountConfig> {
    let prefix = format!("MAIL_IMAP_{}_", sanitize_segment(segment));
    let host = required_env(&format!("{prefix}HOST"))?;
    let user = required_env(&format!("{prefix}USER"))?;
    let pass = required_env(&format!("{prefix}PASS"))?;

    Ok(AccountConfig {
        account_id: segment.to_ascii_lowercase(),
        host,
        port: parse_u16_env(&format!("{prefix}PORT"), 993)?,
        user,
        pass: SecretString::new(pass.into()),
        ignore_cert_validation: parse_bool_env(&format!("{prefix}IGNORE_CERT"), false)?,
    })
}

/// Read a required environment variable, returning error if missing or empty
fn required_env(key: &str) -> AppResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::InvalidInput(format!(
            "missing required environment variable {key}"
        ))),
    }
}

/// Sanitize an account segment to uppercase alphanumeric/underscore
fn sanitize_segment(seg: &str) -> String {
    let mut out = String::with_capacity(seg.len());
    for ch in seg.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push('_');
        }
    }
    out.trim_matches('_').to_owned()
}

/// Parse a boolean environment variable with flexible values
///
/// Accepts: `1`, `true`, `yes`, `y`, `on` (truthy) or `0`, `false`, `no`,
/// `n`, `off` (falsy). Case-insensitive. Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set to an unrecognized value.
fn parse_bool_env(key: &str, default: bool) -> AppResult<bool> {
    match env::var(key) {
        Ok(v) => parse_bool_value(&v).ok_or_else(|| {
            AppError::InvalidInput(format!("invalid boolean environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a candidate selection (`first` or `last`) with default fallback
fn parse_candidate_env(key: &str, default: CandidateSelection) -> AppResult<CandidateSelection> {
    match env::var(key) {
        Ok(v) => parse_candidate_value(&v).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "invalid candidate selection {key}: '{v}' (expected first or last)"
            ))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

fn parse_candidate_value(value: &str) -> Option<CandidateSelection> {
    match value.trim().to_ascii_lowercase().as_str() {
        "first" => Some(CandidateSelection::FirstWins),
        "last" => Some(CandidateSelection::LastWins),
        _ => None,
    }
}

fn parse_u16_env(key: &str, default: u16) -> AppResult<u16> {
    parse_number_env(key, default)
}

fn parse_u64_env(key: &str, default: u64) -> AppResult<u64> {
    parse_number_env(key, default)
}

fn parse_usize_env(key: &str, default: usize) -> AppResult<usize> {
    parse_number_env(key, default)
}

/// Parse a numeric environment variable with default fallback
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but does not parse.
fn parse_number_env<T: std::str::FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(v) => v.trim().parse::<T>().map_err(|_| {
            AppError::InvalidInput(format!("invalid numeric environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}
