//! Input/output DTOs and schema-bearing types
//!
//! Defines all data structures used in MCP tool contracts. Each type is
//! annotated with `JsonSchema` for automatic schema generation.

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::message::RawMessage;
use crate::mime::Email;

/// Metadata included in all tool responses
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    /// Current UTC timestamp in RFC 3339 format with milliseconds
    pub now_utc: String,
    /// Tool execution duration in milliseconds
    pub duration_ms: u64,
}

impl Meta {
    /// Create metadata populated with current time and elapsed duration
    pub fn now(duration_ms: u64) -> Self {
        Self {
            now_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms,
        }
    }
}

/// Standard response envelope for all tools
///
/// Wraps tool-specific data with human-readable summary and execution metadata.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolEnvelope<T>
where
    T: JsonSchema,
{
    /// Human-readable summary of the operation outcome
    pub summary: String,
    /// Tool-specific data payload
    pub data: T,
    /// Execution metadata (timestamp, duration)
    pub meta: Meta,
}

/// Account metadata (no credentials)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AccountInfo {
    pub account_id: String,
    pub host: String,
    pub port: u16,
    /// Whether certificate verification is disabled for this account
    pub ignore_cert_validation: bool,
}

/// Mailbox listing result
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MailboxListData {
    pub account_id: String,
    /// Decoded mailbox names in server order
    pub mailboxes: Vec<String>,
    /// Names rendered one per line as `-> NAME`
    pub rendered: String,
}

/// Normalized message as returned to tool callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EmailRecord {
    /// Message sequence number at fetch time
    pub seq: u32,
    pub uid: Option<u32>,
    /// IMAP flags as reported by the server
    pub flags: Vec<String>,
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Date header as RFC 3339 UTC, if present and parseable
    pub date: Option<String>,
    /// Raw HTML when `html_format` is true, tag-free text otherwise
    pub body: String,
    /// Attachment filenames, each followed by CRLF
    pub attachment: String,
    /// Attachment filenames in message order
    pub attachment_names: Vec<String>,
    pub html_format: bool,
}

impl EmailRecord {
    pub fn new(raw: &RawMessage, email: Email) -> Self {
        let attachment_names = email.attachment_names().map(str::to_owned).collect();
        Self {
            seq: raw.seq,
            uid: raw.uid,
            flags: raw.flags.clone(),
            from: email.from,
            to: email.to,
            subject: email.subject,
            date: email
                .date
                .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true)),
            body: email.body,
            attachment: email.attachment,
            attachment_names,
            html_format: email.html_format,
        }
    }
}

/// Recent-message fetch result
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchRecentData {
    pub account_id: String,
    pub mailbox: String,
    /// `0` mailbox unselectable, `1` mailbox empty, `-1` fetch ran
    pub status: i32,
    /// Sequence numbers requested, newest first
    pub requested: Vec<u32>,
    /// Normalized messages, newest first
    pub emails: Vec<EmailRecord>,
    /// Messages that could not be normalized
    pub skipped: usize,
    /// Fetch failure text when the fetch ended early
    pub fetch_error: Option<String>,
}

/// Input: account_id only
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AccountOnlyInput {
    /// Account identifier (defaults to `"default"`)
    #[serde(default = "default_account_id")]
    pub account_id: String,
}

/// Input: fetch and normalize the most recent messages
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FetchRecentInput {
    /// Account identifier (defaults to `"default"`)
    #[serde(default = "default_account_id")]
    pub account_id: String,
    /// Mailbox to read (defaults to `INBOX`)
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    /// Destination (e.g. chat room id) whose HTML preference applies
    pub destination_id: Option<String>,
    /// Fetch only the header block; bodies and attachments come back empty
    #[serde(default)]
    pub headers_only: bool,
}

/// Default value for `account_id` field
pub fn default_account_id() -> String {
    "default".to_owned()
}

fn default_mailbox() -> String {
    "INBOX".to_owned()
}
