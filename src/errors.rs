//! Application error model with MCP error mapping
//!
//! Defines a typed error hierarchy using `thiserror` for the retrieval
//! pipeline, and maps each variant to the appropriate MCP `ErrorData` type for
//! protocol compliance. Each variant also exposes a stable code so log lines
//! and tool responses can be correlated.

use rmcp::model::ErrorData;
use serde_json::json;
use thiserror::Error;

/// Application error type
///
/// Session-level variants (`Connection`, `AuthFailed`, `MailboxSelect`) abort
/// a whole retrieval attempt. Message-level variants (`MessageParse`,
/// `PartRead`, `PreferenceLookup`) are logged and never abort the batch.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (validation failed, malformed request)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Resource not found (account)
    #[error("not found: {0}")]
    NotFound(String),
    /// Transport or TLS establishment failed
    #[error("connection failed: {0}")]
    Connection(String),
    /// Credentials rejected by the server
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// Named mailbox could not be selected
    #[error("mailbox select failed: {0}")]
    MailboxSelect(String),
    /// Mailbox listing failed
    #[error("mailbox listing failed: {0}")]
    List(String),
    /// Asynchronous fetch failed after it was started
    #[error("fetch failed: {0}")]
    Fetch(String),
    /// A single message could not be parsed as MIME
    #[error("message parse failed: {0}")]
    MessageParse(String),
    /// A MIME part could not be read
    #[error("part read failed: {0}")]
    PartRead(String),
    /// Per-destination HTML preference could not be resolved
    #[error("preference lookup failed: {0}")]
    PreferenceLookup(String),
    /// Operation timeout (TCP connect, TLS handshake, IMAP response)
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// Operation stopped through its cancellation token
    #[error("operation cancelled")]
    Cancelled,
    /// Internal error (unexpected failure, task join failure)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Stable identifying code for logs and tool responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::Connection(_) => "connection_failed",
            Self::AuthFailed(_) => "auth_failed",
            Self::MailboxSelect(_) => "mailbox_select_failed",
            Self::List(_) => "list_failed",
            Self::Fetch(_) => "fetch_failed",
            Self::MessageParse(_) => "message_parse_failed",
            Self::PartRead(_) => "part_read_failed",
            Self::PreferenceLookup(_) => "preference_lookup_failed",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }

    /// Convert to MCP `ErrorData`
    ///
    /// # Mappings
    ///
    /// - `InvalidInput` → `invalid_params`
    /// - `NotFound`, `MailboxSelect` → `resource_not_found`
    /// - `AuthFailed` → `invalid_request`
    /// - everything else → `internal_error`
    pub fn to_error_data(&self) -> ErrorData {
        let data = Some(json!({ "code": self.code() }));
        let msg = self.to_string();
        match self {
            Self::InvalidInput(_) => ErrorData::invalid_params(msg, data),
            Self::NotFound(_) | Self::MailboxSelect(_) => {
                ErrorData::resource_not_found(msg, data)
            }
            Self::AuthFailed(_) => ErrorData::invalid_request(msg, data),
            _ => ErrorData::internal_error(msg, data),
        }
    }
}

/// Type alias for fallible return values
pub type AppResult<T> = Result<T, AppError>;
