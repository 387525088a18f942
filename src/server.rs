//! MCP server implementation with tool handlers
//!
//! Implements the `ServerHandler` trait and registers the mail retrieval
//! tools. Handles input validation, session lifecycle, and response
//! formatting; the retrieval work itself lives in `fetch`, `mailbox` and
//! `mime`.

use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{Json, ServerHandler, tool, tool_handler, tool_router};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};
use crate::fetch::{self, FetchOutcome};
use crate::imap::{self, MailSession};
use crate::mailbox;
use crate::message::BodySection;
use crate::mime::{ContentNormalizer, DestinationContext};
use crate::models::{
    AccountInfo, AccountOnlyInput, EmailRecord, FetchRecentData, FetchRecentInput,
    MailboxListData, Meta, ToolEnvelope,
};

/// Mail retrieval MCP server
///
/// Holds shared configuration and the content normalizer. Every tool call
/// opens its own session and logs out before returning.
#[derive(Clone)]
pub struct MailRecentServer {
    config: Arc<ServerConfig>,
    normalizer: Arc<ContentNormalizer>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MailRecentServer {
    /// Create a new MCP server instance
    ///
    /// # Errors
    ///
    /// - `Internal` if the normalizer cannot be built
    pub fn new(config: ServerConfig) -> AppResult<Self> {
        let normalizer = ContentNormalizer::new(config.normalize)?;
        Ok(Self {
            config: Arc::new(config),
            normalizer: Arc::new(normalizer),
            tool_router: Self::tool_router(),
        })
    }

    /// Tool: List configured IMAP accounts
    #[tool(
        name = "mail_list_accounts",
        description = "List configured IMAP accounts"
    )]
    async fn list_accounts(&self) -> Result<Json<ToolEnvelope<Vec<AccountInfo>>>, ErrorData> {
        let started = Instant::now();
        let data = self
            .config
            .accounts
            .values()
            .map(|a| AccountInfo {
                account_id: a.account_id.clone(),
                host: a.host.clone(),
                port: a.port,
                ignore_cert_validation: a.ignore_cert_validation,
            })
            .collect::<Vec<_>>();
        finalize_tool(
            started,
            Ok((format!("{} account(s) configured", data.len()), data)),
        )
    }

    /// Tool: List mailboxes for an account
    #[tool(
        name = "mail_list_mailboxes",
        description = "List every mailbox of an account"
    )]
    async fn list_mailboxes(
        &self,
        Parameters(input): Parameters<AccountOnlyInput>,
    ) -> Result<Json<ToolEnvelope<MailboxListData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.list_mailboxes_impl(input)
                .await
                .map(|data| (format!("{} mailbox(es)", data.mailboxes.len()), data)),
        )
    }

    /// Tool: Fetch and normalize the most recent messages
    ///
    /// Returns up to five of the newest messages of a mailbox as plain
    /// records, with HTML kept only for destinations that accept it.
    #[tool(
        name = "mail_fetch_recent",
        description = "Fetch the most recent messages of a mailbox as normalized records"
    )]
    async fn fetch_recent(
        &self,
        Parameters(input): Parameters<FetchRecentInput>,
    ) -> Result<Json<ToolEnvelope<FetchRecentData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.fetch_recent_impl(input).await.map(|data| {
                let summary = if data.status == 1 {
                    "Mailbox is empty".to_owned()
                } else {
                    format!(
                        "{} message(s) normalized, {} skipped",
                        data.emails.len(),
                        data.skipped
                    )
                };
                (summary, data)
            }),
        )
    }
}

/// MCP server handler implementation
#[tool_handler(router = self.tool_router)]
impl ServerHandler for MailRecentServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "Read-only IMAP retrieval. mail_fetch_recent returns the newest messages of a mailbox normalized for chat delivery; pass destination_id to apply that destination's HTML preference.",
        )
    }
}

/// Tool implementation methods
impl MailRecentServer {
    async fn list_mailboxes_impl(&self, input: AccountOnlyInput) -> AppResult<MailboxListData> {
        validate_account_id(&input.account_id)?;
        let account = self.config.get_account(&input.account_id)?;
        let session = imap::login(&self.config, account).await?;

        let result = mailbox::list_mailboxes(&self.config, &session).await;
        close_session(&self.config, session).await;
        let mailboxes = result?;

        Ok(MailboxListData {
            account_id: account.account_id.clone(),
            rendered: mailbox::render_mailbox_list(&mailboxes),
            mailboxes,
        })
    }

    async fn fetch_recent_impl(&self, input: FetchRecentInput) -> AppResult<FetchRecentData> {
        validate_account_id(&input.account_id)?;
        validate_mailbox(&input.mailbox)?;
        if let Some(destination) = &input.destination_id {
            validate_destination(destination)?;
        }
        let account = self.config.get_account(&input.account_id)?;
        let session = imap::login(&self.config, account).await?;

        let result = self.collect_recent(&session, &input).await;
        close_session(&self.config, session).await;
        result
    }

    /// Start the fetch, normalize messages as they arrive, then collect the
    /// fetch result
    async fn collect_recent(
        &self,
        session: &MailSession,
        input: &FetchRecentInput,
    ) -> AppResult<FetchRecentData> {
        let section = if input.headers_only {
            BodySection::Header
        } else {
            BodySection::Full
        };
        let (tx, mut rx) = mpsc::channel(self.config.fetch_channel_capacity);
        let cancel = CancellationToken::new();
        // Stops the fetch task if this call is dropped mid-drain
        let _cancel_on_drop = cancel.clone().drop_guard();
        let outcome = fetch::fetch_recent(
            &self.config,
            session,
            &input.mailbox,
            section,
            tx,
            cancel,
        )
        .await;

        let mut data = FetchRecentData {
            account_id: input.account_id.clone(),
            mailbox: input.mailbox.clone(),
            status: outcome.status(),
            requested: Vec::new(),
            emails: Vec::new(),
            skipped: 0,
            fetch_error: None,
        };
        let handle = match outcome {
            FetchOutcome::Unselectable(err) => return Err(err),
            FetchOutcome::Empty => return Ok(data),
            FetchOutcome::Started(handle) => handle,
        };
        data.requested = handle.requested().as_slice().to_vec();

        let destination = DestinationContext {
            id: input.destination_id.as_deref().unwrap_or_default(),
            preference: &self.config.html_destinations,
        };
        while let Some(raw) = rx.recv().await {
            match self
                .normalizer
                .normalize(Some(&raw), handle.section(), destination)
            {
                Some(email) => data.emails.push(EmailRecord::new(&raw, email)),
                None => data.skipped += 1,
            }
        }

        data.fetch_error = handle.finished().await.err().map(|e| e.to_string());
        data.emails.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(data)
    }
}

/// Log out, reporting but not propagating failures
async fn close_session(config: &ServerConfig, session: MailSession) {
    if let Err(err) = session.logout(config).await {
        warn!(code = err.code(), error = %err, "logout failed");
    }
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Build a standardized MCP tool response envelope from business logic output
fn finalize_tool<T>(
    started: Instant,
    result: AppResult<(String, T)>,
) -> Result<Json<ToolEnvelope<T>>, ErrorData>
where
    T: schemars::JsonSchema,
{
    match result {
        Ok((summary, data)) => Ok(Json(ToolEnvelope {
            summary,
            data,
            meta: Meta::now(duration_ms(started)),
        })),
        Err(e) => Err(e.to_error_data()),
    }
}

/// Validate account_id format
fn validate_account_id(account_id: &str) -> AppResult<()> {
    if account_id.is_empty() || account_id.len() > 64 {
        return Err(AppError::InvalidInput(
            "account_id must be 1..64 characters".to_owned(),
        ));
    }
    if !account_id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        return Err(AppError::InvalidInput(
            "account_id must match [A-Za-z0-9_-]+".to_owned(),
        ));
    }
    Ok(())
}

/// Validate mailbox name format
fn validate_mailbox(mailbox: &str) -> AppResult<()> {
    if mailbox.is_empty() || mailbox.len() > 256 {
        return Err(AppError::InvalidInput(
            "mailbox must be 1..256 characters".to_owned(),
        ));
    }
    validate_no_controls(mailbox, "mailbox")
}

fn validate_destination(destination: &str) -> AppResult<()> {
    if destination.is_empty() || destination.len() > 256 {
        return Err(AppError::InvalidInput(
            "destination_id must be 1..256 characters".to_owned(),
        ));
    }
    validate_no_controls(destination, "destination_id")
}

/// Reject IMAP control characters in user-provided values
fn validate_no_controls(value: &str, field: &str) -> AppResult<()> {
    if value.chars().any(|ch| ch.is_ascii_control()) {
        return Err(AppError::InvalidInput(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(())
}
