//! mail-recent-mcp-rs: recent IMAP messages as plain records, over MCP stdio
//!
//! Logs into an IMAP account, fetches the newest messages of a mailbox, and
//! normalizes each into a single record (sender, recipients, subject, date,
//! body, attachment names, HTML flag) ready for a chat bridge or notifier.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading and stdio serving
//! - [`config`]: Environment-driven configuration for accounts and policy
//! - [`errors`]: Application error model with MCP error mapping
//! - [`imap`]: Session establishment and timeout-bounded IMAP operations
//! - [`mailbox`]: Mailbox listing producer
//! - [`fetch`]: Recent-message fetcher streaming into a channel
//! - [`message`]: Owned fetched-message handles and body section selectors
//! - [`mime`]: MIME walk and body selection producing `Email` records
//! - [`preference`]: Per-destination HTML preference lookup
//! - [`server`]: MCP tool handlers
//! - [`models`]: Input/output DTOs and schema-bearing types

mod config;
mod errors;
mod fetch;
mod imap;
mod mailbox;
mod message;
mod mime;
mod models;
mod preference;
mod server;

use config::ServerConfig;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing_subscriber::EnvFilter;

/// Application entry point
///
/// Initializes tracing from environment, loads config, and serves the MCP
/// server over stdio. Logs go to stderr; stdout carries the protocol.
///
/// # Environment Variables
///
/// See [`ServerConfig::load_from_env`] for full configuration options.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::load_from_env()?;
    let service = server::MailRecentServer::new(config)?
        .serve(stdio())
        .await?;
    service.waiting().await?;
    Ok(())
}
