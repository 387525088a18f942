//! Mailbox listing
//!
//! Runs `LIST "" *` as a producer task that streams names through a bounded
//! channel, with a separate completion signal carrying the listing result.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};
use crate::fetch::forward_stream;
use crate::imap::{self, MailSession};

/// Capacity of the channel carrying mailbox names
const LIST_CHANNEL_CAPACITY: usize = 20;

/// List every mailbox reachable from the session
///
/// Blocks until the full name list is available.
///
/// # Errors
///
/// - `List` or `Timeout` if the server listing failed
/// - `Internal` if the producer task ended without reporting
pub async fn list_mailboxes(server: &ServerConfig, session: &MailSession) -> AppResult<Vec<String>> {
    let (tx, rx) = mpsc::channel(LIST_CHANNEL_CAPACITY);
    let (done_tx, done_rx) = oneshot::channel();
    let mut guard = session.lock().await;
    let io_timeout = server.socket_timeout();

    tokio::spawn(async move {
        let result: AppResult<usize> = async {
            let names = imap::list_names(io_timeout, &mut guard).await?;
            forward_stream(names, &tx, io_timeout, &CancellationToken::new()).await
        }
        .await;
        drop(tx);
        let _ = done_tx.send(result);
    });

    collect_listing(rx, done_rx).await
}

/// Drain listed names, then map the producer's completion into the result
///
/// # Errors
///
/// - `List` or `Timeout` from the producer; other producer errors become `List`
/// - `Internal` if the producer dropped its completion sender
async fn collect_listing(
    mut names_rx: mpsc::Receiver<String>,
    done_rx: oneshot::Receiver<AppResult<usize>>,
) -> AppResult<Vec<String>> {
    let mut names = Vec::new();
    while let Some(name) = names_rx.recv().await {
        names.push(name);
    }

    let outcome = done_rx
        .await
        .map_err(|_| AppError::Internal("mailbox listing task ended without a result".to_owned()))?;
    if let Err(err) = outcome {
        error!(code = 20, error = %err, "mailbox listing failed");
        return Err(match err {
            AppError::List(_) | AppError::Timeout(_) => err,
            other => AppError::List(other.to_string()),
        });
    }
    Ok(names)
}

/// Render names one per line as `-> NAME\r\n`
pub fn render_mailbox_list(names: &[String]) -> String {
    names.iter().map(|name| format!("-> {name}\r\n")).collect()
}
