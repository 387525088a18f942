//! Recent-message fetcher
//!
//! Selects a mailbox read-only, computes the sequence window of the newest
//! messages, and streams them to a caller-supplied channel from a background
//! task. The caller drains the channel concurrently; the channel closes when
//! the fetch ends, and [`FetchHandle::finished`] reports how it ended.

use std::fmt;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};
use crate::imap::{self, MailSession};
use crate::message::{BodySection, RawMessage};

/// Number of most recent messages fetched per call
pub const RECENT_MESSAGE_CAP: u32 = 5;

/// Explicit list of message sequence numbers
///
/// Numbers are kept in generation order and rendered comma-separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSet(Vec<u32>);

impl SequenceSet {
    /// The `min(total, cap)` highest sequence numbers, newest first
    pub fn most_recent(total: u32, cap: u32) -> Self {
        let count = total.min(cap);
        Self((0..count).map(|i| total - i).collect())
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, num) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{num}")?;
        }
        Ok(())
    }
}

/// Result of starting a recent-message fetch
#[derive(Debug)]
pub enum FetchOutcome {
    /// The mailbox could not be selected
    Unselectable(AppError),
    /// The mailbox holds no messages; nothing was fetched
    Empty,
    /// The fetch runs in the background
    Started(FetchHandle),
}

impl FetchOutcome {
    /// Numeric status: `0` unselectable, `1` empty, `-1` fetch in flight
    pub fn status(&self) -> i32 {
        match self {
            Self::Unselectable(_) => 0,
            Self::Empty => 1,
            Self::Started(_) => -1,
        }
    }
}

/// Handle on an in-flight fetch
#[derive(Debug)]
pub struct FetchHandle {
    section: BodySection,
    requested: SequenceSet,
    task: JoinHandle<AppResult<usize>>,
}

impl FetchHandle {
    pub fn section(&self) -> BodySection {
        self.section
    }

    /// Sequence numbers requested from the server
    pub fn requested(&self) -> &SequenceSet {
        &self.requested
    }

    /// Wait for the fetch task to end
    ///
    /// Returns the number of messages delivered to the channel.
    ///
    /// # Errors
    ///
    /// - `Fetch` or `Timeout` if the fetch failed part-way
    /// - `Cancelled` if the token given to [`fetch_recent`] fired
    /// - `Internal` if the task panicked
    pub async fn finished(self) -> AppResult<usize> {
        self.task
            .await
            .map_err(|e| AppError::Internal(format!("fetch task failed: {e}")))?
    }
}

/// Start fetching the newest messages of `mailbox` into `out`
///
/// Selection happens before this returns; the fetch itself runs in a spawned
/// task that holds the session for its whole duration. Delivery order on
/// `out` is whatever order the server answers in. Firing `cancel` stops
/// forwarding and closes `out`; the session is then left mid-response and
/// should be logged out.
pub async fn fetch_recent(
    server: &ServerConfig,
    session: &MailSession,
    mailbox: &str,
    section: BodySection,
    out: mpsc::Sender<RawMessage>,
    cancel: CancellationToken,
) -> FetchOutcome {
    let mut guard = session.lock().await;

    let total = match imap::examine(server, &mut guard, mailbox).await {
        Ok(total) => total,
        Err(err) => {
            error!(code = 12, mailbox, error = %err, "cannot select mailbox");
            return FetchOutcome::Unselectable(err);
        }
    };
    if total == 0 {
        info!(code = 13, mailbox, "mailbox has no messages");
        return FetchOutcome::Empty;
    }

    let requested = SequenceSet::most_recent(total, RECENT_MESSAGE_CAP);
    let sequence_set = requested.to_string();
    debug!(mailbox, total, requested = requested.len(), %sequence_set, "fetching recent messages");
    let io_timeout = server.socket_timeout();
    let mailbox_name = mailbox.to_owned();

    let task = tokio::spawn(async move {
        let result: AppResult<usize> = async {
            let stream =
                imap::fetch_messages(io_timeout, &mut guard, &sequence_set, section).await?;
            forward_stream(stream, &out, io_timeout, &cancel).await
        }
        .await;
        match &result {
            Ok(delivered) => info!(mailbox = %mailbox_name, delivered, "fetch complete"),
            Err(err) => {
                error!(code = 14, critical = true, mailbox = %mailbox_name, error = %err, "fetch failed");
            }
        }
        result
    });

    FetchOutcome::Started(FetchHandle {
        section,
        requested,
        task,
    })
}

/// Pump a response stream into a channel
///
/// Each item must arrive within `idle`. When the receiver is gone the rest of
/// the stream is still drained so the session stays in sync. Returns the
/// number of items delivered.
///
/// # Errors
///
/// - the first error yielded by the stream
/// - `Timeout` if an item takes longer than `idle`
/// - `Cancelled` once `cancel` fires
pub async fn forward_stream<S, T>(
    stream: S,
    out: &mpsc::Sender<T>,
    idle: Duration,
    cancel: &CancellationToken,
) -> AppResult<usize>
where
    S: Stream<Item = AppResult<T>>,
{
    tokio::pin!(stream);
    let mut delivered = 0;
    let mut receiver_gone = false;
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AppError::Cancelled),
            next = timeout(idle, stream.next()) => next
                .map_err(|_| AppError::Timeout("response stream stalled".to_owned()))?,
        };
        let Some(item) = next else {
            return Ok(delivered);
        };
        let item = item?;
        if receiver_gone {
            continue;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AppError::Cancelled),
            sent = out.send(item) => match sent {
                Ok(()) => delivered += 1,
                Err(_) => {
                    warn!("receiver dropped; draining remaining responses");
                    receiver_gone = true;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::{FetchOutcome, RECENT_MESSAGE_CAP, SequenceSet, forward_stream};
    use crate::errors::{AppError, AppResult};

    const IDLE: Duration = Duration::from_secs(5);

    #[test]
    fn sequence_set_covers_top_numbers_without_gaps() {
        for total in 0..20u32 {
            let set = SequenceSet::most_recent(total, RECENT_MESSAGE_CAP);
            let expected = total.min(RECENT_MESSAGE_CAP) as usize;
            assert_eq!(set.len(), expected, "total={total}");
            assert!(set.as_slice().iter().all(|n| *n > 0 && *n <= total));
            let mut sorted = set.as_slice().to_vec();
            sorted.sort_unstable();
            for pair in sorted.windows(2) {
                assert_eq!(pair[1], pair[0] + 1);
            }
            if let Some(max) = sorted.last() {
                assert_eq!(*max, total);
            }
        }
    }

    #[test]
    fn sequence_set_renders_newest_first() {
        assert_eq!(SequenceSet::most_recent(12, 5).to_string(), "12,11,10,9,8");
        assert_eq!(SequenceSet::most_recent(2, 5).to_string(), "2,1");
        assert!(SequenceSet::most_recent(0, 5).as_slice().is_empty());
    }

    #[test]
    fn outcome_status_sentinels() {
        assert_eq!(
            FetchOutcome::Unselectable(AppError::MailboxSelect("x".into())).status(),
            0
        );
        assert_eq!(FetchOutcome::Empty.status(), 1);
    }

    #[tokio::test]
    async fn forwards_every_item_then_closes() {
        let (tx, mut rx) = mpsc::channel(2);
        let items: Vec<AppResult<u32>> = vec![Ok(5), Ok(4), Ok(3)];
        let producer = tokio::spawn(async move {
            forward_stream(stream::iter(items), &tx, IDLE, &CancellationToken::new()).await
        });

        let mut received = Vec::new();
        while let Some(item) = rx.recv().await {
            received.push(item);
        }
        assert_eq!(received, [5, 4, 3]);
        assert_eq!(producer.await.expect("join").expect("forward"), 3);
    }

    #[tokio::test]
    async fn stream_error_keeps_delivered_items_and_surfaces() {
        let (tx, mut rx) = mpsc::channel(4);
        let items: Vec<AppResult<u32>> = vec![
            Ok(1),
            Err(AppError::Fetch("connection reset".into())),
            Ok(2),
        ];
        let result =
            forward_stream(stream::iter(items), &tx, IDLE, &CancellationToken::new()).await;
        drop(tx);

        assert!(matches!(result, Err(AppError::Fetch(_))));
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn dropped_receiver_still_drains_stream() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let items: Vec<AppResult<u32>> = vec![Ok(1), Ok(2), Ok(3)];
        let delivered =
            forward_stream(stream::iter(items), &tx, IDLE, &CancellationToken::new())
                .await
                .expect("drained");
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn cancellation_stops_forwarding() {
        let (tx, _rx) = mpsc::channel::<u32>(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = forward_stream(stream::pending::<AppResult<u32>>(), &tx, IDLE, &cancel).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[tokio::test]
    async fn stalled_stream_times_out() {
        let (tx, _rx) = mpsc::channel::<u32>(1);
        let result = forward_stream(
            stream::pending::<AppResult<u32>>(),
            &tx,
            Duration::from_millis(20),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Timeout(_))));
    }
}
