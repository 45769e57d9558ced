use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use jejupost_client::{ApiClient, ClientError};
use jejupost_types::events::PipelineStatus;

use crate::decoder::FrameDecoder;

/// Chunked bytes of one open status stream.
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// Where a watcher's status stream comes from. `ApiClient` is the real one;
/// tests script artificial streams with arbitrary chunk boundaries.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn open(&self, postcard_id: &str) -> Result<ByteStream, ClientError>;
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn open(&self, postcard_id: &str) -> Result<ByteStream, ClientError> {
        let stream = self.open_status_stream(postcard_id).await?;
        Ok(stream.map(|r| r.map_err(ClientError::from)).boxed())
    }
}

/// Why the subscription stopped. Distinguishes a terminal frame from the
/// connection simply dropping — callers may choose to re-watch after `Eof`,
/// but nothing reconnects automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A `completed` or `failed` frame arrived.
    Terminal,
    /// The server closed the connection without a terminal frame. Not an
    /// error.
    Eof,
    /// The watcher was cancelled by its owner.
    Cancelled,
    /// Connection could not be opened, or broke mid-stream.
    Error,
}

/// What the owning view renders: last parsed status, last error text, and
/// whether the connection is currently open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    pub status: Option<PipelineStatus>,
    pub error: Option<String>,
    pub connected: bool,
    pub closed: Option<CloseReason>,
}

/// One live status subscription for one postcard.
///
/// Owns its connection exclusively. The caller decides when to spawn one
/// (postcard in `processing` state, view mounted) and must drop or cancel it
/// on teardown — dropping the watcher aborts the connection rather than
/// leaving it open for the life of the process.
pub struct StatusWatcher {
    rx: watch::Receiver<StatusSnapshot>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StatusWatcher {
    /// Open the stream for `postcard_id` and start consuming it. Snapshots
    /// are published on a watch channel; the subscription stops on a
    /// terminal frame, stream end, error, or cancellation.
    pub fn spawn(source: Arc<dyn StatusSource>, postcard_id: impl Into<String>) -> Self {
        let postcard_id = postcard_id.into();
        let (tx, rx) = watch::channel(StatusSnapshot::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(source, postcard_id, tx, cancel.clone()));
        Self {
            rx,
            cancel,
            task: Some(task),
        }
    }

    /// Receiver for rendering; `borrow()` is always the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<StatusSnapshot> {
        self.rx.clone()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.rx.borrow().clone()
    }

    /// Abort the subscription. Idempotent; also invoked on drop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the consumer task to finish (after a terminal frame, EOF,
    /// error, or cancellation).
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for StatusWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    source: Arc<dyn StatusSource>,
    postcard_id: String,
    tx: watch::Sender<StatusSnapshot>,
    cancel: CancellationToken,
) {
    let mut stream = tokio::select! {
        _ = cancel.cancelled() => {
            tx.send_modify(|s| s.closed = Some(CloseReason::Cancelled));
            return;
        }
        opened = source.open(&postcard_id) => match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!(postcard_id = %postcard_id, error = %e, "status stream not opened");
                tx.send_modify(|s| {
                    s.error = Some(e.to_string());
                    s.closed = Some(CloseReason::Error);
                });
                return;
            }
        }
    };

    tx.send_modify(|s| s.connected = true);
    let mut decoder = FrameDecoder::new();

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(postcard_id = %postcard_id, "status stream cancelled");
                tx.send_modify(|s| {
                    s.connected = false;
                    s.closed = Some(CloseReason::Cancelled);
                });
                return;
            }
            item = stream.next() => item,
        };

        match item {
            // Clean EOF without a terminal frame. Not an error; the caller
            // sees `Eof` and may re-watch.
            None => {
                tx.send_modify(|s| {
                    s.connected = false;
                    s.closed = Some(CloseReason::Eof);
                });
                return;
            }
            Some(Err(e)) => {
                warn!(postcard_id = %postcard_id, error = %e, "status stream broke");
                tx.send_modify(|s| {
                    s.connected = false;
                    s.error = Some(e.to_string());
                    s.closed = Some(CloseReason::Error);
                });
                return;
            }
            Some(Ok(chunk)) => {
                for event in decoder.push(&chunk) {
                    debug!(postcard_id = %postcard_id, status = %event.status, "pipeline status");
                    let terminal = event.status.is_terminal();
                    // One publish per frame: a subscriber must never observe
                    // a terminal status with the connection still marked
                    // open.
                    tx.send_modify(|s| {
                        s.status = Some(event.status);
                        if event.status == PipelineStatus::Failed {
                            if let Some(text) = event.error {
                                s.error = Some(text);
                            }
                        }
                        if terminal {
                            s.connected = false;
                            s.closed = Some(CloseReason::Terminal);
                        }
                    });
                    if terminal {
                        // Stop reading even if more bytes are queued and
                        // close the connection by dropping the stream.
                        return;
                    }
                }
            }
        }
    }
}
