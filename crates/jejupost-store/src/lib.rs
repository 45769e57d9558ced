//! Observable in-memory cache of the user's postcards.
//!
//! One store instance is created at startup and shared by every view that
//! needs the list, so navigation does not re-fetch. State changes are pushed
//! to subscribers over a broadcast channel; there is no ambient global.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, broadcast};
use tracing::debug;

use jejupost_client::{ClientError, PostcardApi};
use jejupost_types::models::{LifecycleStatus, Postcard};

/// Point-in-time view of the store for rendering.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// Server-returned order, replaced wholesale on every successful fetch.
    pub postcards: Vec<Postcard>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Change notifications pushed to subscribers. Carry ids rather than records;
/// subscribers read the current state through `snapshot()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Loading,
    ListReplaced,
    Created { id: String },
    Deleted { id: String },
    Error { message: String },
    ErrorCleared,
}

/// Shared handle to the postcard collection store. Cheap to clone.
#[derive(Clone)]
pub struct PostcardStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    api: Arc<dyn PostcardApi>,
    state: Mutex<StoreSnapshot>,
    events: broadcast::Sender<StoreEvent>,
    /// Monotonic fetch sequence. A response is applied only while its
    /// sequence is still the latest issued, so a slow earlier fetch can
    /// never overwrite the result of a newer one.
    fetch_seq: AtomicU64,
}

impl PostcardStore {
    pub fn new(api: Arc<dyn PostcardApi>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(StoreInner {
                api,
                state: Mutex::new(StoreSnapshot::default()),
                events,
                fetch_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to store change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    /// Current state, cloned for the caller.
    pub async fn snapshot(&self) -> StoreSnapshot {
        self.inner.state.lock().await.clone()
    }

    /// Number of cached postcards. Always derived from the list, never
    /// tracked separately.
    pub async fn count(&self) -> usize {
        self.inner.state.lock().await.postcards.len()
    }

    /// Fetch the list, optionally filtered by lifecycle status, and replace
    /// the cached list wholesale. Failures are recorded in the error field
    /// and returned to the caller; nothing is retried here.
    pub async fn fetch(&self, filter: Option<LifecycleStatus>) -> Result<(), ClientError> {
        let seq = self.inner.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.inner.state.lock().await;
            state.loading = true;
            state.error = None;
        }
        self.emit(StoreEvent::Loading);

        let result = self.inner.api.list(filter).await;

        // Staleness is decided under the state lock, in the same critical
        // section as the apply. Checking first and locking after would leave
        // a window where a newer fetch applies in between and this response
        // overwrites it anyway. A stale response is dropped entirely,
        // including its loading/error bookkeeping — the newer fetch settles
        // those.
        match result {
            Ok(postcards) => {
                let mut state = self.inner.state.lock().await;
                if seq != self.inner.fetch_seq.load(Ordering::SeqCst) {
                    debug!(seq, "dropping stale fetch response");
                    return Ok(());
                }
                state.postcards = postcards;
                state.loading = false;
                drop(state);
                self.emit(StoreEvent::ListReplaced);
                Ok(())
            }
            Err(e) => {
                let mut state = self.inner.state.lock().await;
                if seq == self.inner.fetch_seq.load(Ordering::SeqCst) {
                    state.loading = false;
                    state.error = Some(e.to_string());
                    drop(state);
                    self.emit(StoreEvent::Error {
                        message: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    /// Create a blank postcard and append it to the cached list. The record
    /// is returned so the caller can e.g. navigate to its editor.
    pub async fn create(&self) -> Result<Postcard, ClientError> {
        match self.inner.api.create().await {
            Ok(postcard) => {
                let mut state = self.inner.state.lock().await;
                state.postcards.push(postcard.clone());
                drop(state);
                self.emit(StoreEvent::Created {
                    id: postcard.id.clone(),
                });
                Ok(postcard)
            }
            Err(e) => {
                self.record_error(&e).await;
                Err(e)
            }
        }
    }

    /// Delete a postcard and drop it from the cached list by id.
    pub async fn delete(&self, id: &str) -> Result<(), ClientError> {
        match self.inner.api.delete(id).await {
            Ok(()) => {
                let mut state = self.inner.state.lock().await;
                state.postcards.retain(|p| p.id != id);
                drop(state);
                self.emit(StoreEvent::Deleted { id: id.to_string() });
                Ok(())
            }
            Err(e) => {
                self.record_error(&e).await;
                Err(e)
            }
        }
    }

    /// Reset the error field, typically after the UI has shown the toast.
    pub async fn clear_error(&self) {
        let mut state = self.inner.state.lock().await;
        state.error = None;
        drop(state);
        self.emit(StoreEvent::ErrorCleared);
    }

    async fn record_error(&self, e: &ClientError) {
        let mut state = self.inner.state.lock().await;
        state.error = Some(e.to_string());
        drop(state);
        self.emit(StoreEvent::Error {
            message: e.to_string(),
        });
    }
}

#[cfg(test)]
mod tests;
