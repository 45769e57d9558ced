use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use jejupost_client::{ClientError, PostcardApi};
use jejupost_types::models::{LifecycleStatus, Postcard};

use crate::{PostcardStore, StoreEvent};

fn postcard(id: &str, status: LifecycleStatus) -> Postcard {
    let now = Utc::now();
    Postcard {
        id: id.to_string(),
        template_id: Some("tpl-1".to_string()),
        text: None,
        original_text: None,
        recipient_email: None,
        recipient_name: None,
        sender_name: None,
        status,
        scheduled_at: None,
        sent_at: None,
        postcard_path: None,
        user_photo_url: None,
        error_message: None,
        created_at: now,
        updated_at: now,
    }
}

fn api_error(message: &str) -> ClientError {
    ClientError::Api {
        status: 500,
        message: message.to_string(),
    }
}

/// Scripted `PostcardApi`: each call pops the next queued result.
#[derive(Default)]
struct FakeApi {
    list_results: Mutex<VecDeque<Result<Vec<Postcard>, ClientError>>>,
    create_results: Mutex<VecDeque<Result<Postcard, ClientError>>>,
    delete_results: Mutex<VecDeque<Result<(), ClientError>>>,
}

impl FakeApi {
    fn queue_list(&self, result: Result<Vec<Postcard>, ClientError>) {
        self.list_results.lock().unwrap().push_back(result);
    }
    fn queue_create(&self, result: Result<Postcard, ClientError>) {
        self.create_results.lock().unwrap().push_back(result);
    }
    fn queue_delete(&self, result: Result<(), ClientError>) {
        self.delete_results.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl PostcardApi for FakeApi {
    async fn list(&self, _filter: Option<LifecycleStatus>) -> Result<Vec<Postcard>, ClientError> {
        self.list_results
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected list call")
    }

    async fn create(&self) -> Result<Postcard, ClientError> {
        self.create_results
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected create call")
    }

    async fn delete(&self, _id: &str) -> Result<(), ClientError> {
        self.delete_results
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected delete call")
    }
}

fn store_with(api: FakeApi) -> (PostcardStore, Arc<FakeApi>) {
    let api = Arc::new(api);
    (PostcardStore::new(api.clone()), api)
}

#[tokio::test]
async fn fetch_replaces_list_and_clears_loading() {
    let api = FakeApi::default();
    api.queue_list(Ok(vec![
        postcard("a", LifecycleStatus::Writing),
        postcard("b", LifecycleStatus::Sent),
    ]));
    let (store, _api) = store_with(api);

    store.fetch(None).await.unwrap();

    let snap = store.snapshot().await;
    assert!(!snap.loading);
    assert!(snap.error.is_none());
    let ids: Vec<&str> = snap.postcards.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);
    assert_eq!(store.count().await, snap.postcards.len());
}

#[tokio::test]
async fn fetch_failure_records_error_and_clears_loading() {
    let api = FakeApi::default();
    api.queue_list(Err(api_error("boom")));
    let (store, _api) = store_with(api);

    let err = store.fetch(None).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 500, .. }));

    let snap = store.snapshot().await;
    assert!(!snap.loading);
    assert_eq!(snap.error.as_deref(), Some("server error (500): boom"));
    assert!(snap.postcards.is_empty());
}

#[tokio::test]
async fn fetch_clears_prior_error() {
    let api = FakeApi::default();
    api.queue_list(Err(api_error("boom")));
    api.queue_list(Ok(vec![postcard("a", LifecycleStatus::Writing)]));
    let (store, _api) = store_with(api);

    let _ = store.fetch(None).await;
    assert!(store.snapshot().await.error.is_some());

    store.fetch(None).await.unwrap();
    let snap = store.snapshot().await;
    assert!(snap.error.is_none());
    assert_eq!(snap.postcards.len(), 1);
}

#[tokio::test]
async fn create_appends_and_count_tracks_length() {
    let api = FakeApi::default();
    api.queue_list(Ok(vec![postcard("a", LifecycleStatus::Writing)]));
    api.queue_create(Ok(postcard("b", LifecycleStatus::Writing)));
    let (store, _api) = store_with(api);

    store.fetch(None).await.unwrap();
    let before = store.count().await;

    let created = store.create().await.unwrap();
    assert_eq!(created.id, "b");

    let snap = store.snapshot().await;
    assert_eq!(snap.postcards.len(), before + 1);
    assert_eq!(snap.postcards.last().unwrap().id, "b");
    assert_eq!(store.count().await, snap.postcards.len());
}

#[tokio::test]
async fn create_failure_records_error_and_rethrows() {
    let api = FakeApi::default();
    api.queue_create(Err(api_error("no template available")));
    let (store, _api) = store_with(api);

    assert!(store.create().await.is_err());
    let snap = store.snapshot().await;
    assert!(snap.error.as_deref().unwrap().contains("no template available"));
    assert!(snap.postcards.is_empty());
}

#[tokio::test]
async fn delete_removes_by_id() {
    let api = FakeApi::default();
    api.queue_list(Ok(vec![
        postcard("a", LifecycleStatus::Writing),
        postcard("b", LifecycleStatus::Writing),
    ]));
    api.queue_delete(Ok(()));
    let (store, _api) = store_with(api);

    store.fetch(None).await.unwrap();
    store.delete("a").await.unwrap();

    let snap = store.snapshot().await;
    assert_eq!(snap.postcards.len(), 1);
    assert!(snap.postcards.iter().all(|p| p.id != "a"));
    assert_eq!(store.count().await, 1);
}

#[tokio::test]
async fn delete_failure_leaves_list_unchanged() {
    let api = FakeApi::default();
    api.queue_list(Ok(vec![postcard("a", LifecycleStatus::Writing)]));
    api.queue_delete(Err(api_error("postcard not found")));
    let (store, _api) = store_with(api);

    store.fetch(None).await.unwrap();
    assert!(store.delete("ghost").await.is_err());

    let snap = store.snapshot().await;
    assert_eq!(snap.postcards.len(), 1);
    assert!(snap.error.is_some());
}

#[tokio::test]
async fn clear_error_resets_error_field() {
    let api = FakeApi::default();
    api.queue_list(Err(api_error("boom")));
    let (store, _api) = store_with(api);

    let _ = store.fetch(None).await;
    assert!(store.snapshot().await.error.is_some());

    store.clear_error().await;
    assert!(store.snapshot().await.error.is_none());
}

#[tokio::test]
async fn list_create_delete_scenario() {
    let api = FakeApi::default();
    api.queue_list(Ok(vec![postcard("a", LifecycleStatus::Writing)]));
    api.queue_create(Ok(postcard("b", LifecycleStatus::Writing)));
    api.queue_delete(Ok(()));
    let (store, _api) = store_with(api);

    store.fetch(None).await.unwrap();
    assert_eq!(store.count().await, 1);

    store.create().await.unwrap();
    let snap = store.snapshot().await;
    assert_eq!(snap.postcards.len(), 2);
    assert_eq!(snap.postcards.last().unwrap().id, "b");

    store.delete("a").await.unwrap();
    let snap = store.snapshot().await;
    assert_eq!(snap.postcards.len(), 1);
    assert_eq!(snap.postcards[0].id, "b");
}

#[tokio::test]
async fn subscribers_see_store_events() {
    let api = FakeApi::default();
    api.queue_list(Ok(vec![postcard("a", LifecycleStatus::Writing)]));
    let (store, _api) = store_with(api);

    let mut rx = store.subscribe();
    store.fetch(None).await.unwrap();

    assert_eq!(rx.recv().await.unwrap(), StoreEvent::Loading);
    assert_eq!(rx.recv().await.unwrap(), StoreEvent::ListReplaced);
}

/// `PostcardApi` whose first list call blocks until released, so a later
/// fetch can overtake it.
struct GatedApi {
    calls: AtomicU64,
    first_entered: Notify,
    release_first: Notify,
}

#[async_trait]
impl PostcardApi for GatedApi {
    async fn list(&self, _filter: Option<LifecycleStatus>) -> Result<Vec<Postcard>, ClientError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.first_entered.notify_one();
            self.release_first.notified().await;
            Ok(vec![postcard("stale", LifecycleStatus::Writing)])
        } else {
            Ok(vec![postcard("fresh", LifecycleStatus::Writing)])
        }
    }

    async fn create(&self) -> Result<Postcard, ClientError> {
        unreachable!()
    }

    async fn delete(&self, _id: &str) -> Result<(), ClientError> {
        unreachable!()
    }
}

/// Both list calls park until released, so the test controls which response
/// arrives first regardless of issue order.
struct OrderedApi {
    calls: AtomicU64,
    fail_first: bool,
    first_entered: Notify,
    second_entered: Notify,
    release_first: Notify,
    release_second: Notify,
}

impl OrderedApi {
    fn new(fail_first: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU64::new(0),
            fail_first,
            first_entered: Notify::new(),
            second_entered: Notify::new(),
            release_first: Notify::new(),
            release_second: Notify::new(),
        })
    }
}

#[async_trait]
impl PostcardApi for OrderedApi {
    async fn list(&self, _filter: Option<LifecycleStatus>) -> Result<Vec<Postcard>, ClientError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.first_entered.notify_one();
            self.release_first.notified().await;
            if self.fail_first {
                Err(api_error("slow backend"))
            } else {
                Ok(vec![postcard("stale", LifecycleStatus::Writing)])
            }
        } else {
            self.second_entered.notify_one();
            self.release_second.notified().await;
            Ok(vec![postcard("fresh", LifecycleStatus::Writing)])
        }
    }

    async fn create(&self) -> Result<Postcard, ClientError> {
        unreachable!()
    }

    async fn delete(&self, _id: &str) -> Result<(), ClientError> {
        unreachable!()
    }
}

#[tokio::test]
async fn stale_response_arriving_after_newer_apply_is_dropped() {
    let api = OrderedApi::new(false);
    let store = PostcardStore::new(api.clone());

    // First fetch parks inside the API call while a second one is issued.
    let first = {
        let store = store.clone();
        tokio::spawn(async move { store.fetch(None).await })
    };
    api.first_entered.notified().await;

    let second = {
        let store = store.clone();
        tokio::spawn(async move { store.fetch(None).await })
    };
    api.second_entered.notified().await;

    // The newer fetch applies its list first.
    api.release_second.notify_one();
    second.await.unwrap().unwrap();
    assert_eq!(store.snapshot().await.postcards[0].id, "fresh");

    // The older response arrives afterwards; the check-and-apply runs under
    // one lock, so it must be dropped rather than overwrite the newer list.
    api.release_first.notify_one();
    first.await.unwrap().unwrap();

    let snap = store.snapshot().await;
    assert_eq!(snap.postcards.len(), 1);
    assert_eq!(snap.postcards[0].id, "fresh");
    assert!(!snap.loading);
    assert!(snap.error.is_none());
}

#[tokio::test]
async fn stale_fetch_failure_does_not_clobber_newer_result() {
    let api = OrderedApi::new(true);
    let store = PostcardStore::new(api.clone());

    let first = {
        let store = store.clone();
        tokio::spawn(async move { store.fetch(None).await })
    };
    api.first_entered.notified().await;

    let second = {
        let store = store.clone();
        tokio::spawn(async move { store.fetch(None).await })
    };
    api.second_entered.notified().await;

    api.release_second.notify_one();
    second.await.unwrap().unwrap();

    // The older fetch fails after the newer one already settled. Its caller
    // still sees the error, but the store keeps the newer bookkeeping.
    api.release_first.notify_one();
    assert!(first.await.unwrap().is_err());

    let snap = store.snapshot().await;
    assert_eq!(snap.postcards[0].id, "fresh");
    assert!(snap.error.is_none());
    assert!(!snap.loading);
}

#[tokio::test]
async fn stale_fetch_response_is_dropped() {
    let api = Arc::new(GatedApi {
        calls: AtomicU64::new(0),
        first_entered: Notify::new(),
        release_first: Notify::new(),
    });
    let store = PostcardStore::new(api.clone());

    // First fetch parks inside the API call.
    let slow = {
        let store = store.clone();
        tokio::spawn(async move { store.fetch(None).await })
    };
    api.first_entered.notified().await;

    // Second fetch completes while the first is still in flight.
    store.fetch(None).await.unwrap();
    assert_eq!(store.snapshot().await.postcards[0].id, "fresh");

    // Now let the first response arrive; it must be dropped as stale.
    api.release_first.notify_one();
    slow.await.unwrap().unwrap();

    let snap = store.snapshot().await;
    assert_eq!(snap.postcards.len(), 1);
    assert_eq!(snap.postcards[0].id, "fresh");
    assert!(!snap.loading);
}
