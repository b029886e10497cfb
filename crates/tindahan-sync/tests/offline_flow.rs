//! End-to-end offline flows over a file-backed queue.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use tindahan_core::{EntityType, MutationAction, NotificationKind, DEFAULT_SCOPE};
use tindahan_db::{Database, DbConfig};
use tindahan_sync::{
    CacheKey, DrainOutcome, DrainReport, InMemoryFeed, OfflineQueue, RemoteApi, SyncConfig,
    SyncEngine, SyncError, SyncMode, SyncResult,
};

// =============================================================================
// Test Remote
// =============================================================================

/// Server stand-in. Records `(route, payload)` pairs and rejects payloads
/// whose `name` is listed in `reject`. Created records get `real123`; temp
/// ids are unknown to it.
#[derive(Default)]
struct TestRemote {
    calls: Mutex<Vec<(&'static str, Value)>>,
    reject: Vec<&'static str>,
    gate: Option<Arc<Notify>>,
}

impl TestRemote {
    fn calls(&self) -> Vec<(&'static str, Value)> {
        self.calls.lock().unwrap().clone()
    }

    async fn handle(&self, route: &'static str, payload: &Value) -> SyncResult<Value> {
        self.calls.lock().unwrap().push((route, payload.clone()));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let id = payload.get("_id").and_then(Value::as_str).unwrap_or_default();
        if id.starts_with("temp_") {
            return Err(SyncError::RemoteRejected {
                status: 404,
                message: format!("{id} not found"),
            });
        }
        let name = payload.get("name").and_then(Value::as_str).unwrap_or_default();
        if self.reject.contains(&name) {
            return Err(SyncError::RemoteRejected {
                status: 503,
                message: "Service Unavailable".into(),
            });
        }
        let mut record = payload.clone();
        if record.get("_id").is_none() {
            record["_id"] = json!("real123");
        }
        Ok(record)
    }
}

#[async_trait]
impl RemoteApi for TestRemote {
    async fn create_product(&self, p: &Value) -> SyncResult<Value> {
        self.handle("create_product", p).await
    }
    async fn update_product(&self, p: &Value) -> SyncResult<Value> {
        self.handle("update_product", p).await
    }
    async fn delete_product(&self, id: &str) -> SyncResult<Value> {
        self.handle("delete_product", &json!({"_id": id})).await
    }
    async fn create_category(&self, p: &Value) -> SyncResult<Value> {
        self.handle("create_category", p).await
    }
    async fn update_category(&self, p: &Value) -> SyncResult<Value> {
        self.handle("update_category", p).await
    }
    async fn delete_category(&self, id: &str) -> SyncResult<Value> {
        self.handle("delete_category", &json!({"_id": id})).await
    }
    async fn add_stock_movement(&self, p: &Value) -> SyncResult<Value> {
        self.handle("add_stock_movement", p).await
    }
    async fn create_sale(&self, p: &Value) -> SyncResult<Value> {
        self.handle("create_sale", p).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    engine: SyncEngine,
    remote: Arc<TestRemote>,
    feed: Arc<InMemoryFeed>,
}

async fn open(dir: &Path, remote: TestRemote) -> Harness {
    let db = Database::new(DbConfig::new(dir.join("queue.db"))).await.unwrap();
    let remote = Arc::new(remote);
    let feed = Arc::new(InMemoryFeed::default());
    let engine = SyncEngine::builder(SyncConfig::default())
        .with_database(db)
        .with_remote(remote.clone())
        .with_feed(feed.clone())
        .initially_online(false)
        .build()
        .await
        .unwrap();
    Harness { engine, remote, feed }
}

async fn queue(h: &Harness, entity: EntityType, action: MutationAction, payload: Value) {
    assert!(h.engine.interceptor().intercept(entity, action, payload).await.unwrap());
}

fn category(name: &str) -> Value {
    json!({"name": name, "store": "s1"})
}

fn completed(outcome: DrainOutcome) -> DrainReport {
    match outcome {
        DrainOutcome::Completed(report) => report,
        DrainOutcome::Skipped => panic!("drain was skipped"),
    }
}

// =============================================================================
// Flows
// =============================================================================

#[tokio::test]
async fn replay_preserves_enqueue_order_per_entity() {
    let dir = tempfile::tempdir().unwrap();
    let h = open(dir.path(), TestRemote::default()).await;

    for name in ["First", "Second", "Third"] {
        queue(&h, EntityType::Category, MutationAction::Create, category(name)).await;
    }
    queue(
        &h,
        EntityType::Product,
        MutationAction::Update,
        json!({"_id": "p1", "price": 15}),
    )
    .await;

    h.engine.network().set_online(true);
    let report = completed(h.engine.manager().drain().await);
    assert_eq!(report.synced(), 4);

    let category_names: Vec<_> = h
        .remote
        .calls()
        .into_iter()
        .filter(|(route, _)| *route == "create_category")
        .map(|(_, p)| p["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(category_names, vec!["First", "Second", "Third"]);
}

#[tokio::test]
async fn concurrent_drain_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Notify::new());
    let h = open(
        dir.path(),
        TestRemote {
            gate: Some(gate.clone()),
            ..Default::default()
        },
    )
    .await;
    queue(&h, EntityType::Category, MutationAction::Create, category("Drinks")).await;

    let manager = h.engine.manager().clone();
    let first = tokio::spawn(async move { manager.drain().await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.remote.calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(h.engine.manager().drain().await, DrainOutcome::Skipped);

    gate.notify_one();
    assert_eq!(completed(first.await.unwrap()).synced(), 1);
    assert_eq!(h.remote.calls().len(), 1);
}

#[tokio::test]
async fn removed_items_stay_removed_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let h = open(dir.path(), TestRemote::default()).await;
        queue(&h, EntityType::Category, MutationAction::Create, category("Drinks")).await;
        queue(&h, EntityType::Category, MutationAction::Create, category("Snacks")).await;

        completed(h.engine.manager().drain().await);
        h.engine.close().await;
    }

    let h = open(dir.path(), TestRemote::default()).await;
    assert_eq!(h.engine.queue().count_unsynced(EntityType::Category).await.unwrap(), 0);
    assert!(h.engine.queue().all().await.unwrap().is_empty());

    let report = completed(h.engine.manager().drain().await);
    assert!(report.is_empty());
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn queued_items_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let h = open(dir.path(), TestRemote::default()).await;
        queue(&h, EntityType::Category, MutationAction::Create, category("Drinks")).await;
        h.engine.close().await;
    }

    let h = open(dir.path(), TestRemote::default()).await;
    let pending = h.engine.queue().list_unsynced(EntityType::Category).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload, category("Drinks"));
}

#[tokio::test]
async fn failed_item_does_not_block_its_successors() {
    let dir = tempfile::tempdir().unwrap();
    let h = open(
        dir.path(),
        TestRemote {
            reject: vec!["B"],
            ..Default::default()
        },
    )
    .await;

    for name in ["A", "B", "C"] {
        queue(&h, EntityType::Category, MutationAction::Create, category(name)).await;
    }

    let report = completed(h.engine.manager().drain().await);
    assert_eq!(report.synced(), 2);
    assert_eq!(report.failed(), 1);

    let remaining = h.engine.queue().all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].payload["name"], "B");
    assert!(!remaining[0].synced);
    assert_eq!(remaining[0].attempts, 1);
    assert!(remaining[0].last_error.as_deref().unwrap().contains("503"));

    let kinds: Vec<_> = h.feed.history().into_iter().map(|n| n.kind).collect();
    assert_eq!(kinds, vec![NotificationKind::System, NotificationKind::Alert]);
}

#[tokio::test]
async fn optimistic_create_is_reconciled_with_server_id() {
    let dir = tempfile::tempdir().unwrap();
    let h = open(dir.path(), TestRemote::default()).await;
    let key = CacheKey::new(EntityType::Category, DEFAULT_SCOPE);

    queue(&h, EntityType::Category, MutationAction::Create, json!({"name": "Drinks"})).await;

    let before = h.engine.cache().snapshot(&key);
    assert_eq!(before.len(), 1);
    let temp_id = before[0]["_id"].as_str().unwrap().to_string();
    assert!(temp_id.starts_with("temp_"));

    h.engine.network().set_online(true);
    completed(h.engine.manager().drain().await);

    let after = h.engine.cache().snapshot(&key);
    assert_eq!(after.len(), 1);
    assert_eq!(after[0]["_id"], "real123");
    assert_eq!(after[0]["name"], "Drinks");
    assert!(!h.engine.cache().contains(&key, &temp_id));
}

#[tokio::test]
async fn empty_drain_is_silent() {
    let dir = tempfile::tempdir().unwrap();
    let h = open(dir.path(), TestRemote::default()).await;

    let report = completed(h.engine.manager().drain().await);

    assert!(report.is_empty());
    assert!(h.remote.calls().is_empty());
    assert!(h.feed.is_empty());
}

#[tokio::test]
async fn offline_stock_movement_syncs_on_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let h = open(dir.path(), TestRemote::default()).await;
    let movement = json!({"product": "p1", "type": "in", "quantity": 5, "reason": "restock"});

    queue(&h, EntityType::Inventory, MutationAction::Create, movement.clone()).await;
    assert_eq!(h.engine.queue().count_unsynced(EntityType::Inventory).await.unwrap(), 1);

    let handle = h.engine.agent().start().unwrap();
    assert_eq!(h.engine.config().mode(), SyncMode::Auto);
    h.engine.network().set_online(true);

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let pending = h.engine.queue().count_unsynced(EntityType::Inventory).await.unwrap();
            if pending == 0 && !h.feed.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(h.remote.calls(), vec![("add_stock_movement", movement)]);

    let notifications = h.feed.history();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].message, "Successfully synchronized 1 offline item");
    assert_eq!(notifications[0].kind, NotificationKind::System);

    handle.shutdown().await.unwrap();
}

// =============================================================================
// Store Lists and Edit Chains
// =============================================================================

fn s1(entity: EntityType) -> CacheKey {
    CacheKey::new(entity, "s1")
}

/// Creates "Drinks" in store s1 offline and returns its temp id.
async fn create_drinks(h: &Harness) -> String {
    let receipt = h
        .engine
        .interceptor()
        .queue_offline(EntityType::Category, MutationAction::Create, category("Drinks"))
        .await
        .unwrap();
    receipt.temp_id.unwrap()
}

#[tokio::test]
async fn partial_edits_land_in_the_store_list() {
    let dir = tempfile::tempdir().unwrap();
    let h = open(dir.path(), TestRemote::default()).await;
    let key = s1(EntityType::Product);
    h.engine.cache().load(
        key.clone(),
        vec![
            json!({"_id": "p1", "name": "Soap", "price": 10, "store": "s1"}),
            json!({"_id": "p2", "name": "Rice", "price": 50, "store": "s1"}),
        ],
    );

    queue(&h, EntityType::Product, MutationAction::Update, json!({"_id": "p1", "price": 12})).await;
    queue(&h, EntityType::Product, MutationAction::Delete, json!({"_id": "p2"})).await;

    let shown = h.engine.cache().snapshot(&key);
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0]["name"], "Soap");
    assert_eq!(shown[0]["price"], 12);
    let default_key = CacheKey::new(EntityType::Product, DEFAULT_SCOPE);
    assert!(h.engine.cache().snapshot(&default_key).is_empty());

    let pending = h.engine.queue().list_unsynced(EntityType::Product).await.unwrap();
    assert!(pending.iter().all(|m| m.scope() == "s1"));

    h.engine.network().set_online(true);
    let report = completed(h.engine.manager().drain().await);
    assert_eq!((report.synced(), report.failed()), (2, 0));

    assert_eq!(
        h.remote.calls(),
        vec![
            ("update_product", json!({"_id": "p1", "price": 12})),
            ("delete_product", json!({"_id": "p2"})),
        ]
    );
    let after = h.engine.cache().snapshot(&key);
    assert_eq!(after.len(), 1);
    assert_eq!(after[0]["price"], 12);
    assert!(h.engine.cache().snapshot(&default_key).is_empty());
}

#[tokio::test]
async fn offline_edit_of_offline_create_syncs_with_server_id() {
    let dir = tempfile::tempdir().unwrap();
    let h = open(dir.path(), TestRemote::default()).await;
    let key = s1(EntityType::Category);

    let temp_id = create_drinks(&h).await;
    queue(
        &h,
        EntityType::Category,
        MutationAction::Update,
        json!({"_id": temp_id, "name": "Juice"}),
    )
    .await;
    assert_eq!(h.engine.cache().snapshot(&key)[0]["name"], "Juice");

    h.engine.network().set_online(true);
    let report = completed(h.engine.manager().drain().await);
    assert_eq!((report.synced(), report.failed()), (2, 0));

    assert_eq!(
        h.remote.calls(),
        vec![
            ("create_category", category("Drinks")),
            ("update_category", json!({"_id": "real123", "name": "Juice"})),
        ]
    );
    assert!(h.engine.queue().all().await.unwrap().is_empty());

    let records = h.engine.cache().snapshot(&key);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["_id"], "real123");
    assert_eq!(records[0]["name"], "Juice");
}

#[tokio::test]
async fn offline_delete_of_offline_create_syncs_with_server_id() {
    let dir = tempfile::tempdir().unwrap();
    let h = open(dir.path(), TestRemote::default()).await;
    let key = s1(EntityType::Category);

    let temp_id = create_drinks(&h).await;
    queue(&h, EntityType::Category, MutationAction::Delete, json!({"_id": temp_id})).await;
    assert!(h.engine.cache().snapshot(&key).is_empty());

    h.engine.network().set_online(true);
    let report = completed(h.engine.manager().drain().await);
    assert_eq!((report.synced(), report.failed()), (2, 0));

    assert_eq!(
        h.remote.calls(),
        vec![
            ("create_category", category("Drinks")),
            ("delete_category", json!({"_id": "real123"})),
        ]
    );
    assert!(h.engine.queue().all().await.unwrap().is_empty());
    assert!(h.engine.cache().snapshot(&key).is_empty());
}

#[tokio::test]
async fn edit_waits_for_its_create_across_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let h = open(
            dir.path(),
            TestRemote {
                reject: vec!["Drinks"],
                ..Default::default()
            },
        )
        .await;
        let temp_id = create_drinks(&h).await;
        queue(
            &h,
            EntityType::Category,
            MutationAction::Update,
            json!({"_id": temp_id, "name": "Juice"}),
        )
        .await;

        let report = completed(h.engine.manager().drain().await);
        assert_eq!((report.synced(), report.failed()), (0, 2));
        assert_eq!(h.remote.calls().len(), 1);
        h.engine.close().await;
    }

    let h = open(dir.path(), TestRemote::default()).await;
    let report = completed(h.engine.manager().drain().await);
    assert_eq!((report.synced(), report.failed()), (2, 0));

    let calls = h.remote.calls();
    assert_eq!(calls[1], ("update_category", json!({"_id": "real123", "name": "Juice"})));
    assert!(h.engine.queue().all().await.unwrap().is_empty());
}
