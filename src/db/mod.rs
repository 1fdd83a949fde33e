// src/db/mod.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::error::StoreResult;
use crate::models::{Assignment, AuditLog, Lead, Sale, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Leads,
    Assignments,
    Sales,
    AuditLogs,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Users,
        Collection::Leads,
        Collection::Assignments,
        Collection::Sales,
        Collection::AuditLogs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Leads => "leads",
            Collection::Assignments => "assignments",
            Collection::Sales => "sales",
            Collection::AuditLogs => "audit_logs",
        }
    }
}

// ───────────────────────────────────────
// Queries & batched writes
// ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    /// String comparison, used for ISO timestamps.
    Gte(String, String),
    Lt(String, String),
}

impl Condition {
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Condition::Eq(field, expected) => doc.get(field) == Some(expected),
            Condition::Gte(field, bound) => doc
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| s >= bound.as_str()),
            Condition::Lt(field, bound) => doc
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| s < bound.as_str()),
        }
    }
}

/// Conjunction of field conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(field.to_string(), value.into()));
        self
    }

    /// `start <= field < end`
    pub fn range(mut self, field: &str, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.conditions.push(Condition::Gte(field.to_string(), start.into()));
        self.conditions.push(Condition::Lt(field.to_string(), end.into()));
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put { collection: Collection, id: i64, doc: Value },
    Update { collection: Collection, id: i64, patch: Map<String, Value> },
    Delete { collection: Collection, id: i64 },
}

impl WriteOp {
    pub fn collection(&self) -> Collection {
        match self {
            WriteOp::Put { collection, .. }
            | WriteOp::Update { collection, .. }
            | WriteOp::Delete { collection, .. } => *collection,
        }
    }
}

/// Writes applied all-or-nothing by `DocumentStore::commit`.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, collection: Collection, id: i64, doc: Value) -> &mut Self {
        self.ops.push(WriteOp::Put { collection, id, doc });
        self
    }

    pub fn update(
        &mut self,
        collection: Collection,
        id: i64,
        patch: Map<String, Value>,
    ) -> &mut Self {
        self.ops.push(WriteOp::Update { collection, id, patch });
        self
    }

    pub fn touched(&self) -> Vec<Collection> {
        let mut out: Vec<Collection> = Vec::new();
        for op in &self.ops {
            if !out.contains(&op.collection()) {
                out.push(op.collection());
            }
        }
        out
    }
}

// ───────────────────────────────────────
// Change subscriptions
// ───────────────────────────────────────

/// Full collection contents, ordered by id.
pub type Snapshot = Arc<Vec<Value>>;

#[derive(Debug)]
pub struct SnapshotHub {
    senders: HashMap<Collection, broadcast::Sender<Snapshot>>,
}

impl SnapshotHub {
    pub fn new(capacity: usize) -> Self {
        let senders = Collection::ALL
            .iter()
            .map(|c| (*c, broadcast::channel(capacity).0))
            .collect();
        Self { senders }
    }

    pub fn subscribe(&self, collection: Collection) -> broadcast::Receiver<Snapshot> {
        self.senders[&collection].subscribe()
    }

    pub fn has_subscribers(&self, collection: Collection) -> bool {
        self.senders[&collection].receiver_count() > 0
    }

    pub fn publish(&self, collection: Collection, docs: Vec<Value>) {
        // No receivers is not an error.
        let _ = self.senders[&collection].send(Arc::new(docs));
    }
}

// ───────────────────────────────────────
// Store contract
// ───────────────────────────────────────

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list(&self, collection: Collection) -> StoreResult<Vec<Value>>;
    async fn get(&self, collection: Collection, id: i64) -> StoreResult<Option<Value>>;
    /// Create (or overwrite) the document stored under `id`.
    async fn put(&self, collection: Collection, id: i64, doc: Value) -> StoreResult<()>;
    /// Shallow merge of `patch` into the document. Returns false when absent.
    async fn update_fields(
        &self,
        collection: Collection,
        id: i64,
        patch: Map<String, Value>,
    ) -> StoreResult<bool>;
    async fn delete(&self, collection: Collection, id: i64) -> StoreResult<bool>;
    async fn query(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Value>>;
    /// Largest id in the collection, 0 when empty.
    async fn max_id(&self, collection: Collection) -> StoreResult<i64>;
    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<Snapshot>;
}

pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;
    fn id(&self) -> i64;
}

impl Document for User {
    const COLLECTION: Collection = Collection::Users;
    fn id(&self) -> i64 {
        self.id
    }
}

impl Document for Lead {
    const COLLECTION: Collection = Collection::Leads;
    fn id(&self) -> i64 {
        self.id
    }
}

impl Document for Assignment {
    const COLLECTION: Collection = Collection::Assignments;
    fn id(&self) -> i64 {
        self.id
    }
}

impl Document for Sale {
    const COLLECTION: Collection = Collection::Sales;
    fn id(&self) -> i64 {
        self.id
    }
}

impl Document for AuditLog {
    const COLLECTION: Collection = Collection::AuditLogs;
    fn id(&self) -> i64 {
        self.id
    }
}

pub async fn fetch_all<T: Document>(store: &dyn DocumentStore) -> StoreResult<Vec<T>> {
    decode_all(store.list(T::COLLECTION).await?)
}

pub async fn fetch<T: Document>(store: &dyn DocumentStore, id: i64) -> StoreResult<Option<T>> {
    match store.get(T::COLLECTION, id).await? {
        Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
        None => Ok(None),
    }
}

pub async fn query_as<T: Document>(
    store: &dyn DocumentStore,
    filter: &Filter,
) -> StoreResult<Vec<T>> {
    decode_all(store.query(T::COLLECTION, filter).await?)
}

pub async fn insert<T: Document>(store: &dyn DocumentStore, doc: &T) -> StoreResult<()> {
    store.put(T::COLLECTION, doc.id(), serde_json::to_value(doc)?).await
}

pub fn decode_all<T: DeserializeOwned>(docs: Vec<Value>) -> StoreResult<Vec<T>> {
    docs.into_iter()
        .map(|d| serde_json::from_value(d).map_err(Into::into))
        .collect()
}

/// Next sequential id for `collection` (max + 1).
///
/// Two creators racing on the same collection can compute the same id; the
/// later `put` then overwrites the earlier document. Callers that must not
/// collide (ledger, audit writer) allocate from behind their own single
/// writer.
pub async fn next_id(store: &dyn DocumentStore, collection: Collection) -> StoreResult<i64> {
    Ok(store.max_id(collection).await? + 1)
}

/// Push fresh snapshots of `collections` to their subscribers.
///
/// Runs after a write has landed, so a failed read is logged and dropped
/// rather than turned into an error for the write.
pub async fn publish_snapshots(
    store: &dyn DocumentStore,
    hub: &SnapshotHub,
    collections: &[Collection],
) {
    for c in collections {
        if !hub.has_subscribers(*c) {
            continue;
        }
        match store.list(*c).await {
            Ok(docs) => hub.publish(*c, docs),
            Err(e) => {
                tracing::warn!(collection = c.as_str(), error = %e, "snapshot refresh failed")
            }
        }
    }
}

/// Open the Postgres-backed store from `DATABASE_URL`.
pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgStore> {
    let store = PgStore::connect(database_url, max_connections).await?;
    tracing::info!("connected to PostgreSQL");
    Ok(store)
}
