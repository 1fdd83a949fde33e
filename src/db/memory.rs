// src/db/memory.rs

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};

use super::{Collection, DocumentStore, Filter, Snapshot, SnapshotHub, WriteBatch, WriteOp};
use crate::error::StoreResult;

type Tables = HashMap<Collection, BTreeMap<i64, Value>>;

/// Process-local store. Used for tests and `STORE_BACKEND=memory`.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    hub: SnapshotHub,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            hub: SnapshotHub::new(64),
        }
    }

    fn snapshot(tables: &Tables, collection: Collection) -> Vec<Value> {
        tables
            .get(&collection)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    fn notify(&self, tables: &Tables, collections: &[Collection]) {
        for c in collections {
            if self.hub.has_subscribers(*c) {
                self.hub.publish(*c, Self::snapshot(tables, *c));
            }
        }
    }

    fn apply(tables: &mut Tables, op: WriteOp) -> bool {
        match op {
            WriteOp::Put { collection, id, doc } => {
                tables.entry(collection).or_default().insert(id, doc);
                true
            }
            WriteOp::Update { collection, id, patch } => {
                match tables.get_mut(&collection).and_then(|t| t.get_mut(&id)) {
                    Some(Value::Object(existing)) => {
                        existing.extend(patch);
                        true
                    }
                    _ => false,
                }
            }
            WriteOp::Delete { collection, id } => tables
                .get_mut(&collection)
                .and_then(|t| t.remove(&id))
                .is_some(),
        }
    }

    async fn write(&self, op: WriteOp) -> bool {
        let collection = op.collection();
        let mut tables = self.tables.write().await;
        let changed = Self::apply(&mut tables, op);
        if changed {
            self.notify(&tables, &[collection]);
        }
        changed
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list(&self, collection: Collection) -> StoreResult<Vec<Value>> {
        let tables = self.tables.read().await;
        Ok(Self::snapshot(&tables, collection))
    }

    async fn get(&self, collection: Collection, id: i64) -> StoreResult<Option<Value>> {
        let tables = self.tables.read().await;
        Ok(tables.get(&collection).and_then(|t| t.get(&id)).cloned())
    }

    async fn put(&self, collection: Collection, id: i64, doc: Value) -> StoreResult<()> {
        self.write(WriteOp::Put { collection, id, doc }).await;
        Ok(())
    }

    async fn update_fields(
        &self,
        collection: Collection,
        id: i64,
        patch: Map<String, Value>,
    ) -> StoreResult<bool> {
        Ok(self.write(WriteOp::Update { collection, id, patch }).await)
    }

    async fn delete(&self, collection: Collection, id: i64) -> StoreResult<bool> {
        Ok(self.write(WriteOp::Delete { collection, id }).await)
    }

    async fn query(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Value>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&collection)
            .map(|t| t.values().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default())
    }

    async fn max_id(&self, collection: Collection) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&collection)
            .and_then(|t| t.keys().next_back().copied())
            .unwrap_or(0))
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let touched = batch.touched();
        let mut tables = self.tables.write().await;
        for op in batch.ops {
            Self::apply(&mut tables, op);
        }
        self.notify(&tables, &touched);
        Ok(())
    }

    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<Snapshot> {
        self.hub.subscribe(collection)
    }
}
