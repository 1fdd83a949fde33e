// src/services/audit.rs

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::db::{self, Collection, DocumentStore};
use crate::error::StoreResult;
use crate::models::{AuditLog, NewAuditLog};

/// Fire-and-forget audit trail. `record` never blocks and never fails;
/// a background writer persists events in arrival order.
#[derive(Clone, Debug)]
pub struct AuditSink {
    tx: mpsc::UnboundedSender<NewAuditLog>,
}

impl AuditSink {
    /// Start the writer. It stops once every sink clone has been dropped
    /// and the queue is drained.
    pub fn spawn(store: Arc<dyn DocumentStore>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<NewAuditLog>();
        let writer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = write(store.as_ref(), event).await {
                    warn!(error = %e, "audit write failed");
                }
            }
        });
        (Self { tx }, writer)
    }

    pub fn record(&self, event: NewAuditLog) {
        if self.tx.send(event).is_err() {
            warn!("audit writer is gone, event dropped");
        }
    }
}

async fn write(store: &dyn DocumentStore, event: NewAuditLog) -> StoreResult<()> {
    let entry = AuditLog {
        id: db::next_id(store, Collection::AuditLogs).await?,
        user_id: event.user_id,
        action_type: event.action_type,
        entity_type: event.entity_type,
        entity_id: event.entity_id,
        old_value: event.old_value,
        new_value: event.new_value,
        created_at: Utc::now(),
    };
    db::insert(store, &entry).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn event(action: &str) -> NewAuditLog {
        NewAuditLog {
            user_id: 1,
            action_type: action.into(),
            entity_type: "user".into(),
            entity_id: Some(1),
            old_value: None,
            new_value: None,
        }
    }

    #[tokio::test]
    async fn events_are_persisted_in_order() {
        let store = Arc::new(MemoryStore::new());
        let (sink, writer) = AuditSink::spawn(store.clone());

        sink.clone().record(event("USER_LOGIN"));
        sink.record(event("USER_LOGOUT"));
        drop(sink);
        writer.await.unwrap();

        let logs: Vec<AuditLog> = db::fetch_all(store.as_ref()).await.unwrap();
        let actions: Vec<&str> = logs.iter().map(|l| l.action_type.as_str()).collect();
        assert_eq!(actions, vec!["USER_LOGIN", "USER_LOGOUT"]);
        assert_eq!(logs[1].id, 2);
    }

    #[tokio::test]
    async fn record_after_writer_stops_does_not_panic() {
        let store = Arc::new(MemoryStore::new());
        let (sink, writer) = AuditSink::spawn(store);
        writer.abort();
        let _ = writer.await;
        sink.record(event("LEAD_ASSIGNED"));
    }
}
