// src/db/postgres.rs

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{query, query_as, query_scalar, Pool, Postgres, QueryBuilder};
use tokio::sync::broadcast;

use super::{Collection, Condition, DocumentStore, Filter, Snapshot, SnapshotHub, WriteBatch, WriteOp};
use crate::error::StoreResult;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS public.documents (
    collection TEXT   NOT NULL,
    id         BIGINT NOT NULL,
    body       JSONB  NOT NULL,
    PRIMARY KEY (collection, id)
)
"#;

/// Documents live in one `jsonb` table keyed by `(collection, id)`.
/// Change snapshots are only published for writes made through this process.
pub struct PgStore {
    pool: Pool<Postgres>,
    hub: SnapshotHub,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        query(SCHEMA).execute(&pool).await?;

        Ok(Self {
            pool,
            hub: SnapshotHub::new(64),
        })
    }

    async fn notify(&self, collections: &[Collection]) {
        super::publish_snapshots(self, &self.hub, collections).await;
    }
}

fn push_condition(qb: &mut QueryBuilder<'_, Postgres>, cond: &Condition) {
    match cond {
        Condition::Eq(field, value) => {
            qb.push(" AND body -> ")
                .push_bind(field.clone())
                .push(" = ")
                .push_bind(value.clone());
        }
        Condition::Gte(field, bound) => {
            qb.push(" AND body ->> ")
                .push_bind(field.clone())
                .push(" >= ")
                .push_bind(bound.clone());
        }
        Condition::Lt(field, bound) => {
            qb.push(" AND body ->> ")
                .push_bind(field.clone())
                .push(" < ")
                .push_bind(bound.clone());
        }
    }
}

async fn apply_op<'c, E>(executor: E, op: &WriteOp) -> StoreResult<u64>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let res = match op {
        WriteOp::Put { collection, id, doc } => {
            query(
                r#"
                INSERT INTO public.documents (collection, id, body)
                VALUES ($1, $2, $3)
                ON CONFLICT (collection, id) DO UPDATE SET body = EXCLUDED.body
                "#,
            )
            .bind(collection.as_str())
            .bind(id)
            .bind(doc)
            .execute(executor)
            .await?
        }
        WriteOp::Update { collection, id, patch } => {
            query(
                r#"UPDATE public.documents SET body = body || $3 WHERE collection = $1 AND id = $2"#,
            )
            .bind(collection.as_str())
            .bind(id)
            .bind(Value::Object(patch.clone()))
            .execute(executor)
            .await?
        }
        WriteOp::Delete { collection, id } => {
            query(r#"DELETE FROM public.documents WHERE collection = $1 AND id = $2"#)
                .bind(collection.as_str())
                .bind(id)
                .execute(executor)
                .await?
        }
    };
    Ok(res.rows_affected())
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn list(&self, collection: Collection) -> StoreResult<Vec<Value>> {
        let rows = query_as::<_, (Value,)>(
            r#"SELECT body FROM public.documents WHERE collection = $1 ORDER BY id"#,
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(body,)| body).collect())
    }

    async fn get(&self, collection: Collection, id: i64) -> StoreResult<Option<Value>> {
        let row = query_as::<_, (Value,)>(
            r#"SELECT body FROM public.documents WHERE collection = $1 AND id = $2"#,
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(body,)| body))
    }

    async fn put(&self, collection: Collection, id: i64, doc: Value) -> StoreResult<()> {
        apply_op(&self.pool, &WriteOp::Put { collection, id, doc }).await?;
        self.notify(&[collection]).await;
        Ok(())
    }

    async fn update_fields(
        &self,
        collection: Collection,
        id: i64,
        patch: Map<String, Value>,
    ) -> StoreResult<bool> {
        let affected = apply_op(&self.pool, &WriteOp::Update { collection, id, patch }).await?;
        if affected > 0 {
            self.notify(&[collection]).await;
        }
        Ok(affected > 0)
    }

    async fn delete(&self, collection: Collection, id: i64) -> StoreResult<bool> {
        let affected = apply_op(&self.pool, &WriteOp::Delete { collection, id }).await?;
        if affected > 0 {
            self.notify(&[collection]).await;
        }
        Ok(affected > 0)
    }

    async fn query(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Value>> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT body FROM public.documents WHERE collection = ",
        );
        qb.push_bind(collection.as_str());
        for cond in &filter.conditions {
            push_condition(&mut qb, cond);
        }
        qb.push(" ORDER BY id");

        let rows = qb
            .build_query_as::<(Value,)>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(body,)| body).collect())
    }

    async fn max_id(&self, collection: Collection) -> StoreResult<i64> {
        let max = query_scalar::<_, Option<i64>>(
            r#"SELECT MAX(id) FROM public.documents WHERE collection = $1"#,
        )
        .bind(collection.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(max.unwrap_or(0))
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let touched = batch.touched();
        let mut tx = self.pool.begin().await?;
        for op in &batch.ops {
            apply_op(&mut *tx, op).await?;
        }
        tx.commit().await?;
        self.notify(&touched).await;
        Ok(())
    }

    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<Snapshot> {
        self.hub.subscribe(collection)
    }
}
