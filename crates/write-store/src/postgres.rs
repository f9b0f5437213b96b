use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EventId, EventKind};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};

use crate::{
    AggregateId, AggregateKind, EventEnvelope, Page, PageRequest, Result, WriteStoreError,
    outbox::{OutboxEntry, OutboxStore},
    record::{Record, UniqueKey},
    store::{WriteStore, validate_event_for},
};

const UNIQUE_KEYS_CONSTRAINT: &str = "unique_keys_pkey";

/// PostgreSQL-backed write store.
///
/// Each aggregate lives in the table named after its collection. The
/// `unique_keys` primary key is the authoritative uniqueness check.
#[derive(Clone)]
pub struct PostgresWriteStore {
    pool: PgPool,
}

impl PostgresWriteStore {
    /// Creates a new PostgreSQL write store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn claim_keys(
        conn: &mut PgConnection,
        kind: AggregateKind,
        id: AggregateId,
        keys: Vec<UniqueKey>,
    ) -> Result<()> {
        for key in keys {
            sqlx::query(
                r#"
                INSERT INTO unique_keys (aggregate_type, key_name, key_value, record_id)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(kind.as_str())
            .bind(key.name)
            .bind(&key.value)
            .bind(id.as_uuid())
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some(UNIQUE_KEYS_CONSTRAINT)
                {
                    return WriteStoreError::DuplicateKey {
                        aggregate: kind,
                        key: key.name.to_string(),
                        value: key.value.clone(),
                    };
                }
                WriteStoreError::Database(e)
            })?;
        }
        Ok(())
    }

    async fn release_keys(
        conn: &mut PgConnection,
        kind: AggregateKind,
        id: AggregateId,
    ) -> Result<()> {
        sqlx::query("DELETE FROM unique_keys WHERE aggregate_type = $1 AND record_id = $2")
            .bind(kind.as_str())
            .bind(id.as_uuid())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn enqueue(conn: &mut PgConnection, event: &EventEnvelope) -> Result<()> {
        let envelope = serde_json::to_value(event)?;
        sqlx::query(
            r#"
            INSERT INTO outbox (event_id, aggregate_type, aggregate_id, routing_key, envelope, committed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.event_id.as_uuid())
        .bind(event.aggregate_type.as_str())
        .bind(event.aggregate_id.as_uuid())
        .bind(event.routing_key())
        .bind(envelope)
        .bind(event.timestamp)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    fn row_to_outbox(row: PgRow) -> Result<OutboxEntry> {
        let envelope: serde_json::Value = row.try_get("envelope")?;
        let attempts: i32 = row.try_get("attempts")?;
        Ok(OutboxEntry {
            envelope: serde_json::from_value(envelope)?,
            attempts: u32::try_from(attempts).unwrap_or(0),
            last_error: row.try_get("last_error")?,
            published_at: row.try_get::<Option<DateTime<Utc>>, _>("published_at")?,
        })
    }
}

#[async_trait]
impl<R: Record> WriteStore<R> for PostgresWriteStore {
    async fn insert(&self, record: &R, event: &EventEnvelope) -> Result<()> {
        let id = record.id();
        validate_event_for::<R>(id, EventKind::Created, event)?;
        let body = serde_json::to_value(record)?;
        let table = R::KIND.collection();

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("INSERT INTO {table} (id, body) VALUES ($1, $2)"))
            .bind(id.as_uuid())
            .bind(&body)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some(format!("{table}_pkey").as_str())
                {
                    return WriteStoreError::DuplicateKey {
                        aggregate: R::KIND,
                        key: "id".to_string(),
                        value: id.to_string(),
                    };
                }
                WriteStoreError::Database(e)
            })?;

        Self::claim_keys(&mut *tx, R::KIND, id, record.unique_keys()).await?;
        Self::enqueue(&mut *tx, event).await?;

        tx.commit().await?;
        tracing::debug!(aggregate = %R::KIND, %id, "record inserted");
        Ok(())
    }

    async fn update(&self, record: &R, event: &EventEnvelope) -> Result<()> {
        let id = record.id();
        validate_event_for::<R>(id, EventKind::Updated, event)?;
        let body = serde_json::to_value(record)?;
        let table = R::KIND.collection();

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(&format!(
            "UPDATE {table} SET body = $2, updated_at = NOW() WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .bind(&body)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(WriteStoreError::NotFound {
                aggregate: R::KIND,
                id,
            });
        }

        Self::release_keys(&mut *tx, R::KIND, id).await?;
        Self::claim_keys(&mut *tx, R::KIND, id, record.unique_keys()).await?;
        Self::enqueue(&mut *tx, event).await?;

        tx.commit().await?;
        tracing::debug!(aggregate = %R::KIND, %id, "record updated");
        Ok(())
    }

    async fn delete(&self, id: AggregateId, event: &EventEnvelope) -> Result<()> {
        validate_event_for::<R>(id, EventKind::Deleted, event)?;
        let table = R::KIND.collection();

        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(WriteStoreError::NotFound {
                aggregate: R::KIND,
                id,
            });
        }

        Self::release_keys(&mut *tx, R::KIND, id).await?;
        Self::enqueue(&mut *tx, event).await?;

        tx.commit().await?;
        tracing::debug!(aggregate = %R::KIND, %id, "record deleted");
        Ok(())
    }

    async fn get(&self, id: AggregateId) -> Result<Option<R>> {
        let table = R::KIND.collection();
        let body: Option<serde_json::Value> =
            sqlx::query_scalar(&format!("SELECT body FROM {table} WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match body {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }

    async fn find_by_key(&self, key: &UniqueKey) -> Result<Option<R>> {
        let table = R::KIND.collection();
        let body: Option<serde_json::Value> = sqlx::query_scalar(&format!(
            r#"
            SELECT t.body
            FROM {table} t
            JOIN unique_keys k ON k.record_id = t.id
            WHERE k.aggregate_type = $1 AND k.key_name = $2 AND k.key_value = $3
            "#
        ))
        .bind(R::KIND.as_str())
        .bind(key.name)
        .bind(&key.value)
        .fetch_optional(&self.pool)
        .await?;

        match body {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, page: PageRequest) -> Result<Page<R>> {
        let page = page.normalized();
        let table = R::KIND.collection();

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;

        let bodies: Vec<serde_json::Value> = sqlx::query_scalar(&format!(
            "SELECT body FROM {table} ORDER BY seq ASC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = bodies
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<R>, _>>()?;

        Ok(Page::new(items, page, total.max(0) as u64))
    }
}

#[async_trait]
impl OutboxStore for PostgresWriteStore {
    async fn pending(
        &self,
        limit: usize,
        committed_before: DateTime<Utc>,
    ) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT envelope, attempts, last_error, published_at
            FROM outbox
            WHERE published_at IS NULL AND committed_at <= $1
            ORDER BY seq ASC
            LIMIT $2
            "#,
        )
        .bind(committed_before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_outbox).collect()
    }

    async fn has_pending_before(&self, event: &EventEnvelope) -> Result<bool> {
        let waiting: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM outbox earlier
                WHERE earlier.aggregate_type = $1
                  AND earlier.aggregate_id = $2
                  AND earlier.published_at IS NULL
                  AND earlier.seq < COALESCE(
                      (SELECT seq FROM outbox WHERE event_id = $3),
                      9223372036854775807
                  )
            )
            "#,
        )
        .bind(event.aggregate_type.as_str())
        .bind(event.aggregate_id.as_uuid())
        .bind(event.event_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(waiting)
    }

    async fn mark_published(&self, event_id: EventId) -> Result<()> {
        sqlx::query(
            "UPDATE outbox SET published_at = NOW() WHERE event_id = $1 AND published_at IS NULL",
        )
        .bind(event_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_failure(&self, event_id: EventId, error: &str) -> Result<()> {
        sqlx::query("UPDATE outbox SET attempts = attempts + 1, last_error = $2 WHERE event_id = $1")
            .bind(event_id.as_uuid())
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
