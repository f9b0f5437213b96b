use async_trait::async_trait;
use common::{Page, PageRequest};
use serde_json::Value;
use sqlx::PgPool;

use crate::{Result, document::DocumentStore};

/// PostgreSQL-backed document store over the `read_documents` JSONB table.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Creates a new PostgreSQL document store.
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
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let body: Option<Value> =
            sqlx::query_scalar("SELECT body FROM read_documents WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(body)
    }

    async fn upsert(&self, collection: &str, id: &str, document: Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO read_documents (collection, id, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO UPDATE SET
                body = EXCLUDED.body,
                updated_at = NOW()
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(document)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM read_documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, collection: &str, page: PageRequest) -> Result<Page<Value>> {
        let page = page.normalized();

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM read_documents WHERE collection = $1")
                .bind(collection)
                .fetch_one(&self.pool)
                .await?;

        let items: Vec<Value> = sqlx::query_scalar(
            r#"
            SELECT body FROM read_documents
            WHERE collection = $1
            ORDER BY seq ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(collection)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(items, page, total.max(0) as u64))
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        sqlx::query("DELETE FROM read_documents WHERE collection = $1")
            .bind(collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
