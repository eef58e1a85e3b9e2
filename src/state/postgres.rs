use super::{check_path, job_key, JobStore};
use crate::error::CrosswalkError;
use crate::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::sync::OnceCell;
use tracing::info;
use uuid::Uuid;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS job_objects (
    job_id UUID NOT NULL,
    path TEXT NOT NULL,
    body BYTEA NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (job_id, path)
)"#;

/// Postgres-backed job store; the table is created on first use.
pub struct PostgresJobStore {
    pool: PgPool,
    schema: OnceCell<()>,
}

impl PostgresJobStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema: OnceCell::new(),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema
            .get_or_try_init(|| async {
                sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
                info!("job_objects table ready");
                Ok::<(), CrosswalkError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobStore for PostgresJobStore {
    async fn read(&self, job_id: Uuid, path: &str) -> Result<Vec<u8>> {
        check_path(path)?;
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT body FROM job_objects WHERE job_id = $1 AND path = $2")
            .bind(job_id)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get("body")?),
            None => Err(CrosswalkError::NotFound {
                job_id,
                path: path.to_string(),
            }),
        }
    }

    async fn write(&self, job_id: Uuid, path: &str, bytes: Vec<u8>) -> Result<String> {
        check_path(path)?;
        self.ensure_schema().await?;

        sqlx::query(
            r#"INSERT INTO job_objects (job_id, path, body)
               VALUES ($1, $2, $3)
               ON CONFLICT (job_id, path)
               DO UPDATE SET body = EXCLUDED.body, updated_at = now()"#,
        )
        .bind(job_id)
        .bind(path)
        .bind(bytes)
        .execute(&self.pool)
        .await?;

        Ok(job_key(job_id, path))
    }

    async fn list(&self, job_id: Uuid, prefix: &str) -> Result<Vec<String>> {
        self.ensure_schema().await?;

        let rows = sqlx::query("SELECT path FROM job_objects WHERE job_id = $1 ORDER BY path")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let path: String = row.try_get("path")?;
            if path.starts_with(prefix) {
                keys.push(job_key(job_id, &path));
            }
        }
        Ok(keys)
    }
}
