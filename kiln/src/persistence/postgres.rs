use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::debug;

use crate::config::PersistenceConfig;
use crate::device::DeviceId;
use crate::job::{JobId, JobRecord, JobStatus, JobUpdate};
use crate::store::{JobStore, StoreError};

/// PostgreSQL-backed implementation of the job store.
///
/// Mutations fetch the row `FOR UPDATE` inside a transaction and apply
/// [`JobUpdate::apply`] in process before writing the full row back, so
/// the field semantics are byte-for-byte the ones every other backend
/// uses.
#[derive(Clone, Debug)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    /// Create a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool from persistence settings.
    pub async fn connect(config: &PersistenceConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.connection_string)
            .await
            .map_err(backend)?;
        Ok(Self::new(pool))
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `kiln_jobs` table and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kiln_jobs (
                id UUID PRIMARY KEY,
                character_name TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                progress DOUBLE PRECISION NOT NULL DEFAULT 0,
                device_id INTEGER,
                queue_position INTEGER,
                error_message TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS kiln_jobs_status_created_idx \
             ON kiln_jobs (status, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        debug!("kiln_jobs schema ensured");
        Ok(())
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn status_from_str(value: &str) -> Result<JobStatus, StoreError> {
    match value {
        "pending" => Ok(JobStatus::Pending),
        "queued" => Ok(JobStatus::Queued),
        "running" => Ok(JobStatus::Running),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        other => Err(StoreError::Backend(format!("invalid status value: {other}"))),
    }
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<JobRecord, StoreError> {
    let status: String = row.try_get("status").map_err(backend)?;
    let device_id: Option<i32> = row.try_get("device_id").map_err(backend)?;
    let device = device_id
        .map(|id| {
            u16::try_from(id)
                .map(DeviceId)
                .map_err(|_| StoreError::Backend(format!("invalid device id: {id}")))
        })
        .transpose()?;
    let queue_position: Option<i32> = row.try_get("queue_position").map_err(backend)?;

    Ok(JobRecord {
        id: JobId(row.try_get("id").map_err(backend)?),
        character_name: row.try_get("character_name").map_err(backend)?,
        status: status_from_str(&status)?,
        progress: row.try_get("progress").map_err(backend)?,
        device,
        queue_position: queue_position.map(|p| p as u32),
        error_message: row.try_get("error_message").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
        completed_at: row.try_get("completed_at").map_err(backend)?,
    })
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn create(&self, character_name: &str) -> Result<JobRecord, StoreError> {
        let record = JobRecord::new(character_name);

        let result = sqlx::query(
            r#"
            INSERT INTO kiln_jobs (
                id, character_name, status, progress, device_id,
                queue_position, error_message, created_at, updated_at,
                completed_at
            )
            VALUES ($1, $2, $3, $4, NULL, NULL, NULL, $5, $6, NULL)
            "#,
        )
        .bind(record.id.0)
        .bind(&record.character_name)
        .bind(record.status.as_str())
        .bind(record.progress)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(record),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::NameTaken(character_name.to_string()))
            }
            Err(err) => Err(backend(err)),
        }
    }

    async fn get(&self, job_id: JobId) -> Result<JobRecord, StoreError> {
        let row = sqlx::query("SELECT * FROM kiln_jobs WHERE id = $1")
            .bind(job_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound(job_id))?;
        row_to_record(&row)
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<JobRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM kiln_jobs WHERE character_name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn update(&self, job_id: JobId, update: JobUpdate) -> Result<JobRecord, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row = sqlx::query("SELECT * FROM kiln_jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound(job_id))?;
        let mut record = row_to_record(&row)?;

        update.apply(&mut record, Utc::now());

        sqlx::query(
            r#"
            UPDATE kiln_jobs
            SET status = $2,
                progress = $3,
                device_id = $4,
                queue_position = $5,
                error_message = $6,
                updated_at = $7,
                completed_at = $8
            WHERE id = $1
            "#,
        )
        .bind(record.id.0)
        .bind(record.status.as_str())
        .bind(record.progress)
        .bind(record.device.map(|d| i32::from(d.0)))
        .bind(record.queue_position.map(|p| p as i32))
        .bind(record.error_message.as_deref())
        .bind(record.updated_at)
        .bind(record.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(record)
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<JobRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM kiln_jobs WHERE status = $1 ORDER BY created_at ASC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_record).collect()
    }
}
