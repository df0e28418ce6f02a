use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use creatives_core::{FormatTag, JobId, JobStatus, OwnerId, RequestId};

use super::{map_sqlx_error, missing_or_foreign};
use crate::error::StoreError;
use crate::jobs::{Job, JobState, JobStats, JobStore};

const JOB_COLUMNS: &str = "id, request_id, owner_id, format, payload, status, result_ref, error, \
                           attempts, priority, created_at, updated_at";

/// `creative_jobs` table.
///
/// Every query filters on `owner_id`; the completed/failed outcome columns
/// are guarded by CHECK constraints mirroring `JobState`.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        let attempts = attempts_to_db(job.attempts)?;
        sqlx::query(
            r#"
            INSERT INTO creative_jobs
                (id, request_id, owner_id, format, payload, status, result_ref, error,
                 attempts, priority, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.request_id.map(|r| *r.as_uuid()))
        .bind(job.owner_id.as_uuid())
        .bind(job.format.as_str())
        .bind(&job.payload)
        .bind(job.status().as_str())
        .bind(job.result_ref())
        .bind(job.error())
        .bind(attempts)
        .bind(job.priority)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_job", e))?;
        Ok(())
    }

    async fn get(&self, owner_id: OwnerId, job_id: JobId) -> Result<Option<Job>, StoreError> {
        let query = format!("SELECT {JOB_COLUMNS} FROM creative_jobs WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_job", e))?;

        match row {
            None => Ok(None),
            Some(row) => {
                let job = job_from_row(&row)?;
                if job.owner_id != owner_id {
                    return Err(StoreError::OwnerIsolation);
                }
                Ok(Some(job))
            }
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, status = %job.status(), expected = %expected), err)]
    async fn update(&self, job: &Job, expected: JobStatus) -> Result<(), StoreError> {
        let attempts = attempts_to_db(job.attempts)?;
        let result = sqlx::query(
            r#"
            UPDATE creative_jobs
            SET status = $3, result_ref = $4, error = $5, attempts = $6,
                priority = $7, payload = $8, updated_at = $9
            WHERE id = $1 AND owner_id = $2 AND status = $10
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.owner_id.as_uuid())
        .bind(job.status().as_str())
        .bind(job.result_ref())
        .bind(job.error())
        .bind(attempts)
        .bind(job.priority)
        .bind(&job.payload)
        .bind(job.updated_at)
        .bind(expected.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_job", e))?;

        if result.rows_affected() == 0 {
            return Err(self.explain_missed_update(job, expected).await);
        }
        Ok(())
    }

    async fn list_for_request(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<Vec<Job>, StoreError> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM creative_jobs \
             WHERE owner_id = $1 AND request_id = $2 ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&query)
            .bind(owner_id.as_uuid())
            .bind(request_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_jobs_for_request", e))?;

        rows.iter().map(job_from_row).collect()
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Job>, StoreError> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM creative_jobs WHERE owner_id = $1 ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&query)
            .bind(owner_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_jobs_for_owner", e))?;

        rows.iter().map(job_from_row).collect()
    }

    async fn delete(&self, owner_id: OwnerId, job_id: JobId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM creative_jobs WHERE id = $1 AND owner_id = $2")
            .bind(job_id.as_uuid())
            .bind(owner_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_job", e))?;

        if result.rows_affected() == 0 {
            return Err(missing_or_foreign(&self.pool, "creative_jobs", *job_id.as_uuid()).await);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, request_id = %request_id), err)]
    async fn delete_settled_for_request(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<usize, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("delete_settled_jobs", e))?;

        let deleted = sqlx::query(
            "DELETE FROM creative_jobs \
             WHERE owner_id = $1 AND request_id = $2 AND status IN ('draft', 'failed')",
        )
        .bind(owner_id.as_uuid())
        .bind(request_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_settled_jobs", e))?
        .rows_affected();

        // Rows that changed status since the caller looked keep the request alive.
        let remaining: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM creative_jobs WHERE owner_id = $1 AND request_id = $2",
        )
        .bind(owner_id.as_uuid())
        .bind(request_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_settled_jobs", e))?;

        if remaining > 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("delete_settled_jobs", e))?;
            return Err(StoreError::Conflict(format!(
                "{remaining} job(s) of request {request_id} are not draft or failed"
            )));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("delete_settled_jobs", e))?;
        usize::try_from(deleted).map_err(|_| StoreError::storage("deleted row count out of range"))
    }

    async fn stats(&self, owner_id: OwnerId) -> Result<JobStats, StoreError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM creative_jobs WHERE owner_id = $1 GROUP BY status",
        )
        .bind(owner_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("job_stats", e))?;

        let mut stats = JobStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(|e| decode_error("status", e))?;
            let n: i64 = row.try_get("n").map_err(|e| decode_error("n", e))?;
            let status: JobStatus = status.parse().map_err(|e| StoreError::storage(format!("{e}")))?;
            let n = usize::try_from(n).map_err(|_| StoreError::storage("negative job count"))?;
            stats.add(status, n);
        }
        Ok(stats)
    }
}

impl PostgresJobStore {
    /// Tell a missing row, a foreign row and a status race apart.
    async fn explain_missed_update(&self, job: &Job, expected: JobStatus) -> StoreError {
        let row = sqlx::query("SELECT owner_id, status FROM creative_jobs WHERE id = $1")
            .bind(job.id.as_uuid())
            .fetch_optional(&*self.pool)
            .await;

        let row = match row {
            Ok(Some(row)) => row,
            Ok(None) => return StoreError::NotFound(job.id.to_string()),
            Err(err) => return map_sqlx_error("update_job_check", err),
        };

        let owner_id: Uuid = match row.try_get("owner_id") {
            Ok(v) => v,
            Err(err) => return decode_error("owner_id", err),
        };
        if owner_id != *job.owner_id.as_uuid() {
            return StoreError::OwnerIsolation;
        }

        let status: String = row.try_get("status").unwrap_or_default();
        StoreError::Conflict(format!("job {} is {status}, expected {expected}", job.id))
    }
}

fn attempts_to_db(attempts: u32) -> Result<i32, StoreError> {
    i32::try_from(attempts).map_err(|_| StoreError::storage(format!("attempts out of range: {attempts}")))
}

fn decode_error(column: &str, err: sqlx::Error) -> StoreError {
    StoreError::storage(format!("failed to decode creative_jobs.{column}: {err}"))
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let id: Uuid = row.try_get("id").map_err(|e| decode_error("id", e))?;
    let request_id: Option<Uuid> = row.try_get("request_id").map_err(|e| decode_error("request_id", e))?;
    let owner_id: Uuid = row.try_get("owner_id").map_err(|e| decode_error("owner_id", e))?;
    let format: String = row.try_get("format").map_err(|e| decode_error("format", e))?;
    let payload: serde_json::Value = row.try_get("payload").map_err(|e| decode_error("payload", e))?;
    let status: String = row.try_get("status").map_err(|e| decode_error("status", e))?;
    let result_ref: Option<String> = row.try_get("result_ref").map_err(|e| decode_error("result_ref", e))?;
    let error: Option<String> = row.try_get("error").map_err(|e| decode_error("error", e))?;
    let attempts: i32 = row.try_get("attempts").map_err(|e| decode_error("attempts", e))?;
    let priority: i16 = row.try_get("priority").map_err(|e| decode_error("priority", e))?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(|e| decode_error("created_at", e))?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(|e| decode_error("updated_at", e))?;

    let corrupt = |e: creatives_core::DomainError| StoreError::storage(format!("corrupt job row {id}: {e}"));
    let status: JobStatus = status.parse().map_err(corrupt)?;
    let format: FormatTag = format.parse().map_err(corrupt)?;
    let state = JobState::from_parts(status, result_ref, error).map_err(corrupt)?;
    let attempts = u32::try_from(attempts)
        .map_err(|_| StoreError::storage(format!("corrupt job row {id}: negative attempts")))?;

    Ok(Job {
        id: JobId::from_uuid(id),
        request_id: request_id.map(RequestId::from_uuid),
        owner_id: OwnerId::from_uuid(owner_id),
        format,
        payload,
        state,
        attempts,
        priority,
        created_at,
        updated_at,
    })
}
