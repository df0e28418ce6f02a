use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use creatives_core::{OwnerId, RequestId, RequestStatus, RequestedFormats};

use super::{map_sqlx_error, missing_or_foreign};
use crate::error::StoreError;
use crate::requests::{Request, RequestStore};

const REQUEST_COLUMNS: &str = "id, owner_id, requested_formats, payload, status, created_at, updated_at";

/// `creative_requests` table.
#[derive(Debug, Clone)]
pub struct PostgresRequestStore {
    pool: Arc<PgPool>,
}

impl PostgresRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl RequestStore for PostgresRequestStore {
    #[instrument(skip(self, request), fields(request_id = %request.id), err)]
    async fn insert(&self, request: Request) -> Result<(), StoreError> {
        let formats: Vec<String> = request.requested_formats.iter().map(|f| f.to_string()).collect();
        sqlx::query(
            r#"
            INSERT INTO creative_requests
                (id, owner_id, requested_formats, payload, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.owner_id.as_uuid())
        .bind(&formats)
        .bind(&request.payload)
        .bind(request.status.as_str())
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_request", e))?;
        Ok(())
    }

    async fn get(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
    ) -> Result<Option<Request>, StoreError> {
        let query = format!("SELECT {REQUEST_COLUMNS} FROM creative_requests WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(request_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_request", e))?;

        match row {
            None => Ok(None),
            Some(row) => {
                let request = request_from_row(&row)?;
                if request.owner_id != owner_id {
                    return Err(StoreError::OwnerIsolation);
                }
                Ok(Some(request))
            }
        }
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, request_id = %request_id, status = %status), err)]
    async fn update_status(
        &self,
        owner_id: OwnerId,
        request_id: RequestId,
        status: RequestStatus,
    ) -> Result<Request, StoreError> {
        let query = format!(
            "UPDATE creative_requests SET status = $3, updated_at = $4 \
             WHERE id = $1 AND owner_id = $2 RETURNING {REQUEST_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(request_id.as_uuid())
            .bind(owner_id.as_uuid())
            .bind(status.as_str())
            .bind(Utc::now())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_request_status", e))?;

        match row {
            Some(row) => request_from_row(&row),
            None => Err(missing_or_foreign(&self.pool, "creative_requests", *request_id.as_uuid()).await),
        }
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Request>, StoreError> {
        let query = format!(
            "SELECT {REQUEST_COLUMNS} FROM creative_requests \
             WHERE owner_id = $1 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&query)
            .bind(owner_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_requests", e))?;

        rows.iter().map(request_from_row).collect()
    }

    async fn delete(&self, owner_id: OwnerId, request_id: RequestId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM creative_requests WHERE id = $1 AND owner_id = $2")
            .bind(request_id.as_uuid())
            .bind(owner_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_request", e))?;

        if result.rows_affected() == 0 {
            return Err(missing_or_foreign(&self.pool, "creative_requests", *request_id.as_uuid()).await);
        }
        Ok(())
    }
}

fn request_from_row(row: &PgRow) -> Result<Request, StoreError> {
    let decode = |column: &str, err: sqlx::Error| {
        StoreError::storage(format!("failed to decode creative_requests.{column}: {err}"))
    };

    let id: Uuid = row.try_get("id").map_err(|e| decode("id", e))?;
    let owner_id: Uuid = row.try_get("owner_id").map_err(|e| decode("owner_id", e))?;
    let formats: Vec<String> = row
        .try_get("requested_formats")
        .map_err(|e| decode("requested_formats", e))?;
    let payload: serde_json::Value = row.try_get("payload").map_err(|e| decode("payload", e))?;
    let status: String = row.try_get("status").map_err(|e| decode("status", e))?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(|e| decode("created_at", e))?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(|e| decode("updated_at", e))?;

    let corrupt = |e: creatives_core::DomainError| {
        StoreError::storage(format!("corrupt request row {id}: {e}"))
    };

    Ok(Request {
        id: RequestId::from_uuid(id),
        owner_id: OwnerId::from_uuid(owner_id),
        requested_formats: RequestedFormats::parse(&formats).map_err(corrupt)?,
        payload,
        status: status.parse().map_err(corrupt)?,
        created_at,
        updated_at,
    })
}
