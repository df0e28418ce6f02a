//! Postgres-backed job and request stores.
//!
//! ## Error Mapping
//!
//! | SQLx error | Postgres code | StoreError |
//! |---|---|---|
//! | Database (unique violation) | `23505` | `AlreadyExists` |
//! | Database (foreign key violation) | `23503` | `Storage` |
//! | Database (check violation) | `23514` | `Storage` |
//! | anything else | | `Storage` |
//!
//! ## Owner Isolation
//!
//! Writes carry `owner_id` in the WHERE clause. When a write touches no row
//! the store looks the id up once more to tell `NotFound` from
//! `OwnerIsolation`.

mod job_store;
mod request_store;
mod schema;

pub use job_store::PostgresJobStore;
pub use request_store::PostgresRequestStore;
pub use schema::ensure_schema;

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::AlreadyExists(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Resolve a write that matched no row for `owner_id`.
pub(crate) async fn missing_or_foreign(
    pool: &PgPool,
    table: &'static str,
    id: Uuid,
) -> StoreError {
    let query = format!("SELECT owner_id FROM {table} WHERE id = $1");
    match sqlx::query_scalar::<_, Uuid>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
    {
        Ok(Some(_)) => StoreError::OwnerIsolation,
        Ok(None) => StoreError::NotFound(id.to_string()),
        Err(err) => map_sqlx_error("owner_check", err),
    }
}
