use sqlx::PgPool;
use tracing::info;

use crate::error::StoreError;

use super::map_sqlx_error;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS creative_requests (
        id                UUID PRIMARY KEY,
        owner_id          UUID NOT NULL,
        requested_formats TEXT[] NOT NULL CHECK (cardinality(requested_formats) > 0),
        payload           JSONB NOT NULL,
        status            TEXT NOT NULL
            CHECK (status IN ('pending', 'processing', 'completed', 'partial', 'failed')),
        created_at        TIMESTAMPTZ NOT NULL,
        updated_at        TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS creative_requests_owner_created
        ON creative_requests (owner_id, created_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS creative_jobs (
        id          UUID PRIMARY KEY,
        request_id  UUID NULL REFERENCES creative_requests (id),
        owner_id    UUID NOT NULL,
        format      TEXT NOT NULL,
        payload     JSONB NOT NULL,
        status      TEXT NOT NULL
            CHECK (status IN ('draft', 'queued', 'processing', 'completed', 'failed')),
        result_ref  TEXT NULL,
        error       TEXT NULL,
        attempts    INTEGER NOT NULL DEFAULT 0 CHECK (attempts >= 0),
        priority    SMALLINT NOT NULL DEFAULT 0,
        created_at  TIMESTAMPTZ NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL,
        CHECK ((status = 'completed') = (result_ref IS NOT NULL)),
        CHECK ((status = 'failed') = (error IS NOT NULL))
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS creative_jobs_request
        ON creative_jobs (owner_id, request_id)
    "#,
];

/// Create tables and indexes if they are missing. Safe to run on every start.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in STATEMENTS {
        sqlx::query(*statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    }
    info!("creative tables ready");
    Ok(())
}
