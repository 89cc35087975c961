//! Database schema management for `fleetcore`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied whenever a primary store connection is (re)established.

use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::ALL_SCHEMAS;

// ---

/// Name of the unique index guarding `field` for one record kind.
pub fn unique_index_name(kind: &str, field: &str) -> String {
    format!("uq_{}_{}", kind.to_lowercase(), field.to_lowercase())
}

/// Create or update the database schema (idempotent).
///
/// All record kinds share the `fleet_records` document table, keyed by
/// `(kind, id)`. Unique fields other than the key get a partial expression
/// index per kind. The audit trail lives in `activity_log`.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> AppResult<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Every record kind, stored as a JSONB document
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fleet_records (
            kind        TEXT        NOT NULL,
            id          TEXT        NOT NULL,
            doc         JSONB       NOT NULL,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (kind, id)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Append-only audit trail
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activity_log (
            id          TEXT        PRIMARY KEY,
            kind        TEXT        NOT NULL,
            message     TEXT        NOT NULL,
            actor_id    TEXT,
            metadata    JSONB       NOT NULL DEFAULT 'null'::jsonb,
            logged_at   TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_fleet_records_doc
            ON fleet_records USING GIN (doc);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_activity_log_logged_at
            ON activity_log (logged_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    for schema in ALL_SCHEMAS {
        for field in schema.unique.iter().filter(|f| **f != schema.key) {
            // identifiers come from static schema data, never from callers
            let ddl = format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON fleet_records ((doc->>'{}')) WHERE kind = '{}'",
                unique_index_name(schema.kind, field),
                field,
                schema.kind
            );
            sqlx::query(&ddl).execute(&mut *tx).await?;
        }
    }

    tx.commit().await?;
    Ok(())
}
