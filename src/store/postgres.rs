//! PostgreSQL-backed [`EntityStore`].
//!
//! Records of every kind live in `fleet_records` as JSONB documents, so route
//! stops and other nested fields round-trip without per-kind columns. Filters,
//! search and default ordering are compiled from the kind's schema into SQL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use super::{
    document_key, field_text, split_filters, Document, EntitySchema, EntityStore, Filters,
    StoreConnector,
};
use crate::error::{AppError, AppResult};
use crate::models::ActivityEntry;
use crate::schema;

// ---

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    // ---
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reject documents whose unique fields collide with another record.
    async fn check_unique(
        &self,
        schema: &'static EntitySchema,
        doc: &Document,
        own_id: Option<&str>,
    ) -> AppResult<()> {
        // ---
        for field in schema.unique {
            let Some(value) = field_text(doc, field) else {
                continue;
            };
            let taken: Option<String> = sqlx::query_scalar(
                "SELECT id FROM fleet_records WHERE kind = $1 AND doc->>$2 = $3 AND id IS DISTINCT FROM $4 LIMIT 1",
            )
            .bind(schema.kind)
            .bind(*field)
            .bind(&value)
            .bind(own_id)
            .fetch_optional(&self.pool)
            .await?;

            if taken.is_some() {
                return Err(AppError::Conflict {
                    kind: schema.kind,
                    field: field.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Escape LIKE wildcards so search terms match literally.
fn like_pattern(term: &str) -> String {
    // ---
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Compile a filtered, ordered listing for one kind.
///
/// Field names are taken from the static schema (never from caller keys), so
/// they can be bound as parameters to `->>` without quoting concerns.
pub fn build_list_query<'a>(
    schema: &'static EntitySchema,
    filters: &'a Filters,
) -> QueryBuilder<'a, Postgres> {
    // ---
    let (exact, search) = split_filters(schema, filters);

    let mut qb = QueryBuilder::<Postgres>::new("SELECT doc FROM fleet_records WHERE kind = ");
    qb.push_bind(schema.kind);

    for (field, value) in exact {
        qb.push(" AND doc->>");
        qb.push_bind(field);
        qb.push(" = ");
        qb.push_bind(value);
    }

    if let Some(term) = search {
        if !schema.search.is_empty() {
            qb.push(" AND (");
            for (i, field) in schema.search.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push("doc->>");
                qb.push_bind(*field);
                qb.push(" ILIKE ");
                qb.push_bind(like_pattern(term));
            }
            qb.push(")");
        }
    }

    qb.push(" ORDER BY ");
    for key in schema.sort {
        let direction = if key.descending {
            "DESC NULLS LAST"
        } else {
            "ASC NULLS FIRST"
        };
        qb.push("lower(doc->>");
        qb.push_bind(key.field);
        qb.push(format!(") {direction}, "));
    }
    qb.push("id ASC");
    qb
}

/// `LIMIT` bind value; sizes beyond `i64::MAX` clamp instead of wrapping negative.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn doc_from_row(row: &sqlx::postgres::PgRow) -> AppResult<Document> {
    let Json(doc): Json<Document> = row.try_get("doc")?;
    Ok(doc)
}

fn map_write_error(schema: &'static EntitySchema, id: &str, err: sqlx::Error) -> AppError {
    // ---
    match err.as_database_error().and_then(|e| e.code()) {
        Some(code) if code == "23505" => AppError::Conflict {
            kind: schema.kind,
            field: schema.key.to_string(),
            value: id.to_string(),
        },
        _ => AppError::from(err),
    }
}

#[async_trait]
impl EntityStore for PgStore {
    // ---
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list(
        &self,
        schema: &'static EntitySchema,
        filters: &Filters,
    ) -> AppResult<Vec<Document>> {
        // ---
        let mut qb = build_list_query(schema, filters);
        debug!("{} list: {}", schema.kind, qb.sql());

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(doc_from_row).collect()
    }

    async fn get(&self, schema: &'static EntitySchema, id: &str) -> AppResult<Option<Document>> {
        // ---
        let row = sqlx::query("SELECT doc FROM fleet_records WHERE kind = $1 AND id = $2")
            .bind(schema.kind)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(doc_from_row).transpose()
    }

    async fn insert(&self, schema: &'static EntitySchema, doc: Document) -> AppResult<Document> {
        // ---
        let id = document_key(schema, &doc)?;
        self.check_unique(schema, &doc, None).await?;

        sqlx::query("INSERT INTO fleet_records (kind, id, doc) VALUES ($1, $2, $3)")
            .bind(schema.kind)
            .bind(&id)
            .bind(Json(&doc))
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(schema, &id, e))?;
        Ok(doc)
    }

    async fn replace(
        &self,
        schema: &'static EntitySchema,
        id: &str,
        doc: Document,
    ) -> AppResult<Option<Document>> {
        // ---
        self.check_unique(schema, &doc, Some(id)).await?;

        let result = sqlx::query(
            "UPDATE fleet_records SET doc = $3, updated_at = now() WHERE kind = $1 AND id = $2",
        )
        .bind(schema.kind)
        .bind(id)
        .bind(Json(&doc))
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(schema, id, e))?;

        Ok((result.rows_affected() > 0).then_some(doc))
    }

    async fn upsert(&self, schema: &'static EntitySchema, doc: Document) -> AppResult<Document> {
        // ---
        let id = document_key(schema, &doc)?;
        sqlx::query(
            r#"
            INSERT INTO fleet_records (kind, id, doc) VALUES ($1, $2, $3)
            ON CONFLICT (kind, id) DO UPDATE SET
                doc = EXCLUDED.doc,
                updated_at = now()
            "#,
        )
        .bind(schema.kind)
        .bind(&id)
        .bind(Json(&doc))
        .execute(&self.pool)
        .await?;
        Ok(doc)
    }

    async fn delete(&self, schema: &'static EntitySchema, id: &str) -> AppResult<bool> {
        // ---
        let result = sqlx::query("DELETE FROM fleet_records WHERE kind = $1 AND id = $2")
            .bind(schema.kind)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_activity(&self, entry: &ActivityEntry) -> AppResult<()> {
        // ---
        let logged_at = DateTime::parse_from_rfc3339(&entry.timestamp)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        sqlx::query(
            r#"
            INSERT INTO activity_log (id, kind, message, actor_id, metadata, logged_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.kind)
        .bind(&entry.message)
        .bind(&entry.actor_id)
        .bind(Json(&entry.metadata))
        .bind(logged_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_activity(&self, limit: usize) -> AppResult<Vec<ActivityEntry>> {
        // ---
        let rows = sqlx::query(
            r#"
            SELECT id, kind, message, actor_id, metadata, logged_at
            FROM activity_log
            ORDER BY logged_at DESC
            LIMIT $1
            "#,
        )
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> AppResult<ActivityEntry> {
                let Json(metadata): Json<Value> = row.try_get("metadata")?;
                let logged_at: DateTime<Utc> = row.try_get("logged_at")?;
                Ok(ActivityEntry {
                    id: row.try_get("id")?,
                    kind: row.try_get("kind")?,
                    message: row.try_get("message")?,
                    actor_id: row.try_get("actor_id")?,
                    metadata,
                    timestamp: logged_at.to_rfc3339(),
                })
            })
            .collect()
    }
}

/// Builds a [`PgStore`] from a connection URL, creating the schema on success.
pub struct PgConnector {
    // ---
    pub db_url: String,
    pub pool_max: u32,
    pub connect_timeout: Duration,
}

#[async_trait]
impl StoreConnector for PgConnector {
    // ---
    async fn connect(&self) -> AppResult<Arc<dyn EntityStore>> {
        // ---
        let pool = PgPoolOptions::new()
            .max_connections(self.pool_max)
            .acquire_timeout(self.connect_timeout)
            .connect(&self.db_url)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        schema::create_schema(&pool)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        info!("Connected to PostgreSQL, schema ready");
        Ok(Arc::new(PgStore::new(pool)))
    }
}
