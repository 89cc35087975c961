//! In-process [`EntityStore`] implementation.
//!
//! Backs degraded mode (seeded from `fallback`) and lets tests run the whole
//! controller layer without a database. Filtering and ordering reuse the
//! schema helpers in the parent module so results match the primary store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    compare_documents, document_key, field_text, matches_filters, Document, EntitySchema,
    EntityStore, Filters,
};
use crate::error::{AppError, AppResult};
use crate::models::ActivityEntry;

// ---

#[derive(Default)]
struct Tables {
    // ---
    records: HashMap<&'static str, BTreeMap<String, Document>>,
    activity: Vec<ActivityEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Load documents for one kind, bypassing uniqueness checks.
    pub async fn seed(&self, schema: &'static EntitySchema, docs: Vec<Document>) -> AppResult<()> {
        // ---
        let mut tables = self.tables.write().await;
        let table = tables.records.entry(schema.kind).or_default();
        for doc in docs {
            let id = document_key(schema, &doc)?;
            table.insert(id, doc);
        }
        Ok(())
    }

    pub async fn seed_activity(&self, entries: Vec<ActivityEntry>) {
        self.tables.write().await.activity.extend(entries);
    }
}

/// First unique field whose value is already held by a different record.
fn unique_clash(
    schema: &EntitySchema,
    table: &BTreeMap<String, Document>,
    doc: &Document,
    own_id: Option<&str>,
) -> Option<(String, String)> {
    // ---
    for field in schema.unique {
        let Some(value) = field_text(doc, field) else {
            continue;
        };
        let taken = table.iter().any(|(id, other)| {
            Some(id.as_str()) != own_id && field_text(other, field).as_deref() == Some(&value)
        });
        if taken {
            return Some((field.to_string(), value));
        }
    }
    None
}

fn parsed_timestamp(entry: &ActivityEntry) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&entry.timestamp)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[async_trait]
impl EntityStore for MemoryStore {
    // ---
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn list(
        &self,
        schema: &'static EntitySchema,
        filters: &Filters,
    ) -> AppResult<Vec<Document>> {
        // ---
        let tables = self.tables.read().await;
        let mut docs: Vec<Document> = tables
            .records
            .get(schema.kind)
            .map(|table| {
                table
                    .values()
                    .filter(|doc| matches_filters(schema, filters, doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        docs.sort_by(|a, b| compare_documents(schema, a, b));
        Ok(docs)
    }

    async fn get(&self, schema: &'static EntitySchema, id: &str) -> AppResult<Option<Document>> {
        let tables = self.tables.read().await;
        Ok(tables
            .records
            .get(schema.kind)
            .and_then(|table| table.get(id))
            .cloned())
    }

    async fn insert(&self, schema: &'static EntitySchema, doc: Document) -> AppResult<Document> {
        // ---
        let id = document_key(schema, &doc)?;
        let mut tables = self.tables.write().await;
        let table = tables.records.entry(schema.kind).or_default();

        if let Some((field, value)) = unique_clash(schema, table, &doc, None) {
            return Err(AppError::Conflict {
                kind: schema.kind,
                field,
                value,
            });
        }
        table.insert(id, doc.clone());
        Ok(doc)
    }

    async fn replace(
        &self,
        schema: &'static EntitySchema,
        id: &str,
        doc: Document,
    ) -> AppResult<Option<Document>> {
        // ---
        let mut tables = self.tables.write().await;
        let table = tables.records.entry(schema.kind).or_default();
        if !table.contains_key(id) {
            return Ok(None);
        }
        if let Some((field, value)) = unique_clash(schema, table, &doc, Some(id)) {
            return Err(AppError::Conflict {
                kind: schema.kind,
                field,
                value,
            });
        }
        table.insert(id.to_string(), doc.clone());
        Ok(Some(doc))
    }

    async fn upsert(&self, schema: &'static EntitySchema, doc: Document) -> AppResult<Document> {
        // ---
        let id = document_key(schema, &doc)?;
        let mut tables = self.tables.write().await;
        tables
            .records
            .entry(schema.kind)
            .or_default()
            .insert(id, doc.clone());
        Ok(doc)
    }

    async fn delete(&self, schema: &'static EntitySchema, id: &str) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .records
            .get_mut(schema.kind)
            .map(|table| table.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn append_activity(&self, entry: &ActivityEntry) -> AppResult<()> {
        self.tables.write().await.activity.push(entry.clone());
        Ok(())
    }

    async fn recent_activity(&self, limit: usize) -> AppResult<Vec<ActivityEntry>> {
        // ---
        let tables = self.tables.read().await;
        // newest append first, then order by timestamp; unparsable rows sink
        let mut entries: Vec<ActivityEntry> = tables.activity.iter().rev().cloned().collect();
        entries.sort_by(|a, b| parsed_timestamp(b).cmp(&parsed_timestamp(a)));
        entries.truncate(limit);
        Ok(entries)
    }
}
