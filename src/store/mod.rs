//! Storage gateway for fleet records.
//!
//! A single [`EntityStore`] interface serves every record kind. Backends work
//! on JSON documents and are told how to treat each kind by a static
//! [`EntitySchema`]: which field is the key, which fields must be unique,
//! which fields callers may filter on, which fields free-text search covers,
//! and the default ordering.
//!
//! Submodules:
//! - `postgres` – primary store, one JSONB document table shared by all kinds
//! - `memory`   – in-process store used for degraded mode and tests
//! - `fallback` – fixed sample dataset loaded into the memory store
//! - `handle`   – Healthy/Degraded state machine wrapping both

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};
use crate::models::ActivityEntry;

pub mod fallback;
pub mod handle;
pub mod memory;
pub mod postgres;

pub use handle::{ReprobePolicy, StoreConnector, StoreHandle, StoreMode};
pub use memory::MemoryStore;
pub use postgres::{PgConnector, PgStore};

// ---

/// A stored record in its wire form (camelCase field names).
pub type Document = Map<String, Value>;

/// Entity filters after pagination keys have been stripped.
pub type Filters = BTreeMap<String, String>;

/// Filter key matched case-insensitively against a schema's search fields.
pub const SEARCH_KEY: &str = "search";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: &'static str,
    pub descending: bool,
}

impl SortKey {
    pub const fn asc(field: &'static str) -> Self {
        SortKey {
            field,
            descending: false,
        }
    }

    pub const fn desc(field: &'static str) -> Self {
        SortKey {
            field,
            descending: true,
        }
    }
}

/// Per-kind storage configuration.
#[derive(Debug)]
pub struct EntitySchema {
    // ---
    pub kind: &'static str,
    /// Field holding the record identifier.
    pub key: &'static str,
    /// Prefix for generated identifiers.
    pub id_prefix: &'static str,
    pub unique: &'static [&'static str],
    /// Fields accepted as exact-match filters.
    pub filters: &'static [&'static str],
    pub search: &'static [&'static str],
    pub sort: &'static [SortKey],
}

/// A record kind managed by the generic store.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    // ---
    const SCHEMA: &'static EntitySchema;

    fn key(&self) -> &str;

    /// Fill derived fields before validation (e.g. stamp a payment date).
    fn normalize(&mut self, _today: NaiveDate) {}

    /// Field-level invariants checked before anything is written.
    fn validate(&self) -> AppResult<()> {
        Ok(())
    }

    /// Route this record points at, if any. Must name an existing route.
    fn route_ref(&self) -> Option<&str> {
        None
    }
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    // ---
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    /// Cheap round trip proving the backend answers.
    async fn ping(&self) -> AppResult<()>;

    async fn list(&self, schema: &'static EntitySchema, filters: &Filters)
        -> AppResult<Vec<Document>>;

    async fn get(&self, schema: &'static EntitySchema, id: &str) -> AppResult<Option<Document>>;

    /// Fails with `Conflict` when any unique field value is already taken.
    async fn insert(&self, schema: &'static EntitySchema, doc: Document) -> AppResult<Document>;

    /// Replace the stored document; `None` when `id` does not exist.
    async fn replace(
        &self,
        schema: &'static EntitySchema,
        id: &str,
        doc: Document,
    ) -> AppResult<Option<Document>>;

    /// Insert or overwrite by key.
    async fn upsert(&self, schema: &'static EntitySchema, doc: Document) -> AppResult<Document>;

    async fn delete(&self, schema: &'static EntitySchema, id: &str) -> AppResult<bool>;

    async fn append_activity(&self, entry: &ActivityEntry) -> AppResult<()>;

    /// Most recent entries first.
    async fn recent_activity(&self, limit: usize) -> AppResult<Vec<ActivityEntry>>;
}

// --- document helpers shared by backends

pub fn to_document<E: Serialize>(value: &E) -> AppResult<Document> {
    // ---
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(AppError::Store(format!(
            "expected an object document, got {other}"
        ))),
    }
}

pub fn from_document<E: DeserializeOwned>(doc: Document) -> AppResult<E> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Textual value of a document field as used for filtering and uniqueness.
pub fn field_text(doc: &Document, field: &str) -> Option<String> {
    // ---
    match doc.get(field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

pub fn document_key(schema: &EntitySchema, doc: &Document) -> AppResult<String> {
    field_text(doc, schema.key)
        .ok_or_else(|| AppError::validation(format!("{}: {} is required", schema.kind, schema.key)))
}

/// Split caller filters into allow-listed exact matches and an optional search term.
pub fn split_filters<'a>(
    schema: &EntitySchema,
    filters: &'a Filters,
) -> (Vec<(&'a str, &'a str)>, Option<&'a str>) {
    // ---
    let mut exact = Vec::new();
    let mut search = None;

    for (key, value) in filters {
        if key == SEARCH_KEY {
            if !value.trim().is_empty() {
                search = Some(value.trim());
            }
        } else if schema.filters.contains(&key.as_str()) {
            exact.push((key.as_str(), value.as_str()));
        } else {
            tracing::debug!("{}: ignoring filter '{}' (not allow-listed)", schema.kind, key);
        }
    }
    (exact, search)
}

pub fn matches_filters(schema: &EntitySchema, filters: &Filters, doc: &Document) -> bool {
    // ---
    let (exact, search) = split_filters(schema, filters);

    let exact_ok = exact
        .iter()
        .all(|(field, want)| field_text(doc, field).as_deref() == Some(*want));
    if !exact_ok {
        return false;
    }

    match search {
        None => true,
        Some(term) => {
            let needle = term.to_lowercase();
            schema.search.iter().any(|field| {
                field_text(doc, field)
                    .map(|v| v.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    // ---
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x
            .to_lowercase()
            .cmp(&y.to_lowercase())
            .then_with(|| x.cmp(y)),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Default ordering for a kind; ties fall back to the key so listings are stable.
pub fn compare_documents(schema: &EntitySchema, a: &Document, b: &Document) -> Ordering {
    // ---
    schema
        .sort
        .iter()
        .map(|key| {
            let ord = compare_values(a.get(key.field), b.get(key.field));
            if key.descending {
                ord.reverse()
            } else {
                ord
            }
        })
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or_else(|| compare_values(a.get(schema.key), b.get(schema.key)))
}
