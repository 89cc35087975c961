//! HTTP gateway.
//!
//! Each sibling module exports a sub-router over the shared [`Fleet`] state;
//! this gateway merges them so `main.rs` never sees individual endpoints.
//! Every handler answers with the uniform [`crate::Envelope`].

use std::sync::Arc;

use axum::{http::HeaderMap, Router};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::store::Document;
use crate::Fleet;

mod dashboard;
mod entities;
mod health;
mod reports;
mod tracking;

// ---

/// Header carrying the authenticated caller, used for activity attribution.
pub const ACTOR_HEADER: &str = "x-actor-id";

pub type FleetState = Arc<Fleet>;

pub fn router(fleet: FleetState) -> Router {
    // ---
    Router::new()
        .merge(entities::router())
        .merge(dashboard::router())
        .merge(reports::router())
        .merge(tracking::router())
        .merge(health::router())
        .with_state(fleet)
}

fn actor(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn into_document(body: Value) -> AppResult<Document> {
    // ---
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::validation("request body must be a JSON object")),
    }
}
