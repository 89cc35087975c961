// src/routes/health.rs
//! Service health endpoint.
//!
//! `/health` reports whether the process is up and which store is serving
//! requests: the primary store (Healthy) or the fallback dataset (Degraded).
//! A Degraded service still answers 200; callers read `store.mode`.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::FleetState;
use crate::store::handle::StoreStatus;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    store: StoreStatus,
}

/// Handle `GET /health`. Does not issue any store query.
async fn health(State(fleet): State<FleetState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        store: fleet.store_status().await,
    })
}

pub fn router() -> Router<FleetState> {
    Router::new().route("/health", get(health))
}
