//! Report generation by type.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tracing::info;

use super::FleetState;
use crate::error::{AppResult, Envelope};
use crate::reports::Report;

// ---

pub fn router() -> Router<FleetState> {
    Router::new().route("/api/reports/{report_type}", get(generate))
}

/// `GET /api/reports/{attendance|fees|routes|drivers}`
async fn generate(
    State(fleet): State<FleetState>,
    Path(report_type): Path<String>,
) -> AppResult<Json<Envelope<Report>>> {
    // ---
    info!("GET /api/reports/{}", report_type);
    Ok(Json(Envelope::ok(fleet.generate_report(&report_type).await?)))
}
