//! Live bus positions and per-day route history.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{actor, FleetState};
use crate::error::{AppError, AppResult, Envelope};
use crate::models::LivePosition;
use crate::tracking::{HistoryPoint, PositionUpdate};

// ---

pub fn router() -> Router<FleetState> {
    Router::new()
        .route("/api/tracking/live", get(live).post(report_position))
        .route("/api/tracking/history/{bus_id}", get(history))
}

async fn live(State(fleet): State<FleetState>) -> AppResult<Json<Envelope<Vec<LivePosition>>>> {
    Ok(Json(Envelope::ok(fleet.live_positions().await?)))
}

async fn report_position(
    State(fleet): State<FleetState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> AppResult<Json<Envelope<LivePosition>>> {
    // ---
    let update: PositionUpdate = serde_json::from_value(body)
        .map_err(|e| AppError::validation(format!("livePosition: {e}")))?;
    let position = fleet
        .upsert_position(update, actor(&headers).as_deref())
        .await?;
    Ok(Json(Envelope::ok(position)))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    /// `YYYY-MM-DD`; today (UTC) when absent.
    date: Option<String>,
}

async fn history(
    State(fleet): State<FleetState>,
    Path(bus_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Envelope<Vec<HistoryPoint>>>> {
    // ---
    let date = match query.date.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|_| AppError::validation(format!("date must be YYYY-MM-DD, got '{raw}'")))?,
        None => Utc::now().date_naive(),
    };
    Ok(Json(Envelope::ok(fleet.route_history(&bus_id, date)?)))
}
