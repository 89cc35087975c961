//! Dashboard metrics and the recent-activity feed.
//!
//! Both endpoints degrade instead of failing: a read that cannot be served is
//! replaced by empty data or the placeholder feed, and the response is still 200.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::FleetState;
use crate::activity::{ActivityItem, DEFAULT_RECENT_LIMIT};
use crate::error::Envelope;
use crate::metrics::DashboardMetrics;

// ---

pub fn router() -> Router<FleetState> {
    Router::new()
        .route("/api/dashboard/metrics", get(metrics))
        .route("/api/dashboard/activities", get(activities))
}

async fn metrics(State(fleet): State<FleetState>) -> Json<Envelope<DashboardMetrics>> {
    Json(Envelope::ok(fleet.get_metrics().await))
}

#[derive(Debug, Deserialize)]
struct FeedQuery {
    limit: Option<usize>,
}

async fn activities(
    State(fleet): State<FleetState>,
    Query(query): Query<FeedQuery>,
) -> Json<Envelope<Vec<ActivityItem>>> {
    // ---
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT).max(1);
    Json(Envelope::ok(fleet.recent_activity(limit).await))
}
