//! CRUD endpoints for every record kind, plus fee payments and driver assignment.
//!
//! The list/get/create/update/delete handlers are written once, generic over
//! [`Entity`], and mounted per kind.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{actor, into_document, FleetState};
use crate::error::{AppError, AppResult, Envelope};
use crate::metrics::FeeStats;
use crate::models::{
    AttendanceRecord, Bus, Driver, Faculty, FeeRecord, Route, RouteView, Student,
};
use crate::query::{ListParams, Page};
use crate::store::Entity;

// ---

pub fn router() -> Router<FleetState> {
    // ---
    Router::new()
        .merge(crud::<Student>("/api/students"))
        .merge(crud::<Faculty>("/api/faculty"))
        .merge(crud::<Bus>("/api/buses"))
        .merge(crud::<Driver>("/api/drivers"))
        .merge(crud::<FeeRecord>("/api/fees"))
        .merge(crud::<AttendanceRecord>("/api/attendance"))
        .route("/api/routes", get(list_routes).post(create::<Route>))
        .route(
            "/api/routes/{id}",
            get(get_route).put(update::<Route>).delete(remove::<Route>),
        )
        .route("/api/buses/{id}/driver", put(assign_driver))
        .route("/api/fees/stats", get(fee_stats))
        .route("/api/fees/payments", post(record_payment))
}

fn crud<E: Entity>(path: &str) -> Router<FleetState> {
    // ---
    Router::new()
        .route(path, get(list::<E>).post(create::<E>))
        .route(
            &format!("{path}/{{id}}"),
            get(get_one::<E>).put(update::<E>).delete(remove::<E>),
        )
}

async fn list<E: Entity>(
    State(fleet): State<FleetState>,
    Query(raw): Query<HashMap<String, String>>,
) -> AppResult<Json<Envelope<Page<E>>>> {
    // ---
    let params = ListParams::from_raw(&raw)?;
    Ok(Json(Envelope::ok(fleet.list::<E>(&params).await?)))
}

async fn get_one<E: Entity>(
    State(fleet): State<FleetState>,
    Path(id): Path<String>,
) -> AppResult<Json<Envelope<E>>> {
    Ok(Json(Envelope::ok(fleet.get::<E>(&id).await?)))
}

async fn create<E: Entity>(
    State(fleet): State<FleetState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> AppResult<(StatusCode, Json<Envelope<E>>)> {
    // ---
    let fields = into_document(body)?;
    let record = fleet.create::<E>(fields, actor(&headers).as_deref()).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(record))))
}

async fn update<E: Entity>(
    State(fleet): State<FleetState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> AppResult<Json<Envelope<E>>> {
    // ---
    let fields = into_document(body)?;
    let record = fleet.update::<E>(&id, fields, actor(&headers).as_deref()).await?;
    Ok(Json(Envelope::ok(record)))
}

async fn remove<E: Entity>(
    State(fleet): State<FleetState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<Envelope<Value>>> {
    // ---
    if fleet.delete::<E>(&id, actor(&headers).as_deref()).await? {
        Ok(Json(Envelope::ok(json!({ "id": id, "deleted": true }))))
    } else {
        Err(AppError::not_found(E::SCHEMA.kind, id))
    }
}

// --- routes are served with their derived endpoints

async fn list_routes(
    State(fleet): State<FleetState>,
    Query(raw): Query<HashMap<String, String>>,
) -> AppResult<Json<Envelope<Page<RouteView>>>> {
    // ---
    let params = ListParams::from_raw(&raw)?;
    Ok(Json(Envelope::ok(fleet.list_routes(&params).await?)))
}

async fn get_route(
    State(fleet): State<FleetState>,
    Path(id): Path<String>,
) -> AppResult<Json<Envelope<RouteView>>> {
    Ok(Json(Envelope::ok(fleet.route_view(&id).await?)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignDriverRequest {
    driver_id: String,
}

async fn assign_driver(
    State(fleet): State<FleetState>,
    Path(bus_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> AppResult<Json<Envelope<Bus>>> {
    // ---
    let request: AssignDriverRequest = serde_json::from_value(body)
        .map_err(|e| AppError::validation(format!("assign driver: {e}")))?;
    let bus = fleet
        .assign_driver(&bus_id, &request.driver_id, actor(&headers).as_deref())
        .await?;
    Ok(Json(Envelope::ok(bus)))
}

// --- fees

fn default_payment_mode() -> String {
    "Cash".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRequest {
    rider_id: String,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default = "default_payment_mode")]
    payment_mode: String,
}

async fn record_payment(
    State(fleet): State<FleetState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> AppResult<(StatusCode, Json<Envelope<FeeRecord>>)> {
    // ---
    let request: PaymentRequest = serde_json::from_value(body)
        .map_err(|e| AppError::validation(format!("payment: {e}")))?;
    let fee = fleet
        .record_payment(
            &request.rider_id,
            request.amount,
            &request.payment_mode,
            actor(&headers).as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(fee))))
}

async fn fee_stats(State(fleet): State<FleetState>) -> AppResult<Json<Envelope<FeeStats>>> {
    Ok(Json(Envelope::ok(fleet.fee_stats().await?)))
}
