//! Controller layer.
//!
//! [`Fleet`] is the single entry point the HTTP gateway (and the integration
//! tests) talk to. It owns the store handle, validates input before any store
//! call, records one activity entry per successful mutation, and decides where
//! failures surface: single-record CRUD surfaces them, dashboard and feed
//! reads degrade to empty collections or placeholders.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::activity::{format_feed, placeholder_feed, ActivityItem, ActivityLogger};
use crate::error::{AppError, AppResult};
use crate::metrics::{self, DashboardMetrics, FeeStats, FleetSnapshot, RECENT_ACTIVITY_COUNT};
use crate::models::{
    AttendanceRecord, Bus, Driver, Faculty, FeeRecord, LivePosition, PaymentStatus, Route,
    RouteView, Student, FEE_SCHEMA, ROUTE_SCHEMA,
};
use crate::query::{paginate, ListParams, Page};
use crate::reports::{self, PerformanceSource, Report, ReportType, SyntheticPerformance};
use crate::store::handle::StoreStatus;
use crate::store::{
    field_text, from_document, to_document, Document, Entity, EntityStore, Filters, StoreHandle,
};
use crate::tracking::{self, HistoryPoint, PositionUpdate};

// ---

/// Identifier for a new record: schema prefix plus eight hex digits.
pub fn generate_id(prefix: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &simple[..8])
}

/// Deserialize a document into a typed record, reporting shape errors as validation failures.
fn decode<E: Entity>(doc: Document) -> AppResult<E> {
    // ---
    from_document(doc).map_err(|e| match e {
        AppError::Serialization(inner) => {
            AppError::validation(format!("{}: {}", E::SCHEMA.kind, inner))
        }
        other => other,
    })
}

fn capitalize(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct Fleet {
    // ---
    store: Arc<StoreHandle>,
    activity: ActivityLogger,
    performance: Box<dyn PerformanceSource>,
}

impl Fleet {
    // ---
    pub fn new(store: Arc<StoreHandle>) -> Self {
        // ---
        let activity = ActivityLogger::new(store.clone());
        Fleet {
            store,
            activity,
            performance: Box::new(SyntheticPerformance),
        }
    }

    /// Replace the driver performance feed used by the drivers report.
    pub fn with_performance(mut self, source: Box<dyn PerformanceSource>) -> Self {
        self.performance = source;
        self
    }

    pub async fn store_status(&self) -> StoreStatus {
        self.store.status().await
    }

    /// Append an activity entry; a failed write is logged, never surfaced.
    async fn log_activity(&self, kind: &str, message: String, actor: Option<&str>, metadata: Value) {
        // ---
        if let Err(e) = self.activity.record(kind, message, actor, metadata).await {
            warn!("Activity entry '{}' was not recorded: {}", kind, e);
        }
    }

    async fn ensure_route_exists<E: Entity>(&self, record: &E) -> AppResult<()> {
        // ---
        let Some(route_id) = record.route_ref() else {
            return Ok(());
        };
        if self.store.get(&ROUTE_SCHEMA, route_id).await?.is_none() {
            return Err(AppError::validation(format!(
                "{}: route '{}' does not exist",
                E::SCHEMA.kind,
                route_id
            )));
        }
        Ok(())
    }

    /// At most one Pending fee per rider.
    async fn ensure_single_pending_fee(&self, doc: &Document, own_id: Option<&str>) -> AppResult<()> {
        // ---
        if field_text(doc, "paymentStatus").as_deref() != Some("Pending") {
            return Ok(());
        }
        let Some(rider_id) = field_text(doc, "riderId") else {
            return Ok(());
        };

        let filters: Filters = [
            ("riderId".to_string(), rider_id.clone()),
            ("paymentStatus".to_string(), "Pending".to_string()),
        ]
        .into_iter()
        .collect();
        let pending = self.store.list(&FEE_SCHEMA, &filters).await?;
        let clash = pending
            .iter()
            .any(|other| field_text(other, "id").as_deref() != own_id);
        if clash {
            return Err(AppError::Conflict {
                kind: FEE_SCHEMA.kind,
                field: "riderId (pending)".into(),
                value: rider_id,
            });
        }
        Ok(())
    }

    /// Normalize, validate and cross-check a record, returning its stored form.
    async fn prepare<E: Entity>(&self, doc: Document, own_id: Option<&str>) -> AppResult<(E, Document)> {
        // ---
        let mut record: E = decode(doc)?;
        record.normalize(Utc::now().date_naive());
        record.validate()?;
        self.ensure_route_exists(&record).await?;

        let doc = to_document(&record)?;
        if E::SCHEMA.kind == FEE_SCHEMA.kind {
            self.ensure_single_pending_fee(&doc, own_id).await?;
        }
        Ok((record, doc))
    }

    // --- generic CRUD

    pub async fn list<E: Entity>(&self, params: &ListParams) -> AppResult<Page<E>> {
        // ---
        let schema = E::SCHEMA;
        let docs = self.store.list(schema, &params.filters).await?;
        debug!("{}: {} matching records", schema.kind, docs.len());

        let records: Vec<E> = docs
            .into_iter()
            .filter_map(|doc| match from_document::<E>(doc) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("{}: skipping unreadable record: {}", schema.kind, e);
                    None
                }
            })
            .collect();
        Ok(paginate(records, params))
    }

    pub async fn get<E: Entity>(&self, id: &str) -> AppResult<E> {
        // ---
        let schema = E::SCHEMA;
        match self.store.get(schema, id).await? {
            Some(doc) => from_document(doc),
            None => Err(AppError::not_found(schema.kind, id)),
        }
    }

    /// Insert a record from caller-supplied fields; the key is generated when absent.
    pub async fn create<E: Entity>(&self, mut fields: Document, actor: Option<&str>) -> AppResult<E> {
        // ---
        let schema = E::SCHEMA;
        if field_text(&fields, schema.key).map_or(true, |k| k.trim().is_empty()) {
            fields.insert(schema.key.to_string(), Value::String(generate_id(schema.id_prefix)));
        }

        let (record, doc) = self.prepare::<E>(fields, None).await?;
        self.store.insert(schema, doc).await?;

        info!("{} '{}' created", schema.kind, record.key());
        self.log_activity(
            &format!("{}_created", schema.kind),
            format!("{} {} created", capitalize(schema.kind), record.key()),
            actor,
            json!({ "id": record.key() }),
        )
        .await;
        Ok(record)
    }

    /// Write only the supplied fields over the stored record.
    pub async fn update<E: Entity>(&self, id: &str, fields: Document, actor: Option<&str>) -> AppResult<E> {
        // ---
        let schema = E::SCHEMA;
        let mut merged = self
            .store
            .get(schema, id)
            .await?
            .ok_or_else(|| AppError::not_found(schema.kind, id))?;

        let changed: Vec<String> = fields.keys().filter(|k| *k != schema.key).cloned().collect();
        for (field, value) in fields {
            if field != schema.key {
                merged.insert(field, value);
            }
        }

        let (record, doc) = self.prepare::<E>(merged, Some(id)).await?;
        self.store
            .replace(schema, id, doc)
            .await?
            .ok_or_else(|| AppError::not_found(schema.kind, id))?;

        info!("{} '{}' updated", schema.kind, id);
        self.log_activity(
            &format!("{}_updated", schema.kind),
            format!("{} {} updated", capitalize(schema.kind), id),
            actor,
            json!({ "id": id, "fields": changed }),
        )
        .await;
        Ok(record)
    }

    /// `false` when nothing was stored under `id`.
    pub async fn delete<E: Entity>(&self, id: &str, actor: Option<&str>) -> AppResult<bool> {
        // ---
        let schema = E::SCHEMA;
        let removed = self.store.delete(schema, id).await?;
        if removed {
            info!("{} '{}' deleted", schema.kind, id);
            self.log_activity(
                &format!("{}_deleted", schema.kind),
                format!("{} {} deleted", capitalize(schema.kind), id),
                actor,
                json!({ "id": id }),
            )
            .await;
        } else {
            debug!("{} '{}' not present, nothing deleted", schema.kind, id);
        }
        Ok(removed)
    }

    // --- entity-specific operations

    pub async fn route_view(&self, id: &str) -> AppResult<RouteView> {
        Ok(self.get::<Route>(id).await?.into())
    }

    pub async fn list_routes(&self, params: &ListParams) -> AppResult<Page<RouteView>> {
        Ok(self.list::<Route>(params).await?.map(RouteView::from))
    }

    /// Point a bus and a driver at each other.
    pub async fn assign_driver(&self, bus_id: &str, driver_id: &str, actor: Option<&str>) -> AppResult<Bus> {
        // ---
        let mut bus = self.get::<Bus>(bus_id).await?;
        let mut driver = self.get::<Driver>(driver_id).await?;

        bus.driver_id = Some(driver.id.clone());
        driver.assigned_bus_id = Some(bus.id.clone());

        self.store
            .replace(Bus::SCHEMA, bus_id, to_document(&bus)?)
            .await?
            .ok_or_else(|| AppError::not_found(Bus::SCHEMA.kind, bus_id))?;
        self.store
            .replace(Driver::SCHEMA, driver_id, to_document(&driver)?)
            .await?
            .ok_or_else(|| AppError::not_found(Driver::SCHEMA.kind, driver_id))?;

        info!("driver '{}' assigned to bus '{}'", driver_id, bus_id);
        self.log_activity(
            "driver_assigned",
            format!("{} assigned to bus {}", driver.name, bus.bus_number),
            actor,
            json!({ "busId": bus_id, "driverId": driver_id }),
        )
        .await;
        Ok(bus)
    }

    /// Settle the rider's oldest Pending fee, or record a new paid fee when none is open.
    pub async fn record_payment(
        &self,
        rider_id: &str,
        amount: Option<Decimal>,
        mode: &str,
        actor: Option<&str>,
    ) -> AppResult<FeeRecord> {
        // ---
        let today = Utc::now().date_naive();
        let pending = self
            .list::<FeeRecord>(
                &ListParams::default()
                    .with_filter("riderId", rider_id)
                    .with_filter("paymentStatus", "Pending"),
            )
            .await?;
        let oldest = pending.data.into_iter().min_by_key(|f| f.due_date);

        let fee = match oldest {
            Some(mut fee) => {
                fee.payment_status = PaymentStatus::Paid;
                fee.payment_date = Some(today);
                fee.payment_mode = Some(mode.to_string());
                self.store
                    .replace(&FEE_SCHEMA, &fee.id, to_document(&fee)?)
                    .await?
                    .ok_or_else(|| AppError::not_found(FEE_SCHEMA.kind, fee.id.clone()))?;
                fee
            }
            None => {
                let amount = amount.ok_or_else(|| {
                    AppError::validation("payment: amount is required when no fee is pending")
                })?;
                let (rider_name, route_id) = self.rider_details(rider_id).await?;
                let fee = FeeRecord {
                    id: generate_id(FEE_SCHEMA.id_prefix),
                    rider_id: rider_id.to_string(),
                    rider_name,
                    amount,
                    due_date: today,
                    payment_status: PaymentStatus::Paid,
                    payment_date: Some(today),
                    payment_mode: Some(mode.to_string()),
                    route_id,
                };
                fee.validate()?;
                self.store.insert(&FEE_SCHEMA, to_document(&fee)?).await?;
                fee
            }
        };

        let student = self
            .store
            .get(Student::SCHEMA, rider_id)
            .await?
            .map(from_document::<Student>)
            .transpose()?;
        if let Some(mut student) = student {
            student.fee_status = PaymentStatus::Paid;
            self.store
                .replace(Student::SCHEMA, rider_id, to_document(&student)?)
                .await?;
        }

        info!("payment of {} recorded for rider '{}'", fee.amount, rider_id);
        self.log_activity(
            "payment_recorded",
            format!("Fee payment of {} received from {}", fee.amount, fee.rider_name),
            actor,
            json!({ "feeId": fee.id, "riderId": rider_id, "mode": mode }),
        )
        .await;
        Ok(fee)
    }

    /// Name and route of a student or faculty rider.
    async fn rider_details(&self, rider_id: &str) -> AppResult<(String, Option<String>)> {
        // ---
        if let Some(doc) = self.store.get(Student::SCHEMA, rider_id).await? {
            let student: Student = from_document(doc)?;
            return Ok((student.name, student.route_id));
        }
        if let Some(doc) = self.store.get(Faculty::SCHEMA, rider_id).await? {
            let faculty: Faculty = from_document(doc)?;
            return Ok((faculty.name, faculty.route_id));
        }
        Err(AppError::not_found("rider", rider_id))
    }

    pub async fn fee_stats(&self) -> AppResult<FeeStats> {
        let fees = self.all::<FeeRecord>().await?;
        Ok(metrics::fee_stats(&fees))
    }

    // --- aggregates

    async fn all<E: Entity>(&self) -> AppResult<Vec<E>> {
        Ok(self.list::<E>(&ListParams::default().with_limit(usize::MAX)).await?.data)
    }

    /// Every record of a kind, or nothing when the read fails.
    async fn all_or_empty<E: Entity>(&self) -> Vec<E> {
        // ---
        match self.all::<E>().await {
            Ok(records) => records,
            Err(e) => {
                warn!("{}: read failed, continuing with no records: {}", E::SCHEMA.kind, e);
                Vec::new()
            }
        }
    }

    /// Collections for the dashboard; each failed read is replaced by an empty one.
    async fn lenient_snapshot(&self) -> FleetSnapshot {
        // ---
        let activities = match self.activity.recent(RECENT_ACTIVITY_COUNT).await {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!("Activity feed unavailable, using placeholder: {}", e);
                None
            }
        };

        FleetSnapshot {
            students: self.all_or_empty().await,
            faculty: self.all_or_empty().await,
            buses: self.all_or_empty().await,
            drivers: self.all_or_empty().await,
            routes: self.all_or_empty().await,
            fees: self.all_or_empty().await,
            attendance: self.all_or_empty().await,
            activities,
        }
    }

    async fn snapshot(&self) -> AppResult<FleetSnapshot> {
        // ---
        Ok(FleetSnapshot {
            students: self.all::<Student>().await?,
            faculty: self.all::<Faculty>().await?,
            buses: self.all::<Bus>().await?,
            drivers: self.all::<Driver>().await?,
            routes: self.all::<Route>().await?,
            fees: self.all::<FeeRecord>().await?,
            attendance: self.all::<AttendanceRecord>().await?,
            activities: None,
        })
    }

    /// Dashboard figures; never fails, degrading per collection instead.
    pub async fn get_metrics(&self) -> DashboardMetrics {
        let snapshot = self.lenient_snapshot().await;
        metrics::dashboard(&snapshot, Utc::now())
    }

    pub async fn generate_report(&self, report_type: &str) -> AppResult<Report> {
        // ---
        let report_type: ReportType = report_type.parse()?;
        let snapshot = self.snapshot().await?;
        info!("generating {} report", report_type);
        Ok(reports::generate(report_type, &snapshot, self.performance.as_ref(), Utc::now()))
    }

    /// Formatted feed, newest first; the placeholder feed when the log cannot be read.
    pub async fn recent_activity(&self, limit: usize) -> Vec<ActivityItem> {
        // ---
        match self.activity.recent(limit).await {
            Ok(entries) => format_feed(&entries, Utc::now()),
            Err(e) => {
                warn!("Activity feed unavailable, using placeholder: {}", e);
                placeholder_feed()
            }
        }
    }

    // --- tracking

    /// Stored positions, or synthesized ones when no bus has reported yet.
    pub async fn live_positions(&self) -> AppResult<Vec<LivePosition>> {
        // ---
        let rows = self.all::<LivePosition>().await?;
        if !rows.is_empty() {
            return Ok(rows);
        }
        let buses = self.all::<Bus>().await?;
        let drivers = self.all_or_empty::<Driver>().await;
        debug!("no live positions stored, synthesizing for {} buses", buses.len());
        Ok(tracking::synthesize_positions(&buses, &drivers, Utc::now()))
    }

    /// Insert or update the position row for a bus, stamping the current time.
    pub async fn upsert_position(&self, mut update: PositionUpdate, actor: Option<&str>) -> AppResult<LivePosition> {
        // ---
        if update.bus_id.trim().is_empty() {
            return Err(AppError::validation("livePosition: busId is required"));
        }
        let schema = LivePosition::SCHEMA;
        let existing = self
            .store
            .get(schema, &update.bus_id)
            .await?
            .map(from_document::<LivePosition>)
            .transpose()?;

        if existing.is_none() && update.bus_number.is_none() {
            if let Some(doc) = self.store.get(Bus::SCHEMA, &update.bus_id).await? {
                let bus: Bus = from_document(doc)?;
                update.bus_number = Some(bus.bus_number);
                update.route_id = update.route_id.or(bus.route_id);
            }
        }

        let position = tracking::apply_update(existing, update, Utc::now())?;
        self.store.upsert(schema, to_document(&position)?).await?;

        debug!("position for bus '{}' updated", position.bus_id);
        self.log_activity(
            "position_updated",
            format!("Bus {} reported its position", position.bus_number),
            actor,
            json!({ "busId": position.bus_id, "speed": position.speed }),
        )
        .await;
        Ok(position)
    }

    pub fn route_history(&self, bus_id: &str, date: NaiveDate) -> AppResult<Vec<HistoryPoint>> {
        // ---
        if bus_id.trim().is_empty() {
            return Err(AppError::validation("route history: busId is required"));
        }
        Ok(tracking::route_history(bus_id, date))
    }
}
