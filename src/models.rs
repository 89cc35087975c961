//! Data models for the transport fleet.
//!
//! Every record kind carries a static [`EntitySchema`] describing its key,
//! unique fields, filter allow-list, free-text search fields and default
//! ordering. The generic store and controller layers are driven entirely by
//! that data; nothing below is specific to a storage backend.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::store::{Entity, EntitySchema, SortKey};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActiveStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BusStatus {
    #[default]
    Active,
    Maintenance,
    Inactive,
}

/// Used both for a student's `feeStatus` and a fee record's `paymentStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiderType {
    Student,
    Faculty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MovementStatus {
    Moving,
    #[default]
    Stopped,
}

fn require_text(kind: &str, field: &str, value: &str) -> AppResult<()> {
    // ---
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{kind}: {field} must not be empty")));
    }
    Ok(())
}

// --- riders

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    // ---
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub status: ActiveStatus,
    #[serde(default)]
    pub fee_status: PaymentStatus,
}

pub static STUDENT_SCHEMA: EntitySchema = EntitySchema {
    kind: "student",
    key: "id",
    id_prefix: "STU",
    unique: &["id"],
    filters: &["status", "routeId", "feeStatus"],
    search: &["name", "email", "phone"],
    sort: &[SortKey::asc("name")],
};

impl Entity for Student {
    // ---
    const SCHEMA: &'static EntitySchema = &STUDENT_SCHEMA;

    fn key(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> AppResult<()> {
        require_text("student", "name", &self.name)?;
        require_text("student", "email", &self.email)
    }

    fn route_ref(&self) -> Option<&str> {
        self.route_id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Faculty {
    // ---
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub status: ActiveStatus,
}

pub static FACULTY_SCHEMA: EntitySchema = EntitySchema {
    kind: "faculty",
    key: "id",
    id_prefix: "FAC",
    unique: &["id"],
    filters: &["status", "routeId", "department"],
    search: &["name", "email", "phone"],
    sort: &[SortKey::asc("name")],
};

impl Entity for Faculty {
    // ---
    const SCHEMA: &'static EntitySchema = &FACULTY_SCHEMA;

    fn key(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> AppResult<()> {
        require_text("faculty", "name", &self.name)?;
        require_text("faculty", "email", &self.email)
    }

    fn route_ref(&self) -> Option<&str> {
        self.route_id.as_deref()
    }
}

// --- fleet

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bus {
    // ---
    pub id: String,
    pub bus_number: String,
    pub capacity: u32,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub status: BusStatus,
}

pub static BUS_SCHEMA: EntitySchema = EntitySchema {
    kind: "bus",
    key: "id",
    id_prefix: "BUS",
    unique: &["id", "busNumber"],
    filters: &["status", "routeId", "driverId"],
    search: &["busNumber"],
    sort: &[SortKey::asc("busNumber")],
};

impl Entity for Bus {
    // ---
    const SCHEMA: &'static EntitySchema = &BUS_SCHEMA;

    fn key(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> AppResult<()> {
        // ---
        require_text("bus", "busNumber", &self.bus_number)?;
        if self.capacity == 0 {
            return Err(AppError::validation("bus: capacity must be greater than 0"));
        }
        Ok(())
    }

    fn route_ref(&self) -> Option<&str> {
        self.route_id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    // ---
    pub id: String,
    pub name: String,
    pub phone: String,
    pub license_number: String,
    /// Not checked against today; expired licenses are still stored.
    pub license_expiry: NaiveDate,
    #[serde(default)]
    pub assigned_bus_id: Option<String>,
    #[serde(default)]
    pub experience_years: u32,
    #[serde(default)]
    pub status: ActiveStatus,
}

pub static DRIVER_SCHEMA: EntitySchema = EntitySchema {
    kind: "driver",
    key: "id",
    id_prefix: "DRV",
    unique: &["id", "licenseNumber"],
    filters: &["status", "assignedBusId"],
    search: &["name", "phone", "licenseNumber"],
    sort: &[SortKey::asc("name")],
};

impl Entity for Driver {
    // ---
    const SCHEMA: &'static EntitySchema = &DRIVER_SCHEMA;

    fn key(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> AppResult<()> {
        require_text("driver", "name", &self.name)?;
        require_text("driver", "licenseNumber", &self.license_number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub name: String,
    /// Scheduled time, "HH:MM".
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    // ---
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub stops: Vec<Stop>,
    #[serde(default)]
    pub pickup_time: Option<String>,
    #[serde(default)]
    pub drop_time: Option<String>,
    /// Cached rider count; not recomputed from rider records.
    #[serde(default)]
    pub total_students: u32,
    #[serde(default)]
    pub assigned_bus: Option<String>,
    #[serde(default)]
    pub assigned_driver: Option<String>,
    #[serde(default)]
    pub status: ActiveStatus,
}

pub static ROUTE_SCHEMA: EntitySchema = EntitySchema {
    kind: "route",
    key: "id",
    id_prefix: "R",
    unique: &["id"],
    filters: &["status", "assignedBus"],
    search: &["id", "name"],
    sort: &[SortKey::asc("id")],
};

impl Entity for Route {
    // ---
    const SCHEMA: &'static EntitySchema = &ROUTE_SCHEMA;

    fn key(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> AppResult<()> {
        // ---
        require_text("route", "name", &self.name)?;
        for stop in &self.stops {
            require_text("route", "stop name", &stop.name)?;
        }
        Ok(())
    }
}

impl Route {
    // ---
    pub fn start_point(&self) -> Option<&str> {
        self.stops.first().map(|s| s.name.as_str())
    }

    pub fn end_point(&self) -> Option<&str> {
        self.stops.last().map(|s| s.name.as_str())
    }
}

/// A route as presented to readers, with its endpoints derived from the stop list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteView {
    // ---
    #[serde(flatten)]
    pub route: Route,
    pub start_point: Option<String>,
    pub end_point: Option<String>,
}

impl From<Route> for RouteView {
    fn from(route: Route) -> Self {
        let start_point = route.start_point().map(String::from);
        let end_point = route.end_point().map(String::from);
        RouteView {
            route,
            start_point,
            end_point,
        }
    }
}

// --- ledgers

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRecord {
    // ---
    pub id: String,
    pub rider_id: String,
    pub rider_name: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub payment_mode: Option<String>,
    #[serde(default)]
    pub route_id: Option<String>,
}

pub static FEE_SCHEMA: EntitySchema = EntitySchema {
    kind: "fee",
    key: "id",
    id_prefix: "FEE",
    unique: &["id"],
    filters: &["paymentStatus", "riderId", "routeId"],
    search: &["riderName", "riderId"],
    sort: &[SortKey::desc("dueDate")],
};

impl Entity for FeeRecord {
    // ---
    const SCHEMA: &'static EntitySchema = &FEE_SCHEMA;

    fn key(&self) -> &str {
        &self.id
    }

    /// Paid without a date is stamped today; Pending drops date and mode.
    fn normalize(&mut self, today: NaiveDate) {
        // ---
        match self.payment_status {
            PaymentStatus::Paid => {
                self.payment_date.get_or_insert(today);
            }
            PaymentStatus::Pending => {
                self.payment_date = None;
                self.payment_mode = None;
            }
        }
    }

    fn validate(&self) -> AppResult<()> {
        // ---
        require_text("fee", "riderId", &self.rider_id)?;
        if self.amount <= Decimal::ZERO {
            return Err(AppError::validation("fee: amount must be greater than 0"));
        }
        match (self.payment_status, self.payment_date) {
            (PaymentStatus::Paid, None) => Err(AppError::validation(
                "fee: paymentDate is required when paymentStatus is Paid",
            )),
            (PaymentStatus::Pending, Some(_)) => Err(AppError::validation(
                "fee: paymentDate must be empty while paymentStatus is Pending",
            )),
            _ => Ok(()),
        }
    }

    fn route_ref(&self) -> Option<&str> {
        self.route_id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    // ---
    pub id: String,
    pub date: NaiveDate,
    pub entity_type: RiderType,
    pub entity_id: String,
    pub entity_name: String,
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub bus_number: Option<String>,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub remarks: Option<String>,
}

pub static ATTENDANCE_SCHEMA: EntitySchema = EntitySchema {
    kind: "attendance",
    key: "id",
    id_prefix: "ATT",
    unique: &["id"],
    filters: &["date", "entityType", "routeId", "status", "entityId"],
    search: &["entityName", "busNumber"],
    sort: &[SortKey::desc("date"), SortKey::asc("entityName")],
};

impl Entity for AttendanceRecord {
    // ---
    const SCHEMA: &'static EntitySchema = &ATTENDANCE_SCHEMA;

    fn key(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> AppResult<()> {
        require_text("attendance", "entityId", &self.entity_id)
    }
}

// --- tracking

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivePosition {
    // ---
    pub bus_id: String,
    pub bus_number: String,
    #[serde(default)]
    pub route_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub status: MovementStatus,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub driver_name: Option<String>,
}

pub static LIVE_POSITION_SCHEMA: EntitySchema = EntitySchema {
    kind: "livePosition",
    key: "busId",
    id_prefix: "BUS",
    unique: &["busId"],
    filters: &["routeId", "status"],
    search: &["busNumber", "driverName"],
    sort: &[SortKey::asc("busNumber")],
};

impl Entity for LivePosition {
    // ---
    const SCHEMA: &'static EntitySchema = &LIVE_POSITION_SCHEMA;

    fn key(&self) -> &str {
        &self.bus_id
    }

    fn validate(&self) -> AppResult<()> {
        // ---
        require_text("livePosition", "busId", &self.bus_id)?;
        if !(self.speed >= 0.0) {
            return Err(AppError::validation("livePosition: speed must be >= 0"));
        }
        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(AppError::validation("livePosition: coordinates out of range"));
        }
        Ok(())
    }
}

/// Every record kind, in the order the schema module creates indexes.
pub static ALL_SCHEMAS: &[&EntitySchema] = &[
    &STUDENT_SCHEMA,
    &FACULTY_SCHEMA,
    &BUS_SCHEMA,
    &DRIVER_SCHEMA,
    &ROUTE_SCHEMA,
    &FEE_SCHEMA,
    &ATTENDANCE_SCHEMA,
    &LIVE_POSITION_SCHEMA,
];

/// One row of the append-only audit trail.
///
/// `timestamp` is kept as the stored RFC 3339 text so a single malformed row
/// can be rendered instead of failing the whole feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    // ---
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    fn route_with_stops(names: &[&str]) -> Route {
        // ---
        Route {
            id: "R1".into(),
            name: "North Loop".into(),
            stops: names
                .iter()
                .map(|n| Stop {
                    name: n.to_string(),
                    time: "07:30".into(),
                })
                .collect(),
            pickup_time: None,
            drop_time: None,
            total_students: 0,
            assigned_bus: None,
            assigned_driver: None,
            status: ActiveStatus::Active,
        }
    }

    #[test]
    fn test_route_endpoints() {
        // ---
        let route = route_with_stops(&["Depot", "Market", "Campus"]);
        assert_eq!(route.start_point(), Some("Depot"));
        assert_eq!(route.end_point(), Some("Campus"));

        let empty = route_with_stops(&[]);
        assert_eq!(empty.start_point(), None);

        let view = RouteView::from(route);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["startPoint"], "Depot");
        assert_eq!(json["endPoint"], "Campus");
        assert_eq!(json["name"], "North Loop");
    }

    #[test]
    fn test_bus_defaults_and_capacity() {
        // ---
        let bus: Bus =
            serde_json::from_value(json!({"id": "b1", "busNumber": "TN01", "capacity": 40})).unwrap();
        assert_eq!(bus.status, BusStatus::Active);
        assert!(bus.validate().is_ok());

        let zero: Bus =
            serde_json::from_value(json!({"id": "b2", "busNumber": "TN02", "capacity": 0})).unwrap();
        assert!(matches!(zero.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_fee_payment_date_invariant() {
        // ---
        let mut fee: FeeRecord = serde_json::from_value(json!({
            "id": "f1", "riderId": "s1", "riderName": "Asha",
            "amount": 100, "dueDate": "2026-01-10"
        }))
        .unwrap();
        assert!(fee.validate().is_ok());

        fee.payment_status = PaymentStatus::Paid;
        assert!(fee.validate().is_err());

        fee.payment_date = NaiveDate::from_ymd_opt(2026, 1, 5);
        assert!(fee.validate().is_ok());

        fee.amount = Decimal::ZERO;
        assert!(fee.validate().is_err());
    }

    #[test]
    fn test_activity_entry_wire_names() {
        // ---
        let entry = ActivityEntry {
            id: "a1".into(),
            kind: "bus_created".into(),
            message: "Bus TN01 added".into(),
            actor_id: None,
            metadata: Value::Null,
            timestamp: "2026-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "bus_created");
        assert!(json.get("actorId").is_some());
    }
}
