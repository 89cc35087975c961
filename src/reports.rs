//! Structured reports over a [`FleetSnapshot`].
//!
//! Each report groups raw records by one dimension (route or driver) and
//! computes per-group figures plus fleet-wide totals.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::AppError;
use crate::metrics::{fee_stats, percentage, round1, FleetSnapshot};
use crate::models::{ActiveStatus, AttendanceStatus, Bus, Driver, PaymentStatus, Route};
use crate::synthetic::seeded_rng;

// ---

/// Capacity assumed for a route with no bus attached.
pub const DEFAULT_ROUTE_CAPACITY: u64 = 50;

/// Group key for records that carry no route.
pub const UNASSIGNED_ROUTE: &str = "unassigned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Attendance,
    Fees,
    Routes,
    Drivers,
}

impl FromStr for ReportType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s.trim().to_ascii_lowercase().as_str() {
            "attendance" => Ok(ReportType::Attendance),
            "fees" => Ok(ReportType::Fees),
            "routes" => Ok(ReportType::Routes),
            "drivers" => Ok(ReportType::Drivers),
            _ => Err(AppError::UnsupportedReportType(s.to_string())),
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportType::Attendance => "attendance",
            ReportType::Fees => "fees",
            ReportType::Routes => "routes",
            ReportType::Drivers => "drivers",
        };
        f.write_str(name)
    }
}

// --- attendance

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAttendance {
    pub route_id: String,
    pub present: usize,
    pub absent: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceReport {
    // ---
    pub total_days: usize,
    pub present: usize,
    pub absent: usize,
    pub percentage: f64,
    pub by_route: Vec<RouteAttendance>,
}

pub fn attendance_report(snapshot: &FleetSnapshot) -> AttendanceReport {
    // ---
    let mut days = BTreeSet::new();
    let mut by_route: BTreeMap<String, (usize, usize)> = BTreeMap::new();

    for record in &snapshot.attendance {
        days.insert(record.date);
        let route = record
            .route_id
            .clone()
            .unwrap_or_else(|| UNASSIGNED_ROUTE.to_string());
        let counts = by_route.entry(route).or_default();
        match record.status {
            AttendanceStatus::Present => counts.0 += 1,
            AttendanceStatus::Absent => counts.1 += 1,
        }
    }

    let present: usize = by_route.values().map(|(p, _)| p).sum();
    let absent: usize = by_route.values().map(|(_, a)| a).sum();

    AttendanceReport {
        total_days: days.len(),
        present,
        absent,
        percentage: percentage(present as f64, (present + absent) as f64),
        by_route: by_route
            .into_iter()
            .map(|(route_id, (present, absent))| RouteAttendance {
                route_id,
                present,
                absent,
            })
            .collect(),
    }
}

// --- fees

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteFees {
    pub route_id: String,
    pub total: Decimal,
    pub collected: Decimal,
    pub pending: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeReport {
    // ---
    pub total: Decimal,
    pub collected: Decimal,
    pub pending: Decimal,
    pub collection_rate: f64,
    pub by_route: Vec<RouteFees>,
}

pub fn fee_report(snapshot: &FleetSnapshot) -> FeeReport {
    // ---
    let stats = fee_stats(&snapshot.fees);
    let mut by_route: BTreeMap<String, (Decimal, Decimal)> = BTreeMap::new();

    for fee in &snapshot.fees {
        let route = fee
            .route_id
            .clone()
            .unwrap_or_else(|| UNASSIGNED_ROUTE.to_string());
        let (total, collected) = by_route.entry(route).or_default();
        *total += fee.amount;
        if fee.payment_status == PaymentStatus::Paid {
            *collected += fee.amount;
        }
    }

    FeeReport {
        total: stats.total,
        collected: stats.collected,
        pending: stats.pending,
        collection_rate: stats.collection_rate,
        by_route: by_route
            .into_iter()
            .map(|(route_id, (total, collected))| RouteFees {
                route_id,
                total,
                collected,
                pending: total - collected,
            })
            .collect(),
    }
}

// --- routes

/// `riders / capacity * 100`, one decimal.
pub fn occupancy(riders: u64, capacity: u64) -> f64 {
    percentage(riders as f64, capacity as f64)
}

/// Seats serving a route: its assigned bus, else every bus pointing at it,
/// else [`DEFAULT_ROUTE_CAPACITY`].
pub fn route_capacity(route: &Route, buses: &[Bus]) -> u64 {
    // ---
    if let Some(bus) = route
        .assigned_bus
        .as_deref()
        .and_then(|id| buses.iter().find(|b| b.id == id))
    {
        return u64::from(bus.capacity);
    }

    let serving: u64 = buses
        .iter()
        .filter(|b| b.route_id.as_deref() == Some(route.id.as_str()))
        .map(|b| u64::from(b.capacity))
        .sum();
    if serving > 0 {
        serving
    } else {
        DEFAULT_ROUTE_CAPACITY
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteOccupancy {
    // ---
    pub route_id: String,
    pub name: String,
    pub riders: u32,
    pub capacity: u64,
    pub occupancy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteReport {
    // ---
    pub total_routes: usize,
    pub active_routes: usize,
    pub average_occupancy: f64,
    pub routes: Vec<RouteOccupancy>,
}

pub fn route_report(snapshot: &FleetSnapshot) -> RouteReport {
    // ---
    let routes: Vec<RouteOccupancy> = snapshot
        .routes
        .iter()
        .map(|route| {
            let capacity = route_capacity(route, &snapshot.buses);
            RouteOccupancy {
                route_id: route.id.clone(),
                name: route.name.clone(),
                riders: route.total_students,
                capacity,
                occupancy: occupancy(u64::from(route.total_students), capacity),
            }
        })
        .collect();

    let occupied: u64 = routes.iter().map(|r| u64::from(r.riders)).sum();
    let capacity: u64 = routes.iter().map(|r| r.capacity).sum();

    RouteReport {
        total_routes: snapshot.routes.len(),
        active_routes: snapshot
            .routes
            .iter()
            .filter(|r| r.status == ActiveStatus::Active)
            .count(),
        average_occupancy: occupancy(occupied, capacity),
        routes,
    }
}

// --- drivers

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceFigures {
    pub trips: u32,
    pub on_time_percentage: f64,
    pub rating: f64,
}

/// Supplies per-driver trip performance.
pub trait PerformanceSource: Send + Sync {
    fn performance(&self, driver: &Driver) -> PerformanceFigures;
}

/// Illustrative figures derived from the driver id until a telemetry feed exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticPerformance;

impl PerformanceSource for SyntheticPerformance {
    fn performance(&self, driver: &Driver) -> PerformanceFigures {
        // ---
        let mut rng = seeded_rng(&["driver-performance", &driver.id]);
        PerformanceFigures {
            trips: rng.random_range(120..=260),
            on_time_percentage: round1(rng.random_range(82.0..99.0)),
            rating: round1(rng.random_range(3.5..5.0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverPerformance {
    // ---
    pub driver_id: String,
    pub name: String,
    pub status: ActiveStatus,
    pub experience_years: u32,
    #[serde(flatten)]
    pub figures: PerformanceFigures,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverReport {
    // ---
    pub total_drivers: usize,
    pub active_drivers: usize,
    pub average_experience: f64,
    pub drivers: Vec<DriverPerformance>,
}

pub fn driver_report(snapshot: &FleetSnapshot, source: &dyn PerformanceSource) -> DriverReport {
    // ---
    let total = snapshot.drivers.len();
    let years: u64 = snapshot.drivers.iter().map(|d| u64::from(d.experience_years)).sum();

    DriverReport {
        total_drivers: total,
        active_drivers: snapshot
            .drivers
            .iter()
            .filter(|d| d.status == ActiveStatus::Active)
            .count(),
        average_experience: if total == 0 {
            0.0
        } else {
            round1(years as f64 / total as f64)
        },
        drivers: snapshot
            .drivers
            .iter()
            .map(|d| DriverPerformance {
                driver_id: d.id.clone(),
                name: d.name.clone(),
                status: d.status,
                experience_years: d.experience_years,
                figures: source.performance(d),
            })
            .collect(),
    }
}

// --- envelope

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportData {
    Attendance(AttendanceReport),
    Fees(FeeReport),
    Routes(RouteReport),
    Drivers(DriverReport),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    // ---
    pub title: String,
    pub report_type: ReportType,
    pub generated_at: DateTime<Utc>,
    pub data: ReportData,
}

pub fn generate(
    report_type: ReportType,
    snapshot: &FleetSnapshot,
    performance: &dyn PerformanceSource,
    now: DateTime<Utc>,
) -> Report {
    // ---
    let (title, data) = match report_type {
        ReportType::Attendance => (
            "Attendance Report",
            ReportData::Attendance(attendance_report(snapshot)),
        ),
        ReportType::Fees => ("Fee Collection Report", ReportData::Fees(fee_report(snapshot))),
        ReportType::Routes => (
            "Route Efficiency Report",
            ReportData::Routes(route_report(snapshot)),
        ),
        ReportType::Drivers => (
            "Driver Performance Report",
            ReportData::Drivers(driver_report(snapshot, performance)),
        ),
    };

    Report {
        title: title.to_string(),
        report_type,
        generated_at: now,
        data,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{AttendanceRecord, BusStatus, FeeRecord, RiderType};
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    fn mark(route: &str, d: u32, status: AttendanceStatus) -> AttendanceRecord {
        // ---
        AttendanceRecord {
            id: format!("{route}-{d}"),
            date: day(d),
            entity_type: RiderType::Student,
            entity_id: "s".into(),
            entity_name: "S".into(),
            route_id: Some(route.into()),
            bus_number: None,
            status,
            remarks: None,
        }
    }

    fn route(id: &str, riders: u32, bus: Option<&str>) -> Route {
        // ---
        Route {
            id: id.into(),
            name: format!("Route {id}"),
            stops: vec![],
            pickup_time: None,
            drop_time: None,
            total_students: riders,
            assigned_bus: bus.map(String::from),
            assigned_driver: None,
            status: ActiveStatus::Active,
        }
    }

    fn bus(id: &str, capacity: u32, route: Option<&str>) -> Bus {
        Bus {
            id: id.into(),
            bus_number: id.to_uppercase(),
            capacity,
            driver_id: None,
            route_id: route.map(String::from),
            status: BusStatus::Active,
        }
    }

    fn driver(id: &str, years: u32, status: ActiveStatus) -> Driver {
        Driver {
            id: id.into(),
            name: format!("Driver {id}"),
            phone: "1".into(),
            license_number: format!("L-{id}"),
            license_expiry: day(1),
            assigned_bus_id: None,
            experience_years: years,
            status,
        }
    }

    #[test]
    fn test_report_type_parsing() {
        // ---
        assert_eq!("Attendance".parse::<ReportType>().unwrap(), ReportType::Attendance);
        assert!(matches!(
            "weekly".parse::<ReportType>(),
            Err(AppError::UnsupportedReportType(t)) if t == "weekly"
        ));
    }

    #[test]
    fn test_attendance_report_groups_by_route() {
        // ---
        let snapshot = FleetSnapshot {
            attendance: vec![
                mark("R1", 1, AttendanceStatus::Present),
                mark("R1", 1, AttendanceStatus::Present),
                mark("R1", 2, AttendanceStatus::Present),
                mark("R1", 2, AttendanceStatus::Absent),
            ],
            ..Default::default()
        };
        let report = attendance_report(&snapshot);
        assert_eq!(report.total_days, 2);
        assert_eq!(report.percentage, 75.0);
        assert_eq!(
            report.by_route,
            vec![RouteAttendance {
                route_id: "R1".into(),
                present: 3,
                absent: 1
            }]
        );
    }

    #[test]
    fn test_fee_report_by_route() {
        // ---
        let fee = |id: &str, route: Option<&str>, amount: i64, paid: bool| FeeRecord {
            id: id.into(),
            rider_id: id.into(),
            rider_name: id.into(),
            amount: Decimal::new(amount, 0),
            due_date: day(30),
            payment_status: if paid { PaymentStatus::Paid } else { PaymentStatus::Pending },
            payment_date: if paid { Some(day(2)) } else { None },
            payment_mode: None,
            route_id: route.map(String::from),
        };
        let snapshot = FleetSnapshot {
            fees: vec![
                fee("a", Some("R1"), 100, true),
                fee("b", Some("R1"), 300, false),
                fee("c", None, 50, true),
            ],
            ..Default::default()
        };
        let report = fee_report(&snapshot);
        assert_eq!(report.total, Decimal::new(450, 0));
        assert_eq!(report.by_route.len(), 2);
        assert_eq!(report.by_route[0].route_id, "R1");
        assert_eq!(report.by_route[0].pending, Decimal::new(300, 0));
        assert_eq!(report.by_route[1].route_id, UNASSIGNED_ROUTE);
        assert_eq!(report.collection_rate, 33.3);
    }

    #[test]
    fn test_occupancy() {
        // ---
        assert_eq!(occupancy(25, 50), 50.0);
        assert_eq!(occupancy(0, 50), 0.0);
        assert_eq!(occupancy(10, 0), 0.0);
    }

    #[test]
    fn test_route_capacity_resolution() {
        // ---
        let buses = vec![bus("b1", 40, None), bus("b2", 30, Some("R2")), bus("b3", 20, Some("R2"))];
        assert_eq!(route_capacity(&route("R1", 0, Some("b1")), &buses), 40);
        assert_eq!(route_capacity(&route("R2", 0, None), &buses), 50);
        assert_eq!(route_capacity(&route("R3", 0, None), &buses), DEFAULT_ROUTE_CAPACITY);
        assert_eq!(route_capacity(&route("R4", 0, Some("ghost")), &buses), DEFAULT_ROUTE_CAPACITY);
    }

    #[test]
    fn test_route_report_fleet_average() {
        // ---
        let snapshot = FleetSnapshot {
            routes: vec![route("R1", 25, None), route("R2", 40, Some("b1"))],
            buses: vec![bus("b1", 50, None)],
            ..Default::default()
        };
        let report = route_report(&snapshot);
        assert_eq!(report.routes[0].occupancy, 50.0);
        assert_eq!(report.routes[1].occupancy, 80.0);
        assert_eq!(report.average_occupancy, 65.0);
        assert_eq!(report.active_routes, 2);
    }

    #[test]
    fn test_route_report_handles_huge_capacities() {
        // ---
        let snapshot = FleetSnapshot {
            routes: vec![
                route("R1", u32::MAX, Some("b1")),
                route("R2", u32::MAX, Some("b2")),
            ],
            buses: vec![bus("b1", 3_000_000_000, None), bus("b2", 3_000_000_000, None)],
            ..Default::default()
        };
        let report = route_report(&snapshot);
        assert_eq!(report.routes[0].capacity, 3_000_000_000);
        assert_eq!(report.routes[0].occupancy, 143.2);
        assert_eq!(report.average_occupancy, 143.2);

        let shared = vec![bus("b1", u32::MAX, Some("R9")), bus("b2", u32::MAX, Some("R9"))];
        assert_eq!(
            route_capacity(&route("R9", 0, None), &shared),
            2 * u64::from(u32::MAX)
        );
    }

    #[test]
    fn test_driver_report_handles_huge_experience() {
        // ---
        let snapshot = FleetSnapshot {
            drivers: vec![
                driver("d1", u32::MAX, ActiveStatus::Active),
                driver("d2", u32::MAX, ActiveStatus::Active),
            ],
            ..Default::default()
        };
        let report = driver_report(&snapshot, &SyntheticPerformance);
        assert_eq!(report.average_experience, f64::from(u32::MAX));
    }

    #[test]
    fn test_driver_report_is_stable() {
        // ---
        let snapshot = FleetSnapshot {
            drivers: vec![
                driver("d1", 10, ActiveStatus::Active),
                driver("d2", 5, ActiveStatus::Inactive),
            ],
            ..Default::default()
        };
        let first = driver_report(&snapshot, &SyntheticPerformance);
        let second = driver_report(&snapshot, &SyntheticPerformance);
        assert_eq!(first, second);
        assert_eq!(first.active_drivers, 1);
        assert_eq!(first.average_experience, 7.5);

        let figures = first.drivers[0].figures;
        assert!((120..=260).contains(&figures.trips));
        assert!(figures.rating >= 3.5 && figures.rating <= 5.0);
    }

    #[test]
    fn test_generate_titles() {
        // ---
        let snapshot = FleetSnapshot::default();
        let report = generate(ReportType::Routes, &snapshot, &SyntheticPerformance, Utc::now());
        assert_eq!(report.title, "Route Efficiency Report");
        assert!(matches!(report.data, ReportData::Routes(_)));
    }
}
