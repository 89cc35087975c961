//! Fixed sample dataset served while the primary store is unreachable.
//!
//! Values are constants (no clock, no randomness) so degraded-mode responses
//! are identical across runs.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::{to_document, Entity, MemoryStore};
use crate::error::AppResult;
use crate::models::{
    ActiveStatus, AttendanceRecord, AttendanceStatus, Bus, BusStatus, Driver, Faculty, FeeRecord,
    PaymentStatus, RiderType, Route, Stop, Student,
};

// ---

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

fn stops(list: &[(&str, &str)]) -> Vec<Stop> {
    list.iter()
        .map(|(name, time)| Stop {
            name: name.to_string(),
            time: time.to_string(),
        })
        .collect()
}

pub fn routes() -> Vec<Route> {
    // ---
    let route = |id: &str, name: &str, stop_list: &[(&str, &str)], riders: u32, bus: &str, driver: &str| Route {
        id: id.into(),
        name: name.into(),
        stops: stops(stop_list),
        pickup_time: stop_list.first().map(|(_, t)| t.to_string()),
        drop_time: Some("17:15".into()),
        total_students: riders,
        assigned_bus: Some(bus.into()),
        assigned_driver: Some(driver.into()),
        status: ActiveStatus::Active,
    };

    vec![
        route(
            "R1",
            "Tambaram Express",
            &[("Tambaram", "07:10"), ("Chromepet", "07:25"), ("Guindy", "07:50"), ("Campus", "08:20")],
            38,
            "BUS-001",
            "DRV-001",
        ),
        route(
            "R2",
            "Velachery Loop",
            &[("Velachery", "07:20"), ("Adyar", "07:45"), ("Campus", "08:15")],
            29,
            "BUS-002",
            "DRV-002",
        ),
        route(
            "R3",
            "Anna Nagar Link",
            &[("Anna Nagar", "07:05"), ("Koyambedu", "07:30"), ("Vadapalani", "07:50"), ("Campus", "08:25")],
            44,
            "BUS-003",
            "DRV-003",
        ),
    ]
}

pub fn buses() -> Vec<Bus> {
    // ---
    let bus = |id: &str, number: &str, capacity: u32, driver: Option<&str>, route: Option<&str>, status| Bus {
        id: id.into(),
        bus_number: number.into(),
        capacity,
        driver_id: driver.map(String::from),
        route_id: route.map(String::from),
        status,
    };

    vec![
        bus("BUS-001", "TN01AB1234", 50, Some("DRV-001"), Some("R1"), BusStatus::Active),
        bus("BUS-002", "TN01AB5678", 40, Some("DRV-002"), Some("R2"), BusStatus::Active),
        bus("BUS-003", "TN02CD4321", 55, Some("DRV-003"), Some("R3"), BusStatus::Active),
        bus("BUS-004", "TN02CD8765", 45, None, None, BusStatus::Maintenance),
    ]
}

pub fn drivers() -> Vec<Driver> {
    // ---
    let driver = |id: &str, name: &str, phone: &str, license: &str, expiry, bus: Option<&str>, years, status| Driver {
        id: id.into(),
        name: name.into(),
        phone: phone.into(),
        license_number: license.into(),
        license_expiry: expiry,
        assigned_bus_id: bus.map(String::from),
        experience_years: years,
        status,
    };

    vec![
        driver("DRV-001", "Murugan S", "9840011001", "TN0120150001", date(2028, 3, 31), Some("BUS-001"), 12, ActiveStatus::Active),
        driver("DRV-002", "Ravi Kumar", "9840011002", "TN0120170002", date(2027, 8, 15), Some("BUS-002"), 8, ActiveStatus::Active),
        driver("DRV-003", "Senthil P", "9840011003", "TN0220120003", date(2026, 12, 1), Some("BUS-003"), 15, ActiveStatus::Active),
        driver("DRV-004", "Arjun M", "9840011004", "TN0220200004", date(2025, 6, 30), None, 3, ActiveStatus::Inactive),
    ]
}

pub fn students() -> Vec<Student> {
    // ---
    let student = |id: &str, name: &str, email: &str, route: &str, fee| Student {
        id: id.into(),
        name: name.into(),
        email: email.into(),
        phone: "9000000000".into(),
        route_id: Some(route.into()),
        status: ActiveStatus::Active,
        fee_status: fee,
    };

    vec![
        student("STU-001", "Aarthi Raman", "aarthi@college.edu", "R1", PaymentStatus::Paid),
        student("STU-002", "Bharath Kannan", "bharath@college.edu", "R1", PaymentStatus::Pending),
        student("STU-003", "Deepa Suresh", "deepa@college.edu", "R2", PaymentStatus::Paid),
        student("STU-004", "Karthik Rajan", "karthik@college.edu", "R3", PaymentStatus::Pending),
        student("STU-005", "Meena Lakshmi", "meena@college.edu", "R3", PaymentStatus::Paid),
    ]
}

pub fn faculty() -> Vec<Faculty> {
    // ---
    vec![
        Faculty {
            id: "FAC-001".into(),
            name: "Dr. Lakshmi Narayanan".into(),
            email: "lakshmi@college.edu".into(),
            phone: "9000000101".into(),
            department: Some("Physics".into()),
            route_id: Some("R2".into()),
            status: ActiveStatus::Active,
        },
        Faculty {
            id: "FAC-002".into(),
            name: "Prof. Vijay Anand".into(),
            email: "vijay@college.edu".into(),
            phone: "9000000102".into(),
            department: Some("Mathematics".into()),
            route_id: Some("R1".into()),
            status: ActiveStatus::Active,
        },
    ]
}

pub fn fees() -> Vec<FeeRecord> {
    // ---
    let fee = |id: &str, rider: &str, name: &str, amount: i64, route: &str, paid_on: Option<NaiveDate>| FeeRecord {
        id: id.into(),
        rider_id: rider.into(),
        rider_name: name.into(),
        amount: Decimal::new(amount, 0),
        due_date: date(2026, 7, 15),
        payment_status: if paid_on.is_some() {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Pending
        },
        payment_date: paid_on,
        payment_mode: paid_on.map(|_| "UPI".to_string()),
        route_id: Some(route.into()),
    };

    vec![
        fee("FEE-001", "STU-001", "Aarthi Raman", 12000, "R1", Some(date(2026, 7, 1))),
        fee("FEE-002", "STU-002", "Bharath Kannan", 12000, "R1", None),
        fee("FEE-003", "STU-003", "Deepa Suresh", 10000, "R2", Some(date(2026, 7, 3))),
        fee("FEE-004", "STU-004", "Karthik Rajan", 14000, "R3", None),
        fee("FEE-005", "STU-005", "Meena Lakshmi", 14000, "R3", Some(date(2026, 7, 10))),
    ]
}

pub fn attendance() -> Vec<AttendanceRecord> {
    // ---
    let record = |id: &str, day: u32, who: &Student, bus: &str, status| AttendanceRecord {
        id: id.into(),
        date: date(2026, 7, day),
        entity_type: RiderType::Student,
        entity_id: who.id.clone(),
        entity_name: who.name.clone(),
        route_id: who.route_id.clone(),
        bus_number: Some(bus.into()),
        status,
        remarks: None,
    };

    let s = students();
    vec![
        record("ATT-001", 20, &s[0], "TN01AB1234", AttendanceStatus::Present),
        record("ATT-002", 20, &s[1], "TN01AB1234", AttendanceStatus::Absent),
        record("ATT-003", 20, &s[2], "TN01AB5678", AttendanceStatus::Present),
        record("ATT-004", 20, &s[3], "TN02CD4321", AttendanceStatus::Present),
        record("ATT-005", 21, &s[0], "TN01AB1234", AttendanceStatus::Present),
        record("ATT-006", 21, &s[4], "TN02CD4321", AttendanceStatus::Present),
    ]
}

async fn seed_kind<E: Entity>(store: &MemoryStore, records: Vec<E>) -> AppResult<()> {
    // ---
    let docs = records.iter().map(to_document).collect::<AppResult<Vec<_>>>()?;
    store.seed(E::SCHEMA, docs).await
}

/// Load every sample collection into `store`.
pub async fn load_into(store: &MemoryStore) -> AppResult<()> {
    // ---
    seed_kind(store, routes()).await?;
    seed_kind(store, buses()).await?;
    seed_kind(store, drivers()).await?;
    seed_kind(store, students()).await?;
    seed_kind(store, faculty()).await?;
    seed_kind(store, fees()).await?;
    seed_kind(store, attendance()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_sample_references_are_consistent() {
        // ---
        let route_ids: Vec<_> = routes().into_iter().map(|r| r.id).collect();
        for s in students() {
            assert!(route_ids.contains(s.route_id.as_ref().unwrap()));
        }
        for b in buses() {
            assert!(b.validate().is_ok());
        }
        for f in fees() {
            assert!(f.validate().is_ok(), "{} invalid", f.id);
        }
    }

    #[test]
    fn test_dataset_is_stable() {
        assert_eq!(buses(), buses());
        assert_eq!(attendance().len(), 6);
    }
}
