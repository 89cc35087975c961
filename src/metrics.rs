//! Dashboard aggregation.
//!
//! Pure functions over collections that the controller layer has already
//! fetched; nothing here touches a store.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::activity::{format_feed, placeholder_feed, ActivityItem};
use crate::models::{
    ActiveStatus, ActivityEntry, AttendanceRecord, AttendanceStatus, Bus, BusStatus, Driver,
    Faculty, FeeRecord, PaymentStatus, Route, Student,
};

// ---

/// Shown when no attendance has been recorded today.
pub const NEUTRAL_ATTENDANCE_PERCENTAGE: f64 = 0.0;

pub const RECENT_ACTIVITY_COUNT: usize = 4;

/// Baseline (attendance %, fee collection %) for the five months before the current one.
const TREND_BASELINE: [(f64, f64); 5] = [
    (88.5, 72.0),
    (90.2, 75.5),
    (86.7, 78.3),
    (91.4, 80.1),
    (89.9, 83.6),
];

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `part / whole * 100`, rounded to one decimal; 0 when `whole` is zero.
pub fn percentage(part: f64, whole: f64) -> f64 {
    // ---
    if whole <= 0.0 {
        0.0
    } else {
        round1(part / whole * 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeStats {
    // ---
    pub total: Decimal,
    pub collected: Decimal,
    pub pending: Decimal,
    pub collection_rate: f64,
}

pub fn fee_stats(fees: &[FeeRecord]) -> FeeStats {
    // ---
    let total: Decimal = fees.iter().map(|f| f.amount).sum();
    let collected: Decimal = fees
        .iter()
        .filter(|f| f.payment_status == PaymentStatus::Paid)
        .map(|f| f.amount)
        .sum();

    let collection_rate = percentage(
        collected.to_f64().unwrap_or(0.0),
        total.to_f64().unwrap_or(0.0),
    );

    FeeStats {
        total,
        collected,
        pending: total - collected,
        collection_rate,
    }
}

/// Share of today's attendance records marked Present.
pub fn attendance_percentage(records: &[AttendanceRecord], today: NaiveDate) -> f64 {
    // ---
    let todays: Vec<_> = records.iter().filter(|r| r.date == today).collect();
    if todays.is_empty() {
        return NEUTRAL_ATTENDANCE_PERCENTAGE;
    }
    let present = todays
        .iter()
        .filter(|r| r.status == AttendanceStatus::Present)
        .count();
    percentage(present as f64, todays.len() as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTrend {
    pub month: String,
    pub attendance: f64,
    pub fee_collection: f64,
}

/// Six months ending with the current one; only the current month is live.
pub fn monthly_trends(now: DateTime<Utc>, attendance: f64, fee_collection: f64) -> Vec<MonthlyTrend> {
    // ---
    let (year, month0) = (now.year(), now.month0() as i32);
    let label = |back: i32| {
        let idx = year * 12 + month0 - back;
        NaiveDate::from_ymd_opt(idx.div_euclid(12), idx.rem_euclid(12) as u32 + 1, 1)
            .map(|d| d.format("%b").to_string())
            .unwrap_or_default()
    };

    let mut trends: Vec<MonthlyTrend> = TREND_BASELINE
        .iter()
        .enumerate()
        .map(|(i, (att, fee))| MonthlyTrend {
            month: label((TREND_BASELINE.len() - i) as i32),
            attendance: *att,
            fee_collection: *fee,
        })
        .collect();

    trends.push(MonthlyTrend {
        month: label(0),
        attendance,
        fee_collection,
    });
    trends
}

/// Collections the dashboard and reports are computed from.
///
/// `activities` is `None` when the activity log could not be read.
#[derive(Debug, Default)]
pub struct FleetSnapshot {
    // ---
    pub students: Vec<Student>,
    pub faculty: Vec<Faculty>,
    pub buses: Vec<Bus>,
    pub drivers: Vec<Driver>,
    pub routes: Vec<Route>,
    pub fees: Vec<FeeRecord>,
    pub attendance: Vec<AttendanceRecord>,
    pub activities: Option<Vec<ActivityEntry>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    // ---
    pub total_students: usize,
    pub faculty_users: usize,
    pub active_buses: usize,
    pub total_drivers: usize,
    pub attendance_percentage: f64,
    pub fee_collection_rate: f64,
    pub active_routes: usize,
    pub pending_fees: Decimal,
    pub recent_activities: Vec<ActivityItem>,
    pub monthly_trends: Vec<MonthlyTrend>,
}

pub fn dashboard(snapshot: &FleetSnapshot, now: DateTime<Utc>) -> DashboardMetrics {
    // ---
    let fees = fee_stats(&snapshot.fees);
    let attendance_percentage = attendance_percentage(&snapshot.attendance, now.date_naive());

    let recent_activities = match &snapshot.activities {
        Some(entries) => {
            let mut feed = format_feed(entries, now);
            feed.truncate(RECENT_ACTIVITY_COUNT);
            feed
        }
        None => placeholder_feed(),
    };

    DashboardMetrics {
        total_students: snapshot.students.len(),
        faculty_users: snapshot.faculty.len(),
        active_buses: snapshot
            .buses
            .iter()
            .filter(|b| b.status == BusStatus::Active)
            .count(),
        total_drivers: snapshot.drivers.len(),
        attendance_percentage,
        fee_collection_rate: fees.collection_rate,
        active_routes: snapshot
            .routes
            .iter()
            .filter(|r| r.status == ActiveStatus::Active)
            .count(),
        pending_fees: fees.pending,
        recent_activities,
        monthly_trends: monthly_trends(now, attendance_percentage, fees.collection_rate),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::RiderType;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 9, 0, 0).unwrap()
    }

    fn fee(id: &str, amount: i64, paid: bool) -> FeeRecord {
        // ---
        FeeRecord {
            id: id.into(),
            rider_id: format!("rider-{id}"),
            rider_name: "Rider".into(),
            amount: Decimal::new(amount, 0),
            due_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            payment_status: if paid { PaymentStatus::Paid } else { PaymentStatus::Pending },
            payment_date: paid.then(|| NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()),
            payment_mode: None,
            route_id: None,
        }
    }

    fn attendance(date: NaiveDate, status: AttendanceStatus) -> AttendanceRecord {
        // ---
        AttendanceRecord {
            id: "a".into(),
            date,
            entity_type: RiderType::Student,
            entity_id: "s1".into(),
            entity_name: "S".into(),
            route_id: Some("R1".into()),
            bus_number: None,
            status,
            remarks: None,
        }
    }

    #[test]
    fn test_fee_stats_half_paid() {
        // ---
        let stats = fee_stats(&[fee("1", 100, true), fee("2", 100, false)]);
        assert_eq!(stats.collection_rate, 50.0);
        assert_eq!(stats.pending, Decimal::new(100, 0));
        assert_eq!(stats.total, Decimal::new(200, 0));
    }

    #[test]
    fn test_fee_rate_zero_total() {
        assert_eq!(fee_stats(&[]).collection_rate, 0.0);
    }

    #[test]
    fn test_fee_rate_non_decreasing_as_payments_arrive() {
        // ---
        let mut fees: Vec<FeeRecord> = (0..5).map(|i| fee(&i.to_string(), 70 + i, false)).collect();
        let mut last = fee_stats(&fees).collection_rate;
        for i in 0..fees.len() {
            fees[i].payment_status = PaymentStatus::Paid;
            let rate = fee_stats(&fees).collection_rate;
            assert!(rate >= last, "{rate} < {last}");
            last = rate;
        }
        assert_eq!(last, 100.0);
    }

    #[test]
    fn test_attendance_only_counts_today() {
        // ---
        let today = now().date_naive();
        let yesterday = today.pred_opt().unwrap();
        let records = vec![
            attendance(today, AttendanceStatus::Present),
            attendance(today, AttendanceStatus::Present),
            attendance(today, AttendanceStatus::Absent),
            attendance(yesterday, AttendanceStatus::Absent),
        ];
        assert_eq!(attendance_percentage(&records, today), 66.7);
        assert_eq!(attendance_percentage(&[], today), NEUTRAL_ATTENDANCE_PERCENTAGE);
        assert_eq!(
            attendance_percentage(&records[3..], today),
            NEUTRAL_ATTENDANCE_PERCENTAGE
        );
    }

    #[test]
    fn test_monthly_trends_end_with_live_month() {
        // ---
        let trends = monthly_trends(now(), 77.7, 55.5);
        let months: Vec<_> = trends.iter().map(|t| t.month.as_str()).collect();
        assert_eq!(months, vec!["Sep", "Oct", "Nov", "Dec", "Jan", "Feb"]);
        assert_eq!(trends[5].attendance, 77.7);
        assert_eq!(trends[5].fee_collection, 55.5);
        assert_eq!(trends[0].attendance, 88.5);
    }

    #[test]
    fn test_dashboard_uses_placeholder_when_feed_missing() {
        // ---
        let snapshot = FleetSnapshot {
            fees: vec![fee("1", 100, true), fee("2", 100, false)],
            ..Default::default()
        };
        let metrics = dashboard(&snapshot, now());
        assert_eq!(metrics.recent_activities, placeholder_feed());
        assert_eq!(metrics.fee_collection_rate, 50.0);
        assert_eq!(metrics.attendance_percentage, NEUTRAL_ATTENDANCE_PERCENTAGE);
        assert_eq!(metrics.monthly_trends.len(), 6);
    }
}
