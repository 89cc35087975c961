//! Live bus positions.
//!
//! Real rows are upserted by bus id. When none exist, plausible positions are
//! synthesized around a fixed depot coordinate with offsets seeded by the bus
//! id, so the same bus always lands in the same spot. Positions are
//! illustrative, not navigationally computed.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::metrics::round1;
use crate::models::{Bus, Driver, LivePosition, MovementStatus};
use crate::store::Entity;
use crate::synthetic::seeded_rng;

// ---

pub const BASE_LATITUDE: f64 = 13.0827;
pub const BASE_LONGITUDE: f64 = 80.2707;

/// Largest spread (degrees) of a synthesized position from the base.
pub const MAX_OFFSET: f64 = 0.05;

pub const MAX_SYNTHETIC_BUSES: usize = 15;

pub const HISTORY_POINTS: usize = 20;
pub const HISTORY_STEP_MINUTES: i64 = 2;

/// Below this speed (km/h) a bus is reported as Stopped.
const STOPPED_BELOW: f64 = 5.0;

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Fields a caller may send when reporting a position.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    // ---
    pub bus_id: String,
    pub bus_number: Option<String>,
    pub route_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub status: Option<MovementStatus>,
    pub driver_name: Option<String>,
}

/// Merge an update over the existing row (if any), stamping `now`.
pub fn apply_update(
    existing: Option<LivePosition>,
    update: PositionUpdate,
    now: DateTime<Utc>,
) -> AppResult<LivePosition> {
    // ---
    let speed = update
        .speed
        .or(existing.as_ref().map(|p| p.speed))
        .unwrap_or(0.0);
    let status = update.status.unwrap_or(if speed < STOPPED_BELOW {
        MovementStatus::Stopped
    } else {
        MovementStatus::Moving
    });

    let bus_number = update
        .bus_number
        .or(existing.as_ref().map(|p| p.bus_number.clone()))
        .ok_or_else(|| AppError::validation("livePosition: busNumber is required for a new bus"))?;

    let position = LivePosition {
        bus_id: update.bus_id,
        bus_number,
        route_id: update
            .route_id
            .or(existing.as_ref().and_then(|p| p.route_id.clone())),
        latitude: update.latitude,
        longitude: update.longitude,
        speed,
        status,
        last_update: now,
        driver_name: update
            .driver_name
            .or(existing.and_then(|p| p.driver_name)),
    };
    position.validate()?;
    Ok(position)
}

/// Deterministic offset (lat, lon) for a bus.
pub fn seeded_offset(bus_id: &str) -> (f64, f64) {
    // ---
    let mut rng = seeded_rng(&["position", bus_id]);
    (
        rng.random_range(-MAX_OFFSET..MAX_OFFSET),
        rng.random_range(-MAX_OFFSET..MAX_OFFSET),
    )
}

pub fn synthetic_position(bus: &Bus, driver_name: Option<String>, now: DateTime<Utc>) -> LivePosition {
    // ---
    let (dlat, dlon) = seeded_offset(&bus.id);
    let mut rng = seeded_rng(&["speed", &bus.id]);
    let raw_speed: f64 = rng.random_range(0.0..60.0);
    let (speed, status) = if raw_speed < STOPPED_BELOW {
        (0.0, MovementStatus::Stopped)
    } else {
        (round1(raw_speed), MovementStatus::Moving)
    };

    LivePosition {
        bus_id: bus.id.clone(),
        bus_number: bus.bus_number.clone(),
        route_id: bus.route_id.clone(),
        latitude: round6(BASE_LATITUDE + dlat),
        longitude: round6(BASE_LONGITUDE + dlon),
        speed,
        status,
        last_update: now,
        driver_name,
    }
}

/// Positions for up to [`MAX_SYNTHETIC_BUSES`] buses, in the order given.
pub fn synthesize_positions(buses: &[Bus], drivers: &[Driver], now: DateTime<Utc>) -> Vec<LivePosition> {
    // ---
    buses
        .iter()
        .take(MAX_SYNTHETIC_BUSES)
        .map(|bus| {
            let driver_name = bus
                .driver_id
                .as_deref()
                .and_then(|id| drivers.iter().find(|d| d.id == id))
                .map(|d| d.name.clone());
            synthetic_position(bus, driver_name, now)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
}

/// A day's trace for one bus: 20 points from 07:30 UTC, two minutes apart.
pub fn route_history(bus_id: &str, date: NaiveDate) -> Vec<HistoryPoint> {
    // ---
    let start = date
        .and_time(NaiveTime::from_hms_opt(7, 30, 0).unwrap_or_default())
        .and_utc();
    let (dlat, dlon) = seeded_offset(bus_id);
    let day = date.to_string();
    let mut rng = seeded_rng(&["history", bus_id, &day]);

    let (mut lat, mut lon) = (BASE_LATITUDE + dlat, BASE_LONGITUDE + dlon);
    (0..HISTORY_POINTS)
        .map(|i| {
            if i > 0 {
                lat += rng.random_range(-0.002..0.002);
                lon += rng.random_range(-0.002..0.002);
            }
            HistoryPoint {
                timestamp: start + Duration::minutes(HISTORY_STEP_MINUTES * i as i64),
                latitude: round6(lat),
                longitude: round6(lon),
                speed: round1(rng.random_range(10.0..55.0)),
            }
        })
        .collect()
}
