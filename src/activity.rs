//! Append-only audit trail of mutating operations.
//!
//! Entries are written after the mutation they describe has succeeded, and
//! rendered for the dashboard feed with a coarse relative time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::ActivityEntry;
use crate::store::EntityStore;

// ---

pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Render the gap between `timestamp` and `now` as "N mins/hours/days ago".
///
/// Unparsable timestamps are treated as `now`, so one bad row renders as
/// "0 mins ago" instead of failing the whole feed.
pub fn relative_time(timestamp: &str, now: DateTime<Utc>) -> String {
    // ---
    let at = DateTime::parse_from_rfc3339(timestamp)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now);

    let minutes = (now - at).num_minutes().max(0);
    if minutes < 60 {
        format!("{minutes} mins ago")
    } else if minutes < 60 * 24 {
        format!("{} hours ago", minutes / 60)
    } else {
        format!("{} days ago", minutes / (60 * 24))
    }
}

/// One line of the recent-activity feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    // ---
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub time: String,
}

pub fn format_feed(entries: &[ActivityEntry], now: DateTime<Utc>) -> Vec<ActivityItem> {
    // ---
    entries
        .iter()
        .map(|e| ActivityItem {
            id: e.id.clone(),
            kind: e.kind.clone(),
            message: e.message.clone(),
            time: relative_time(&e.timestamp, now),
        })
        .collect()
}

/// Shown in place of the live feed when the activity log cannot be read.
pub fn placeholder_feed() -> Vec<ActivityItem> {
    // ---
    let item = |id: &str, kind: &str, message: &str, time: &str| ActivityItem {
        id: id.into(),
        kind: kind.into(),
        message: message.into(),
        time: time.into(),
    };
    vec![
        item("placeholder-1", "attendance", "Morning attendance marked for Route R1", "10 mins ago"),
        item("placeholder-2", "payment", "Fee payment received from a student", "25 mins ago"),
        item("placeholder-3", "bus", "Bus TN01AB1234 departed from depot", "1 hours ago"),
        item("placeholder-4", "route", "Route R2 timings updated", "3 hours ago"),
    ]
}

pub struct ActivityLogger {
    store: Arc<dyn EntityStore>,
}

impl ActivityLogger {
    // ---
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Append one entry stamped with the current time.
    pub async fn record(
        &self,
        kind: &str,
        message: impl Into<String>,
        actor_id: Option<&str>,
        metadata: Value,
    ) -> AppResult<ActivityEntry> {
        // ---
        let entry = ActivityEntry {
            id: Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            message: message.into(),
            actor_id: actor_id.map(String::from),
            metadata,
            timestamp: Utc::now().to_rfc3339(),
        };
        self.store.append_activity(&entry).await?;
        tracing::debug!("activity [{}] {}", entry.kind, entry.message);
        Ok(entry)
    }

    /// Most recent entries, newest first.
    pub async fn recent(&self, limit: usize) -> AppResult<Vec<ActivityEntry>> {
        self.store.recent_activity(limit).await
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_relative_time_buckets() {
        // ---
        let at = |d: Duration| (now() - d).to_rfc3339();
        assert_eq!(relative_time(&at(Duration::minutes(10)), now()), "10 mins ago");
        assert_eq!(relative_time(&at(Duration::minutes(59)), now()), "59 mins ago");
        assert_eq!(relative_time(&at(Duration::minutes(60)), now()), "1 hours ago");
        assert_eq!(relative_time(&at(Duration::hours(23)), now()), "23 hours ago");
        assert_eq!(relative_time(&at(Duration::hours(24)), now()), "1 days ago");
        assert_eq!(relative_time(&at(Duration::days(9)), now()), "9 days ago");
    }

    #[test]
    fn test_unparsable_and_future_timestamps_render_as_now() {
        // ---
        assert_eq!(relative_time("not-a-date", now()), "0 mins ago");
        let future = (now() + Duration::hours(2)).to_rfc3339();
        assert_eq!(relative_time(&future, now()), "0 mins ago");
    }

    #[test]
    fn test_one_bad_entry_does_not_break_feed() {
        // ---
        let entry = |id: &str, ts: &str| ActivityEntry {
            id: id.into(),
            kind: "bus_updated".into(),
            message: "Bus updated".into(),
            actor_id: None,
            metadata: Value::Null,
            timestamp: ts.into(),
        };
        let feed = format_feed(
            &[entry("a", &(now() - Duration::hours(3)).to_rfc3339()), entry("b", "garbage")],
            now(),
        );
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].time, "3 hours ago");
        assert_eq!(feed[1].time, "0 mins ago");
    }

    #[tokio::test]
    async fn test_record_then_recent() {
        // ---
        let logger = ActivityLogger::new(Arc::new(MemoryStore::new()));
        for i in 0..12 {
            logger
                .record("bus_created", format!("Bus {i} added"), Some("admin"), json!({"i": i}))
                .await
                .unwrap();
        }
        let recent = logger.recent(DEFAULT_RECENT_LIMIT).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].actor_id.as_deref(), Some("admin"));
        assert_eq!(placeholder_feed().len(), 4);
    }
}
