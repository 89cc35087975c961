//! End-to-end scenarios driven through the `Fleet` controller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use fleetcore::activity::placeholder_feed;
use fleetcore::models::{
    ActivityEntry, AttendanceRecord, Bus, Driver, Faculty, FeeRecord, LivePosition, Route, Student,
};
use fleetcore::reports::ReportData;
use fleetcore::store::{fallback, Document, Entity, EntitySchema, Filters, StoreConnector};
use fleetcore::tracking::PositionUpdate;
use fleetcore::{
    AppError, AppResult, EntityStore, Fleet, ListParams, MemoryStore, ReprobePolicy, StoreHandle,
    StoreMode,
};

// ---

fn fields(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn sorted_keys<E: Entity>(records: &[E]) -> Vec<String> {
    let mut keys: Vec<String> = records.iter().map(|r| r.key().to_string()).collect();
    keys.sort();
    keys
}

async fn listed_keys<E: Entity>(fleet: &Fleet) -> Vec<String> {
    let page = fleet.list::<E>(&ListParams::default()).await.unwrap();
    assert_eq!(page.total, page.data.len(), "{}", E::SCHEMA.kind);
    sorted_keys(&page.data)
}

async fn memory_fleet() -> Fleet {
    let store = StoreHandle::with_store(Arc::new(MemoryStore::new()), Duration::from_secs(1)).await;
    Fleet::new(Arc::new(store))
}

struct UnreachableConnector;

#[async_trait]
impl StoreConnector for UnreachableConnector {
    async fn connect(&self) -> AppResult<Arc<dyn EntityStore>> {
        Err(AppError::StoreUnavailable("connection refused".into()))
    }
}

/// Memory store whose activity log is broken and whose listings can be slowed down.
struct UnreliableStore {
    inner: MemoryStore,
    list_delay: Option<Duration>,
}

#[async_trait]
impl EntityStore for UnreliableStore {
    // ---
    fn backend(&self) -> &'static str {
        "unreliable"
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn list(&self, schema: &'static EntitySchema, filters: &Filters) -> AppResult<Vec<Document>> {
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.list(schema, filters).await
    }

    async fn get(&self, schema: &'static EntitySchema, id: &str) -> AppResult<Option<Document>> {
        self.inner.get(schema, id).await
    }

    async fn insert(&self, schema: &'static EntitySchema, doc: Document) -> AppResult<Document> {
        self.inner.insert(schema, doc).await
    }

    async fn replace(
        &self,
        schema: &'static EntitySchema,
        id: &str,
        doc: Document,
    ) -> AppResult<Option<Document>> {
        self.inner.replace(schema, id, doc).await
    }

    async fn upsert(&self, schema: &'static EntitySchema, doc: Document) -> AppResult<Document> {
        self.inner.upsert(schema, doc).await
    }

    async fn delete(&self, schema: &'static EntitySchema, id: &str) -> AppResult<bool> {
        self.inner.delete(schema, id).await
    }

    async fn append_activity(&self, _entry: &ActivityEntry) -> AppResult<()> {
        Err(AppError::Store("relation \"activity_log\" does not exist".into()))
    }

    async fn recent_activity(&self, _limit: usize) -> AppResult<Vec<ActivityEntry>> {
        Err(AppError::Store("relation \"activity_log\" does not exist".into()))
    }
}

async fn unreliable_fleet(list_delay: Option<Duration>, timeout: Duration) -> Fleet {
    // ---
    let store = UnreliableStore {
        inner: MemoryStore::new(),
        list_delay,
    };
    let handle = StoreHandle::with_store(Arc::new(store), timeout).await;
    Fleet::new(Arc::new(handle))
}

#[tokio::test]
async fn created_bus_is_listed_as_active() {
    // ---
    let fleet = memory_fleet().await;
    let bus: Bus = fleet
        .create(fields(json!({"busNumber": "TN01", "capacity": 40})), Some("admin"))
        .await
        .unwrap();
    assert!(bus.id.starts_with("BUS-"));

    let page = fleet
        .list::<Bus>(&ListParams::default().with_filter("status", "Active"))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].bus_number, "TN01");
    assert_eq!(page.pages, 1);

    let err = fleet
        .create::<Bus>(fields(json!({"busNumber": "TN01", "capacity": 30})), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already exists"), "{err}");
}

#[tokio::test]
async fn half_paid_fees_give_fifty_percent() {
    // ---
    let fleet = memory_fleet().await;
    let mut ids = Vec::new();
    for rider in ["STU-A", "STU-B"] {
        let fee: FeeRecord = fleet
            .create(
                fields(json!({
                    "riderId": rider, "riderName": rider, "amount": 100, "dueDate": "2026-11-01"
                })),
                None,
            )
            .await
            .unwrap();
        ids.push(fee.id);
    }
    fleet
        .update::<FeeRecord>(&ids[0], fields(json!({"paymentStatus": "Paid"})), None)
        .await
        .unwrap();

    let metrics = fleet.get_metrics().await;
    assert_eq!(metrics.fee_collection_rate, 50.0);
    assert_eq!(metrics.pending_fees, Decimal::new(100, 0));

    let stats = fleet.fee_stats().await.unwrap();
    assert_eq!(stats.collected, Decimal::new(100, 0));
}

#[tokio::test]
async fn attendance_report_groups_by_route() {
    // ---
    let fleet = memory_fleet().await;
    for (i, status) in ["Present", "Present", "Present", "Absent"].iter().enumerate() {
        fleet
            .create::<AttendanceRecord>(
                fields(json!({
                    "date": "2026-10-12",
                    "entityType": "student",
                    "entityId": format!("STU-{i}"),
                    "entityName": format!("Rider {i}"),
                    "routeId": "R1",
                    "status": status,
                })),
                None,
            )
            .await
            .unwrap();
    }

    let report = fleet.generate_report("attendance").await.unwrap();
    assert_eq!(report.title, "Attendance Report");
    let ReportData::Attendance(data) = report.data else {
        panic!("expected attendance data");
    };
    assert_eq!(data.percentage, 75.0);
    assert_eq!(data.by_route.len(), 1);
    assert_eq!(data.by_route[0].route_id, "R1");
    assert_eq!((data.by_route[0].present, data.by_route[0].absent), (3, 1));
}

#[tokio::test]
async fn position_upserts_keep_one_row() {
    // ---
    let fleet = memory_fleet().await;
    let update = |lat: f64| PositionUpdate {
        bus_id: "BUS-7".into(),
        bus_number: Some("TN07".into()),
        route_id: None,
        latitude: lat,
        longitude: 80.27,
        speed: Some(22.5),
        status: None,
        driver_name: None,
    };

    let first = fleet.upsert_position(update(13.08), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = fleet.upsert_position(update(13.09), None).await.unwrap();

    let rows: Vec<LivePosition> = fleet.live_positions().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].latitude, 13.09);
    assert!(second.last_update > first.last_update);
}

#[tokio::test]
async fn live_positions_are_synthesized_from_buses() {
    // ---
    let fleet = memory_fleet().await;
    for n in 0..3 {
        fleet
            .create::<Bus>(fields(json!({"busNumber": format!("TN0{n}"), "capacity": 40})), None)
            .await
            .unwrap();
    }
    let first = fleet.live_positions().await.unwrap();
    let second = fleet.live_positions().await.unwrap();
    assert_eq!(first.len(), 3);
    for (a, b) in first.iter().zip(&second) {
        assert_eq!((a.latitude, a.longitude, a.speed), (b.latitude, b.longitude, b.speed));
    }
}

#[tokio::test]
async fn deleting_missing_record_returns_false() {
    // ---
    let fleet = memory_fleet().await;
    assert!(!fleet.delete::<Student>("STU-none", None).await.unwrap());

    let student: Student = fleet
        .create(
            fields(json!({"name": "Asha", "email": "asha@college.edu", "phone": "1"})),
            None,
        )
        .await
        .unwrap();
    assert!(fleet.delete::<Student>(&student.id, None).await.unwrap());
    assert!(matches!(
        fleet.get::<Student>(&student.id).await,
        Err(AppError::NotFound { .. })
    ));
}

#[tokio::test]
async fn listing_is_idempotent() {
    // ---
    let fleet = memory_fleet().await;
    for n in ["TN09", "TN03", "TN05"] {
        fleet
            .create::<Bus>(fields(json!({"busNumber": n, "capacity": 40})), None)
            .await
            .unwrap();
    }
    let params = ListParams::default().with_limit(2).with_page(1);
    let a = fleet.list::<Bus>(&params).await.unwrap();
    let b = fleet.list::<Bus>(&params).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.pages, 2);
    let numbers: Vec<_> = a.data.iter().map(|b| b.bus_number.as_str()).collect();
    assert_eq!(numbers, vec!["TN03", "TN05"]);
}

#[tokio::test]
async fn unreachable_store_serves_fallback_data() {
    // ---
    let build = || async {
        let handle = StoreHandle::connect(
            Arc::new(UnreachableConnector),
            ReprobePolicy::Never,
            Duration::from_secs(1),
        )
        .await;
        Fleet::new(Arc::new(handle))
    };
    let (one, two) = (build().await, build().await);
    assert_eq!(one.store_status().await.mode, StoreMode::Degraded);

    let buses = one.list::<Bus>(&ListParams::default()).await.unwrap();
    let ids: Vec<_> = buses.data.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["BUS-001", "BUS-002", "BUS-003", "BUS-004"]);
    assert_eq!(buses, two.list::<Bus>(&ListParams::default()).await.unwrap());

    let students = one.list::<Student>(&ListParams::default()).await.unwrap();
    assert_eq!(students.total, 5);
    assert_eq!(
        students,
        two.list::<Student>(&ListParams::default()).await.unwrap()
    );

    let report = one.generate_report("fees").await.unwrap();
    assert_eq!(report.title, "Fee Collection Report");
}

#[tokio::test]
async fn every_kind_lists_fallback_data_while_degraded() {
    // ---
    let fleet = Fleet::new(Arc::new(
        StoreHandle::connect(
            Arc::new(UnreachableConnector),
            ReprobePolicy::Never,
            Duration::from_secs(1),
        )
        .await,
    ));
    assert_eq!(fleet.store_status().await.mode, StoreMode::Degraded);

    assert_eq!(listed_keys::<Student>(&fleet).await, sorted_keys(&fallback::students()));
    assert_eq!(listed_keys::<Faculty>(&fleet).await, sorted_keys(&fallback::faculty()));
    assert_eq!(listed_keys::<Bus>(&fleet).await, sorted_keys(&fallback::buses()));
    assert_eq!(listed_keys::<Driver>(&fleet).await, sorted_keys(&fallback::drivers()));
    assert_eq!(listed_keys::<Route>(&fleet).await, sorted_keys(&fallback::routes()));
    assert_eq!(listed_keys::<FeeRecord>(&fleet).await, sorted_keys(&fallback::fees()));
    assert_eq!(
        listed_keys::<AttendanceRecord>(&fleet).await,
        sorted_keys(&fallback::attendance())
    );

    let drivers = fleet.list::<Driver>(&ListParams::default()).await.unwrap();
    assert!(drivers.data.iter().any(|d| d.id == "DRV-001" && d.name == "Murugan S"));
    let routes = fleet.list_routes(&ListParams::default()).await.unwrap();
    assert_eq!(routes.total, 3);
}

#[tokio::test]
async fn interval_reprobe_leaves_fallback_once_elapsed() {
    // ---
    struct RecoveringConnector(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl StoreConnector for RecoveringConnector {
        async fn connect(&self) -> AppResult<Arc<dyn EntityStore>> {
            if self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Err(AppError::StoreUnavailable("connection refused".into()))
            } else {
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }

    let handle = StoreHandle::connect(
        Arc::new(RecoveringConnector(Default::default())),
        ReprobePolicy::Interval(Duration::from_millis(200)),
        Duration::from_secs(1),
    )
    .await;
    let fleet = Fleet::new(Arc::new(handle));

    // interval not yet elapsed: still the fallback buses
    assert_eq!(fleet.list::<Bus>(&ListParams::default()).await.unwrap().total, 4);
    assert_eq!(fleet.store_status().await.mode, StoreMode::Degraded);

    tokio::time::sleep(Duration::from_millis(250)).await;
    let buses = fleet.list::<Bus>(&ListParams::default()).await.unwrap();
    assert_eq!(buses.total, 0);
    assert_eq!(fleet.store_status().await.mode, StoreMode::Healthy);
}

#[tokio::test]
async fn dashboard_degrades_when_activity_log_fails() {
    // ---
    let fleet = unreliable_fleet(None, Duration::from_secs(1)).await;

    // the mutation succeeds even though its activity entry cannot be written
    let bus: Bus = fleet
        .create(fields(json!({"busNumber": "TN01", "capacity": 40})), None)
        .await
        .unwrap();
    assert_eq!(bus.capacity, 40);

    let metrics = fleet.get_metrics().await;
    assert_eq!(metrics.recent_activities, placeholder_feed());
    assert_eq!(metrics.active_buses, 1);
    assert_eq!(fleet.recent_activity(10).await, placeholder_feed());
}

#[tokio::test]
async fn slow_store_calls_time_out() {
    // ---
    let fleet = unreliable_fleet(Some(Duration::from_millis(500)), Duration::from_millis(20)).await;

    let err = fleet.list::<Bus>(&ListParams::default()).await.unwrap_err();
    assert!(matches!(err, AppError::Timeout(20)), "{err}");

    // aggregates swallow the timeout and still answer
    let metrics = fleet.get_metrics().await;
    assert_eq!(metrics.total_students, 0);
}
