//! Store availability handling.
//!
//! [`StoreHandle`] is what the controller layer talks to. It tries to build the
//! primary store once at construction; when that fails it serves the fixed
//! fallback dataset instead (Degraded). Whether and when it tries the primary
//! again is governed by [`ReprobePolicy`]. Once Healthy it stays Healthy:
//! failures of individual calls are returned to the caller, they never flip
//! the handle into Degraded.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{fallback, Document, EntitySchema, EntityStore, Filters, MemoryStore};
use crate::error::{AppError, AppResult};
use crate::models::ActivityEntry;

// ---

/// Builds (or rebuilds) the primary store.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Fails with `StoreUnavailable` when the backend cannot be reached.
    async fn connect(&self) -> AppResult<Arc<dyn EntityStore>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StoreMode {
    Healthy,
    Degraded,
}

/// When a Degraded handle retries the primary store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReprobePolicy {
    /// Stay Degraded for the lifetime of the handle.
    Never,
    /// Retry before every call made while Degraded.
    NextCall,
    /// Retry at most once per interval.
    Interval(Duration),
}

impl ReprobePolicy {
    fn is_due(&self, last_probe: Instant) -> bool {
        // ---
        match self {
            ReprobePolicy::Never => false,
            ReprobePolicy::NextCall => true,
            ReprobePolicy::Interval(every) => last_probe.elapsed() >= *every,
        }
    }
}

impl FromStr for ReprobePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "never" => Ok(ReprobePolicy::Never),
            "next_call" => Ok(ReprobePolicy::NextCall),
            secs => secs
                .parse::<u64>()
                .map(|n| ReprobePolicy::Interval(Duration::from_secs(n)))
                .map_err(|_| format!("expected never, next_call or seconds, got '{s}'")),
        }
    }
}

impl fmt::Display for ReprobePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReprobePolicy::Never => write!(f, "never"),
            ReprobePolicy::NextCall => write!(f, "next_call"),
            ReprobePolicy::Interval(d) => write!(f, "every {}s", d.as_secs()),
        }
    }
}

/// Snapshot reported by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub mode: StoreMode,
    pub backend: &'static str,
    pub reprobe: String,
}

struct State {
    primary: Option<Arc<dyn EntityStore>>,
    last_probe: Instant,
}

pub struct StoreHandle {
    // ---
    connector: Option<Arc<dyn StoreConnector>>,
    fallback: Arc<MemoryStore>,
    state: RwLock<State>,
    policy: ReprobePolicy,
    timeout: Duration,
}

async fn seeded_fallback() -> Arc<MemoryStore> {
    // ---
    let store = MemoryStore::new();
    if let Err(e) = fallback::load_into(&store).await {
        warn!("Fallback dataset could not be loaded: {}", e);
    }
    Arc::new(store)
}

impl StoreHandle {
    // ---
    /// Attempt the primary store once; fall back to the sample dataset on failure.
    pub async fn connect(
        connector: Arc<dyn StoreConnector>,
        policy: ReprobePolicy,
        timeout: Duration,
    ) -> Self {
        // ---
        let primary = match connector.connect().await {
            Ok(store) => {
                info!("Primary store '{}' ready", store.backend());
                Some(store)
            }
            Err(e) => {
                warn!("Primary store unavailable, serving fallback data: {}", e);
                None
            }
        };

        StoreHandle {
            connector: Some(connector),
            fallback: seeded_fallback().await,
            state: RwLock::new(State {
                primary,
                last_probe: Instant::now(),
            }),
            policy,
            timeout,
        }
    }

    /// A handle with no primary configured at all. Always Degraded.
    pub async fn fallback_only() -> Self {
        // ---
        warn!("No primary store configured, serving fallback data");
        StoreHandle {
            connector: None,
            fallback: seeded_fallback().await,
            state: RwLock::new(State {
                primary: None,
                last_probe: Instant::now(),
            }),
            policy: ReprobePolicy::Never,
            timeout: Duration::from_secs(5),
        }
    }

    /// Wrap an already-built store, e.g. a test double.
    pub async fn with_store(store: Arc<dyn EntityStore>, timeout: Duration) -> Self {
        // ---
        StoreHandle {
            connector: None,
            fallback: seeded_fallback().await,
            state: RwLock::new(State {
                primary: Some(store),
                last_probe: Instant::now(),
            }),
            policy: ReprobePolicy::Never,
            timeout,
        }
    }

    pub async fn mode(&self) -> StoreMode {
        if self.state.read().await.primary.is_some() {
            StoreMode::Healthy
        } else {
            StoreMode::Degraded
        }
    }

    pub async fn status(&self) -> StoreStatus {
        // ---
        let (mode, backend) = match &self.state.read().await.primary {
            Some(store) => (StoreMode::Healthy, store.backend()),
            None => (StoreMode::Degraded, self.fallback.backend()),
        };
        StoreStatus {
            mode,
            backend,
            reprobe: self.policy.to_string(),
        }
    }

    /// The store to use for the next call, re-probing the primary when due.
    async fn active(&self) -> Option<Arc<dyn EntityStore>> {
        // ---
        if let Some(primary) = &self.state.read().await.primary {
            return Some(primary.clone());
        }
        let connector = self.connector.as_ref()?;

        let mut state = self.state.write().await;
        if let Some(primary) = &state.primary {
            return Some(primary.clone());
        }
        if !self.policy.is_due(state.last_probe) {
            return None;
        }

        state.last_probe = Instant::now();
        match connector.connect().await {
            Ok(store) => {
                info!("Primary store '{}' recovered, leaving degraded mode", store.backend());
                state.primary = Some(store.clone());
                Some(store)
            }
            Err(e) => {
                warn!("Re-probe failed, staying degraded: {}", e);
                None
            }
        }
    }

    /// Run one operation against the active store.
    ///
    /// Primary calls are bounded by the configured timeout; fallback calls are not.
    async fn call<T, F, Fut>(&self, op: F) -> AppResult<T>
    where
        F: FnOnce(Arc<dyn EntityStore>) -> Fut + Send,
        Fut: Future<Output = AppResult<T>> + Send,
        T: Send,
    {
        // ---
        match self.active().await {
            Some(primary) => tokio::time::timeout(self.timeout, op(primary))
                .await
                .map_err(|_| AppError::Timeout(self.timeout.as_millis() as u64))?,
            None => {
                let fallback: Arc<dyn EntityStore> = self.fallback.clone();
                op(fallback).await
            }
        }
    }
}

#[async_trait]
impl EntityStore for StoreHandle {
    // ---
    fn backend(&self) -> &'static str {
        "handle"
    }

    async fn ping(&self) -> AppResult<()> {
        self.call(|s| async move { s.ping().await }).await
    }

    async fn list(
        &self,
        schema: &'static EntitySchema,
        filters: &Filters,
    ) -> AppResult<Vec<Document>> {
        self.call(|s| async move { s.list(schema, filters).await })
            .await
    }

    async fn get(&self, schema: &'static EntitySchema, id: &str) -> AppResult<Option<Document>> {
        self.call(|s| async move { s.get(schema, id).await }).await
    }

    async fn insert(&self, schema: &'static EntitySchema, doc: Document) -> AppResult<Document> {
        self.call(|s| async move { s.insert(schema, doc).await })
            .await
    }

    async fn replace(
        &self,
        schema: &'static EntitySchema,
        id: &str,
        doc: Document,
    ) -> AppResult<Option<Document>> {
        self.call(|s| async move { s.replace(schema, id, doc).await })
            .await
    }

    async fn upsert(&self, schema: &'static EntitySchema, doc: Document) -> AppResult<Document> {
        self.call(|s| async move { s.upsert(schema, doc).await })
            .await
    }

    async fn delete(&self, schema: &'static EntitySchema, id: &str) -> AppResult<bool> {
        self.call(|s| async move { s.delete(schema, id).await })
            .await
    }

    async fn append_activity(&self, entry: &ActivityEntry) -> AppResult<()> {
        self.call(|s| async move { s.append_activity(entry).await })
            .await
    }

    async fn recent_activity(&self, limit: usize) -> AppResult<Vec<ActivityEntry>> {
        self.call(|s| async move { s.recent_activity(limit).await })
            .await
    }
}
