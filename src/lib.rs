//! Transport fleet operations core.
//!
//! Riders, buses, drivers, routes, fees, attendance and live bus positions,
//! kept in a primary PostgreSQL store with an in-memory fallback dataset when
//! that store cannot be reached. The [`Fleet`] controller is the entry point;
//! [`routes::router`] exposes it over HTTP.
//!
//! Module layout follows the Explicit Module Boundary Pattern (EMBP): each
//! module exposes a small surface here and keeps its helpers private.

pub mod activity;
pub mod config;
pub mod error;
pub mod fleet;
pub mod metrics;
pub mod models;
pub mod query;
pub mod reports;
pub mod routes;
pub mod schema;
pub mod store;
pub mod synthetic;
pub mod tracking;

pub use config::Config;
pub use error::{AppError, AppResult, Envelope};
pub use fleet::Fleet;
pub use query::{ListParams, Page};
pub use store::{EntityStore, MemoryStore, ReprobePolicy, StoreHandle, StoreMode};
