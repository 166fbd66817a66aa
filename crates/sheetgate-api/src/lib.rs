//! SheetGate API
//!
//! Wires the Tenant Registry, Connection Pool, Batch Coordinator, and Cache
//! into one process and exposes the health/admin/metrics HTTP surface
//! described in the external interfaces section. There is no business
//! (row-level) HTTP surface here -- that belongs to whatever product calls
//! SheetGate as a library; this crate only exposes SheetGate's own
//! operability endpoints.

pub mod error_response;
pub mod metrics;
pub mod routes;
pub mod signing;
pub mod state;

pub use state::{AppConfig, AppState};
