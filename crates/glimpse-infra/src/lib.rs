//! Glimpse Infrastructure Library
//!
//! Shared infrastructure used by Glimpse binaries. Currently tracing
//! initialization only.

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry};
