//! Tracing initialization
//!
//! Installs a global `tracing` subscriber writing either human-readable or
//! JSON lines, filtered through `RUST_LOG`.

mod init;

pub use init::{init_telemetry, shutdown_telemetry, DEFAULT_FILTER};
