//! Glimpse Core Library
//!
//! Value types, configuration and error classification shared by the storage,
//! messaging, analysis and service crates.

pub mod config;
pub mod error;
pub mod handler_error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, DeadLetterPolicy, LogFormat};
pub use error::ConfigError;
pub use handler_error::{HandlerError, HandlerResultExt};
pub use models::{
    AnalysisResult, Caption, Category, ColorInfo, Location, LocationError, Notification,
};
pub use storage_types::StorageBackend;
