//! Glimpse Analysis Library
//!
//! The external vision API behind the [`AnalysisService`] trait, and the
//! [`AnalysisCache`] that keeps it to at most one in-flight call per URL.

pub mod cache;
pub mod error;
pub mod service;
pub mod vision;

pub use cache::AnalysisCache;
pub use error::AnalysisError;
pub use service::AnalysisService;
pub use vision::VisionClient;
