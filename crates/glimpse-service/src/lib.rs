//! Glimpse Service Library
//!
//! The two entry points an upload front end calls into
//! ([`IngestService::ingest`] and [`IngestService::fetch`]), the subscriber
//! hook that drives analysis ([`AnalysisHandler`]), and the assembly that
//! wires them together ([`setup::initialize_app`]).

pub mod services;
pub mod setup;
pub mod state;
pub mod task_handlers;

pub use services::{IngestError, IngestReceipt, IngestService, NotificationStatus};
pub use state::App;
pub use task_handlers::{AnalysisHandler, PipelineError};
