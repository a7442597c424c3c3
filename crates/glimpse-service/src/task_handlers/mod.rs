//! Subscriber-side handlers.

mod analysis_handler;

pub use analysis_handler::{AnalysisHandler, PipelineError};
