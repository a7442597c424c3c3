use async_trait::async_trait;
use glimpse_core::AnalysisResult;

use crate::AnalysisError;

/// Visual analysis of an image reachable at a URL.
///
/// Implementations do not retry; retry policy belongs to the caller.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, url: &str) -> Result<AnalysisResult, AnalysisError>;
}
