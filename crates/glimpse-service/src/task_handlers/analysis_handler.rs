use async_trait::async_trait;
use glimpse_analysis::{AnalysisCache, AnalysisError, AnalysisService};
use glimpse_core::{AnalysisResult, HandlerError, Location, Notification};
use glimpse_storage::{ObjectStore, StorageError};
use glimpse_worker::NotificationHandler;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl PipelineError {
    /// Whether redelivering the same notification may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Storage(e) => !e.is_location_error(),
            PipelineError::Analysis(e) => e.is_transient(),
        }
    }
}

impl From<PipelineError> for HandlerError {
    fn from(err: PipelineError) -> Self {
        if err.is_transient() {
            HandlerError::transient(err)
        } else {
            HandlerError::permanent(err)
        }
    }
}

/// Subscriber hook: load the stored object, resolve its fetch URL and analyze
/// it through the cache.
pub struct AnalysisHandler {
    store: Arc<dyn ObjectStore>,
    cache: Arc<AnalysisCache>,
    service: Arc<dyn AnalysisService>,
}

impl AnalysisHandler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        cache: Arc<AnalysisCache>,
        service: Arc<dyn AnalysisService>,
    ) -> Self {
        Self {
            store,
            cache,
            service,
        }
    }

    /// Analysis result for the object at `location`, calling the vision API
    /// only if no result is cached for its fetch URL.
    #[tracing::instrument(skip(self), fields(location = %location, fetch_url = tracing::field::Empty))]
    pub async fn analyze(&self, location: &Location) -> Result<AnalysisResult, PipelineError> {
        // Loading confirms the object exists; only its fetch URL is needed.
        let object = self.store.load(location).await?;
        let fetch_url = object.fetch_url.clone();
        drop(object);

        tracing::Span::current().record("fetch_url", fetch_url.as_str());

        let service = self.service.clone();
        let url = fetch_url.clone();
        let result = self
            .cache
            .get_or_compute(&fetch_url, || async move { service.analyze(&url).await })
            .await?;
        Ok(result)
    }
}

#[async_trait]
impl NotificationHandler for AnalysisHandler {
    #[tracing::instrument(skip(self, notification), fields(notification.id = %notification.id, location = %notification.location))]
    async fn on_message(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!("Notification received");

        match self.analyze(&notification.location).await {
            Ok(result) => {
                let best = result.best_caption();
                tracing::info!(
                    caption = best.map(|c| c.text.as_str()).unwrap_or(""),
                    confidence = best.map(|c| c.confidence).unwrap_or(0.0),
                    tags = result.tags.len(),
                    "Image analyzed"
                );
                Ok(())
            }
            Err(e) => {
                let status = match &e {
                    PipelineError::Analysis(a) => a.status(),
                    PipelineError::Storage(_) => None,
                };
                tracing::error!(
                    error = %e,
                    status = ?status,
                    transient = e.is_transient(),
                    "Image analysis failed"
                );
                Err(HandlerError::from(e).into())
            }
        }
    }
}
