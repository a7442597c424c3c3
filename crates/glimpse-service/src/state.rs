use glimpse_analysis::{AnalysisCache, AnalysisService};
use glimpse_core::Config;
use glimpse_storage::ObjectStore;
use glimpse_worker::{InMemoryChannel, MessageChannel, NotificationSubscriber};
use std::sync::Arc;

use crate::services::IngestService;
use crate::task_handlers::AnalysisHandler;

/// A fully wired pipeline. The subscriber's worker pool runs as long as this
/// value (or a clone of `subscriber`) is alive.
pub struct App {
    pub config: Config,
    pub store: Arc<dyn ObjectStore>,
    pub channel: Arc<InMemoryChannel>,
    pub cache: Arc<AnalysisCache>,
    pub analysis: Arc<dyn AnalysisService>,
    pub ingest: IngestService,
    pub handler: Arc<AnalysisHandler>,
    pub subscriber: NotificationSubscriber,
}

impl App {
    /// Stop accepting publishes and stop the worker pool.
    pub async fn shutdown(&self) {
        self.channel.close();
        self.subscriber.shutdown().await;
        tracing::info!(
            outstanding = self.channel.outstanding(),
            dead_letters = self.channel.dead_letters().len(),
            cached_results = self.cache.len(),
            "Pipeline shut down"
        );
    }
}
