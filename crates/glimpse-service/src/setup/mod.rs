//! Application setup and initialization
//!
//! Every component takes its collaborators as constructor arguments;
//! [`initialize_app`] builds them from [`Config`] and [`assemble`] wires them.

pub mod messaging;
pub mod storage;

use anyhow::{Context, Result};
use glimpse_analysis::{AnalysisCache, AnalysisService, VisionClient};
use glimpse_core::Config;
use glimpse_storage::ObjectStore;
use glimpse_worker::{InMemoryChannel, NotificationPublisher, NotificationSubscriber, SubscriberConfig};
use std::sync::Arc;

use crate::services::IngestService;
use crate::state::App;
use crate::task_handlers::AnalysisHandler;

/// Initialize the entire application and start the subscriber.
///
/// Must be called from within a tokio runtime.
pub async fn initialize_app(config: Config) -> Result<App> {
    let store = storage::setup_storage(&config).await?;
    let channel = messaging::setup_channel(&config)?;

    let analysis: Arc<dyn AnalysisService> = Arc::new(
        VisionClient::from_config(&config).context("Failed to initialize vision client")?,
    );
    tracing::info!(
        base_url = %config.vision_api_base_url,
        timeout_secs = config.analysis_timeout.as_secs(),
        "Vision client initialized"
    );

    Ok(assemble(config, store, channel, analysis))
}

/// Wire pre-built components into an [`App`] and start the subscriber.
pub fn assemble(
    config: Config,
    store: Arc<dyn ObjectStore>,
    channel: Arc<InMemoryChannel>,
    analysis: Arc<dyn AnalysisService>,
) -> App {
    let cache = Arc::new(AnalysisCache::from_config(&config));
    tracing::info!(
        ttl_secs = ?config.cache_ttl.map(|ttl| ttl.as_secs()),
        max_entries = ?config.cache_max_entries,
        "Analysis cache initialized"
    );

    let publisher = NotificationPublisher::new(channel.clone());
    let ingest = IngestService::new(
        store.clone(),
        publisher,
        config.publish_max_attempts,
        config.redelivery_base_backoff,
    );

    let handler = Arc::new(AnalysisHandler::new(
        store.clone(),
        cache.clone(),
        analysis.clone(),
    ));
    let subscriber = NotificationSubscriber::subscribe(
        channel.clone(),
        handler.clone(),
        SubscriberConfig::from(&config),
    );

    App {
        config,
        store,
        channel,
        cache,
        analysis,
        ingest,
        handler,
        subscriber,
    }
}
