use anyhow::{Context, Result};
use glimpse_core::Config;
use glimpse_storage::{create_storage, ObjectStore};
use std::sync::Arc;

pub async fn setup_storage(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    let storage = create_storage(config)
        .await
        .context("Failed to initialize object store")?;

    tracing::info!(
        backend = %storage.backend_type(),
        scheme = storage.scheme(),
        fetch_base_url = %config.fetch_base_url,
        "Object store initialized"
    );

    Ok(storage)
}
