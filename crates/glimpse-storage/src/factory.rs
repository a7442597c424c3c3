#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-memory")]
use crate::MemoryStorage;
use crate::{ObjectStore, StorageBackend, StorageError, StorageResult};
use glimpse_core::Config;
use std::sync::Arc;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn ObjectStore>> {
    match config.storage_backend {
        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_storage_path.clone().ok_or_else(|| {
                StorageError::Config("STORAGE_BACKEND_URI has no filesystem path".to_string())
            })?;

            let storage = LocalStorage::new(
                base_path,
                config.fetch_base_url.clone(),
                config.storage_scheme.clone(),
            )
            .await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::Config(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-memory")]
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new(
            config.fetch_base_url.clone(),
            config.storage_scheme.clone(),
        ))),

        #[cfg(not(feature = "storage-memory"))]
        StorageBackend::Memory => Err(StorageError::Config(
            "Memory storage backend not available (storage-memory feature not enabled)".to_string(),
        )),
    }
}
