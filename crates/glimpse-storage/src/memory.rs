//! In-process object store.
//!
//! Objects live in a map for the lifetime of the process. `store` buffers the
//! whole input before inserting, so readers only ever observe complete objects.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use glimpse_core::Location;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::io::AsyncReadExt;

use crate::keys;
use crate::traits::{ObjectReader, ObjectStore, StorageError, StorageResult, StoredObject};
use crate::StorageBackend;

#[derive(Clone)]
pub struct MemoryStorage {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
    base_url: String,
    scheme: String,
}

impl MemoryStorage {
    pub fn new(base_url: impl Into<String>, scheme: impl Into<String>) -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            base_url: base_url.into(),
            scheme: scheme.into(),
        }
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned<T>(_: T) -> StorageError {
        StorageError::Backend("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl ObjectStore for MemoryStorage {
    async fn store(&self, location: &Location, mut data: ObjectReader) -> StorageResult<u64> {
        let key = keys::storage_key(&self.scheme, location)?.to_string();

        let mut buf = Vec::new();
        data.read_to_end(&mut buf).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to read input for {}: {}", location, e))
        })?;
        drop(data);

        let size = buf.len() as u64;
        self.objects
            .write()
            .map_err(Self::poisoned)?
            .insert(key, Bytes::from(buf));

        tracing::debug!(location = %location, size_bytes = size, "Memory storage store successful");
        Ok(size)
    }

    async fn load(&self, location: &Location) -> StorageResult<StoredObject> {
        let key = keys::storage_key(&self.scheme, location)?;
        let data = self
            .objects
            .read()
            .map_err(Self::poisoned)?
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(location.to_string()))?;

        let size = data.len() as u64;
        let body = stream::once(async move { Ok::<_, StorageError>(data) });

        Ok(StoredObject::new(
            location.clone(),
            keys::fetch_url(&self.base_url, key),
            Some(size),
            Box::pin(body),
        ))
    }

    async fn exists(&self, location: &Location) -> StorageResult<bool> {
        let key = keys::storage_key(&self.scheme, location)?;
        Ok(self
            .objects
            .read()
            .map_err(Self::poisoned)?
            .contains_key(key))
    }

    fn fetch_url(&self, location: &Location) -> StorageResult<String> {
        let key = keys::storage_key(&self.scheme, location)?;
        Ok(keys::fetch_url(&self.base_url, key))
    }

    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
