//! Object store abstraction
//!
//! This module defines the ObjectStore trait that all storage backends must implement.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use glimpse_core::{Location, StorageBackend};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Location {location} is not served by this store (expected scheme '{expected}')")]
    UnsupportedScheme { expected: String, location: String },

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Errors caused by the Location itself; retrying the same Location cannot succeed.
    pub fn is_location_error(&self) -> bool {
        matches!(
            self,
            StorageError::InvalidLocation(_) | StorageError::UnsupportedScheme { .. }
        )
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Chunked object body.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Input handed to `store`. Owned so the store can guarantee it is closed.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// A loaded object: its body plus the URL external services use to fetch it.
pub struct StoredObject {
    pub location: Location,
    pub fetch_url: String,
    pub size: Option<u64>,
    body: ByteStream,
}

impl StoredObject {
    pub fn new(location: Location, fetch_url: String, size: Option<u64>, body: ByteStream) -> Self {
        Self {
            location,
            fetch_url,
            size,
            body,
        }
    }

    pub fn into_stream(self) -> ByteStream {
        self.body
    }

    /// Drain the body into a single buffer.
    pub async fn bytes(self) -> StorageResult<Bytes> {
        let mut buf = match self.size {
            Some(size) => BytesMut::with_capacity(size as usize),
            None => BytesMut::new(),
        };
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl Debug for StoredObject {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StoredObject")
            .field("location", &self.location)
            .field("fetch_url", &self.fetch_url)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Object store abstraction trait
///
/// Backends own one Location scheme. Concurrent `store`/`load` of different
/// Locations is the backend's concern; an overwrite must never leave a torn
/// object visible to `load`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store the full contents of `data` at `location`, replacing any existing
    /// object. Returns the number of bytes written.
    ///
    /// The reader is consumed and dropped on success and on failure.
    async fn store(&self, location: &Location, data: ObjectReader) -> StorageResult<u64>;

    /// Open the object at `location` for reading.
    async fn load(&self, location: &Location) -> StorageResult<StoredObject>;

    /// Check if an object exists
    async fn exists(&self, location: &Location) -> StorageResult<bool>;

    /// Fetch URL for `location` without touching the backend.
    fn fetch_url(&self, location: &Location) -> StorageResult<String>;

    /// Location scheme served by this store.
    fn scheme(&self) -> &str;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
