//! Upload-side entry points: store and announce, and serve back.

use glimpse_core::{Location, LocationError};
use glimpse_storage::{ObjectReader, ObjectStore, StorageError, StorageResult, StoredObject};
use glimpse_worker::NotificationPublisher;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Ingest failures. Only a bad hint or a failed store fail the call; a
/// failed publish is reported in the receipt instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    InvalidLocation(#[from] LocationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationStatus {
    Published(Uuid),
    /// The object is stored but no notification went out.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub location: Location,
    pub bytes: u64,
    pub notification: NotificationStatus,
}

#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn ObjectStore>,
    publisher: NotificationPublisher,
    publish_max_attempts: u32,
    publish_backoff: Duration,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        publisher: NotificationPublisher,
        publish_max_attempts: u32,
        publish_backoff: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            publish_max_attempts,
            publish_backoff,
        }
    }

    /// Store `data` at the Location named by `location_hint` and announce it.
    #[tracing::instrument(skip(self, data), fields(location = %location_hint))]
    pub async fn ingest(
        &self,
        location_hint: &str,
        data: ObjectReader,
    ) -> Result<IngestReceipt, IngestError> {
        let location = Location::parse(location_hint)?;

        let bytes = match self.store.store(&location, data).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to store uploaded object");
                return Err(e.into());
            }
        };

        let notification = match self
            .publisher
            .send_with_retry(
                location.clone(),
                self.publish_max_attempts,
                self.publish_backoff,
            )
            .await
        {
            Ok(notification) => NotificationStatus::Published(notification.id),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    size_bytes = bytes,
                    "Object stored but notification could not be published"
                );
                NotificationStatus::Failed(e.to_string())
            }
        };

        Ok(IngestReceipt {
            location,
            bytes,
            notification,
        })
    }

    /// Open a previously stored object for serving.
    pub async fn fetch(&self, location: &Location) -> StorageResult<StoredObject> {
        self.store.load(location).await
    }
}
