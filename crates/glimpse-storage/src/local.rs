use crate::keys;
use crate::traits::{ObjectReader, ObjectStore, StorageError, StorageResult, StoredObject};
use crate::StorageBackend;
use async_trait::async_trait;
use futures::StreamExt;
use glimpse_core::Location;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Local filesystem storage implementation
///
/// Writes go to a hidden temporary file next to the target and are renamed
/// into place once synced, so a failed `store` never leaves a partial object
/// under the final name.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
    scheme: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for objects (e.g., "/var/lib/glimpse")
    /// * `base_url` - Base URL the objects are served from (e.g., "http://localhost:3000/media")
    /// * `scheme` - Location scheme this store answers for (e.g., "blob")
    pub async fn new(
        base_path: impl Into<PathBuf>,
        base_url: String,
        scheme: impl Into<String>,
    ) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::Config(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
            scheme: scheme.into(),
        })
    }

    /// Convert a Location to a filesystem path under the base directory.
    fn location_to_path(&self, location: &Location) -> StorageResult<PathBuf> {
        let key = keys::storage_key(&self.scheme, location)?;

        // Location parsing already rejects these; checked again because the
        // path is about to touch the filesystem.
        if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
            return Err(StorageError::InvalidLocation(location.to_string()));
        }

        Ok(self.base_path.join(key))
    }

    fn temp_path_for(path: &Path) -> PathBuf {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.{}.part", file_name, Uuid::new_v4()))
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn write_temp(temp_path: &Path, mut data: ObjectReader) -> StorageResult<u64> {
        let mut file = fs::File::create(temp_path).await.map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to create file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        let bytes_copied = tokio::io::copy(&mut data, &mut file).await.map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to write stream to file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to sync file {}: {}",
                temp_path.display(),
                e
            ))
        })?;

        Ok(bytes_copied)
    }
}

#[async_trait]
impl ObjectStore for LocalStorage {
    async fn store(&self, location: &Location, data: ObjectReader) -> StorageResult<u64> {
        let path = self.location_to_path(location)?;
        let start = std::time::Instant::now();

        self.ensure_parent_dir(&path).await?;

        let temp_path = Self::temp_path_for(&path);
        let written = match Self::write_temp(&temp_path, data).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::WriteFailed(format!(
                "Failed to move {} into place: {}",
                path.display(),
                e
            )));
        }

        tracing::info!(
            path = %path.display(),
            location = %location,
            size_bytes = written,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage store successful"
        );

        Ok(written)
    }

    async fn load(&self, location: &Location) -> StorageResult<StoredObject> {
        let path = self.location_to_path(location)?;

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(location.to_string()));
            }
            Err(e) => {
                return Err(StorageError::ReadFailed(format!(
                    "Failed to open file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let size = file.metadata().await.ok().map(|meta| meta.len());
        let fetch_url = self.fetch_url(location)?;

        let path_display = path.display().to_string();
        let body = tokio_util::io::ReaderStream::new(file).map(move |chunk| {
            chunk.map_err(|e| {
                tracing::error!(path = %path_display, error = %e, "Local storage read error");
                StorageError::ReadFailed(format!("Failed to read chunk: {}", e))
            })
        });

        tracing::debug!(
            path = %path.display(),
            location = %location,
            size_bytes = ?size,
            "Local storage load opened"
        );

        Ok(StoredObject::new(
            location.clone(),
            fetch_url,
            size,
            Box::pin(body),
        ))
    }

    async fn exists(&self, location: &Location) -> StorageResult<bool> {
        let path = self.location_to_path(location)?;
        Ok(fs::try_exists(&path).await?)
    }

    fn fetch_url(&self, location: &Location) -> StorageResult<String> {
        let key = keys::storage_key(&self.scheme, location)?;
        Ok(keys::fetch_url(&self.base_url, key))
    }

    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
