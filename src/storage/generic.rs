use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use std::sync::Arc;
use tracing::debug;

use super::config::{PATH_OPTION, StorageConfig, StorageKind};
use super::error::{StorageError, StorageResult};
use super::provider::{FileMetadata, StorageProvider, string_to_path};

/// [`StorageProvider`] backed by any `object_store` implementation.
pub struct GenericStorageProvider {
    store: Arc<dyn ObjectStore>,
    base_path: String,
    base_url: String,
}

impl GenericStorageProvider {
    pub async fn new(config: StorageConfig) -> StorageResult<Self> {
        match config.kind {
            StorageKind::Local => {
                let path = config.option(PATH_OPTION).ok_or_else(|| {
                    StorageError::ConfigError(format!(
                        "Local storage requires the '{}' option",
                        PATH_OPTION
                    ))
                })?;
                let store = LocalFileSystem::new_with_prefix(path)?;
                let base_path = path.trim_end_matches('/').to_string();
                Ok(Self {
                    store: Arc::new(store),
                    base_url: format!("file://{}", base_path),
                    base_path,
                })
            }
            StorageKind::Memory => Ok(Self::from_object_store(
                Arc::new(InMemory::new()),
                "memory://",
            )),
        }
    }

    /// Wraps an already constructed store, e.g. a pre-populated [`InMemory`].
    pub fn from_object_store(store: Arc<dyn ObjectStore>, base_url: &str) -> Self {
        Self {
            store,
            base_path: String::new(),
            base_url: base_url.to_string(),
        }
    }

    fn prefix(path: &str) -> Option<object_store::path::Path> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            None
        } else {
            Some(string_to_path(trimmed))
        }
    }
}

#[async_trait]
impl StorageProvider for GenericStorageProvider {
    fn base_path(&self) -> &str {
        &self.base_path
    }

    async fn validate_connection(&self, path: &str) -> StorageResult<()> {
        let prefix = Self::prefix(path);
        self.store
            .list_with_delimiter(prefix.as_ref())
            .await
            .map_err(|e| {
                StorageError::ConnectionError(format!(
                    "Unable to list location={} at base={}: {}",
                    path, self.base_url, e
                ))
            })?;
        Ok(())
    }

    async fn list_files(&self, path: &str, recursive: bool) -> StorageResult<Vec<FileMetadata>> {
        let prefix = Self::prefix(path);
        let objects = if recursive {
            self.store
                .list(prefix.as_ref())
                .try_collect::<Vec<_>>()
                .await?
        } else {
            self.store
                .list_with_delimiter(prefix.as_ref())
                .await?
                .objects
        };

        debug!("Listed path={}, recursive={}, count={}", path, recursive, objects.len());

        Ok(objects
            .into_iter()
            .map(|meta| FileMetadata {
                path: meta.location.to_string(),
                size: meta.size as u64,
            })
            .collect())
    }

    async fn read_file(&self, path: &str) -> StorageResult<Vec<u8>> {
        let bytes = self.store.get(&string_to_path(path)).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    fn url_from_path(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            self.base_url.clone()
        } else if self.base_url.ends_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}
