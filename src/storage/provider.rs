use async_trait::async_trait;
use object_store::path::Path as ObjectPath;
use std::fmt::{Debug, Formatter, Result as FmtResult};

use super::error::StorageResult;

/// Metadata about a file in storage
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Path of the file relative to the store root
    pub path: String,

    /// File size in bytes
    pub size: u64,
}

/// Generic trait for storage providers
///
/// This trait provides a unified interface over the object stores a table
/// can live in, so readers never touch backend specifics.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get the base path/prefix for this storage provider
    fn base_path(&self) -> &str;

    /// Validate the connection to the storage provider
    ///
    /// This performs a simple listing to ensure the location is reachable
    async fn validate_connection(&self, path: &str) -> StorageResult<()>;

    /// List all files at the given path
    ///
    /// # Arguments
    /// * `path` - The path to list files from (relative to base_path)
    /// * `recursive` - Whether to list files recursively
    async fn list_files(&self, path: &str, recursive: bool) -> StorageResult<Vec<FileMetadata>>;

    /// Read the contents of a file
    ///
    /// # Arguments
    /// * `path` - The path to the file (relative to base_path)
    async fn read_file(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Get a full provider specific URL for a path
    fn url_from_path(&self, path: &str) -> String;
}

impl Debug for dyn StorageProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "StorageProvider(base_path={})", self.base_path())
    }
}

/// Helper function to create an ObjectPath from a string
pub(crate) fn string_to_path(s: &str) -> ObjectPath {
    ObjectPath::from(s)
}

/// Joins a location and a child name into a store-relative path.
pub(crate) fn join_path(location: &str, child: &str) -> String {
    let location = location.trim_matches('/');
    if location.is_empty() {
        child.trim_start_matches('/').to_string()
    } else {
        format!("{}/{}", location, child.trim_start_matches('/'))
    }
}
