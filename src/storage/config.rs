use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use url::Url;

use super::error::{StorageError, StorageResult};

/// Option key holding the root directory of a local store.
pub const PATH_OPTION: &str = "path";

/// Backend a [`StorageConfig`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Local,
    Memory,
}

impl Display for StorageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageKind::Local => write!(f, "local"),
            StorageKind::Memory => write!(f, "memory"),
        }
    }
}

/// Storage configuration used to build a [`super::StorageProvider`].
///
/// # Examples
///
/// ```
/// use lake_overlap::storage::StorageConfig;
///
/// let config = StorageConfig::local().with_option("path", "/data/tables");
/// assert_eq!(config.option("path"), Some("/data/tables"));
/// ```
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub kind: StorageKind,
    pub options: HashMap<String, String>,
}

impl StorageConfig {
    /// Local filesystem storage. Requires the `path` option.
    pub fn local() -> Self {
        Self {
            kind: StorageKind::Local,
            options: HashMap::new(),
        }
    }

    /// Process-local in-memory storage, empty on creation.
    pub fn memory() -> Self {
        Self {
            kind: StorageKind::Memory,
            options: HashMap::new(),
        }
    }

    /// Builds a configuration from a URL such as `file:///data/tables` or `memory://`.
    pub fn from_url(url: &str) -> StorageResult<Self> {
        let parsed = Url::parse(url)?;
        match parsed.scheme() {
            "file" => {
                let path = parsed.to_file_path().map_err(|_| {
                    StorageError::ConfigError(format!("Not a local file URL: {}", url))
                })?;
                Ok(Self::local().with_option(PATH_OPTION, path.to_string_lossy()))
            }
            "memory" => Ok(Self::memory()),
            other => Err(StorageError::ConfigError(format!(
                "Unsupported storage scheme '{}' in {}",
                other, url
            ))),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(|v| v.as_str())
    }
}
