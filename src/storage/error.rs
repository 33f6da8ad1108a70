use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
}

impl StorageError {
    /// Whether retrying the same operation may succeed.
    ///
    /// Only transport-level failures qualify; missing objects and bad
    /// configuration never recover by themselves.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::ConnectionError(_) => true,
            StorageError::IoError(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
            ),
            StorageError::ObjectStoreError(object_store::Error::Generic { source, .. }) => {
                let msg = format!("{:?}", source);
                msg.contains("ConnectionReset")
                    || msg.contains("BrokenPipe")
                    || msg.contains("Interrupted")
                    || msg.contains("TimedOut")
            }
            _ => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
