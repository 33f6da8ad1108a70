mod config;
mod error;
mod factory;
mod generic;
mod provider;

pub use config::{PATH_OPTION, StorageConfig, StorageKind};
pub use error::{StorageError, StorageResult};
pub use factory::StorageProviderFactory;
pub use generic::GenericStorageProvider;
pub use provider::{FileMetadata, StorageProvider};
pub(crate) use provider::join_path;
