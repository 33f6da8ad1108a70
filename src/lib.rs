pub mod analyze;
pub mod reader;
pub mod record;
pub mod storage;
pub mod util;

pub use analyze::Analyzer;
pub use record::{BoundOrdering, FileRecord};
pub use storage::StorageConfig;
