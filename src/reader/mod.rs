//! Sources of [`FileRecord`]s.

pub mod delta;

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

use crate::record::{FileRecord, RecordError};
use crate::storage::StorageError;

/// Data-validation and I/O failures raised while building records.
///
/// All of these surface before any overlap comparison runs.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Malformed action in commit={commit}, line={line}: {source}")]
    MalformedAction {
        commit: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed statistics for file={file}: {source}")]
    MalformedStats {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    /// Commits before `found` are gone (log retention) or one is missing, so
    /// the JSON commits alone cannot rebuild the snapshot.
    #[error("Incomplete log={log}: expected commit version={expected}, found version={found}")]
    IncompleteLog {
        log: String,
        expected: u64,
        found: u64,
    },

    #[error("Duplicate file={0}")]
    DuplicateFile(String),

    #[error("Invalid record: {0}")]
    Record(#[from] RecordError),
}

/// Result type for source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Produces the immutable snapshot of file records for one analysis run.
#[async_trait]
pub trait FileRecordSource: Send + Sync {
    async fn load(&self) -> SourceResult<Vec<FileRecord>>;
}

/// Records that are already materialized.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    records: Vec<FileRecord>,
}

impl InMemorySource {
    pub fn new(records: Vec<FileRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl FileRecordSource for InMemorySource {
    async fn load(&self) -> SourceResult<Vec<FileRecord>> {
        ensure_unique_files(&self.records)?;
        Ok(self.records.clone())
    }
}

pub(crate) fn ensure_unique_files(records: &[FileRecord]) -> SourceResult<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.file()) {
            return Err(SourceError::DuplicateFile(record.file().to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_source_returns_records() {
        let source = InMemorySource::new(vec![
            FileRecord::builder("a").partition("1").build(),
            FileRecord::builder("b").partition("1").build(),
        ]);
        let records = source.load().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].file(), "b");
    }

    #[tokio::test]
    async fn test_in_memory_source_rejects_duplicates() {
        let source = InMemorySource::new(vec![
            FileRecord::builder("a").partition("1").build(),
            FileRecord::builder("a").partition("2").build(),
        ]);
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, SourceError::DuplicateFile(f) if f == "a"));
    }

    #[tokio::test]
    async fn test_empty_source() {
        let records = InMemorySource::default().load().await.unwrap();
        assert!(records.is_empty());
    }
}
