use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

use super::actions::{Action, AddAction};
use crate::reader::{FileRecordSource, SourceError, SourceResult};
use crate::record::{BoundOrdering, FileRecord};
use crate::storage::{FileMetadata, StorageProvider, join_path};
use crate::util::retry::retry_with_max_retries;

pub const DELTA_LOG_DIR: &str = "_delta_log";
pub const DEFAULT_PARTITION_COLUMN: &str = "p";

/// Builds [`FileRecord`]s by replaying the JSON commits of a Delta table.
///
/// Commits are applied in version order: an `add` registers (or replaces) a
/// file, a `remove` drops it. The files alive after the last commit form the
/// snapshot.
#[derive(Debug)]
pub struct DeltaLogSource {
    provider: Arc<dyn StorageProvider>,
    location: String,
    partition_column: String,
    ordering: BoundOrdering,
    parallelism: usize,
    max_retries: usize,
}

impl DeltaLogSource {
    pub fn new(provider: Arc<dyn StorageProvider>, location: impl Into<String>) -> Self {
        Self {
            provider,
            location: location.into(),
            partition_column: DEFAULT_PARTITION_COLUMN.to_string(),
            ordering: BoundOrdering::default(),
            parallelism: 1,
            max_retries: 3,
        }
    }

    pub fn with_partition_column(mut self, column: impl Into<String>) -> Self {
        self.partition_column = column.into();
        self
    }

    pub fn with_bound_ordering(mut self, ordering: BoundOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Version of a commit file, `None` for anything else in the log directory.
    fn commit_version(path: &str) -> Option<u64> {
        let name = path.rsplit('/').next()?;
        let stem = name.strip_suffix(".json")?;
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok()
    }

    async fn list_commits(&self) -> SourceResult<Vec<(u64, FileMetadata)>> {
        let log_path = join_path(&self.location, DELTA_LOG_DIR);
        let entries = retry_with_max_retries(self.max_retries, "list_delta_log", || {
            self.provider.list_files(&log_path, false)
        })
        .await?;

        if entries
            .iter()
            .any(|f| f.path.ends_with(".checkpoint.parquet") || f.path.ends_with("_last_checkpoint"))
        {
            warn!(
                "Checkpoint files present in log={}, only JSON commits are replayed",
                log_path
            );
        }

        let mut commits: Vec<(u64, FileMetadata)> = entries
            .into_iter()
            .filter_map(|f| Self::commit_version(&f.path).map(|v| (v, f)))
            .collect();
        commits.sort_by_key(|(version, _)| *version);

        for (expected, (found, _)) in (0u64..).zip(commits.iter()) {
            if *found != expected {
                return Err(SourceError::IncompleteLog {
                    log: log_path,
                    expected,
                    found: *found,
                });
            }
        }
        Ok(commits)
    }

    async fn read_commit(&self, path: &str) -> SourceResult<Vec<Action>> {
        let read_start = SystemTime::now();
        let content = retry_with_max_retries(self.max_retries, "read_commit", || {
            self.provider.read_file(path)
        })
        .await?;

        // `from_slice` rejects invalid UTF-8 instead of rewriting it.
        let mut actions = Vec::new();
        for (index, line) in content.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let action: Action =
                serde_json::from_slice(line).map_err(|source| SourceError::MalformedAction {
                    commit: path.to_string(),
                    line: index + 1,
                    source,
                })?;
            actions.push(action);
        }

        debug!(
            "Read commit={}, actions={}, took={}",
            path,
            actions.len(),
            read_start.elapsed().unwrap_or_default().as_millis()
        );
        Ok(actions)
    }
}

#[async_trait]
impl FileRecordSource for DeltaLogSource {
    async fn load(&self) -> SourceResult<Vec<FileRecord>> {
        let list_start = SystemTime::now();
        let commits = self.list_commits().await?;
        info!(
            "Listed count={} commits at location={}, took={}",
            commits.len(),
            self.provider.url_from_path(&self.location),
            list_start.elapsed().unwrap_or_default().as_millis()
        );

        let replay_start = SystemTime::now();
        // `buffered` keeps commit order, which the replay depends on.
        let paths: Vec<String> = commits.iter().map(|(_, meta)| meta.path.clone()).collect();
        let commit_actions: Vec<SourceResult<Vec<Action>>> = stream::iter(paths)
            .map(|path| async move { self.read_commit(&path).await })
            .buffered(self.parallelism)
            .collect()
            .await;

        let mut live: BTreeMap<String, AddAction> = BTreeMap::new();
        for actions in commit_actions {
            for action in actions? {
                if let Some(remove) = action.remove {
                    live.remove(&remove.path);
                }
                if let Some(add) = action.add {
                    live.insert(add.path.clone(), add);
                }
            }
        }

        let records = live
            .into_values()
            .map(|add| add.into_record(&self.partition_column, self.ordering))
            .collect::<SourceResult<Vec<FileRecord>>>()?;

        info!(
            "Replayed count={} commits into count={} files, partition_column={}, ordering={}, took={}",
            commits.len(),
            records.len(),
            self.partition_column,
            self.ordering,
            replay_start.elapsed().unwrap_or_default().as_millis()
        );

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BoundValue, IndexedColumn};
    use crate::storage::GenericStorageProvider;
    use object_store::memory::InMemory;
    use object_store::path::Path;
    use object_store::{ObjectStore, PutPayload};

    fn add_line(path: &str, partition: &str, min: i64, max: i64) -> String {
        let stats = format!(
            r#"{{"numRecords":10,"minValues":{{"c1":{min}}},"maxValues":{{"c1":{max}}}}}"#
        );
        serde_json::json!({
            "add": {
                "path": path,
                "partitionValues": { "p": partition },
                "size": 100,
                "modificationTime": 0,
                "dataChange": true,
                "stats": stats,
            }
        })
        .to_string()
    }

    async fn raw_table(commits: &[(&str, Vec<u8>)]) -> Arc<dyn StorageProvider> {
        let store = Arc::new(InMemory::new());
        for (name, content) in commits {
            store
                .put(
                    &Path::from(format!("sales/_delta_log/{}", name)),
                    PutPayload::from(content.clone()),
                )
                .await
                .unwrap();
        }
        Arc::new(GenericStorageProvider::from_object_store(
            store as Arc<dyn ObjectStore>,
            "memory://",
        ))
    }

    async fn table(commits: &[(&str, Vec<String>)]) -> Arc<dyn StorageProvider> {
        let commits: Vec<(&str, Vec<u8>)> = commits
            .iter()
            .map(|(name, lines)| (*name, lines.join("\n").into_bytes()))
            .collect();
        raw_table(&commits).await
    }

    #[test]
    fn test_commit_version() {
        assert_eq!(
            DeltaLogSource::commit_version("t/_delta_log/00000000000000000012.json"),
            Some(12)
        );
        assert_eq!(
            DeltaLogSource::commit_version("t/_delta_log/00000000000000000010.checkpoint.parquet"),
            None
        );
        assert_eq!(DeltaLogSource::commit_version("t/_delta_log/_last_checkpoint"), None);
        assert_eq!(DeltaLogSource::commit_version("t/_delta_log/.json"), None);
    }

    #[tokio::test]
    async fn test_replay_applies_adds_and_removes_in_version_order() {
        let provider = table(&[
            (
                "00000000000000000001.json",
                vec![
                    r#"{"remove":{"path":"p=1/a.parquet","dataChange":true}}"#.to_string(),
                    add_line("p=1/c.parquet", "1", 5, 8),
                ],
            ),
            (
                "00000000000000000000.json",
                vec![
                    r#"{"protocol":{"minReaderVersion":1,"minWriterVersion":2}}"#.to_string(),
                    add_line("p=1/a.parquet", "1", 1, 5),
                    add_line("p=2/b.parquet", "2", 3, 4),
                ],
            ),
        ])
        .await;

        let records = DeltaLogSource::new(provider, "sales")
            .with_parallelism(4)
            .load()
            .await
            .unwrap();
        let files: Vec<&str> = records.iter().map(|r| r.file()).collect();
        assert_eq!(files, vec!["p=1/c.parquet", "p=2/b.parquet"]);
        assert_eq!(
            records[0].bounds(IndexedColumn::C1).unwrap().min(),
            &BoundValue::from(5)
        );
    }

    #[tokio::test]
    async fn test_custom_partition_column() {
        let line = serde_json::json!({
            "add": {
                "path": "day=1/a.parquet",
                "partitionValues": { "day": "2024-01-01" },
                "size": 1,
            }
        })
        .to_string();
        let provider = table(&[("00000000000000000000.json", vec![line])]).await;

        let default_column = DeltaLogSource::new(Arc::clone(&provider), "sales")
            .load()
            .await
            .unwrap();
        assert!(default_column[0].partition().is_none());

        let day = DeltaLogSource::new(provider, "sales")
            .with_partition_column("day")
            .load()
            .await
            .unwrap();
        assert_eq!(day[0].partition().map(|p| p.as_str()), Some("2024-01-01"));
    }

    #[tokio::test]
    async fn test_malformed_action_reports_commit_and_line() {
        let provider = table(&[(
            "00000000000000000000.json",
            vec![add_line("a.parquet", "1", 1, 2), "{not json".to_string()],
        )])
        .await;
        let err = DeltaLogSource::new(provider, "sales").load().await.unwrap_err();
        match err {
            SourceError::MalformedAction { commit, line, .. } => {
                assert_eq!(commit, "sales/_delta_log/00000000000000000000.json");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_log_missing_early_commits_is_rejected() {
        let provider = table(&[
            (
                "00000000000000000005.json",
                vec![add_line("p=1/a.parquet", "1", 1, 5)],
            ),
            (
                "00000000000000000006.json",
                vec![add_line("p=1/b.parquet", "1", 4, 9)],
            ),
            ("00000000000000000005.checkpoint.parquet", vec![String::new()]),
        ])
        .await;
        let err = DeltaLogSource::new(provider, "sales").load().await.unwrap_err();
        match err {
            SourceError::IncompleteLog { log, expected, found } => {
                assert_eq!(log, "sales/_delta_log");
                assert_eq!(expected, 0);
                assert_eq!(found, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_gap_in_commits_is_rejected() {
        let provider = table(&[
            (
                "00000000000000000000.json",
                vec![add_line("p=1/a.parquet", "1", 1, 5)],
            ),
            (
                "00000000000000000002.json",
                vec![add_line("p=1/b.parquet", "1", 4, 9)],
            ),
        ])
        .await;
        let err = DeltaLogSource::new(provider, "sales").load().await.unwrap_err();
        assert!(matches!(
            err,
            SourceError::IncompleteLog {
                expected: 1,
                found: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_invalid_utf8_commit_is_malformed() {
        let mut content = add_line("p=1/a.parquet", "1", 1, 5).into_bytes();
        content.push(b'\n');
        content.extend_from_slice(b"{\"add\":{\"path\":\"p=1/b\xff.parquet\",\"size\":1}}");
        let provider = raw_table(&[("00000000000000000000.json", content)]).await;

        let err = DeltaLogSource::new(provider, "sales").load().await.unwrap_err();
        match err {
            SourceError::MalformedAction { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_table_without_commits_is_empty() {
        let provider = table(&[]).await;
        let records = DeltaLogSource::new(provider, "sales").load().await.unwrap();
        assert!(records.is_empty());
    }
}
