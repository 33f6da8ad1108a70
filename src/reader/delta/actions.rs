use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::reader::{SourceError, SourceResult};
use crate::record::{BoundOrdering, FileRecord, IndexedColumn, PartitionKey};

/// One line of a commit file. Only file actions matter here; every other
/// action type deserializes to an empty `Action`.
#[derive(Debug, Deserialize)]
pub(crate) struct Action {
    pub add: Option<AddAction>,
    pub remove: Option<RemoveAction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddAction {
    pub path: String,
    #[serde(default)]
    pub partition_values: HashMap<String, Option<String>>,
    pub size: u64,
    /// Per-file statistics, itself a JSON document encoded as a string.
    pub stats: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RemoveAction {
    pub path: String,
}

/// Decoded `stats` payload of an add action.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileStats {
    #[serde(default)]
    pub num_records: u64,
    #[serde(default)]
    pub min_values: HashMap<String, Value>,
    #[serde(default)]
    pub max_values: HashMap<String, Value>,
}

impl FileStats {
    fn bound(values: &HashMap<String, Value>, column: IndexedColumn) -> Option<String> {
        match values.get(column.name())? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl AddAction {
    pub fn parse_stats(&self) -> SourceResult<FileStats> {
        match self.stats.as_deref() {
            None => Ok(FileStats::default()),
            Some(raw) if raw.trim().is_empty() => Ok(FileStats::default()),
            Some(raw) => serde_json::from_str(raw).map_err(|source| SourceError::MalformedStats {
                file: self.path.clone(),
                source,
            }),
        }
    }

    pub fn into_record(
        self,
        partition_column: &str,
        ordering: BoundOrdering,
    ) -> SourceResult<FileRecord> {
        let stats = self.parse_stats()?;
        let partition = self
            .partition_values
            .get(partition_column)
            .cloned()
            .flatten()
            .map(PartitionKey::from);

        let mut builder = FileRecord::builder(self.path)
            .maybe_partition(partition)
            .size(self.size)
            .num_records(stats.num_records);

        for column in IndexedColumn::ALL {
            let min = FileStats::bound(&stats.min_values, column);
            let max = FileStats::bound(&stats.max_values, column);
            if let (Some(min), Some(max)) = (min, max) {
                builder = builder.with_raw_bounds(column, ordering, &min, &max)?;
            }
        }

        Ok(builder.build())
    }
}
