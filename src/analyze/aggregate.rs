use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::record::{FileRecord, PartitionKey};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub partition: PartitionKey,
    pub file_count: usize,
    pub record_count_sum: u64,
    pub size_sum: u64,
    pub mean_size: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub partitions: Vec<PartitionStats>,
    pub total_files: usize,
    pub total_records: u64,
    pub total_size_bytes: u64,
    /// Mean record count per file over every file, partitioned or not.
    pub mean_records_per_file: f64,
    /// Files without a partition value; they only count toward the totals.
    pub unpartitioned_files: usize,
}

impl PartitionSummary {
    pub fn partition(&self, key: &PartitionKey) -> Option<&PartitionStats> {
        self.partitions.iter().find(|p| &p.partition == key)
    }
}

/// Per-partition record and size reductions.
#[derive(Debug, Default, Clone, Copy)]
pub struct PartitionAggregator;

impl PartitionAggregator {
    pub fn aggregate(&self, records: &[FileRecord]) -> PartitionSummary {
        let mut summary = PartitionSummary::default();
        let mut partition_map: BTreeMap<&PartitionKey, PartitionStats> = BTreeMap::new();

        for record in records {
            summary.total_files += 1;
            summary.total_records = summary.total_records.saturating_add(record.num_records());
            summary.total_size_bytes = summary.total_size_bytes.saturating_add(record.size());

            let Some(key) = record.partition() else {
                summary.unpartitioned_files += 1;
                continue;
            };

            let stats = partition_map.entry(key).or_insert_with(|| PartitionStats {
                partition: key.clone(),
                file_count: 0,
                record_count_sum: 0,
                size_sum: 0,
                mean_size: 0.0,
            });
            stats.file_count += 1;
            stats.record_count_sum = stats.record_count_sum.saturating_add(record.num_records());
            stats.size_sum = stats.size_sum.saturating_add(record.size());
        }

        if summary.total_files > 0 {
            summary.mean_records_per_file =
                summary.total_records as f64 / summary.total_files as f64;
        }

        summary.partitions = partition_map
            .into_values()
            .map(|mut stats| {
                if stats.file_count > 0 {
                    stats.mean_size = stats.size_sum as f64 / stats.file_count as f64;
                }
                stats
            })
            .collect();

        summary
    }
}
