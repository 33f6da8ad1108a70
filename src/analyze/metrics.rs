use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use std::fmt::{Display, Formatter, Result as FmtResult};

use super::aggregate::PartitionSummary;
use super::overlap::OverlapReport;
use crate::record::BoundOrdering;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub name: String,
    /// Milliseconds since the Unix epoch.
    pub start_ms: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub table_path: String,
    pub analysis_timestamp: String,
    pub partition_column: String,
    pub bound_ordering: BoundOrdering,
    pub partitions: PartitionSummary,
    pub overlap: OverlapReport,
    pub timings: Vec<StageTiming>,
}

impl AnalysisReport {
    pub fn to_json(&self, exclude_files: bool) -> Result<String, JsonError> {
        if exclude_files {
            let mut report = self.clone();
            report
                .overlap
                .partitions
                .iter_mut()
                .for_each(|p| p.files = Vec::new());
            serde_json::to_string_pretty(&report)
        } else {
            serde_json::to_string_pretty(self)
        }
    }
}

fn format_bytes(bytes: f64) -> String {
    let size_gb = bytes / (1024.0 * 1024.0 * 1024.0);
    if size_gb >= 1.0 {
        format!("{:.2} GB", size_gb)
    } else {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    }
}

impl Display for AnalysisReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let report = self;

        writeln!(f, "\n{}", "=".repeat(60))?;
        writeln!(f, "Table Overlap Report: {}", report.table_path)?;
        writeln!(f, "Analysis Time: {}", report.analysis_timestamp)?;
        writeln!(
            f,
            "Partition Column: {}, Bound Ordering: {}",
            report.partition_column, report.bound_ordering
        )?;
        writeln!(f, "{}\n", "=".repeat(60))?;

        let summary = &report.partitions;
        writeln!(f, "📊 Key Metrics:")?;
        writeln!(f, "{}", "─".repeat(60))?;
        writeln!(f, "  Total Files:         {}", summary.total_files)?;
        writeln!(f, "  Total Records:       {}", summary.total_records)?;
        writeln!(
            f,
            "  Total Size:          {}",
            format_bytes(summary.total_size_bytes as f64)
        )?;
        writeln!(
            f,
            "  Mean Records/File:   {:.2}",
            summary.mean_records_per_file
        )?;
        writeln!(f, "  Partition Count:     {}", summary.partitions.len())?;
        if summary.unpartitioned_files > 0 {
            writeln!(f, "  Unpartitioned Files: {}", summary.unpartitioned_files)?;
        }

        writeln!(f, "\n📦 Partitions:")?;
        writeln!(f, "{}", "─".repeat(60))?;
        writeln!(
            f,
            "  {:<20} {:>8} {:>14} {:>12} {:>12}",
            "partition", "files", "records", "size", "mean size"
        )?;
        for stats in &summary.partitions {
            writeln!(
                f,
                "  {:<20} {:>8} {:>14} {:>12} {:>12}",
                stats.partition.as_str(),
                stats.file_count,
                stats.record_count_sum,
                format_bytes(stats.size_sum as f64),
                format_bytes(stats.mean_size)
            )?;
        }

        let overlap = &report.overlap;
        writeln!(f, "\n🎯 Overlapping Files per Partition:")?;
        writeln!(f, "{}", "─".repeat(60))?;
        for partition in &overlap.partitions {
            let ratio = if partition.file_count > 0 {
                partition.overlapping_file_count as f64 / partition.file_count as f64 * 100.0
            } else {
                0.0
            };
            writeln!(
                f,
                "  {:<20} {:>6} of {:>6} files ({:>5.1}%)",
                partition.partition.as_str(),
                partition.overlapping_file_count,
                partition.file_count,
                ratio
            )?;
        }

        writeln!(f, "\n🔀 Overlapping Partitions:")?;
        writeln!(f, "{}", "─".repeat(60))?;
        writeln!(
            f,
            "  Count:               {} of {}",
            overlap.overlapping_partition_count,
            overlap.partitions.len()
        )?;
        if !overlap.overlapping_partitions.is_empty() {
            let keys: Vec<&str> = overlap
                .overlapping_partitions
                .iter()
                .map(|k| k.as_str())
                .collect();
            writeln!(f, "  Partitions:          {}", keys.join(", "))?;
        }
        writeln!(
            f,
            "  Pairs Compared:      {} (pruned {})",
            overlap.compared_partition_pairs, overlap.pruned_partition_pairs
        )?;

        if !report.timings.is_empty() {
            writeln!(f, "\n⏱️  Timings:")?;
            writeln!(f, "{}", "─".repeat(60))?;
            for timing in &report.timings {
                writeln!(f, "  {}: {}ms", timing.name, timing.duration_ms)?;
            }
        }

        writeln!(f, "\n{}\n", "=".repeat(60))
    }
}
