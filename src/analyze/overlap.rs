//! Min/max range overlap detection.
//!
//! Two files overlap when their closed `[min, max]` intervals intersect on at
//! least one indexed column. The detector reports, per partition, the files
//! that overlap another file of the same partition, and globally, the
//! partitions that overlap another partition.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::debug;

use crate::record::{ColumnBounds, FileRecord, IndexedColumn, PartitionKey};

#[derive(Error, Debug)]
pub enum OverlapError {
    #[error("Overlap worker failed: {0}")]
    Worker(#[from] JoinError),
}

/// True iff `a` and `b` intersect on at least one indexed column.
///
/// A column missing from either side does not take part in the test.
pub fn overlaps(a: &FileRecord, b: &FileRecord) -> bool {
    IndexedColumn::ALL
        .iter()
        .any(|column| match (a.bounds(*column), b.bounds(*column)) {
            (Some(x), Some(y)) => x.intersects(y),
            _ => false,
        })
}

/// Per-column bounding range of a set of files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    bounds: [Option<ColumnBounds>; 3],
}

impl Envelope {
    pub fn of<'a>(files: impl IntoIterator<Item = &'a FileRecord>) -> Self {
        let mut envelope = Envelope::default();
        for file in files {
            for (slot, column) in envelope.bounds.iter_mut().zip(IndexedColumn::ALL) {
                if let Some(bounds) = file.bounds(column) {
                    *slot = Some(match slot.take() {
                        Some(mut existing) => {
                            existing.extend(bounds);
                            existing
                        }
                        None => bounds.clone(),
                    });
                }
            }
        }
        envelope
    }

    pub fn bounds(&self, column: IndexedColumn) -> Option<&ColumnBounds> {
        IndexedColumn::ALL
            .iter()
            .position(|c| *c == column)
            .and_then(|i| self.bounds[i].as_ref())
    }

    /// Same OR predicate as [`overlaps`]. When this is false, no file of one
    /// side can overlap a file of the other.
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.bounds
            .iter()
            .zip(other.bounds.iter())
            .any(|pair| match pair {
                (Some(x), Some(y)) => x.intersects(y),
                _ => false,
            })
    }
}

/// Overlap figures of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionOverlap {
    pub partition: PartitionKey,
    pub file_count: usize,
    /// Distinct files overlapping at least one other file of the partition.
    pub overlapping_file_count: usize,
    /// Unordered overlapping file pairs.
    pub overlapping_pairs: usize,
    /// Sorted names of the overlapping files.
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapReport {
    /// One entry per partition, ordered by key; partitions without overlap report 0.
    pub partitions: Vec<PartitionOverlap>,
    /// Distinct partitions overlapping at least one file of another partition.
    pub overlapping_partition_count: usize,
    pub overlapping_partitions: Vec<PartitionKey>,
    /// Partition pairs whose files were compared pairwise.
    pub compared_partition_pairs: usize,
    /// Partition pairs skipped because their envelopes are disjoint.
    pub pruned_partition_pairs: usize,
    /// Files without a partition value, left out of both passes.
    pub excluded_files: usize,
}

impl OverlapReport {
    pub fn partition(&self, key: &PartitionKey) -> Option<&PartitionOverlap> {
        self.partitions.iter().find(|p| &p.partition == key)
    }
}

#[derive(Debug, Default, PartialEq)]
struct FileOutcome {
    files: BTreeSet<String>,
    pairs: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairOutcome {
    Pruned,
    Disjoint,
    Overlapping,
}

/// Records grouped by partition, as indices into the record slice.
#[derive(Debug)]
struct Partitioned {
    groups: Vec<(PartitionKey, Vec<usize>)>,
    envelopes: Vec<Envelope>,
    excluded: usize,
}

impl Partitioned {
    fn new(records: &[FileRecord]) -> Self {
        let mut grouped: BTreeMap<&PartitionKey, Vec<usize>> = BTreeMap::new();
        let mut excluded = 0;
        for (index, record) in records.iter().enumerate() {
            match record.partition() {
                Some(key) => grouped.entry(key).or_default().push(index),
                None => excluded += 1,
            }
        }

        let groups: Vec<(PartitionKey, Vec<usize>)> = grouped
            .into_iter()
            .map(|(key, indices)| (key.clone(), indices))
            .collect();
        let envelopes = groups
            .iter()
            .map(|(_, indices)| Envelope::of(indices.iter().map(|i| &records[*i])))
            .collect();

        Self {
            groups,
            envelopes,
            excluded,
        }
    }

    /// Every unordered pair is visited once and both sides are recorded, so
    /// the result does not depend on which side of a pair is read.
    fn file_pass(&self, records: &[FileRecord], group: usize) -> FileOutcome {
        let indices = &self.groups[group].1;
        let mut outcome = FileOutcome::default();
        for (n, &i) in indices.iter().enumerate() {
            for &j in &indices[n + 1..] {
                let (a, b) = (&records[i], &records[j]);
                if a.file() != b.file() && overlaps(a, b) {
                    outcome.pairs += 1;
                    outcome.files.insert(a.file().to_string());
                    outcome.files.insert(b.file().to_string());
                }
            }
        }
        outcome
    }

    fn pair_pass(
        &self,
        records: &[FileRecord],
        left: usize,
        right: usize,
        prune: bool,
    ) -> PairOutcome {
        if prune && !self.envelopes[left].intersects(&self.envelopes[right]) {
            return PairOutcome::Pruned;
        }
        let left_files = &self.groups[left].1;
        let right_files = &self.groups[right].1;
        let found = left_files
            .iter()
            .any(|&i| right_files.iter().any(|&j| overlaps(&records[i], &records[j])));
        if found {
            PairOutcome::Overlapping
        } else {
            PairOutcome::Disjoint
        }
    }

    /// Pair outcomes of `left` against every later partition.
    fn pair_row(
        &self,
        records: &[FileRecord],
        left: usize,
        prune: bool,
    ) -> Vec<(usize, PairOutcome)> {
        (left + 1..self.groups.len())
            .map(|right| (right, self.pair_pass(records, left, right, prune)))
            .collect()
    }

    fn assemble(
        &self,
        mut file_outcomes: BTreeMap<usize, FileOutcome>,
        pair_outcomes: BTreeMap<(usize, usize), PairOutcome>,
    ) -> OverlapReport {
        let mut report = OverlapReport {
            excluded_files: self.excluded,
            ..Default::default()
        };

        for (group, (key, indices)) in self.groups.iter().enumerate() {
            let outcome = file_outcomes.remove(&group).unwrap_or_default();
            report.partitions.push(PartitionOverlap {
                partition: key.clone(),
                file_count: indices.len(),
                overlapping_file_count: outcome.files.len(),
                overlapping_pairs: outcome.pairs,
                files: outcome.files.into_iter().collect(),
            });
        }

        let mut overlapping: BTreeSet<usize> = BTreeSet::new();
        for ((left, right), outcome) in pair_outcomes {
            match outcome {
                PairOutcome::Pruned => report.pruned_partition_pairs += 1,
                PairOutcome::Disjoint => report.compared_partition_pairs += 1,
                PairOutcome::Overlapping => {
                    report.compared_partition_pairs += 1;
                    overlapping.insert(left);
                    overlapping.insert(right);
                }
            }
        }
        report.overlapping_partition_count = overlapping.len();
        report.overlapping_partitions = overlapping
            .into_iter()
            .map(|group| self.groups[group].0.clone())
            .collect();

        report
    }
}

/// Runs both overlap passes over an immutable snapshot of records.
#[derive(Debug, Clone)]
pub struct OverlapDetector {
    envelope_pruning: bool,
}

impl Default for OverlapDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlapDetector {
    pub fn new() -> Self {
        Self {
            envelope_pruning: true,
        }
    }

    /// Skip partition pairs whose envelopes are disjoint. Enabled by default;
    /// only the pruned/compared counters depend on it.
    pub fn with_envelope_pruning(mut self, enabled: bool) -> Self {
        self.envelope_pruning = enabled;
        self
    }

    pub fn detect(&self, records: &[FileRecord]) -> OverlapReport {
        let partitioned = Partitioned::new(records);
        let groups = partitioned.groups.len();

        let file_outcomes = (0..groups)
            .map(|group| (group, partitioned.file_pass(records, group)))
            .collect();

        let mut pair_outcomes = BTreeMap::new();
        for left in 0..groups {
            for (right, outcome) in partitioned.pair_row(records, left, self.envelope_pruning) {
                pair_outcomes.insert((left, right), outcome);
            }
        }

        let report = partitioned.assemble(file_outcomes, pair_outcomes);
        debug!(
            "Detected overlaps, partitions={}, overlapping_partitions={}, pruned_pairs={}",
            report.partitions.len(),
            report.overlapping_partition_count,
            report.pruned_partition_pairs
        );
        report
    }

    /// Same result as [`Self::detect`], computed on blocking worker tasks.
    ///
    /// Each partition's file pass and each partition's row of cross-partition
    /// comparisons is an independent unit; at most `parallelism` run at once
    /// and their outputs are merged into ordered sets.
    pub async fn detect_parallel(
        &self,
        records: Arc<[FileRecord]>,
        parallelism: usize,
    ) -> Result<OverlapReport, OverlapError> {
        let partitioned = Arc::new(Partitioned::new(&records));
        let groups = partitioned.groups.len();
        let prune = self.envelope_pruning;

        enum Unit {
            Files(usize, FileOutcome),
            Pairs(usize, Vec<(usize, PairOutcome)>),
        }

        let units = (0..groups).flat_map(|group| [(group, true), (group, false)]);
        let results: Vec<Result<Unit, JoinError>> = stream::iter(units)
            .map(|(group, file_unit)| {
                let records = Arc::clone(&records);
                let partitioned = Arc::clone(&partitioned);
                tokio::task::spawn_blocking(move || {
                    if file_unit {
                        Unit::Files(group, partitioned.file_pass(&records, group))
                    } else {
                        Unit::Pairs(group, partitioned.pair_row(&records, group, prune))
                    }
                })
            })
            .buffer_unordered(parallelism.max(1))
            .collect()
            .await;

        let mut file_outcomes = BTreeMap::new();
        let mut pair_outcomes = BTreeMap::new();
        for result in results {
            match result? {
                Unit::Files(group, outcome) => {
                    file_outcomes.insert(group, outcome);
                }
                Unit::Pairs(left, row) => {
                    for (right, outcome) in row {
                        pair_outcomes.insert((left, right), outcome);
                    }
                }
            }
        }

        let report = partitioned.assemble(file_outcomes, pair_outcomes);
        debug!(
            "Detected overlaps in parallel, parallelism={}, partitions={}, overlapping_partitions={}",
            parallelism,
            report.partitions.len(),
            report.overlapping_partition_count
        );
        Ok(report)
    }
}
