use crate::analyze::aggregate::PartitionAggregator;
use crate::analyze::metrics::{AnalysisReport, StageTiming};
use crate::analyze::overlap::OverlapDetector;
use crate::reader::FileRecordSource;
use crate::reader::delta::{DEFAULT_PARTITION_COLUMN, DeltaLogSource};
use crate::record::{BoundOrdering, FileRecord};
use crate::storage::{StorageConfig, StorageProvider, StorageProviderFactory};
use std::error::Error;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Builder for constructing an `Analyzer` instance.
///
/// # Examples
///
/// ```no_run
/// use lake_overlap::analyze::Analyzer;
/// use lake_overlap::record::BoundOrdering;
/// use lake_overlap::storage::StorageConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
/// let storage_config = StorageConfig::local().with_option("path", "/path/to/data");
///
/// let analyzer = Analyzer::builder(storage_config)
///     .with_parallelism(10)
///     .with_bound_ordering(BoundOrdering::Lexicographic)
///     .build()
///     .await?;
/// let report = analyzer.analyze("sales").await?;
/// println!("{}", report);
/// # Ok(())
/// # }
/// ```
pub struct AnalyzerBuilder {
    config: StorageConfig,
    storage_provider: Option<Arc<dyn StorageProvider>>,
    parallelism: Option<usize>,
    bound_ordering: BoundOrdering,
    partition_column: String,
    max_retries: usize,
}

impl AnalyzerBuilder {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            storage_provider: None,
            parallelism: None,
            bound_ordering: BoundOrdering::default(),
            partition_column: DEFAULT_PARTITION_COLUMN.to_string(),
            max_retries: 3,
        }
    }

    /// Sets the number of concurrent commit reads and overlap workers.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    pub fn with_bound_ordering(mut self, ordering: BoundOrdering) -> Self {
        self.bound_ordering = ordering;
        self
    }

    pub fn with_partition_column(mut self, column: impl Into<String>) -> Self {
        self.partition_column = column.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Uses an existing provider instead of building one from the config.
    pub fn with_storage_provider(mut self, provider: Arc<dyn StorageProvider>) -> Self {
        self.storage_provider = Some(provider);
        self
    }

    /// Builds the `Analyzer` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage provider cannot be initialized.
    pub async fn build(self) -> Result<Analyzer, Box<dyn Error + Send + Sync>> {
        let storage_provider = match self.storage_provider {
            Some(provider) => provider,
            None => StorageProviderFactory::from_config(self.config).await?,
        };
        Ok(Analyzer {
            storage_provider,
            parallelism: self.parallelism.unwrap_or(1).max(1),
            bound_ordering: self.bound_ordering,
            partition_column: self.partition_column,
            max_retries: self.max_retries,
        })
    }
}

pub struct Analyzer {
    storage_provider: Arc<dyn StorageProvider>,
    parallelism: usize,
    bound_ordering: BoundOrdering,
    partition_column: String,
    max_retries: usize,
}

fn push_timing(
    timings: &mut Vec<StageTiming>,
    name: &str,
    start: SystemTime,
) -> Result<u128, Box<dyn Error + Send + Sync>> {
    let duration = start.elapsed()?;
    timings.push(StageTiming {
        name: name.to_string(),
        start_ms: u64::try_from(start.duration_since(UNIX_EPOCH)?.as_millis())
            .unwrap_or(u64::MAX),
        duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
    });
    Ok(duration.as_millis())
}

impl Analyzer {
    pub fn builder(config: StorageConfig) -> AnalyzerBuilder {
        AnalyzerBuilder::new(config)
    }

    /// Analyzes the Delta table at `location`, relative to the storage root.
    pub async fn analyze(
        &self,
        location: &str,
    ) -> Result<AnalysisReport, Box<dyn Error + Send + Sync>> {
        let mut timings = Vec::new();

        let validate_connection_start = SystemTime::now();
        self.storage_provider.validate_connection(location).await?;
        let took = push_timing(
            &mut timings,
            "validate_connection_dur",
            validate_connection_start,
        )?;
        info!("Validated connection, took={}", took);

        let table_path = self.storage_provider.url_from_path(location);
        info!(
            "Analyzing, table_path={}, parallelism={}",
            table_path, self.parallelism
        );

        let source = DeltaLogSource::new(Arc::clone(&self.storage_provider), location)
            .with_partition_column(self.partition_column.clone())
            .with_bound_ordering(self.bound_ordering)
            .with_parallelism(self.parallelism)
            .with_max_retries(self.max_retries);

        let mut report = self.analyze_source(&table_path, &source).await?;
        timings.append(&mut report.timings);
        report.timings = timings;
        Ok(report)
    }

    /// Loads records from any source and runs both analyses over them.
    pub async fn analyze_source(
        &self,
        table_path: &str,
        source: &dyn FileRecordSource,
    ) -> Result<AnalysisReport, Box<dyn Error + Send + Sync>> {
        let mut timings = Vec::new();

        let load_records_start = SystemTime::now();
        let records: Arc<[FileRecord]> = source.load().await?.into();
        let took = push_timing(&mut timings, "load_records_dur", load_records_start)?;
        info!(
            "Loaded count={} file records from table_path={}, took={}",
            records.len(),
            table_path,
            took
        );

        let aggregate_partitions_start = SystemTime::now();
        let partitions = PartitionAggregator.aggregate(&records);
        let took = push_timing(
            &mut timings,
            "aggregate_partitions_dur",
            aggregate_partitions_start,
        )?;
        info!(
            "Aggregated partitions count={}, unpartitioned_files={}, took={}",
            partitions.partitions.len(),
            partitions.unpartitioned_files,
            took
        );

        let detect_overlaps_start = SystemTime::now();
        let detector = OverlapDetector::new();
        let overlap = if self.parallelism > 1 {
            detector
                .detect_parallel(Arc::clone(&records), self.parallelism)
                .await?
        } else {
            detector.detect(&records)
        };
        let took = push_timing(&mut timings, "detect_overlaps_dur", detect_overlaps_start)?;
        info!(
            "Detected overlapping_partitions={}, compared_pairs={}, pruned_pairs={}, took={}",
            overlap.overlapping_partition_count,
            overlap.compared_partition_pairs,
            overlap.pruned_partition_pairs,
            took
        );

        Ok(AnalysisReport {
            table_path: table_path.to_string(),
            analysis_timestamp: chrono::Utc::now().to_rfc3339(),
            partition_column: self.partition_column.clone(),
            bound_ordering: self.bound_ordering,
            partitions,
            overlap,
            timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_timing_records_stage() {
        let mut timings = Vec::new();
        let start = SystemTime::now();
        let took = push_timing(&mut timings, "load_records_dur", start).unwrap();
        assert_eq!(timings.len(), 1);
        assert_eq!(timings[0].name, "load_records_dur");
        assert_eq!(u128::from(timings[0].duration_ms), took);
        assert_eq!(
            u128::from(timings[0].start_ms),
            start.duration_since(UNIX_EPOCH).unwrap().as_millis()
        );
    }
    use crate::reader::InMemorySource;
    use crate::record::{IndexedColumn, PartitionKey};

    fn records() -> Vec<FileRecord> {
        let file = |name: &str, partition: &str, min: i64, max: i64| {
            FileRecord::builder(name)
                .partition(partition)
                .size(100)
                .num_records(10)
                .with_bounds(IndexedColumn::C1, min, max)
                .unwrap()
                .build()
        };
        vec![
            file("A", "P1", 1, 5),
            file("B", "P1", 4, 9),
            file("C", "P1", 20, 25),
            file("D", "P2", 7, 15),
            file("E", "P3", 100, 110),
        ]
    }

    async fn analyzer(parallelism: usize) -> Analyzer {
        Analyzer::builder(StorageConfig::memory())
            .with_parallelism(parallelism)
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_analyze_source() {
        let analyzer = analyzer(1).await;
        let source = InMemorySource::new(records());
        let report = analyzer.analyze_source("memory://t", &source).await.unwrap();

        assert_eq!(report.partitions.total_files, 5);
        assert_eq!(report.partitions.mean_records_per_file, 10.0);
        let p1 = report.overlap.partition(&PartitionKey::new("P1")).unwrap();
        assert_eq!(p1.overlapping_file_count, 2);
        assert_eq!(report.overlap.overlapping_partition_count, 2);
        assert_eq!(
            report.overlap.overlapping_partitions,
            vec![PartitionKey::new("P1"), PartitionKey::new("P2")]
        );
        let names: Vec<&str> = report.timings.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["load_records_dur", "aggregate_partitions_dur", "detect_overlaps_dur"]
        );
    }

    #[tokio::test]
    async fn test_parallel_analyzer_matches_sequential() {
        let source = InMemorySource::new(records());
        let sequential = analyzer(1).await.analyze_source("t", &source).await.unwrap();
        let parallel = analyzer(4).await.analyze_source("t", &source).await.unwrap();
        assert_eq!(sequential.overlap, parallel.overlap);
        assert_eq!(sequential.partitions, parallel.partitions);
    }

    #[tokio::test]
    async fn test_duplicate_files_fail_before_comparison() {
        let mut records = records();
        records.push(records[0].clone());
        let err = analyzer(1)
            .await
            .analyze_source("t", &InMemorySource::new(records))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("Duplicate file=A"));
    }

    #[tokio::test]
    async fn test_analyze_empty_memory_table() {
        let report = analyzer(2).await.analyze("sales").await.unwrap();
        assert_eq!(report.table_path, "memory://sales");
        assert_eq!(report.partitions.total_files, 0);
        assert!(report.overlap.partitions.is_empty());
        assert_eq!(report.timings[0].name, "validate_connection_dur");
    }
}
