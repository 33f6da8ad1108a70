use lake_overlap::analyze::{AnalysisReport, Analyzer};
use lake_overlap::record::{BoundOrdering, PartitionKey};
use lake_overlap::storage::StorageConfig;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn add(
    path: &str,
    partition: Option<&str>,
    size: u64,
    records: u64,
    c1: (&str, &str),
) -> String {
    let stats = json!({
        "numRecords": records,
        "minValues": { "c1": c1.0, "c2": "only-min", "c4": null },
        "maxValues": { "c1": c1.1 },
        "nullCount": { "c1": 0, "c2": 0, "c4": records },
    });
    json!({
        "add": {
            "path": path,
            "partitionValues": { "p": partition },
            "size": size,
            "modificationTime": 1_700_000_000_000u64,
            "dataChange": true,
            "stats": stats.to_string(),
        }
    })
    .to_string()
}

fn write_commit(table: &Path, version: u64, lines: &[String]) {
    let log = table.join("_delta_log");
    fs::create_dir_all(&log).unwrap();
    fs::write(log.join(format!("{:020}.json", version)), lines.join("\n")).unwrap();
}

/// Partition 1: a[1,5] b[4,9] c[20,25]; partition 2: d[7,8]; partition 3: e[100,110].
/// c2 has no max and c4 is null, so only c1 decides.
fn sales_table() -> TempDir {
    let dir = TempDir::new().unwrap();
    let table = dir.path().join("sales");
    write_commit(
        &table,
        0,
        &[
            json!({"protocol": {"minReaderVersion": 1, "minWriterVersion": 2}}).to_string(),
            json!({"metaData": {"id": "t", "partitionColumns": ["p"]}}).to_string(),
            add("p=1/a.parquet", Some("1"), 1000, 10, ("1", "5")),
            add("p=1/b.parquet", Some("1"), 3000, 30, ("4", "9")),
            add("p=2/d.parquet", Some("2"), 500, 5, ("7", "8")),
        ],
    );
    write_commit(
        &table,
        1,
        &[
            add("p=1/c.parquet", Some("1"), 2000, 20, ("20", "25")),
            add("p=3/e.parquet", Some("3"), 100, 1, ("100", "110")),
            add("p=3/stale.parquet", Some("3"), 100, 1, ("100", "110")),
            add("p=__HIVE_DEFAULT_PARTITION__/n.parquet", None, 10, 4, ("1", "100")),
        ],
    );
    write_commit(
        &table,
        2,
        &[json!({"remove": {"path": "p=3/stale.parquet", "dataChange": true}}).to_string()],
    );
    dir
}

async fn analyze(dir: &TempDir, ordering: BoundOrdering, parallelism: usize) -> AnalysisReport {
    let config = StorageConfig::local().with_option("path", dir.path().to_string_lossy());
    Analyzer::builder(config)
        .with_bound_ordering(ordering)
        .with_parallelism(parallelism)
        .build()
        .await
        .unwrap()
        .analyze("sales")
        .await
        .unwrap()
}

#[tokio::test]
async fn test_full_run_over_delta_log() {
    let dir = sales_table();
    let report = analyze(&dir, BoundOrdering::Natural, 1).await;

    let summary = &report.partitions;
    assert_eq!(summary.total_files, 6);
    assert_eq!(summary.unpartitioned_files, 1);
    assert_eq!(summary.mean_records_per_file, 70.0 / 6.0);
    let one = summary.partition(&PartitionKey::new("1")).unwrap();
    assert_eq!(one.file_count, 3);
    assert_eq!(one.record_count_sum, 60);
    assert_eq!(one.size_sum, 6000);
    assert_eq!(one.mean_size, 2000.0);
    assert_eq!(summary.partition(&PartitionKey::new("3")).unwrap().file_count, 1);

    let overlap = &report.overlap;
    assert_eq!(overlap.excluded_files, 1);
    let p1 = overlap.partition(&PartitionKey::new("1")).unwrap();
    assert_eq!(p1.overlapping_file_count, 2);
    assert_eq!(p1.files, vec!["p=1/a.parquet", "p=1/b.parquet"]);
    assert_eq!(overlap.partition(&PartitionKey::new("3")).unwrap().overlapping_file_count, 0);
    assert_eq!(overlap.overlapping_partition_count, 2);
    assert_eq!(
        overlap.overlapping_partitions,
        vec![PartitionKey::new("1"), PartitionKey::new("2")]
    );
    assert_eq!(overlap.pruned_partition_pairs, 2);

    let text = report.to_string();
    assert!(text.contains("Overlapping Partitions"));
}

#[tokio::test]
async fn test_lexicographic_ordering_changes_partition_overlap() {
    let dir = sales_table();
    // As strings "100".."110" and "20".."25" both sort inside "1".."5".
    let report = analyze(&dir, BoundOrdering::Lexicographic, 1).await;
    let p1 = report.overlap.partition(&PartitionKey::new("1")).unwrap();
    assert_eq!(p1.overlapping_file_count, 3);
    assert_eq!(report.overlap.overlapping_partition_count, 3);
    assert_eq!(report.overlap.pruned_partition_pairs, 1);
}

#[tokio::test]
async fn test_lexicographic_run_accepts_string_inverted_bounds() {
    let dir = TempDir::new().unwrap();
    let table = dir.path().join("sales");
    write_commit(
        &table,
        0,
        &[
            add("p=1/x.parquet", Some("1"), 100, 1, ("9", "10")),
            add("p=1/y.parquet", Some("1"), 100, 1, ("0", "95")),
            add("p=2/z.parquet", Some("2"), 100, 1, ("3", "4")),
        ],
    );

    let lexicographic = analyze(&dir, BoundOrdering::Lexicographic, 1).await;
    let p1 = lexicographic.overlap.partition(&PartitionKey::new("1")).unwrap();
    assert_eq!(p1.overlapping_file_count, 2);
    assert_eq!(lexicographic.overlap.overlapping_partition_count, 2);

    let natural = analyze(&dir, BoundOrdering::Natural, 1).await;
    assert_eq!(
        natural.overlap.partition(&PartitionKey::new("1")).unwrap().overlapping_file_count,
        2
    );
    assert_eq!(natural.overlap.overlapping_partition_count, 2);
}

#[tokio::test]
async fn test_log_with_expired_commits_fails() {
    let dir = TempDir::new().unwrap();
    let table = dir.path().join("sales");
    write_commit(&table, 5, &[add("p=1/a.parquet", Some("1"), 1, 1, ("1", "2"))]);
    write_commit(&table, 6, &[add("p=1/b.parquet", Some("1"), 1, 1, ("1", "2"))]);

    let config = StorageConfig::local().with_option("path", dir.path().to_string_lossy());
    let err = Analyzer::builder(config)
        .build()
        .await
        .unwrap()
        .analyze("sales")
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("Incomplete log"));
}

#[tokio::test]
async fn test_parallel_run_matches_sequential() {
    let dir = sales_table();
    let sequential = analyze(&dir, BoundOrdering::Natural, 1).await;
    let parallel = analyze(&dir, BoundOrdering::Natural, 4).await;
    assert_eq!(sequential.overlap, parallel.overlap);
    assert_eq!(sequential.partitions, parallel.partitions);
}

#[tokio::test]
async fn test_missing_storage_root_fails_to_build() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope");
    let config = StorageConfig::local().with_option("path", missing.to_string_lossy());
    assert!(Analyzer::builder(config).build().await.is_err());
}
