use clap::Parser;
use lake_overlap::analyze::Analyzer;
use lake_overlap::record::BoundOrdering;
use lake_overlap::storage::StorageConfig;
use std::error::Error;
use tracing_subscriber::EnvFilter;

/// Partition statistics and min/max overlap report for a Delta table.
#[derive(Debug, Parser)]
#[command(name = "lake-overlap", version, about)]
struct Args {
    /// Storage root, e.g. file:///data/warehouse
    #[arg(long)]
    storage: String,

    /// Table location relative to the storage root
    #[arg(long, default_value = "")]
    location: String,

    /// Concurrent commit reads and overlap workers
    #[arg(long, default_value_t = 1)]
    parallelism: usize,

    /// How min/max statistics are compared: natural or lexicographic
    #[arg(long, default_value_t = BoundOrdering::Natural)]
    ordering: BoundOrdering,

    /// Name of the partition column
    #[arg(long, default_value = "p")]
    partition_column: String,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Leave per-partition file lists out of the JSON output
    #[arg(long, requires = "json")]
    exclude_files: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let analyzer = Analyzer::builder(StorageConfig::from_url(&args.storage)?)
        .with_parallelism(args.parallelism)
        .with_bound_ordering(args.ordering)
        .with_partition_column(args.partition_column)
        .build()
        .await?;

    let report = analyzer.analyze(&args.location).await?;

    if args.json {
        println!("{}", report.to_json(args.exclude_files)?);
    } else {
        println!("{}", report);
    }

    Ok(())
}
