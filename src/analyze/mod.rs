pub mod aggregate;
#[allow(clippy::module_inception)]
pub mod analyze;
pub mod metrics;
pub mod overlap;

pub use aggregate::{PartitionAggregator, PartitionStats, PartitionSummary};
pub use analyze::{Analyzer, AnalyzerBuilder};
pub use metrics::{AnalysisReport, StageTiming};
pub use overlap::{Envelope, OverlapDetector, OverlapError, OverlapReport, PartitionOverlap, overlaps};
