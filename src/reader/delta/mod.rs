//! Delta Lake transaction log replay.

mod actions;
mod source;

pub use source::{DEFAULT_PARTITION_COLUMN, DELTA_LOG_DIR, DeltaLogSource};
