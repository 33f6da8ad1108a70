//! Per-file statistics as consumed by the aggregator and the overlap detector.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("Inverted bounds for file={file}, column={column}: min={min} > max={max}")]
    InvertedBounds {
        file: String,
        column: IndexedColumn,
        min: BoundValue,
        max: BoundValue,
    },
}

/// The fixed set of columns carrying min/max statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexedColumn {
    C1,
    C2,
    C4,
}

impl IndexedColumn {
    pub const ALL: [IndexedColumn; 3] = [IndexedColumn::C1, IndexedColumn::C2, IndexedColumn::C4];

    pub fn name(&self) -> &'static str {
        match self {
            IndexedColumn::C1 => "c1",
            IndexedColumn::C2 => "c2",
            IndexedColumn::C4 => "c4",
        }
    }

    fn index(&self) -> usize {
        match self {
            IndexedColumn::C1 => 0,
            IndexedColumn::C2 => 1,
            IndexedColumn::C4 => 2,
        }
    }
}

impl Display for IndexedColumn {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.name())
    }
}

/// A single min or max statistic.
///
/// Numbers sort before text. Integers compare exactly, against each other and
/// against floats. NaN falls back to `f64::total_cmp`, so the order is total
/// even across mixed values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundValue {
    Int(i64),
    Number(f64),
    Text(String),
}

/// Exact ordering of an integer against a float, without rounding `int`.
fn cmp_int_float(int: i64, float: f64) -> Ordering {
    // 2^63; every finite float below it and at or above -2^63 truncates into i64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if float.is_nan() {
        return (int as f64).total_cmp(&float);
    }
    if float >= LIMIT {
        return Ordering::Less;
    }
    if float < -LIMIT {
        return Ordering::Greater;
    }
    let whole = float.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => whole.total_cmp(&float),
        other => other,
    }
}

impl PartialEq for BoundValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BoundValue {}

impl PartialOrd for BoundValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BoundValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (BoundValue::Int(a), BoundValue::Int(b)) => a.cmp(b),
            (BoundValue::Int(a), BoundValue::Number(b)) => cmp_int_float(*a, *b),
            (BoundValue::Number(a), BoundValue::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (BoundValue::Number(a), BoundValue::Number(b)) => {
                a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b))
            }
            (BoundValue::Text(a), BoundValue::Text(b)) => a.cmp(b),
            (BoundValue::Text(_), _) => Ordering::Greater,
            (_, BoundValue::Text(_)) => Ordering::Less,
        }
    }
}

impl Display for BoundValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BoundValue::Int(n) => write!(f, "{}", n),
            BoundValue::Number(n) => write!(f, "{}", n),
            BoundValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for BoundValue {
    fn from(value: i64) -> Self {
        BoundValue::Int(value)
    }
}

impl From<f64> for BoundValue {
    fn from(value: f64) -> Self {
        BoundValue::Number(value)
    }
}

impl From<&str> for BoundValue {
    fn from(value: &str) -> Self {
        BoundValue::Text(value.to_string())
    }
}

impl From<String> for BoundValue {
    fn from(value: String) -> Self {
        BoundValue::Text(value)
    }
}

/// How raw string statistics are turned into comparable bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundOrdering {
    /// Numeric-looking values compare as numbers, everything else as text.
    #[default]
    Natural,
    /// Every value compares as a plain string ("10" < "9"). Pairs are kept as
    /// stored even when the string min sorts after the string max.
    Lexicographic,
}

impl BoundOrdering {
    pub fn parse(&self, raw: &str) -> BoundValue {
        match self {
            BoundOrdering::Lexicographic => BoundValue::Text(raw.to_string()),
            BoundOrdering::Natural => {
                let trimmed = raw.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    return BoundValue::Int(i);
                }
                match trimmed.parse::<f64>() {
                    Ok(n) if n.is_finite() => BoundValue::Number(n),
                    _ => BoundValue::Text(raw.to_string()),
                }
            }
        }
    }
}

impl Display for BoundOrdering {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BoundOrdering::Natural => write!(f, "natural"),
            BoundOrdering::Lexicographic => write!(f, "lexicographic"),
        }
    }
}

impl FromStr for BoundOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "natural" => Ok(BoundOrdering::Natural),
            "lexicographic" => Ok(BoundOrdering::Lexicographic),
            other => Err(format!(
                "Unknown bound ordering '{}', expected 'natural' or 'lexicographic'",
                other
            )),
        }
    }
}

/// Closed `[min, max]` interval of one column within one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnBounds {
    min: BoundValue,
    max: BoundValue,
}

impl ColumnBounds {
    /// Fails when `min > max`; the file name is only used for the error.
    pub fn new(
        file: &str,
        column: IndexedColumn,
        min: BoundValue,
        max: BoundValue,
    ) -> Result<Self, RecordError> {
        if min > max {
            return Err(RecordError::InvertedBounds {
                file: file.to_string(),
                column,
                min,
                max,
            });
        }
        Ok(Self { min, max })
    }

    /// Keeps the pair as given, even when `min > max`.
    pub fn literal(min: BoundValue, max: BoundValue) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> &BoundValue {
        &self.min
    }

    pub fn max(&self) -> &BoundValue {
        &self.max
    }

    /// Touching endpoints count as intersecting.
    pub fn intersects(&self, other: &ColumnBounds) -> bool {
        self.max >= other.min && other.max >= self.min
    }

    /// Widens `self` so it also covers `other`.
    pub fn extend(&mut self, other: &ColumnBounds) {
        if other.min < self.min {
            self.min = other.min.clone();
        }
        if other.max > self.max {
            self.max = other.max.clone();
        }
    }
}

/// Value of the table's partition column for one file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PartitionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PartitionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Statistics of one physical data file. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    file: String,
    partition: Option<PartitionKey>,
    size: u64,
    num_records: u64,
    bounds: [Option<ColumnBounds>; 3],
}

impl FileRecord {
    pub fn builder(file: impl Into<String>) -> FileRecordBuilder {
        FileRecordBuilder {
            record: FileRecord {
                file: file.into(),
                partition: None,
                size: 0,
                num_records: 0,
                bounds: [None, None, None],
            },
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// `None` when the partition value was null or absent.
    pub fn partition(&self) -> Option<&PartitionKey> {
        self.partition.as_ref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    pub fn bounds(&self, column: IndexedColumn) -> Option<&ColumnBounds> {
        self.bounds[column.index()].as_ref()
    }
}

pub struct FileRecordBuilder {
    record: FileRecord,
}

impl FileRecordBuilder {
    pub fn partition(mut self, partition: impl Into<PartitionKey>) -> Self {
        self.record.partition = Some(partition.into());
        self
    }

    pub fn maybe_partition(mut self, partition: Option<PartitionKey>) -> Self {
        self.record.partition = partition;
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.record.size = size;
        self
    }

    pub fn num_records(mut self, num_records: u64) -> Self {
        self.record.num_records = num_records;
        self
    }

    pub fn with_bounds(
        mut self,
        column: IndexedColumn,
        min: impl Into<BoundValue>,
        max: impl Into<BoundValue>,
    ) -> Result<Self, RecordError> {
        let bounds = ColumnBounds::new(&self.record.file, column, min.into(), max.into())?;
        self.record.bounds[column.index()] = Some(bounds);
        Ok(self)
    }

    /// Parses raw statistic strings under `ordering`.
    ///
    /// `Natural` bounds are validated like [`Self::with_bounds`].
    /// `Lexicographic` bounds are stored literally, so a numeric column with
    /// min "9" and max "10" is accepted and tested as written.
    pub fn with_raw_bounds(
        mut self,
        column: IndexedColumn,
        ordering: BoundOrdering,
        min: &str,
        max: &str,
    ) -> Result<Self, RecordError> {
        match ordering {
            BoundOrdering::Natural => {
                self.with_bounds(column, ordering.parse(min), ordering.parse(max))
            }
            BoundOrdering::Lexicographic => {
                self.record.bounds[column.index()] =
                    Some(ColumnBounds::literal(ordering.parse(min), ordering.parse(max)));
                Ok(self)
            }
        }
    }

    pub fn build(self) -> FileRecord {
        self.record
    }
}
