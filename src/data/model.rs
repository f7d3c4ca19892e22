use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

// ---------------------------------------------------------------------------
// CellValue – a single cell returned by the query engine
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value mirroring the engine's column types.
/// Must be `Ord` because distinct-value lists feed sorted widgets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Null,
}

// -- Manual Eq/Ord so we can sort and dedupe CellValue --

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
                Date(_) => 5,
                DateTime(_) => 6,
                Time(_) => 7,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Time(a), Time(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v:.2}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            CellValue::Time(t) => write!(f, "{t}"),
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

impl CellValue {
    /// Try to interpret the value as an `f64` for metrics and charts.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Interpret the value as a non-negative count.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            CellValue::Integer(i) => u64::try_from(*i).ok(),
            CellValue::Float(v) if *v >= 0.0 => Some(*v as u64),
            _ => None,
        }
    }

    /// Text written into exported files. Unlike `Display`, floats keep full
    /// precision and nulls become empty fields.
    pub fn to_field(&self) -> String {
        match self {
            CellValue::Float(v) => v.to_string(),
            CellValue::Null => String::new(),
            other => other.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// RowSet – a materialized slice of query output
// ---------------------------------------------------------------------------

/// Rows returned by a query, with the column names they were projected on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// DatasetHandle – the retrieved, locally cached dataset
// ---------------------------------------------------------------------------

/// Physical format of the cached dataset file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Parquet,
    Csv,
}

/// Coarse column type. `Other` covers everything `CellValue` cannot hold
/// directly (intervals, blobs, nested types); row queries read those as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Bool,
    Date,
    Timestamp,
    Time,
    Other,
}

impl ColumnKind {
    /// Kind of a column from the engine's type name as printed by `DESCRIBE`.
    pub fn from_engine_type(type_name: &str) -> Self {
        let ty = type_name.trim().to_ascii_uppercase();
        if ty.ends_with(']') {
            return ColumnKind::Other;
        }
        match ty.as_str() {
            "VARCHAR" => ColumnKind::Text,
            "TINYINT" | "SMALLINT" | "INTEGER" | "BIGINT" | "HUGEINT" | "UTINYINT"
            | "USMALLINT" | "UINTEGER" | "UBIGINT" => ColumnKind::Integer,
            "FLOAT" | "DOUBLE" => ColumnKind::Float,
            "BOOLEAN" => ColumnKind::Bool,
            "DATE" => ColumnKind::Date,
            "TIMESTAMP" | "TIMESTAMP_S" | "TIMESTAMP_MS" | "TIMESTAMP_NS" => ColumnKind::Timestamp,
            "TIME" => ColumnKind::Time,
            _ if ty.starts_with("DECIMAL") => ColumnKind::Float,
            _ if ty.starts_with("ENUM") => ColumnKind::Text,
            _ => ColumnKind::Other,
        }
    }

    /// Whether a date range can be applied to the column.
    pub fn is_temporal(self) -> bool {
        matches!(self, ColumnKind::Date | ColumnKind::Timestamp | ColumnKind::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
}

/// Read-only reference to a local dataset file plus lightweight metadata.
///
/// Obtained once per session. `distinct` caches the sorted distinct values of
/// the low-cardinality filter columns and is never mutated after opening.
#[derive(Debug, Clone)]
pub struct DatasetHandle {
    pub path: PathBuf,
    pub format: SourceFormat,
    /// Row count taken from file metadata (footer or a record scan).
    pub row_count: u64,
    /// Ordered list of the file's columns. Doubles as the column allow-list.
    pub columns: Vec<ColumnInfo>,
    /// For each cached column the sorted, capped set of distinct values.
    pub distinct: BTreeMap<String, Vec<CellValue>>,
}

impl DatasetHandle {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_kind(&self, name: &str) -> Option<ColumnKind> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.kind)
    }

    /// Cached distinct values for a column, empty if none were cached.
    pub fn distinct_values(&self, column: &str) -> &[CellValue] {
        self.distinct.get(column).map(Vec::as_slice).unwrap_or(&[])
    }
}
