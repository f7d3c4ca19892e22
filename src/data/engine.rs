use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use duckdb::types::{TimeUnit, Value};
use duckdb::{Connection, params_from_iter};

use super::model::{CellValue, SourceFormat};
use super::predicate::{Literal, quote_string};
use crate::error::EngineError;

/// Name of the view every query reads from.
pub const DATASET_VIEW: &str = "dataset";

// ---------------------------------------------------------------------------
// QueryEngine – the seam to the embedded analytical engine
// ---------------------------------------------------------------------------

/// Runs SQL against the dataset view. Implementations are read-only with
/// respect to the dataset file.
pub trait QueryEngine {
    /// First column of the first row.
    fn scalar(&self, sql: &str, params: &[Literal]) -> Result<CellValue, EngineError>;

    /// All rows, reading the first `width` columns of each.
    fn rows(
        &self,
        sql: &str,
        params: &[Literal],
        width: usize,
    ) -> Result<Vec<Vec<CellValue>>, EngineError>;

    /// A statement without parameters or results (e.g. `COPY`).
    fn execute(&self, sql: &str) -> Result<(), EngineError>;
}

// ---------------------------------------------------------------------------
// DuckDB
// ---------------------------------------------------------------------------

/// In-memory DuckDB connection with a `dataset` view over the cached file.
pub struct DuckEngine {
    conn: Connection,
}

impl DuckEngine {
    pub fn open(path: &Path, format: SourceFormat) -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        // Parquet support is linked in; never fetch extensions over the network.
        conn.execute_batch("SET autoinstall_known_extensions = false;")?;
        let source = quote_string(&path.to_string_lossy());
        let reader = match format {
            SourceFormat::Parquet => format!("read_parquet({source})"),
            SourceFormat::Csv => format!("read_csv_auto({source}, header = true)"),
        };
        conn.execute_batch(&format!(
            "CREATE VIEW {DATASET_VIEW} AS SELECT * FROM {reader};"
        ))?;
        log::info!("opened query engine over {}", path.display());
        Ok(Self { conn })
    }
}

impl QueryEngine for DuckEngine {
    fn scalar(&self, sql: &str, params: &[Literal]) -> Result<CellValue, EngineError> {
        let values = bind(params);
        let value: Value = self
            .conn
            .query_row(sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(to_cell(value))
    }

    fn rows(
        &self,
        sql: &str,
        params: &[Literal],
        width: usize,
    ) -> Result<Vec<Vec<CellValue>>, EngineError> {
        let values = bind(params);
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(values.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                let value: Value = row.get(i)?;
                cells.push(to_cell(value));
            }
            out.push(cells);
        }
        Ok(out)
    }

    fn execute(&self, sql: &str) -> Result<(), EngineError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

fn bind(params: &[Literal]) -> Vec<Value> {
    params
        .iter()
        .map(|p| match p {
            Literal::Text(s) => Value::Text(s.clone()),
            // Rendered as CAST(? AS DATE)
            Literal::Date(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
        })
        .collect()
}

fn to_cell(value: Value) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Boolean(b) => CellValue::Bool(b),
        Value::TinyInt(i) => CellValue::Integer(i64::from(i)),
        Value::SmallInt(i) => CellValue::Integer(i64::from(i)),
        Value::Int(i) => CellValue::Integer(i64::from(i)),
        Value::BigInt(i) => CellValue::Integer(i),
        Value::UTinyInt(i) => CellValue::Integer(i64::from(i)),
        Value::USmallInt(i) => CellValue::Integer(i64::from(i)),
        Value::UInt(i) => CellValue::Integer(i64::from(i)),
        Value::UBigInt(i) => match i64::try_from(i) {
            Ok(v) => CellValue::Integer(v),
            Err(_) => CellValue::Float(i as f64),
        },
        Value::HugeInt(i) => match i64::try_from(i) {
            Ok(v) => CellValue::Integer(v),
            Err(_) => CellValue::Float(i as f64),
        },
        Value::Float(f) => CellValue::Float(f64::from(f)),
        Value::Double(f) => CellValue::Float(f),
        Value::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(CellValue::Float)
            .unwrap_or(CellValue::Null),
        Value::Text(s) => CellValue::String(s),
        Value::Enum(s) => CellValue::String(s),
        Value::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(Duration::days(i64::from(days))))
            .map(CellValue::Date)
            .unwrap_or(CellValue::Null),
        Value::Timestamp(unit, v) => {
            DateTime::from_timestamp_micros(to_micros(unit, v))
                .map(|dt| CellValue::DateTime(dt.naive_utc()))
                .unwrap_or(CellValue::Null)
        }
        Value::Time64(unit, v) => {
            let micros = to_micros(unit, v);
            let secs = micros.div_euclid(1_000_000);
            let nanos = micros.rem_euclid(1_000_000) * 1_000;
            u32::try_from(secs)
                .ok()
                .and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, nanos as u32))
                .map(CellValue::Time)
                .unwrap_or(CellValue::Null)
        }
        // Row queries cast other kinds to VARCHAR, so this only sees
        // expressions computed inside a statement.
        other => {
            log::warn!("unsupported engine value {other:?}, reading as null");
            CellValue::Null
        }
    }
}

fn to_micros(unit: TimeUnit, v: i64) -> i64 {
    match unit {
        TimeUnit::Second => v.saturating_mul(1_000_000),
        TimeUnit::Millisecond => v.saturating_mul(1_000),
        TimeUnit::Microsecond => v,
        TimeUnit::Nanosecond => v / 1_000,
    }
}
