use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::{ColumnInfo, ColumnKind, DatasetHandle, SourceFormat};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Inspect a dataset file without loading its rows.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` / `.pq` – schema and row count come from the footer
/// * `.csv`             – header row names the columns, records are counted
///
/// The returned handle has an empty distinct-value cache, and CSV columns are
/// untyped until [`QueryExecutor::resolve_column_kinds`] runs.
///
/// [`QueryExecutor::resolve_column_kinds`]: super::query::QueryExecutor::resolve_column_kinds
pub fn inspect(path: &Path) -> Result<DatasetHandle> {
    match source_format(path)? {
        SourceFormat::Parquet => inspect_parquet(path),
        SourceFormat::Csv => inspect_csv(path),
    }
}

pub fn source_format(path: &Path) -> Result<SourceFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => Ok(SourceFormat::Parquet),
        "csv" => Ok(SourceFormat::Csv),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

fn inspect_parquet(path: &Path) -> Result<DatasetHandle> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;

    let row_count = builder.metadata().file_metadata().num_rows();
    let columns = builder
        .schema()
        .fields()
        .iter()
        .map(|f| ColumnInfo {
            name: f.name().clone(),
            kind: column_kind(f.data_type()),
        })
        .collect::<Vec<_>>();

    if columns.is_empty() {
        bail!("Parquet file has no columns");
    }

    Ok(DatasetHandle {
        path: path.to_path_buf(),
        format: SourceFormat::Parquet,
        row_count: u64::try_from(row_count).context("negative row count in parquet footer")?,
        columns,
        distinct: BTreeMap::new(),
    })
}

fn column_kind(data_type: &DataType) -> ColumnKind {
    match data_type {
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => ColumnKind::Text,
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => ColumnKind::Integer,
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => ColumnKind::Float,
        DataType::Boolean => ColumnKind::Bool,
        DataType::Date32 | DataType::Date64 => ColumnKind::Date,
        DataType::Timestamp(_, _) => ColumnKind::Timestamp,
        DataType::Time32(_) | DataType::Time64(_) => ColumnKind::Time,
        DataType::Dictionary(_, value) => column_kind(value),
        _ => ColumnKind::Other,
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn inspect_csv(path: &Path) -> Result<DatasetHandle> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let columns: Vec<ColumnInfo> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| ColumnInfo {
            name: h.to_string(),
            kind: ColumnKind::Other,
        })
        .collect();

    if columns.is_empty() {
        bail!("CSV file has no header row");
    }

    let mut row_count: u64 = 0;
    let mut record = csv::ByteRecord::new();
    while reader
        .read_byte_record(&mut record)
        .with_context(|| format!("CSV row {row_count}"))?
    {
        row_count += 1;
    }

    Ok(DatasetHandle {
        path: path.to_path_buf(),
        format: SourceFormat::Csv,
        row_count,
        columns,
        distinct: BTreeMap::new(),
    })
}
