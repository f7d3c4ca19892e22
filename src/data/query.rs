use std::path::Path;

use chrono::NaiveDate;

use super::engine::{DATASET_VIEW, QueryEngine};
use super::filter::ColumnMap;
use super::model::{CellValue, ColumnKind, DatasetHandle, RowSet};
use super::predicate::{Literal, Predicate, quote_ident, quote_string};
use crate::config::LimitsConfig;
use crate::error::{DashError, DashResult, EngineError, ValidationError};

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// The columns a row query returns. Constructors check every name against the
/// dataset, so a `Projection` only ever holds allow-listed columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    columns: Vec<String>,
}

impl Projection {
    pub fn all(handle: &DatasetHandle) -> Self {
        Self {
            columns: handle.column_names(),
        }
    }

    pub fn identifier_only(columns: &ColumnMap) -> Self {
        Self {
            columns: vec![columns.identifier.clone()],
        }
    }

    pub fn columns(handle: &DatasetHandle, names: &[&str]) -> Result<Self, ValidationError> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            if !handle.has_column(name) {
                return Err(ValidationError::UnknownColumn {
                    column: name.to_string(),
                });
            }
            columns.push(name.to_string());
        }
        Ok(Self { columns })
    }

    pub fn names(&self) -> &[String] {
        &self.columns
    }

    /// Columns as stored, for engine-side writers that keep native types.
    fn native_select_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Columns for rows read back into `CellValue`s. `Other` kinds come back
    /// as the engine's own text rendering.
    fn select_list(&self, handle: &DatasetHandle) -> String {
        self.columns
            .iter()
            .map(|c| {
                let col = quote_ident(c);
                match handle.column_kind(c) {
                    Some(ColumnKind::Other) => format!("CAST({col} AS VARCHAR) AS {col}"),
                    _ => col,
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ---------------------------------------------------------------------------
// Engagement recency
// ---------------------------------------------------------------------------

/// Upper bounds (in days since the date column) of the recency buckets.
const RECENCY_BOUNDS: [(i64, &str); 4] = [
    (30, "0-30 days"),
    (90, "31-90 days"),
    (180, "91-180 days"),
    (365, "181-365 days"),
];
const RECENCY_STALE: &str = "over 365 days";
const RECENCY_NONE: &str = "no date";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecencyBucket {
    pub label: &'static str,
    pub count: u64,
}

fn recency_labels() -> Vec<&'static str> {
    RECENCY_BOUNDS
        .iter()
        .map(|(_, label)| *label)
        .chain([RECENCY_STALE, RECENCY_NONE])
        .collect()
}

// ---------------------------------------------------------------------------
// QueryExecutor
// ---------------------------------------------------------------------------

/// Read-only aggregate and sample queries over one dataset.
///
/// Failures come back as `DashError::QueryExecution` with the predicate
/// attached. Nothing is retried.
pub struct QueryExecutor<E> {
    engine: E,
    sample_ceiling: u64,
}

impl<E: QueryEngine> QueryExecutor<E> {
    pub fn new(engine: E, limits: &LimitsConfig) -> Self {
        Self {
            engine,
            sample_ceiling: limits.sample_ceiling,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn sample_ceiling(&self) -> u64 {
        self.sample_ceiling
    }

    /// Type every column of `handle` the way the engine reads it.
    pub fn resolve_column_kinds(&self, handle: &mut DatasetHandle) -> DashResult<()> {
        let sql = format!("DESCRIBE {DATASET_VIEW}");
        let rows = self.rows(&sql, &[], 2, &Predicate::match_all())?;
        for row in rows {
            if let [CellValue::String(name), CellValue::String(type_name)] = row.as_slice() {
                if let Some(info) = handle.columns.iter_mut().find(|c| &c.name == name) {
                    info.kind = ColumnKind::from_engine_type(type_name);
                }
            }
        }
        Ok(())
    }

    /// Total matching rows. An empty predicate is answered from the file
    /// metadata; otherwise the engine counts natively without materializing.
    pub fn count(&self, handle: &DatasetHandle, predicate: &Predicate) -> DashResult<u64> {
        if predicate.is_empty() {
            return Ok(handle.row_count);
        }
        let bound = predicate.to_sql();
        let sql = format!("SELECT COUNT(*) FROM {DATASET_VIEW} WHERE {}", bound.sql);
        let value = self.scalar(&sql, &bound.params, predicate)?;
        Ok(value.as_u64().unwrap_or(0))
    }

    pub fn count_distinct(
        &self,
        handle: &DatasetHandle,
        predicate: &Predicate,
        column: &str,
    ) -> DashResult<u64> {
        let col = allowed(handle, column)?;
        let bound = predicate.to_sql();
        let sql = format!(
            "SELECT COUNT(DISTINCT {col}) FROM {DATASET_VIEW} WHERE {}",
            bound.sql
        );
        let value = self.scalar(&sql, &bound.params, predicate)?;
        Ok(value.as_u64().unwrap_or(0))
    }

    /// Null-safe sum of a numeric column; 0 when nothing matches.
    pub fn sum(
        &self,
        handle: &DatasetHandle,
        predicate: &Predicate,
        column: &str,
    ) -> DashResult<f64> {
        let col = allowed(handle, column)?;
        let bound = predicate.to_sql();
        let sql = format!(
            "SELECT COALESCE(SUM(TRY_CAST({col} AS DOUBLE)), 0) FROM {DATASET_VIEW} WHERE {}",
            bound.sql
        );
        let value = self.scalar(&sql, &bound.params, predicate)?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    /// At most `min(limit, sample_ceiling)` matching rows.
    pub fn sample(
        &self,
        handle: &DatasetHandle,
        predicate: &Predicate,
        limit: u64,
        projection: &Projection,
    ) -> DashResult<RowSet> {
        check_projection(handle, projection)?;
        let limit = self.clamp(limit);
        let bound = predicate.to_sql();
        let sql = format!(
            "SELECT {} FROM {DATASET_VIEW} WHERE {} LIMIT {limit}",
            projection.select_list(handle),
            bound.sql
        );
        self.row_set(&sql, &bound.params, projection, predicate)
    }

    /// Matching rows ordered by `order_column` descending (the "largest
    /// buyers" table). Clamped like [`QueryExecutor::sample`].
    pub fn top_by(
        &self,
        handle: &DatasetHandle,
        predicate: &Predicate,
        order_column: &str,
        projection: &Projection,
        limit: u64,
    ) -> DashResult<RowSet> {
        check_projection(handle, projection)?;
        let order = allowed(handle, order_column)?;
        let limit = self.clamp(limit);
        let bound = predicate.to_sql();
        let sql = format!(
            "SELECT {} FROM {DATASET_VIEW} WHERE {} ORDER BY {order} DESC NULLS LAST LIMIT {limit}",
            projection.select_list(handle),
            bound.sql
        );
        self.row_set(&sql, &bound.params, projection, predicate)
    }

    /// Sorted distinct non-null values of `column`, at most `cap` of them.
    pub fn distinct_values(
        &self,
        handle: &DatasetHandle,
        column: &str,
        cap: u64,
    ) -> DashResult<Vec<CellValue>> {
        let col = allowed(handle, column)?;
        let sql = format!(
            "SELECT DISTINCT {col} FROM {DATASET_VIEW} WHERE {col} IS NOT NULL ORDER BY 1 LIMIT {cap}"
        );
        let rows = self.rows(&sql, &[], 1, &Predicate::match_all())?;
        let mut values: Vec<CellValue> = rows
            .into_iter()
            .filter_map(|r| r.into_iter().next())
            .collect();
        values.sort();
        Ok(values)
    }

    /// Row counts per value of `column`, largest first, ties by value.
    pub fn top_groups(
        &self,
        handle: &DatasetHandle,
        predicate: &Predicate,
        column: &str,
        limit: u64,
    ) -> DashResult<Vec<(CellValue, u64)>> {
        let col = allowed(handle, column)?;
        let limit = self.clamp(limit);
        let bound = predicate.to_sql();
        let sql = format!(
            "SELECT {col}, COUNT(*) AS qtd FROM {DATASET_VIEW} WHERE {} \
             GROUP BY {col} ORDER BY qtd DESC, {col} ASC NULLS LAST LIMIT {limit}",
            bound.sql
        );
        let rows = self.rows(&sql, &bound.params, 2, predicate)?;
        Ok(rows
            .into_iter()
            .filter_map(|mut r| {
                let count = r.pop()?.as_u64()?;
                let value = r.pop()?;
                Some((value, count))
            })
            .collect())
    }

    /// Engagement recency: matching rows bucketed by days between
    /// `date_column` and `today`. Every bucket is present, in fixed order.
    pub fn recency_buckets(
        &self,
        handle: &DatasetHandle,
        predicate: &Predicate,
        date_column: &str,
        today: NaiveDate,
    ) -> DashResult<Vec<RecencyBucket>> {
        let col = allowed(handle, date_column)?;
        let bound = predicate.to_sql();

        let mut case = String::from("CASE WHEN age IS NULL THEN 5");
        for (i, (upper, _)) in RECENCY_BOUNDS.iter().enumerate() {
            case.push_str(&format!(" WHEN age <= {upper} THEN {i}"));
        }
        case.push_str(" ELSE 4 END");

        let sql = format!(
            "SELECT {case} AS bucket, COUNT(*) FROM (\
             SELECT date_diff('day', TRY_CAST({col} AS DATE), CAST(? AS DATE)) AS age \
             FROM {DATASET_VIEW} WHERE {}) GROUP BY bucket ORDER BY bucket",
            bound.sql
        );
        let mut params = vec![Literal::Date(today)];
        params.extend(bound.params);

        let rows = self.rows(&sql, &params, 2, predicate)?;
        let mut buckets: Vec<RecencyBucket> = recency_labels()
            .into_iter()
            .map(|label| RecencyBucket { label, count: 0 })
            .collect();
        for row in rows {
            if let (Some(idx), Some(count)) = (
                row.first().and_then(CellValue::as_u64),
                row.get(1).and_then(CellValue::as_u64),
            ) {
                if let Some(bucket) = buckets.get_mut(idx as usize) {
                    bucket.count = count;
                }
            }
        }
        Ok(buckets)
    }

    /// One export batch. Not clamped by the sample ceiling.
    pub fn fetch_batch(
        &self,
        handle: &DatasetHandle,
        predicate: &Predicate,
        projection: &Projection,
        offset: u64,
        limit: u64,
    ) -> DashResult<RowSet> {
        check_projection(handle, projection)?;
        let bound = predicate.to_sql();
        let sql = format!(
            "SELECT {} FROM {DATASET_VIEW} WHERE {} LIMIT {limit} OFFSET {offset}",
            projection.select_list(handle),
            bound.sql
        );
        self.row_set(&sql, &bound.params, projection, predicate)
    }

    /// Let the engine write all matching rows to a Parquet file at `dest`.
    pub fn copy_to_parquet(
        &self,
        handle: &DatasetHandle,
        predicate: &Predicate,
        projection: &Projection,
        dest: &Path,
    ) -> DashResult<()> {
        check_projection(handle, projection)?;
        let sql = format!(
            "COPY (SELECT {} FROM {DATASET_VIEW} WHERE {}) TO {} (FORMAT PARQUET)",
            projection.native_select_list(),
            predicate.to_inline_sql(),
            quote_string(&dest.to_string_lossy())
        );
        self.engine
            .execute(&sql)
            .map_err(|source| query_error(predicate, source))
    }

    // -- helpers --

    fn clamp(&self, limit: u64) -> u64 {
        limit.min(self.sample_ceiling)
    }

    fn scalar(&self, sql: &str, params: &[Literal], predicate: &Predicate) -> DashResult<CellValue> {
        self.engine
            .scalar(sql, params)
            .map_err(|source| query_error(predicate, source))
    }

    fn rows(
        &self,
        sql: &str,
        params: &[Literal],
        width: usize,
        predicate: &Predicate,
    ) -> DashResult<Vec<Vec<CellValue>>> {
        self.engine
            .rows(sql, params, width)
            .map_err(|source| query_error(predicate, source))
    }

    fn row_set(
        &self,
        sql: &str,
        params: &[Literal],
        projection: &Projection,
        predicate: &Predicate,
    ) -> DashResult<RowSet> {
        let rows = self.rows(sql, params, projection.names().len(), predicate)?;
        Ok(RowSet::new(projection.names().to_vec(), rows))
    }
}

fn query_error(predicate: &Predicate, source: EngineError) -> DashError {
    let predicate = predicate.diagnostics();
    log::error!("query failed: {source} (predicate {predicate})");
    DashError::QueryExecution { predicate, source }
}

fn allowed(handle: &DatasetHandle, column: &str) -> Result<String, ValidationError> {
    if handle.has_column(column) {
        Ok(quote_ident(column))
    } else {
        Err(ValidationError::UnknownColumn {
            column: column.to_string(),
        })
    }
}

fn check_projection(handle: &DatasetHandle, projection: &Projection) -> Result<(), ValidationError> {
    match projection.names().iter().find(|c| !handle.has_column(c)) {
        Some(missing) => Err(ValidationError::UnknownColumn {
            column: missing.clone(),
        }),
        None => Ok(()),
    }
}
