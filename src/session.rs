//! Per-session dataset state: the opened dataset, its distinct-value cache,
//! and export admission.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::config::DashboardConfig;
use crate::data::engine::DuckEngine;
use crate::data::filter::{ColumnMap, FilterSpec, PredicateBuilder};
use crate::data::loader;
use crate::data::model::{CellValue, DatasetHandle, RowSet};
use crate::data::predicate::Predicate;
use crate::data::query::{Projection, QueryExecutor, RecencyBucket};
use crate::error::{DashError, DashResult};
use crate::export::{
    CancelToken, ExportFormat, ExportGate, ExportJob, ExportOutcome, ExportPipeline,
    ExportProgress,
};
use crate::hub::DatasetSource;

const TOP_N: u64 = 10;

// ---------------------------------------------------------------------------
// LoadedDataset
// ---------------------------------------------------------------------------

/// Everything derived from one retrieved dataset file. Immutable once built.
pub struct LoadedDataset {
    pub handle: DatasetHandle,
    pub columns: ColumnMap,
    pub executor: QueryExecutor<DuckEngine>,
}

impl LoadedDataset {
    pub fn open(source: &dyn DatasetSource, config: &DashboardConfig) -> DashResult<Self> {
        let path = source.fetch()?;
        let mut handle = loader::inspect(&path).map_err(|e| DashError::DatasetUnavailable {
            reason: format!("{e:#}"),
            guidance: "The downloaded file is not a readable Parquet or CSV dataset.".into(),
        })?;
        let engine =
            DuckEngine::open(&handle.path, handle.format).map_err(|e| DashError::DatasetUnavailable {
                reason: e.to_string(),
                guidance: "The query engine could not read the dataset file.".into(),
            })?;
        let executor = QueryExecutor::new(engine, &config.limits);
        executor.resolve_column_kinds(&mut handle)?;
        let columns = ColumnMap::resolve(&config.columns, &handle);

        for column in columns.low_cardinality() {
            let values = executor.distinct_values(&handle, column, config.limits.distinct_cap)?;
            handle.distinct.insert(column.to_string(), values);
        }

        log::info!(
            "loaded {} rows, {} columns from {}",
            handle.row_count,
            handle.columns.len(),
            source.describe()
        );
        Ok(Self {
            handle,
            columns,
            executor,
        })
    }

    pub fn predicate(&self, spec: &FilterSpec) -> DashResult<Predicate> {
        Ok(PredicateBuilder::new(&self.columns).build(spec)?)
    }

    /// Every figure the dashboard shows for one filter selection.
    pub fn dashboard(&self, spec: &FilterSpec, today: NaiveDate) -> DashResult<DashboardView> {
        let predicate = self.predicate(spec)?;
        let h = &self.handle;
        let ex = &self.executor;
        let cols = &self.columns;

        let matching = ex.count(h, &predicate)?;
        let distinct_customers = ex.count_distinct(h, &predicate, &cols.identifier)?;
        let total_spend = match &cols.spend {
            Some(spend) => Some(ex.sum(h, &predicate, spend)?),
            None => None,
        };
        let top_sectors = match &cols.sector {
            Some(sector) => ex.top_groups(h, &predicate, sector, TOP_N)?,
            None => Vec::new(),
        };
        let top_buyers = match &cols.spend {
            Some(spend) => {
                let mut names = vec![cols.identifier.as_str()];
                if let Some(name) = &cols.name {
                    names.push(name);
                }
                names.push(spend);
                let projection = Projection::columns(h, &names)?;
                Some(ex.top_by(h, &predicate, spend, &projection, TOP_N)?)
            }
            None => None,
        };
        let recency = match &cols.purchase_date {
            Some(date) => ex.recency_buckets(h, &predicate, date, today)?,
            None => Vec::new(),
        };
        let sample = ex.sample(h, &predicate, ex.sample_ceiling(), &Projection::all(h))?;

        Ok(DashboardView {
            predicate,
            matching,
            distinct_customers,
            total_spend,
            top_sectors,
            top_buyers,
            recency,
            sample,
        })
    }
}

/// Result of applying one `FilterSpec`.
#[derive(Debug, Clone)]
pub struct DashboardView {
    pub predicate: Predicate,
    pub matching: u64,
    pub distinct_customers: u64,
    pub total_spend: Option<f64>,
    pub top_sectors: Vec<(CellValue, u64)>,
    pub top_buyers: Option<RowSet>,
    pub recency: Vec<RecencyBucket>,
    pub sample: RowSet,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Column selection for an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportColumns {
    All,
    IdentifierOnly,
}

/// Holds the current dataset. Opened on first access; `refresh` replaces it
/// as a whole, so holders of an older `Arc` keep a consistent view.
pub struct Session {
    config: DashboardConfig,
    source: Box<dyn DatasetSource>,
    current: Option<Arc<LoadedDataset>>,
    exports: ExportGate,
}

impl Session {
    pub fn new(config: DashboardConfig, source: Box<dyn DatasetSource>) -> Self {
        Self {
            config,
            source,
            current: None,
            exports: ExportGate::default(),
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn source_description(&self) -> String {
        self.source.describe()
    }

    /// The loaded dataset, opening it on first use.
    pub fn dataset(&mut self) -> DashResult<Arc<LoadedDataset>> {
        if let Some(ds) = &self.current {
            return Ok(Arc::clone(ds));
        }
        let ds = Arc::new(LoadedDataset::open(self.source.as_ref(), &self.config)?);
        self.current = Some(Arc::clone(&ds));
        Ok(ds)
    }

    pub fn loaded(&self) -> Option<Arc<LoadedDataset>> {
        self.current.clone()
    }

    /// Re-fetch and reopen. The previous dataset stays current on failure.
    pub fn refresh(&mut self) -> DashResult<Arc<LoadedDataset>> {
        let ds = Arc::new(LoadedDataset::open(self.source.as_ref(), &self.config)?);
        self.current = Some(Arc::clone(&ds));
        log::info!("dataset refreshed");
        Ok(ds)
    }

    /// Dashboard figures for `spec` over the current dataset.
    pub fn dashboard(&mut self, spec: &FilterSpec, today: NaiveDate) -> DashResult<DashboardView> {
        self.dataset()?.dashboard(spec, today)
    }

    pub fn export_running(&self) -> bool {
        self.exports.is_busy()
    }

    /// Build and run one export job against the loaded dataset. Rejected
    /// while another export from this session is in flight.
    pub fn export(
        &self,
        spec: &FilterSpec,
        format: ExportFormat,
        columns: ExportColumns,
        destination: PathBuf,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(&ExportProgress),
    ) -> DashResult<ExportOutcome> {
        let _permit = self.exports.try_acquire()?;
        let ds = self.loaded().ok_or_else(|| DashError::DatasetUnavailable {
            reason: "no dataset is loaded".into(),
            guidance: "Load the dataset before exporting.".into(),
        })?;
        let predicate = ds.predicate(spec)?;
        let projection = match columns {
            ExportColumns::All => Projection::all(&ds.handle),
            ExportColumns::IdentifierOnly => Projection::identifier_only(&ds.columns),
        };
        let job = ExportJob {
            predicate,
            format,
            projection,
            batch_size: self.config.limits.batch_size,
            destination,
        };
        ExportPipeline::new(&ds.executor, &ds.handle, &self.config.limits).run(
            &job,
            cancel,
            on_progress,
        )
    }
}
