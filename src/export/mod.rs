//! Batch export of a filtered result set to CSV (optionally gzipped),
//! Parquet or XLSX.
//!
//! A job is estimated with `count()`, then streamed batch by batch into a
//! sink that writes to a temporary file next to the destination. The file is
//! persisted only when the job completes, so a failed or cancelled job never
//! leaves a partial artifact behind.

pub mod pipeline;
pub mod sink;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDateTime;

use crate::data::predicate::Predicate;
use crate::data::query::Projection;
use crate::error::{DashError, DashResult};

pub use pipeline::{ExportOutcome, ExportPipeline, ExportProgress, ExportState};
pub use sink::{BatchSink, CsvSink, XlsxSink};

// ---------------------------------------------------------------------------
// Job description
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv { gzip: bool },
    Parquet,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv { gzip: false } => "csv",
            ExportFormat::Csv { gzip: true } => "csv.gz",
            ExportFormat::Parquet => "parquet",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv { gzip: false } => "text/csv",
            ExportFormat::Csv { gzip: true } => "application/gzip",
            ExportFormat::Parquet => "application/vnd.apache.parquet",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Csv { .. } => "CSV",
            ExportFormat::Parquet => "Parquet",
            ExportFormat::Xlsx => "XLSX",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One export request. Not persisted; runs to completion or failure.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub predicate: Predicate,
    pub format: ExportFormat,
    /// Fixed for the whole job: every batch reads the same columns.
    pub projection: Projection,
    pub batch_size: u64,
    pub destination: PathBuf,
}

/// `<prefix>_<YYYYmmdd_HHMMSS>.<ext>`
pub fn artifact_file_name(prefix: &str, format: ExportFormat, at: NaiveDateTime) -> String {
    format!("{prefix}_{}.{}", at.format("%Y%m%d_%H%M%S"), format.extension())
}

// ---------------------------------------------------------------------------
// Cancellation and admission
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Admits one export at a time.
#[derive(Debug, Default)]
pub struct ExportGate {
    busy: Arc<AtomicBool>,
}

/// Held while an export runs; releases the gate on drop.
#[derive(Debug)]
pub struct ExportPermit {
    busy: Arc<AtomicBool>,
}

impl ExportGate {
    pub fn try_acquire(&self) -> DashResult<ExportPermit> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DashError::ExportInFlight);
        }
        Ok(ExportPermit {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for ExportPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn artifact_names_carry_timestamp_and_extension() {
        let at = NaiveDate::from_ymd_opt(2026, 10, 17)
            .unwrap()
            .and_hms_opt(9, 5, 3)
            .unwrap();
        assert_eq!(
            artifact_file_name("clientes", ExportFormat::Csv { gzip: true }, at),
            "clientes_20261017_090503.csv.gz"
        );
        assert_eq!(
            artifact_file_name("clientes", ExportFormat::Xlsx, at),
            "clientes_20261017_090503.xlsx"
        );
    }

    #[test]
    fn gate_admits_one_export_at_a_time() {
        let gate = ExportGate::default();
        let permit = gate.try_acquire().unwrap();
        assert!(gate.is_busy());
        assert!(matches!(gate.try_acquire(), Err(DashError::ExportInFlight)));
        drop(permit);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_ok());
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }
}
