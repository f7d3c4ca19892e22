use thiserror::Error;

/// A `FilterSpec` that cannot be turned into a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid date range for {field}: start is after end")]
    InvalidRange { field: &'static str },

    #[error("identifier #{position} in the identifier list is empty")]
    InvalidIdentifier { position: usize },

    #[error("contradictory filters: '{first}' cannot be combined with '{second}'")]
    ContradictoryFilter {
        first: &'static str,
        second: &'static str,
    },

    #[error("column '{column}' is not available in this dataset")]
    UnknownColumn { column: String },
}

/// Failure reported by the embedded query engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    DuckDb(#[from] duckdb::Error),

    #[error("{0}")]
    Other(String),
}

/// User-facing rendering of an error: what happened and what to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum DashError {
    // ── Filters ───────────────────────────────────────────────────────────────
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // ── Queries ───────────────────────────────────────────────────────────────
    #[error("query failed (predicate: {predicate}): {source}")]
    QueryExecution {
        predicate: String,
        #[source]
        source: EngineError,
    },

    // ── Export ────────────────────────────────────────────────────────────────
    #[error("{format} export is limited to {limit} rows, but {rows} rows match")]
    FormatRowLimitExceeded {
        format: &'static str,
        rows: u64,
        limit: u64,
    },

    #[error("export failed after {processed} rows: {source}")]
    ExportIo {
        processed: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("export cancelled after {processed} rows")]
    Cancelled { processed: u64 },

    #[error("an export is already running for this dataset")]
    ExportInFlight,

    // ── Dataset / configuration ───────────────────────────────────────────────
    #[error("dataset unavailable: {reason}")]
    DatasetUnavailable { reason: String, guidance: String },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type DashResult<T> = Result<T, DashError>;

impl DashError {
    /// Converts the error into a presentation suitable for the dashboard.
    pub fn presentation(&self) -> ErrorPresentation {
        match self {
            DashError::Validation(e) => ErrorPresentation {
                title: "Invalid Filters".into(),
                message: e.to_string(),
                action: Some("Adjust the filters and apply again".into()),
            },
            DashError::QueryExecution { source, .. } => ErrorPresentation {
                title: "Query Failed".into(),
                message: format!("The data engine rejected the query: {source}"),
                action: Some("Change the filters and resubmit".into()),
            },
            DashError::FormatRowLimitExceeded { format, rows, limit } => ErrorPresentation {
                title: "Too Many Rows".into(),
                message: format!(
                    "{format} files are limited to {limit} rows and this selection has {rows}."
                ),
                action: Some("Narrow the filters or choose CSV or Parquet".into()),
            },
            DashError::ExportIo { processed, source } => ErrorPresentation {
                title: "Export Failed".into(),
                message: format!("Writing stopped after {processed} rows: {source}"),
                action: Some("Check free disk space and permissions, then export again".into()),
            },
            DashError::Cancelled { processed } => ErrorPresentation {
                title: "Export Cancelled".into(),
                message: format!("The export was stopped after {processed} rows. No file was saved."),
                action: None,
            },
            DashError::ExportInFlight => ErrorPresentation {
                title: "Export Running".into(),
                message: "Another export is still running for this dataset.".into(),
                action: Some("Wait for it to finish".into()),
            },
            DashError::DatasetUnavailable { reason, guidance } => ErrorPresentation {
                title: "Dataset Unavailable".into(),
                message: reason.clone(),
                action: Some(guidance.clone()),
            },
            DashError::Config(msg) => ErrorPresentation {
                title: "Configuration Error".into(),
                message: msg.clone(),
                action: Some("Fix segment-dash.toml and restart".into()),
            },
        }
    }

    /// Rows written before the export stopped, if this error ended an export.
    pub fn processed_rows(&self) -> Option<u64> {
        match self {
            DashError::ExportIo { processed, .. } | DashError::Cancelled { processed } => {
                Some(*processed)
            }
            _ => None,
        }
    }
}
