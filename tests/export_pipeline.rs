mod common;

use std::cell::Cell;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use common::{Fixture, TOTAL_ROWS, entries, open, open_with};
use pretty_assertions::assert_eq;
use segment_dash::config::LimitsConfig;
use segment_dash::data::engine::{DuckEngine, QueryEngine};
use segment_dash::data::filter::{FilterSpec, PredicateBuilder};
use segment_dash::data::loader;
use segment_dash::data::model::{
    CellValue, ColumnInfo, ColumnKind, DatasetHandle, RowSet, SourceFormat,
};
use segment_dash::data::predicate::{Literal, Predicate, quote_string};
use segment_dash::data::query::{Projection, QueryExecutor};
use segment_dash::error::{DashError, EngineError};
use segment_dash::export::{
    BatchSink, CancelToken, CsvSink, ExportFormat, ExportJob, ExportPipeline, ExportProgress,
    ExportState,
};
use tempfile::TempDir;

fn category_a() -> FilterSpec {
    FilterSpec {
        categories: ["A".to_string()].into(),
        ..Default::default()
    }
}

fn job(predicate: Predicate, format: ExportFormat, projection: Projection, dest: PathBuf) -> ExportJob {
    ExportJob {
        predicate,
        format,
        projection,
        batch_size: 3,
        destination: dest,
    }
}

fn record(events: &mut Vec<ExportProgress>) -> impl FnMut(&ExportProgress) + '_ {
    move |p: &ExportProgress| events.push(*p)
}

#[test]
fn csv_export_writes_header_and_matching_rows() {
    let fx = Fixture::new();
    let out = TempDir::new().unwrap();
    let (handle, ex, cols) = open(&fx.csv);
    let predicate = PredicateBuilder::new(&cols).build(&category_a()).unwrap();
    let dest = out.path().join("clientes.csv");
    let job = job(
        predicate,
        ExportFormat::Csv { gzip: false },
        Projection::all(&handle),
        dest.clone(),
    );

    let mut events = Vec::new();
    let outcome = ExportPipeline::new(&ex, &handle, &LimitsConfig::default())
        .run(&job, &CancelToken::new(), &mut record(&mut events))
        .unwrap();

    assert_eq!(outcome.rows, 4);
    assert_eq!(outcome.path, dest);
    assert_eq!(outcome.mime_type(), "text/csv");

    let content = fs::read_to_string(&dest).unwrap();
    assert_eq!(content.lines().count(), 5);
    assert!(content.starts_with("id_cliente,nome,categoria,setor,"));

    // Reading the artifact back yields the same row count.
    assert_eq!(loader::inspect(&dest).unwrap().row_count, 4);

    let states: Vec<ExportState> = events.iter().map(|e| e.state).collect();
    assert_eq!(states.first(), Some(&ExportState::Estimating));
    assert_eq!(states.last(), Some(&ExportState::Completed));
    let processed: Vec<u64> = events.iter().map(|e| e.processed).collect();
    assert!(processed.windows(2).all(|w| w[0] <= w[1]), "{processed:?}");
    assert_eq!(events.last().unwrap().fraction(), 1.0);
    assert_eq!(entries(out.path()), vec!["clientes.csv".to_string()]);
}

#[test]
fn gzip_csv_round_trips() {
    let fx = Fixture::new();
    let out = TempDir::new().unwrap();
    let (handle, ex, cols) = open(&fx.parquet);
    let predicate = PredicateBuilder::new(&cols).build(&category_a()).unwrap();
    let dest = out.path().join("ids.csv.gz");
    let job = job(
        predicate,
        ExportFormat::Csv { gzip: true },
        Projection::identifier_only(&cols),
        dest.clone(),
    );

    ExportPipeline::new(&ex, &handle, &LimitsConfig::default())
        .run(&job, &CancelToken::new(), &mut |_: &ExportProgress| {})
        .unwrap();

    let mut text = String::new();
    flate2::read::GzDecoder::new(fs::File::open(&dest).unwrap())
        .read_to_string(&mut text)
        .unwrap();
    let mut lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.remove(0), "id_cliente");
    lines.sort();
    assert_eq!(lines, vec!["1", "2", "4", "7"]);
}

#[test]
fn parquet_export_is_written_by_the_engine() {
    let fx = Fixture::new();
    let out = TempDir::new().unwrap();
    let (handle, ex, cols) = open(&fx.csv);
    let predicate = PredicateBuilder::new(&cols).build(&category_a()).unwrap();
    let dest = out.path().join("clientes.parquet");
    let job = job(predicate, ExportFormat::Parquet, Projection::all(&handle), dest.clone());

    let outcome = ExportPipeline::new(&ex, &handle, &LimitsConfig::default())
        .run(&job, &CancelToken::new(), &mut |_: &ExportProgress| {})
        .unwrap();
    assert_eq!(outcome.rows, 4);

    let file = fs::File::open(&dest).unwrap();
    let reader = parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
    assert_eq!(reader.metadata().file_metadata().num_rows(), 4);
    assert_eq!(entries(out.path()), vec!["clientes.parquet".to_string()]);
}

#[test]
fn xlsx_export_under_ceiling_succeeds() {
    let fx = Fixture::new();
    let out = TempDir::new().unwrap();
    let (handle, ex, _) = open(&fx.parquet);
    let dest = out.path().join("clientes.xlsx");
    let job = job(Predicate::match_all(), ExportFormat::Xlsx, Projection::all(&handle), dest.clone());

    let outcome = ExportPipeline::new(&ex, &handle, &LimitsConfig::default())
        .run(&job, &CancelToken::new(), &mut |_: &ExportProgress| {})
        .unwrap();
    assert_eq!(outcome.rows, TOTAL_ROWS);
    assert_eq!(&fs::read(&dest).unwrap()[..2], b"PK");
}

#[test]
fn csv_export_renders_time_interval_and_list_cells_as_text() {
    let fx = Fixture::new();
    let out = TempDir::new().unwrap();
    let source = out.path().join("agenda.parquet");
    let (_, writer, _) = open(&fx.csv);
    writer
        .engine()
        .execute(&format!(
            "COPY (SELECT 1 AS id, TIME '10:30:00' AS hora, INTERVAL 2 DAY AS duracao, \
             [1, 2] AS tags) TO {} (FORMAT PARQUET)",
            quote_string(&source.to_string_lossy())
        ))
        .unwrap();

    let mut handle = DatasetHandle {
        path: source.clone(),
        format: SourceFormat::Parquet,
        row_count: 1,
        columns: ["id", "hora", "duracao", "tags"]
            .into_iter()
            .map(|name| ColumnInfo {
                name: name.into(),
                kind: ColumnKind::Other,
            })
            .collect(),
        distinct: Default::default(),
    };
    let ex = QueryExecutor::new(
        DuckEngine::open(&source, SourceFormat::Parquet).unwrap(),
        &LimitsConfig::default(),
    );
    ex.resolve_column_kinds(&mut handle).unwrap();
    let kinds: Vec<ColumnKind> = handle.columns.iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ColumnKind::Integer,
            ColumnKind::Time,
            ColumnKind::Other,
            ColumnKind::Other
        ]
    );

    let dest = out.path().join("agenda.csv");
    let job = job(
        Predicate::match_all(),
        ExportFormat::Csv { gzip: false },
        Projection::all(&handle),
        dest.clone(),
    );
    ExportPipeline::new(&ex, &handle, &LimitsConfig::default())
        .run(&job, &CancelToken::new(), &mut |_: &ExportProgress| {})
        .unwrap();

    assert_eq!(
        fs::read_to_string(&dest).unwrap(),
        "id,hora,duracao,tags\n1,10:30:00,2 days,\"[1, 2]\"\n"
    );
}

// ---------------------------------------------------------------------------
// Failure paths
// ---------------------------------------------------------------------------

/// Counts row fetches so tests can prove none happened.
struct SpyEngine {
    inner: DuckEngine,
    row_queries: Cell<usize>,
}

impl QueryEngine for SpyEngine {
    fn scalar(&self, sql: &str, params: &[Literal]) -> Result<CellValue, EngineError> {
        self.inner.scalar(sql, params)
    }

    fn rows(
        &self,
        sql: &str,
        params: &[Literal],
        width: usize,
    ) -> Result<Vec<Vec<CellValue>>, EngineError> {
        self.row_queries.set(self.row_queries.get() + 1);
        self.inner.rows(sql, params, width)
    }

    fn execute(&self, sql: &str) -> Result<(), EngineError> {
        self.inner.execute(sql)
    }
}

#[test]
fn xlsx_over_ceiling_is_rejected_before_any_row_fetch() {
    let fx = Fixture::new();
    let out = TempDir::new().unwrap();
    let handle = loader::inspect(&fx.parquet).unwrap();
    let limits = LimitsConfig {
        xlsx_row_ceiling: 5,
        ..Default::default()
    };
    let spy = SpyEngine {
        inner: DuckEngine::open(&handle.path, handle.format).unwrap(),
        row_queries: Cell::new(0),
    };
    let ex = QueryExecutor::new(spy, &limits);
    let dest = out.path().join("clientes.xlsx");
    let job = job(Predicate::match_all(), ExportFormat::Xlsx, Projection::all(&handle), dest.clone());

    let mut pipeline = ExportPipeline::new(&ex, &handle, &limits);
    let err = pipeline
        .run(&job, &CancelToken::new(), &mut |_: &ExportProgress| {})
        .unwrap_err();

    assert!(matches!(
        err,
        DashError::FormatRowLimitExceeded {
            rows: 10,
            limit: 5,
            ..
        }
    ));
    assert_eq!(ex.engine().row_queries.get(), 0);
    assert_eq!(pipeline.state(), ExportState::Failed);
    assert!(!dest.exists());
    assert!(entries(out.path()).is_empty());
}

/// Passes the first `ok_batches` batches to a real CSV sink, then fails.
struct FailingSink {
    inner: Box<CsvSink>,
    ok_batches: usize,
}

impl BatchSink for FailingSink {
    fn begin(&mut self, columns: &[String]) -> io::Result<()> {
        self.inner.begin(columns)
    }

    fn write_batch(&mut self, batch: &RowSet) -> io::Result<()> {
        if self.ok_batches == 0 {
            return Err(io::Error::other("disk full"));
        }
        self.ok_batches -= 1;
        self.inner.write_batch(batch)
    }

    fn finish(self: Box<Self>) -> io::Result<PathBuf> {
        self.inner.finish()
    }
}

#[test]
fn mid_stream_failure_leaves_no_artifact() {
    let fx = Fixture::new();
    let out = TempDir::new().unwrap();
    let (handle, ex, _) = open(&fx.csv);
    let dest = out.path().join("clientes.csv");
    let job = job(
        Predicate::match_all(),
        ExportFormat::Csv { gzip: false },
        Projection::all(&handle),
        dest.clone(),
    );
    let sink = FailingSink {
        inner: Box::new(CsvSink::create(&dest, false).unwrap()),
        ok_batches: 2,
    };

    let mut events = Vec::new();
    let mut pipeline = ExportPipeline::new(&ex, &handle, &LimitsConfig::default());
    let err = pipeline
        .run_with_sink(&job, Box::new(sink), &CancelToken::new(), &mut record(&mut events))
        .unwrap_err();

    // Two batches of three went through before the third write failed.
    assert!(matches!(err, DashError::ExportIo { processed: 6, .. }));
    assert_eq!(err.processed_rows(), Some(6));
    assert_eq!(pipeline.state(), ExportState::Failed);
    assert_eq!(events.last().map(|e| e.state), Some(ExportState::Failed));
    assert!(!dest.exists());
    assert!(entries(out.path()).is_empty());
}

#[test]
fn cancellation_stops_after_current_batch() {
    let fx = Fixture::new();
    let out = TempDir::new().unwrap();
    let (handle, ex, _) = open(&fx.parquet);
    let dest = out.path().join("clientes.csv");
    let job = job(
        Predicate::match_all(),
        ExportFormat::Csv { gzip: false },
        Projection::all(&handle),
        dest.clone(),
    );

    let cancel = CancelToken::new();
    let on_progress = &mut |p: &ExportProgress| {
        if p.processed > 0 {
            cancel.cancel();
        }
    };
    let err = ExportPipeline::new(&ex, &handle, &LimitsConfig::default())
        .run(&job, &cancel, on_progress)
        .unwrap_err();

    assert!(matches!(err, DashError::Cancelled { processed: 3 }));
    assert!(!dest.exists());
    assert!(entries(out.path()).is_empty());
}

#[test]
fn batch_size_is_capped_by_configured_maximum() {
    let fx = Fixture::new();
    let out = TempDir::new().unwrap();
    let limits = LimitsConfig {
        batch_size: 2,
        max_batch_size: 2,
        ..Default::default()
    };
    let (handle, ex, _) = open_with(&fx.csv, &limits);
    let mut job = job(
        Predicate::match_all(),
        ExportFormat::Csv { gzip: false },
        Projection::all(&handle),
        out.path().join("clientes.csv"),
    );
    job.batch_size = 1_000;

    let mut events = Vec::new();
    ExportPipeline::new(&ex, &handle, &limits)
        .run(&job, &CancelToken::new(), &mut record(&mut events))
        .unwrap();

    let batches: Vec<u64> = events
        .iter()
        .filter(|e| e.state == ExportState::Exporting && e.processed > 0)
        .map(|e| e.processed)
        .collect();
    assert_eq!(batches, vec![2, 4, 6, 8, 10]);
}
