use std::io;
use std::path::PathBuf;

use super::sink::{BatchSink, CsvSink, XlsxSink, reserve_temp_path};
use super::{CancelToken, ExportFormat, ExportJob};
use crate::config::LimitsConfig;
use crate::data::engine::QueryEngine;
use crate::data::model::DatasetHandle;
use crate::data::query::QueryExecutor;
use crate::error::{DashError, DashResult};

// ---------------------------------------------------------------------------
// State and progress
// ---------------------------------------------------------------------------

/// `Idle → Estimating → Exporting → Completed`, or `… → Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Estimating,
    Exporting,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportProgress {
    pub state: ExportState,
    pub processed: u64,
    pub total: u64,
}

impl ExportProgress {
    /// `processed / total`, clamped to `[0, 1]`. An empty export is complete.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return if self.state == ExportState::Completed { 1.0 } else { 0.0 };
        }
        (self.processed as f64 / self.total as f64).clamp(0.0, 1.0) as f32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub rows: u64,
    pub format: ExportFormat,
}

impl ExportOutcome {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

// ---------------------------------------------------------------------------
// ExportPipeline
// ---------------------------------------------------------------------------

/// Streams a job's rows into one artifact, one batch in memory at a time.
pub struct ExportPipeline<'a, E> {
    executor: &'a QueryExecutor<E>,
    handle: &'a DatasetHandle,
    max_batch_size: u64,
    xlsx_row_ceiling: u64,
    state: ExportState,
    processed: u64,
    total: u64,
}

impl<'a, E: QueryEngine> ExportPipeline<'a, E> {
    pub fn new(
        executor: &'a QueryExecutor<E>,
        handle: &'a DatasetHandle,
        limits: &LimitsConfig,
    ) -> Self {
        Self {
            executor,
            handle,
            max_batch_size: limits.max_batch_size,
            xlsx_row_ceiling: limits.xlsx_row_ceiling,
            state: ExportState::Idle,
            processed: 0,
            total: 0,
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    pub fn progress(&self) -> ExportProgress {
        ExportProgress {
            state: self.state,
            processed: self.processed,
            total: self.total,
        }
    }

    /// Run `job` into the sink its format calls for.
    pub fn run(
        &mut self,
        job: &ExportJob,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(&ExportProgress),
    ) -> DashResult<ExportOutcome> {
        let total = self.estimate(job, on_progress)?;

        let created: io::Result<Box<dyn BatchSink>> = match job.format {
            ExportFormat::Parquet => return self.copy_parquet(job, on_progress),
            ExportFormat::Csv { gzip } => CsvSink::create(&job.destination, gzip)
                .map(|s| Box::new(s) as Box<dyn BatchSink>),
            ExportFormat::Xlsx => {
                XlsxSink::create(&job.destination).map(|s| Box::new(s) as Box<dyn BatchSink>)
            }
        };
        let sink = match created {
            Ok(sink) => sink,
            Err(e) => return Err(self.fail_io(e, on_progress)),
        };
        self.stream(job, total, sink, cancel, on_progress)
    }

    /// Run `job` into a caller-provided sink. The job's format only decides
    /// the XLSX row ceiling and the outcome label.
    pub fn run_with_sink(
        &mut self,
        job: &ExportJob,
        sink: Box<dyn BatchSink>,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(&ExportProgress),
    ) -> DashResult<ExportOutcome> {
        let total = self.estimate(job, on_progress)?;
        self.stream(job, total, sink, cancel, on_progress)
    }

    // -- phases --

    fn estimate(
        &mut self,
        job: &ExportJob,
        on_progress: &mut dyn FnMut(&ExportProgress),
    ) -> DashResult<u64> {
        self.processed = 0;
        self.total = 0;
        self.transition(ExportState::Estimating, on_progress);

        let total = match self.executor.count(self.handle, &job.predicate) {
            Ok(n) => n,
            Err(e) => return Err(self.fail(e, on_progress)),
        };
        self.total = total;

        if job.format == ExportFormat::Xlsx && total > self.xlsx_row_ceiling {
            let err = DashError::FormatRowLimitExceeded {
                format: job.format.label(),
                rows: total,
                limit: self.xlsx_row_ceiling,
            };
            return Err(self.fail(err, on_progress));
        }
        log::info!(
            "exporting {total} rows as {} to {}",
            job.format,
            job.destination.display()
        );
        Ok(total)
    }

    fn stream(
        &mut self,
        job: &ExportJob,
        total: u64,
        mut sink: Box<dyn BatchSink>,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(&ExportProgress),
    ) -> DashResult<ExportOutcome> {
        let batch_size = job.batch_size.clamp(1, self.max_batch_size).min(total.max(1));
        self.transition(ExportState::Exporting, on_progress);

        if let Err(e) = sink.begin(job.projection.names()) {
            return Err(self.fail_io(e, on_progress));
        }

        loop {
            let batch = match self.executor.fetch_batch(
                self.handle,
                &job.predicate,
                &job.projection,
                self.processed,
                batch_size,
            ) {
                Ok(batch) => batch,
                Err(e) => return Err(self.fail(e, on_progress)),
            };
            if batch.is_empty() {
                break;
            }
            if let Err(e) = sink.write_batch(&batch) {
                return Err(self.fail_io(e, on_progress));
            }
            self.processed += batch.len() as u64;
            log::debug!("export batch written, {}/{} rows", self.processed, total);
            on_progress(&self.progress());

            if cancel.is_cancelled() {
                log::info!("export cancelled after {} rows", self.processed);
                let err = DashError::Cancelled {
                    processed: self.processed,
                };
                return Err(self.fail(err, on_progress));
            }
            if (batch.len() as u64) < batch_size {
                break;
            }
        }

        match sink.finish() {
            Ok(path) => Ok(self.complete(path, job.format, on_progress)),
            Err(e) => Err(self.fail_io(e, on_progress)),
        }
    }

    /// Parquet is written by the engine in one statement; it streams internally.
    fn copy_parquet(
        &mut self,
        job: &ExportJob,
        on_progress: &mut dyn FnMut(&ExportProgress),
    ) -> DashResult<ExportOutcome> {
        self.transition(ExportState::Exporting, on_progress);

        let temp = match reserve_temp_path(&job.destination) {
            Ok(t) => t,
            Err(e) => return Err(self.fail_io(e, on_progress)),
        };
        if let Err(e) =
            self.executor
                .copy_to_parquet(self.handle, &job.predicate, &job.projection, &temp)
        {
            return Err(self.fail(e, on_progress));
        }
        if let Err(e) = temp.persist(&job.destination) {
            return Err(self.fail_io(e.into(), on_progress));
        }
        self.processed = self.total;
        Ok(self.complete(job.destination.clone(), job.format, on_progress))
    }

    // -- transitions --

    fn transition(&mut self, state: ExportState, on_progress: &mut dyn FnMut(&ExportProgress)) {
        log::debug!("export state {:?} -> {:?}", self.state, state);
        self.state = state;
        on_progress(&self.progress());
    }

    fn complete(
        &mut self,
        path: PathBuf,
        format: ExportFormat,
        on_progress: &mut dyn FnMut(&ExportProgress),
    ) -> ExportOutcome {
        self.transition(ExportState::Completed, on_progress);
        log::info!("export completed: {} rows to {}", self.processed, path.display());
        ExportOutcome {
            path,
            rows: self.processed,
            format,
        }
    }

    fn fail(
        &mut self,
        err: DashError,
        on_progress: &mut dyn FnMut(&ExportProgress),
    ) -> DashError {
        self.transition(ExportState::Failed, on_progress);
        log::error!("export failed after {} rows: {err}", self.processed);
        err
    }

    fn fail_io(
        &mut self,
        source: io::Error,
        on_progress: &mut dyn FnMut(&ExportProgress),
    ) -> DashError {
        let err = DashError::ExportIo {
            processed: self.processed,
            source,
        };
        self.fail(err, on_progress)
    }
}
