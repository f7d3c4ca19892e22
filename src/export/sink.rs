//! Atomic output sinks. Each writes into a temporary file in the destination
//! directory and persists it over the destination only in `finish()`. A sink
//! dropped before `finish()` deletes its temporary file.

use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use csv::Writer;
use flate2::Compression;
use flate2::write::GzEncoder;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use tempfile::NamedTempFile;

use crate::data::model::{CellValue, RowSet};

/// Receives an export's rows batch by batch.
pub trait BatchSink {
    /// Called once, before any batch, with the projected column names.
    fn begin(&mut self, columns: &[String]) -> io::Result<()>;

    fn write_batch(&mut self, batch: &RowSet) -> io::Result<()>;

    /// Flush and atomically move the artifact into place.
    fn finish(self: Box<Self>) -> io::Result<PathBuf>;
}

fn temp_in_parent(final_path: &Path) -> io::Result<NamedTempFile> {
    let parent = final_path
        .parent()
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot determine parent directory for {}", final_path.display()),
            )
        })?;
    NamedTempFile::new_in(parent)
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// CSV sink. The header is written once in `begin`; batches append records.
/// With `gzip`, the complete file is compressed once in `finish`.
pub struct CsvSink {
    writer: Writer<BufWriter<NamedTempFile>>,
    final_path: PathBuf,
    gzip: bool,
}

impl CsvSink {
    pub fn create(final_path: impl AsRef<Path>, gzip: bool) -> io::Result<Self> {
        let final_path = final_path.as_ref().to_path_buf();
        let temp = temp_in_parent(&final_path)?;
        Ok(Self {
            writer: Writer::from_writer(BufWriter::new(temp)),
            final_path,
            gzip,
        })
    }
}

impl BatchSink for CsvSink {
    fn begin(&mut self, columns: &[String]) -> io::Result<()> {
        self.writer.write_record(columns)?;
        Ok(())
    }

    fn write_batch(&mut self, batch: &RowSet) -> io::Result<()> {
        for row in &batch.rows {
            self.writer.write_record(row.iter().map(CellValue::to_field))?;
        }
        // Keep at most one batch buffered in memory.
        self.writer.flush()
    }

    fn finish(self: Box<Self>) -> io::Result<PathBuf> {
        let CsvSink {
            writer,
            final_path,
            gzip,
        } = *self;

        let buf = writer.into_inner().map_err(|e| e.into_error())?;
        let temp = buf.into_inner().map_err(|e| e.into_error())?;

        if gzip {
            let mut source = temp.reopen()?;
            let compressed = temp_in_parent(&final_path)?;
            let mut encoder = GzEncoder::new(BufWriter::new(compressed), Compression::default());
            io::copy(&mut source, &mut encoder)?;
            let compressed = encoder
                .finish()?
                .into_inner()
                .map_err(|e| e.into_error())?;
            compressed.persist(&final_path)?;
            // `temp` is dropped here, removing the uncompressed copy.
        } else {
            temp.persist(&final_path)?;
        }
        Ok(final_path)
    }
}

// ---------------------------------------------------------------------------
// XLSX
// ---------------------------------------------------------------------------

/// Spreadsheet writers cannot append, so rows are held in memory until
/// `finish`. The pipeline bounds the row count before creating this sink.
pub struct XlsxSink {
    final_path: PathBuf,
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl XlsxSink {
    pub fn create(final_path: impl AsRef<Path>) -> io::Result<Self> {
        let final_path = final_path.as_ref().to_path_buf();
        // Fail early on an unusable directory rather than after buffering.
        drop(temp_in_parent(&final_path)?);
        Ok(Self {
            final_path,
            columns: Vec::new(),
            rows: Vec::new(),
        })
    }

    fn write_workbook(&self, path: &Path) -> Result<(), XlsxError> {
        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();
        let sheet = workbook.add_worksheet();

        for (c, name) in self.columns.iter().enumerate() {
            sheet.write_string_with_format(0, c as u16, name, &header)?;
        }
        for (r, row) in self.rows.iter().enumerate() {
            let r = (r + 1) as u32;
            for (c, cell) in row.iter().enumerate() {
                let c = c as u16;
                match SheetCell::from(cell) {
                    SheetCell::Blank => {}
                    SheetCell::Number(v) => {
                        sheet.write_number(r, c, v)?;
                    }
                    SheetCell::Bool(b) => {
                        sheet.write_boolean(r, c, b)?;
                    }
                    SheetCell::Text(s) => {
                        sheet.write_string(r, c, s)?;
                    }
                }
            }
        }
        workbook.save(path)
    }
}

/// Largest integer a spreadsheet number holds exactly (2^53).
const XLSX_EXACT_INTEGER: i64 = 1 << 53;

#[derive(Debug, PartialEq)]
enum SheetCell {
    Blank,
    Number(f64),
    Bool(bool),
    Text(String),
}

impl From<&CellValue> for SheetCell {
    fn from(cell: &CellValue) -> Self {
        match cell {
            CellValue::Null => SheetCell::Blank,
            CellValue::Integer(i) if i.unsigned_abs() <= XLSX_EXACT_INTEGER as u64 => {
                SheetCell::Number(*i as f64)
            }
            CellValue::Float(v) => SheetCell::Number(*v),
            CellValue::Bool(b) => SheetCell::Bool(*b),
            other => SheetCell::Text(other.to_field()),
        }
    }
}

impl BatchSink for XlsxSink {
    fn begin(&mut self, columns: &[String]) -> io::Result<()> {
        self.columns = columns.to_vec();
        Ok(())
    }

    fn write_batch(&mut self, batch: &RowSet) -> io::Result<()> {
        self.rows.extend(batch.rows.iter().cloned());
        Ok(())
    }

    fn finish(self: Box<Self>) -> io::Result<PathBuf> {
        let temp = temp_in_parent(&self.final_path)?.into_temp_path();
        self.write_workbook(&temp)
            .map_err(|e| io::Error::other(e.to_string()))?;
        temp.persist(&self.final_path)?;
        Ok(self.final_path)
    }
}

/// Reserve a temporary path next to `final_path` for an engine-written file.
pub(crate) fn reserve_temp_path(final_path: &Path) -> io::Result<tempfile::TempPath> {
    Ok(temp_in_parent(final_path)?.into_temp_path())
}
