//! Debit batch export
//!
//! Writes one CSV file per run into the output directory:
//!
//! ```text
//! 191026_143005.csv
//!
//! iban,amount_in_pence
//! GB00TEST00000000,2883
//! ```
//!
//! File names use `%d%m%y_%H%M%S` local time, the format downstream
//! batch consumers read.

use crate::{types::ExportRow, Error, Result};
use chrono::{DateTime, Local};
use csv::{Terminator, WriterBuilder};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Header row of the export file
pub const EXPORT_HEADER: [&str; 2] = ["iban", "amount_in_pence"];

/// Timestamp format used for export file names
pub const TIMESTAMP_FORMAT: &str = "%d%m%y_%H%M%S";

/// Destination for computed settlement rows
pub trait ExportSink: Send + Sync {
    /// Persist all rows as one batch, returning where they were written
    fn export(&self, rows: &[ExportRow]) -> Result<PathBuf>;
}

/// CSV file exporter
#[derive(Debug, Clone)]
pub struct CsvExporter {
    /// Output directory
    output_dir: PathBuf,
}

impl CsvExporter {
    /// Create exporter writing into `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Output directory
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// File name for an export taken at `timestamp`
    pub fn file_name(timestamp: &DateTime<Local>) -> String {
        format!("{}.csv", timestamp.format(TIMESTAMP_FORMAT))
    }

    /// Write `rows` to the file named after `timestamp`
    ///
    /// Refuses to overwrite an existing export.
    pub fn export_at(&self, rows: &[ExportRow], timestamp: &DateTime<Local>) -> Result<PathBuf> {
        let path = self.write_batch(timestamp, |file| write_rows(file, rows))?;

        tracing::info!("Exported {} rows to {}", rows.len(), path.display());

        Ok(path)
    }

    /// Stage the batch in a temporary file, then move it to its final name
    ///
    /// The final `.csv` only appears once `write` has completed and the data
    /// is synced; on failure the staged file is removed.
    fn write_batch<F>(&self, timestamp: &DateTime<Local>, write: F) -> Result<PathBuf>
    where
        F: FnOnce(&mut File) -> Result<()>,
    {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            Error::Export(format!(
                "cannot create output directory {}: {}",
                self.output_dir.display(),
                e
            ))
        })?;

        let path = self.output_dir.join(Self::file_name(timestamp));

        let mut staged = tempfile::Builder::new()
            .prefix(".")
            .suffix(".partial")
            .tempfile_in(&self.output_dir)
            .map_err(|e| {
                Error::Export(format!(
                    "cannot stage export in {}: {}",
                    self.output_dir.display(),
                    e
                ))
            })?;

        write(staged.as_file_mut())?;
        staged.as_file().sync_all()?;

        staged
            .persist_noclobber(&path)
            .map_err(|e| Error::Export(format!("cannot create {}: {}", path.display(), e.error)))?;

        Ok(path)
    }
}

fn write_rows(file: &mut File, rows: &[ExportRow]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(file);

    writer.write_record(EXPORT_HEADER)?;
    for row in rows {
        let amount = row.amount_in_pence.to_string();
        writer.write_record([row.iban.as_str(), amount.as_str()])?;
    }
    writer.flush()?;

    Ok(())
}

impl ExportSink for CsvExporter {
    fn export(&self, rows: &[ExportRow]) -> Result<PathBuf> {
        self.export_at(rows, &Local::now())
    }
}
