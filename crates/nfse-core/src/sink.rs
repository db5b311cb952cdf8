//! Destinations for finalized rows.

use std::io::Write;

use tracing::debug;

use crate::error::SinkError;
use crate::models::record::{Field, Row};

/// Result type for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Accepts a batch append of rows in column order
/// (Hour, Counterparty, Description, Amount).
pub trait RowSink {
    /// Append all rows in a single call.
    fn append_rows(&mut self, rows: &[Row]) -> Result<()>;
}

/// Keeps appended rows in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Vec<Row>,
    appends: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of `append_rows` calls received.
    pub fn appends(&self) -> usize {
        self.appends
    }
}

impl RowSink for MemorySink {
    fn append_rows(&mut self, rows: &[Row]) -> Result<()> {
        self.appends += 1;
        self.rows.extend_from_slice(rows);
        Ok(())
    }
}

/// Writes rows as CSV, with a header before the first append.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    header_written: bool,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            header_written: false,
        }
    }

    /// Skip the header, for appending to a file that already has one.
    pub fn without_header(mut self) -> Self {
        self.header_written = true;
        self
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| SinkError::Write(e.to_string()))
    }
}

impl<W: Write> RowSink for CsvSink<W> {
    fn append_rows(&mut self, rows: &[Row]) -> Result<()> {
        if !self.header_written {
            self.writer
                .write_record(Field::ALL.map(Field::column_name))?;
            self.header_written = true;
        }
        for row in rows {
            self.writer.write_record(row)?;
        }
        self.writer.flush()?;
        debug!("Wrote {} CSV rows", rows.len());
        Ok(())
    }
}
