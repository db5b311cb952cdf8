//! Core library for NFS-e field extraction.
//!
//! This crate provides:
//! - PDF page access (text layer and scanned page images)
//! - OCR fallback for pages without a usable text layer
//! - Anchor-then-pattern matching of hour, counterparty, description and amount
//! - Record normalization and batch extraction into 4-column rows

pub mod batch;
pub mod error;
pub mod invoice;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod sink;

pub use batch::{BatchExtractor, BatchReport, DocumentOutcome, DocumentStatus, PageOrigin};
pub use error::{NfseError, OcrError, PdfError, Result, SinkError};
pub use invoice::{finalize, FieldMatcher, PageText};
pub use models::{ExtractorConfig, Field, NfseConfig, PartialRecord, Record, Row, SENTINEL};
pub use ocr::{OcrFallback, TextBox, TextRecognizer};
#[cfg(feature = "native")]
pub use ocr::PureOcrEngine;
pub use pdf::{PageSource, PdfDocument};
pub use sink::{CsvSink, MemorySink, RowSink};
