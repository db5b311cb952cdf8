//! Error types for the nfse-core library.

use thiserror::Error;

/// Main error type for the nfse library.
#[derive(Error, Debug)]
pub enum NfseError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Row sink error.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to read the PDF file.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),

    /// The page carries no image that could be rasterized.
    #[error("no image found on page {0}")]
    NoPageImage(u32),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// The page could not be turned into an image.
    #[error("failed to rasterize page {page}: {reason}")]
    Rasterize { page: u32, reason: String },

    /// No recognition model covers the requested language.
    #[error("unsupported OCR language: {0}")]
    UnsupportedLanguage(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),
}

/// Errors raised by a row sink on a batch append.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Writing rows to the destination failed.
    #[error("failed to write rows: {0}")]
    Write(String),

    /// The remote endpoint rejected the append.
    #[error("remote append rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The sink is missing settings it needs.
    #[error("sink not configured: {0}")]
    NotConfigured(String),

    /// CSV encoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to configuration files.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read or write the configuration file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for this schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for the nfse library.
pub type Result<T> = std::result::Result<T, NfseError>;
