//! Data models and configuration.

pub mod config;
pub mod record;

pub use config::{ExtractionConfig, ExtractorConfig, InputConfig, NfseConfig, OcrConfig, SinkConfig};
pub use record::{Field, PartialRecord, Record, Row, SENTINEL};
