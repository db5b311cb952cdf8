//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Header string identifying a page as an NFS-e.
pub const DEFAULT_MARKER: &str = "NOTA FISCAL DE ELETRÔNICA DE SERVIÇOS";

/// Main configuration for the nfse pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NfseConfig {
    /// Field extraction configuration.
    pub extraction: ExtractionConfig,

    /// OCR fallback configuration.
    pub ocr: OcrConfig,

    /// Input document discovery.
    pub input: InputConfig,

    /// Output sink configuration.
    pub sink: SinkConfig,
}

/// Field extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Document-type marker that must appear on a page before it is matched.
    pub marker: String,

    /// Maximum pages to visit per document (0 = unlimited).
    pub max_pages: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            max_pages: 0,
        }
    }
}

/// OCR fallback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Run OCR on pages whose text layer lacks the marker.
    pub enabled: bool,

    /// Recognition language (ISO 639-2 code).
    pub language: String,

    /// DPI used when rasterizing a page.
    pub render_dpi: u32,

    /// Keep `[UNK]` tokens emitted by the recognizer instead of blanking them.
    pub keep_unk: bool,

    /// Directory containing det/rec models and dictionaries.
    pub model_dir: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "por".to_string(),
            render_dpi: 300,
            keep_unk: false,
            model_dir: PathBuf::from("models"),
        }
    }
}

/// Where input documents come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Folder scanned for documents.
    pub folder: PathBuf,

    /// File extension of documents to pick up (without the dot).
    pub extension: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("."),
            extension: "pdf".to_string(),
        }
    }
}

/// Spreadsheet sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Target spreadsheet identifier.
    pub spreadsheet_id: Option<String>,

    /// A1 range rows are appended to.
    pub range: String,

    /// Environment variable holding an already-issued bearer token.
    pub access_token_env: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            range: "Sheet1!A:D".to_string(),
            access_token_env: "NFSE_SHEETS_TOKEN".to_string(),
        }
    }
}

impl NfseConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Settings handed to [`crate::BatchExtractor`] at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    pub marker: String,
    pub max_pages: usize,
    pub ocr_enabled: bool,
    pub language: String,
    pub render_dpi: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self::from(&NfseConfig::default())
    }
}

impl From<&NfseConfig> for ExtractorConfig {
    fn from(config: &NfseConfig) -> Self {
        Self {
            marker: config.extraction.marker.clone(),
            max_pages: config.extraction.max_pages,
            ocr_enabled: config.ocr.enabled,
            language: config.ocr.language.clone(),
            render_dpi: config.ocr.render_dpi,
        }
    }
}
