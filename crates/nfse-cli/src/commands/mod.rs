//! Subcommands and the setup they share.

pub mod batch;
pub mod config;
pub mod process;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use nfse_core::{BatchExtractor, ExtractorConfig, NfseConfig, PureOcrEngine};

/// Location of the per-user configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nfse")
        .join("config.json")
}

/// Load the configuration named on the command line, else the per-user file,
/// else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<NfseConfig> {
    if let Some(path) = config_path {
        return Ok(NfseConfig::from_file(Path::new(path))?);
    }

    let default_path = default_config_path();
    if default_path.exists() {
        debug!("Using config from {}", default_path.display());
        Ok(NfseConfig::from_file(&default_path)?)
    } else {
        Ok(NfseConfig::default())
    }
}

fn load_recognizer(config: &NfseConfig) -> nfse_core::Result<Option<PureOcrEngine>> {
    if !config.ocr.enabled {
        return Ok(None);
    }
    Ok(Some(PureOcrEngine::from_config(&config.ocr)?))
}

/// Build the extractor; missing OCR models leave text-layer extraction only.
pub fn build_extractor(config: &NfseConfig) -> BatchExtractor {
    let extractor = BatchExtractor::new(ExtractorConfig::from(config));

    match load_recognizer(config) {
        Ok(Some(engine)) => extractor.with_recognizer(engine),
        Ok(None) => extractor,
        Err(e) => {
            warn!("OCR fallback unavailable: {}", e);
            extractor
        }
    }
}

/// Apply the `--model-dir` / `--text-only` overrides shared by commands.
pub fn apply_overrides(config: &mut NfseConfig, model_dir: Option<PathBuf>, text_only: bool) {
    if let Some(dir) = model_dir {
        config.ocr.model_dir = dir;
    }
    if text_only {
        config.ocr.enabled = false;
    }
}
