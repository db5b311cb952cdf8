//! Pure Rust OCR engine wrapper using `pure-onnx-ocr`.

use std::path::Path;
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use tracing::{debug, info};

use crate::error::OcrError;
use crate::models::config::OcrConfig;

use super::{sort_reading_order, Result, TextBox, TextRecognizer};

/// Languages covered by the Latin-script recognition model.
const LATIN_LANGUAGES: &[&str] = &[
    "por", "eng", "spa", "fra", "deu", "ita", "pol", "nld", "cat", "ron",
];

/// Recognition script model for an ISO 639-2 language code.
pub fn script_for_language(language: &str) -> Option<&'static str> {
    let language = language.to_ascii_lowercase();
    LATIN_LANGUAGES
        .contains(&language.as_str())
        .then_some("latin")
}

/// OCR engine backed by `pure-onnx-ocr` (pure Rust, no external ONNX Runtime).
pub struct PureOcrEngine {
    engine: pure_onnx_ocr::engine::OcrEngine,
    language: String,
    keep_unk: bool,
}

impl PureOcrEngine {
    /// Load the detection model plus the recognition model for the
    /// configured language from `config.model_dir`.
    pub fn from_config(config: &OcrConfig) -> Result<Self> {
        Self::from_dir(&config.model_dir, &config.language, config.keep_unk)
    }

    /// Load models for `language` from a directory.
    ///
    /// Expects `det.onnx`, `<script>_rec.onnx` and `<script>_dict.txt`.
    pub fn from_dir(model_dir: &Path, language: &str, keep_unk: bool) -> Result<Self> {
        let script = script_for_language(language)
            .ok_or_else(|| OcrError::UnsupportedLanguage(language.to_string()))?;

        let det_path = model_dir.join("det.onnx");
        let rec_path = model_dir.join(format!("{}_rec.onnx", script));
        let dict_path = model_dir.join(format!("{}_dict.txt", script));

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.exists() {
                return Err(OcrError::ModelLoad(format!(
                    "missing model file {}",
                    path.display()
                )));
            }
        }

        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(&det_path)
            .rec_model_path(&rec_path)
            .dictionary_path(&dict_path)
            .build()
            .map_err(|e| OcrError::ModelLoad(format!("pure-onnx-ocr: {}", e)))?;

        info!(
            "Loaded pure-onnx-ocr {} engine for '{}' from {}",
            script,
            language,
            model_dir.display()
        );

        Ok(Self {
            engine,
            language: language.to_ascii_lowercase(),
            keep_unk,
        })
    }
}

impl TextRecognizer for PureOcrEngine {
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<Vec<TextBox>> {
        if !language.eq_ignore_ascii_case(&self.language) {
            return Err(OcrError::UnsupportedLanguage(format!(
                "{} (engine loaded for {})",
                language, self.language
            )));
        }

        let start = Instant::now();
        let (width, height) = image.dimensions();

        let results = self
            .engine
            .run_from_image(image)
            .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {}", e)))?;

        let mut boxes: Vec<TextBox> = results
            .iter()
            .map(|r| TextBox {
                bbox: polygon_to_bbox(&r.bounding_box),
                text: if self.keep_unk {
                    r.text.clone()
                } else {
                    r.text.replace("[UNK]", " ")
                },
                confidence: r.confidence,
            })
            .collect();

        sort_reading_order(&mut boxes);

        debug!(
            "Recognized {} boxes in {}x{} image in {}ms",
            boxes.len(),
            width,
            height,
            start.elapsed().as_millis()
        );

        Ok(boxes)
    }
}

/// First four exterior points of the polygon as `[x1, y1, ..., x4, y4]`.
fn polygon_to_bbox(polygon: &pure_onnx_ocr::Polygon<f64>) -> [f32; 8] {
    let mut bbox = [0.0f32; 8];
    for (i, coord) in polygon.exterior().coords().take(4).enumerate() {
        bbox[i * 2] = coord.x as f32;
        bbox[i * 2 + 1] = coord.y as f32;
    }
    bbox
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_for_language() {
        assert_eq!(script_for_language("por"), Some("latin"));
        assert_eq!(script_for_language("POR"), Some("latin"));
        assert_eq!(script_for_language("jpn"), None);
    }

    #[test]
    fn test_unsupported_language_fails_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let result = PureOcrEngine::from_dir(dir.path(), "jpn", false);
        assert!(matches!(result, Err(OcrError::UnsupportedLanguage(_))));
    }

    #[test]
    fn test_missing_models_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = PureOcrEngine::from_dir(dir.path(), "por", false);
        assert!(matches!(result, Err(OcrError::ModelLoad(_))));
    }
}
