//! OCR fallback for pages without a usable text layer.

#[cfg(feature = "native")]
mod pure_engine;

#[cfg(feature = "native")]
pub use pure_engine::PureOcrEngine;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OcrError;
use crate::pdf::PageSource;

/// Result type for OCR operations.
pub type Result<T> = std::result::Result<T, OcrError>;

/// A recognized text region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    /// Quadrilateral corners (x1, y1, x2, y2, x3, y3, x4, y4).
    pub bbox: [f32; 8],

    /// Recognized text content.
    pub text: String,

    /// Recognition confidence (0.0 - 1.0).
    pub confidence: f32,
}

impl TextBox {
    pub fn new(text: impl Into<String>, bbox: [f32; 8]) -> Self {
        Self {
            bbox,
            text: text.into(),
            confidence: 1.0,
        }
    }

    /// Axis-aligned bounding rectangle (min_x, min_y, max_x, max_y).
    pub fn rect(&self) -> (f32, f32, f32, f32) {
        let xs = [self.bbox[0], self.bbox[2], self.bbox[4], self.bbox[6]];
        let ys = [self.bbox[1], self.bbox[3], self.bbox[5], self.bbox[7]];

        let min_x = xs.iter().copied().fold(f32::INFINITY, f32::min);
        let max_x = xs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let min_y = ys.iter().copied().fold(f32::INFINITY, f32::min);
        let max_y = ys.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        (min_x, min_y, max_x, max_y)
    }
}

/// Sort boxes top-to-bottom, then left-to-right within a 20px row band.
pub fn sort_reading_order(boxes: &mut [TextBox]) {
    boxes.sort_by(|a, b| {
        let (ax, ay, _, _) = a.rect();
        let (bx, by, _, _) = b.rect();
        let row_a = (ay / 20.0) as i32;
        let row_b = (by / 20.0) as i32;
        row_a
            .cmp(&row_b)
            .then(ax.partial_cmp(&bx).unwrap_or(std::cmp::Ordering::Equal))
    });
}

/// An optical character recognizer.
pub trait TextRecognizer {
    /// Recognize text regions in an image using the model for `language`.
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<Vec<TextBox>>;
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for Box<T> {
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<Vec<TextBox>> {
        (**self).recognize(image, language)
    }
}

/// Rasterizes a page and runs a recognizer over it.
pub struct OcrFallback<R> {
    recognizer: R,
    language: String,
    render_dpi: u32,
}

impl<R: TextRecognizer> OcrFallback<R> {
    pub fn new(recognizer: R, language: impl Into<String>, render_dpi: u32) -> Self {
        Self {
            recognizer,
            language: language.into(),
            render_dpi,
        }
    }

    /// Recognize the text boxes of one page.
    pub fn recognize(&self, source: &dyn PageSource, page: u32) -> Result<Vec<TextBox>> {
        let image = source
            .render_page(page, self.render_dpi)
            .map_err(|e| OcrError::Rasterize {
                page,
                reason: e.to_string(),
            })?;

        let boxes = self.recognizer.recognize(&image, &self.language)?;
        debug!(
            "OCR on page {} of {} produced {} boxes",
            page,
            source.name(),
            boxes.len()
        );
        Ok(boxes)
    }
}
