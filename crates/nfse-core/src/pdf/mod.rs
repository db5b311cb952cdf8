//! PDF page access: text layer and page images.

mod extractor;

pub use extractor::PdfDocument;
#[cfg(test)]
pub(crate) use extractor::pdf_with_undeclared_font;

use crate::error::PdfError;
use image::DynamicImage;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// A document whose pages can be read one at a time.
///
/// Pages are 1-indexed.
pub trait PageSource {
    /// Name used in logs and reports (usually the file name).
    fn name(&self) -> &str;

    /// Number of pages in the document.
    fn page_count(&self) -> u32;

    /// Embedded text layer of a page.
    ///
    /// Returns an empty string when the page has no usable text layer;
    /// absence is never an error.
    fn page_text(&self, page: u32) -> String;

    /// Rasterize a page for OCR.
    fn render_page(&self, page: u32, dpi: u32) -> Result<DynamicImage>;
}

impl<T: PageSource + ?Sized> PageSource for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn page_count(&self) -> u32 {
        (**self).page_count()
    }

    fn page_text(&self, page: u32) -> String {
        (**self).page_text(page)
    }

    fn render_page(&self, page: u32, dpi: u32) -> Result<DynamicImage> {
        (**self).render_page(page, dpi)
    }
}
