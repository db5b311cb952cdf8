//! PDF text layer and page image extraction using lopdf and pdf-extract.

use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace};

use super::{PageSource, Result};
use crate::error::PdfError;

/// Form feed emitted by pdf-extract between pages.
const PAGE_BREAK: char = '\u{000C}';

/// A loaded PDF document.
///
/// The text layer of every page is read once at load time; page images are
/// decoded on demand when a page needs OCR.
pub struct PdfDocument {
    name: String,
    document: Document,
    page_ids: Vec<ObjectId>,
    page_texts: Vec<String>,
}

impl PdfDocument {
    /// Open a PDF file from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|source| PdfError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(name, &data)
    }

    /// Load a PDF from memory.
    pub fn from_bytes(name: impl Into<String>, data: &[u8]) -> Result<Self> {
        let name = name.into();
        let mut document = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // pdf-extract needs the decrypted bytes, so re-serialize after decrypting
        let raw = if document.is_encrypted() {
            if document.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted {} with empty password", name);
            let mut decrypted = Vec::new();
            document
                .save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("failed to save decrypted PDF: {}", e)))?;
            decrypted
        } else {
            data.to_vec()
        };

        let pages = document.get_pages();
        if pages.is_empty() {
            return Err(PdfError::NoPages);
        }
        let page_numbers: Vec<u32> = pages.keys().copied().collect();
        let page_ids: Vec<ObjectId> = pages.values().copied().collect();

        let page_texts = read_page_texts(&document, &raw, &page_numbers);

        debug!(
            "Loaded {}: {} pages, {} with a text layer",
            name,
            page_ids.len(),
            page_texts.iter().filter(|t| !t.is_empty()).count()
        );

        Ok(Self {
            name,
            document,
            page_ids,
            page_texts,
        })
    }

    fn page_id(&self, page: u32) -> Result<ObjectId> {
        page.checked_sub(1)
            .and_then(|idx| self.page_ids.get(idx as usize))
            .copied()
            .ok_or(PdfError::InvalidPage(page))
    }

    /// Image XObjects reachable from a page's resources, largest first.
    fn page_images(&self, page_id: ObjectId) -> Vec<DynamicImage> {
        let Some(resources) = page_resources(&self.document, page_id) else {
            return Vec::new();
        };
        let Ok(xobjects) = resources.get(b"XObject") else {
            return Vec::new();
        };
        let Ok((_, Object::Dictionary(xobjects))) = self.document.dereference(xobjects) else {
            return Vec::new();
        };

        let mut images: Vec<DynamicImage> = xobjects
            .iter()
            .filter_map(|(_, obj)| self.document.dereference(obj).ok())
            .filter_map(|(_, obj)| decode_image(&self.document, obj))
            .collect();

        images.sort_by_key(|img| std::cmp::Reverse(img.width() as u64 * img.height() as u64));
        images
    }
}

impl PageSource for PdfDocument {
    fn name(&self) -> &str {
        &self.name
    }

    fn page_count(&self) -> u32 {
        self.page_ids.len() as u32
    }

    fn page_text(&self, page: u32) -> String {
        page.checked_sub(1)
            .and_then(|idx| self.page_texts.get(idx as usize))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the page's scanned image at its native resolution.
    fn render_page(&self, page: u32, dpi: u32) -> Result<DynamicImage> {
        let page_id = self.page_id(page)?;
        trace!("Rendering page {} of {} (requested {} dpi)", page, self.name, dpi);

        self.page_images(page_id)
            .into_iter()
            .next()
            .ok_or(PdfError::NoPageImage(page))
    }
}

/// Read the text layer of every page.
///
/// pdf-extract gives the better text but only for the whole file; its output is
/// used when the form-feed split lines up with the page count. Otherwise each
/// page falls back to lopdf's own extraction.
fn read_page_texts(document: &Document, raw: &[u8], page_numbers: &[u32]) -> Vec<String> {
    let split = guarded("pdf-extract", || pdf_extract::extract_text_from_mem(raw))
        .and_then(|result| result.map_err(|e| debug!("pdf-extract failed: {}", e)).ok())
        .map(|text| split_pages(&text))
        .filter(|pages| pages.len() == page_numbers.len());

    if let Some(pages) = split {
        return pages.into_iter().map(clean_text).collect();
    }

    page_numbers
        .iter()
        .map(|n| {
            guarded("lopdf text extraction", || document.extract_text(&[*n]))
                .and_then(|result| result.ok())
                .map(clean_text)
                .unwrap_or_default()
        })
        .collect()
}

/// Run a text extractor, turning a panic on malformed content into `None`.
fn guarded<T>(what: &str, f: impl FnOnce() -> T) -> Option<T> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(_) => {
            debug!("{} panicked on malformed PDF content", what);
            None
        }
    }
}

fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split(PAGE_BREAK).map(str::to_string).collect();
    if pages.last().is_some_and(String::is_empty) {
        pages.pop();
    }
    pages
}

/// Blank-only text counts as no text layer.
fn clean_text(text: String) -> String {
    if text.trim().is_empty() { String::new() } else { text }
}

/// Resources dictionary of a page, following `Parent` inheritance.
fn page_resources(document: &Document, node_id: ObjectId) -> Option<Dictionary> {
    let Ok(Object::Dictionary(node)) = document.get_object(node_id) else {
        return None;
    };

    if let Ok(resources) = node.get(b"Resources") {
        if let Ok((_, Object::Dictionary(dict))) = document.dereference(resources) {
            return Some(dict.clone());
        }
    }

    match node.get(b"Parent") {
        Ok(Object::Reference(parent_id)) => page_resources(document, *parent_id),
        _ => None,
    }
}

fn decode_image(document: &Document, obj: &Object) -> Option<DynamicImage> {
    let Object::Stream(stream) = obj else {
        return None;
    };
    let dict = &stream.dict;
    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
    let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;

    let filter = dict.get(b"Filter").ok().and_then(|f| match f {
        Object::Name(name) => Some(name.as_slice()),
        Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
        _ => None,
    });

    match filter {
        Some(b"DCTDecode") => {
            trace!("Decoding JPEG page image {}x{}", width, height);
            return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                .ok();
        }
        Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
            trace!("Skipping unsupported image filter {:?}", filter.map(String::from_utf8_lossy));
            return None;
        }
        _ => {}
    }

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 {
        trace!("Skipping image with {} bits per component", bits);
        return None;
    }

    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| match o {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            Object::Reference(r) => document.get_object(*r).ok().and_then(|o| o.as_name().ok()),
            _ => None,
        })
        .unwrap_or(b"DeviceRGB");

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    let pixels = (width as usize) * (height as usize);

    match color_space {
        b"DeviceRGB" | b"RGB" if data.len() >= pixels * 3 => {
            RgbImage::from_raw(width, height, data[..pixels * 3].to_vec()).map(DynamicImage::ImageRgb8)
        }
        b"DeviceGray" | b"G" if data.len() >= pixels => {
            GrayImage::from_raw(width, height, data[..pixels].to_vec()).map(DynamicImage::ImageLuma8)
        }
        _ => {
            trace!(
                "Could not decode raw image: {}x{}, {} bytes",
                width,
                height,
                data.len()
            );
            None
        }
    }
}

/// Single-page PDF whose content stream uses a font the page never declares.
#[cfg(test)]
pub(crate) fn pdf_with_undeclared_font() -> Vec<u8> {
    use lopdf::{dictionary, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content = b"BT /F1 12 Tf 72 720 Td (TOMADOR : Acme Ltd) Tj ET".to_vec();
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        "Resources" => dictionary! {},
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
