//! Batch extraction: one record per document, pages scanned in order.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::error::SinkError;
use crate::invoice::{finalize, parse_amount, FieldMatcher, PageText};
use crate::models::config::ExtractorConfig;
use crate::models::record::{Field, PartialRecord, Record, Row};
use crate::ocr::{OcrFallback, TextBox, TextRecognizer};
use crate::pdf::{PageSource, PdfDocument};
use crate::sink::RowSink;

/// Where a document is in its extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Scanning,
    TextFound,
    NeedsOcr,
    Matching,
    Finalized,
}

/// How the text of one page was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageOrigin {
    /// Text layer carried the marker.
    TextLayer,
    /// OCR produced boxes.
    Ocr,
    /// OCR was needed but failed; treated as zero boxes.
    OcrFailed,
    /// OCR was needed but is disabled or has no recognizer.
    OcrUnavailable,
}

/// Per-page summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageReport {
    pub page: u32,
    pub origin: PageOrigin,
    /// Fields first set by this page.
    pub fields_found: usize,
}

/// Extraction status of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum DocumentStatus {
    /// All four fields extracted.
    Complete,
    /// Marker found, some fields left as sentinel.
    Partial { missing: Vec<Field> },
    /// No page carried the document-type marker.
    NoMarker,
    /// The document could not be opened.
    Failed(String),
}

impl DocumentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DocumentStatus::Complete => "complete",
            DocumentStatus::Partial { .. } => "partial",
            DocumentStatus::NoMarker => "no_marker",
            DocumentStatus::Failed(_) => "failed",
        }
    }
}

/// Result of processing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentOutcome {
    pub name: String,
    pub record: Record,
    pub status: DocumentStatus,
    pub pages: Vec<PageReport>,
}

impl DocumentOutcome {
    fn failed(name: String, reason: String) -> Self {
        Self {
            name,
            record: Record::sentinel(),
            status: DocumentStatus::Failed(reason),
            pages: Vec::new(),
        }
    }
}

/// Outcomes of a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<DocumentOutcome>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Sink rows, one per document.
    pub fn rows(&self) -> Vec<Row> {
        self.outcomes.iter().map(|o| o.record.to_row()).collect()
    }

    /// Number of documents with the given status label.
    pub fn count(&self, label: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status.label() == label)
            .count()
    }

    /// Sum of all parseable amounts.
    pub fn total_amount(&self) -> Decimal {
        self.outcomes
            .iter()
            .filter_map(|o| parse_amount(&o.record.amount))
            .sum()
    }

    /// Append every row to `sink` in one call.
    ///
    /// An empty batch makes no call. Returns the number of rows written.
    pub fn write_to(&self, sink: &mut dyn RowSink) -> Result<usize, SinkError> {
        if self.is_empty() {
            debug!("Empty batch, nothing to append");
            return Ok(0);
        }
        let rows = self.rows();
        sink.append_rows(&rows)?;
        info!("Appended {} rows", rows.len());
        Ok(rows.len())
    }
}

/// Drives extraction over documents and their pages.
pub struct BatchExtractor {
    config: ExtractorConfig,
    matcher: FieldMatcher,
    ocr: Option<OcrFallback<Box<dyn TextRecognizer>>>,
}

impl BatchExtractor {
    /// Extractor without OCR; pages lacking the marker in their text layer
    /// contribute nothing until a recognizer is attached.
    pub fn new(config: ExtractorConfig) -> Self {
        let matcher = FieldMatcher::new(config.marker.clone());
        Self {
            config,
            matcher,
            ocr: None,
        }
    }

    /// Attach the recognizer used for the OCR fallback.
    pub fn with_recognizer(mut self, recognizer: impl TextRecognizer + 'static) -> Self {
        let recognizer: Box<dyn TextRecognizer> = Box::new(recognizer);
        self.ocr = Some(OcrFallback::new(
            recognizer,
            self.config.language.clone(),
            self.config.render_dpi,
        ));
        self
    }

    /// Replace the field matcher (custom rule tables).
    pub fn with_matcher(mut self, matcher: FieldMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn has_ocr(&self) -> bool {
        self.config.ocr_enabled && self.ocr.is_some()
    }

    /// Extract one loaded document.
    pub fn extract_document(&self, source: &dyn PageSource) -> DocumentOutcome {
        let name = source.name().to_string();
        let mut partial = PartialRecord::new();
        let mut pages = Vec::new();
        let mut marker_seen = false;

        let page_count = match self.config.max_pages {
            0 => source.page_count(),
            limit => source.page_count().min(u32::try_from(limit).unwrap_or(u32::MAX)),
        };

        for page in 1..=page_count {
            let mut state = DocumentState::Scanning;
            trace!("{} page {}: {:?}", name, page, state);

            let text = source.page_text(page);
            let (page_text, origin) = if text.contains(self.matcher.marker()) {
                state = DocumentState::TextFound;
                (PageText::Layer(text), PageOrigin::TextLayer)
            } else {
                state = DocumentState::NeedsOcr;
                let (boxes, origin) = self.ocr_page(source, page);
                (PageText::Boxes(boxes), origin)
            };
            debug!("{} page {}: {:?} via {:?}", name, page, state, origin);

            marker_seen |= page_text.contains(self.matcher.marker());
            let fields_found = self.matcher.match_page(&page_text, &mut partial);
            pages.push(PageReport {
                page,
                origin,
                fields_found,
            });

            if partial.is_complete() {
                debug!("{}: all fields found by page {}", name, page);
                break;
            }
        }
        trace!("{}: {:?}", name, DocumentState::Matching);

        let record = finalize(&partial);
        let status = if !marker_seen {
            DocumentStatus::NoMarker
        } else if partial.is_complete() {
            DocumentStatus::Complete
        } else {
            DocumentStatus::Partial {
                missing: record.missing(),
            }
        };
        trace!("{}: {:?} ({})", name, DocumentState::Finalized, status.label());

        DocumentOutcome {
            name,
            record,
            status,
            pages,
        }
    }

    /// OCR one page; failures and missing OCR yield zero boxes.
    fn ocr_page(&self, source: &dyn PageSource, page: u32) -> (Vec<TextBox>, PageOrigin) {
        let Some(ocr) = self.ocr.as_ref().filter(|_| self.config.ocr_enabled) else {
            debug!("{} page {}: marker absent and OCR unavailable", source.name(), page);
            return (Vec::new(), PageOrigin::OcrUnavailable);
        };

        match ocr.recognize(source, page) {
            Ok(boxes) => (boxes, PageOrigin::Ocr),
            Err(e) => {
                warn!("OCR failed on page {} of {}: {}", page, source.name(), e);
                (Vec::new(), PageOrigin::OcrFailed)
            }
        }
    }

    /// Open and extract a PDF; a file that cannot be opened yields an
    /// all-sentinel record.
    pub fn extract_path(&self, path: &Path) -> DocumentOutcome {
        match PdfDocument::open(path) {
            Ok(document) => self.extract_document(&document),
            Err(e) => {
                warn!("Failed to open {}: {}", path.display(), e);
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                DocumentOutcome::failed(name, e.to_string())
            }
        }
    }

    /// Extract every file, one outcome per path in input order.
    pub fn extract_batch<P: AsRef<Path>>(&self, paths: &[P]) -> BatchReport {
        self.extract_batch_with(paths, |_| {})
    }

    /// Like [`extract_batch`](Self::extract_batch), calling `on_done` after
    /// each document.
    pub fn extract_batch_with<P, F>(&self, paths: &[P], mut on_done: F) -> BatchReport
    where
        P: AsRef<Path>,
        F: FnMut(&DocumentOutcome),
    {
        let total = paths.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            info!("Processing file {}/{}: {}", index + 1, total, path.display());

            let outcome = self.extract_path(path);
            info!("{}: {} {:?}", outcome.name, outcome.status.label(), outcome.record.to_row());
            on_done(&outcome);
            outcomes.push(outcome);
        }

        BatchReport { outcomes }
    }

    /// Extract already-loaded documents.
    pub fn extract_sources(&self, sources: &[&dyn PageSource]) -> BatchReport {
        BatchReport {
            outcomes: sources.iter().map(|s| self.extract_document(*s)).collect(),
        }
    }

    /// Extract a batch of files and append the rows to `sink` in one call.
    ///
    /// Only a sink failure is returned as an error.
    pub fn run<P: AsRef<Path>>(
        &self,
        paths: &[P],
        sink: &mut dyn RowSink,
    ) -> Result<BatchReport, SinkError> {
        let report = self.extract_batch(paths);
        report.write_to(sink)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OcrError, PdfError};
    use crate::models::config::DEFAULT_MARKER;
    use crate::models::record::SENTINEL;
    use crate::ocr;
    use crate::sink::MemorySink;
    use image::DynamicImage;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use std::collections::HashMap;

    /// In-memory document: page texts plus whether the pages carry a scan.
    struct FakeDocument {
        name: String,
        texts: Vec<String>,
        scanned: bool,
    }

    impl FakeDocument {
        fn new(name: &str, texts: &[&str]) -> Self {
            Self {
                name: name.to_string(),
                texts: texts.iter().map(|t| t.to_string()).collect(),
                scanned: true,
            }
        }

        fn without_images(mut self) -> Self {
            self.scanned = false;
            self
        }
    }

    impl PageSource for FakeDocument {
        fn name(&self) -> &str {
            &self.name
        }

        fn page_count(&self) -> u32 {
            self.texts.len() as u32
        }

        fn page_text(&self, page: u32) -> String {
            self.texts[(page - 1) as usize].clone()
        }

        fn render_page(&self, page: u32, _dpi: u32) -> crate::pdf::Result<DynamicImage> {
            if page as usize > self.texts.len() {
                return Err(PdfError::InvalidPage(page));
            }
            if !self.scanned {
                return Err(PdfError::NoPageImage(page));
            }
            // Encode the page number in the image width so the fake recognizer can tell pages apart.
            Ok(DynamicImage::new_luma8(page, 1))
        }
    }

    /// Recognizer returning canned boxes per page; pages not listed fail.
    struct FakeRecognizer {
        pages: HashMap<u32, Vec<&'static str>>,
        calls: std::rc::Rc<Cell<usize>>,
    }

    impl FakeRecognizer {
        fn new(pages: &[(u32, Vec<&'static str>)]) -> Self {
            Self {
                pages: pages.iter().cloned().collect(),
                calls: Default::default(),
            }
        }
    }

    impl TextRecognizer for FakeRecognizer {
        fn recognize(&self, image: &DynamicImage, language: &str) -> ocr::Result<Vec<TextBox>> {
            self.calls.set(self.calls.get() + 1);
            assert_eq!(language, "por");
            match self.pages.get(&image.width()) {
                Some(texts) => Ok(texts.iter().map(|t| TextBox::new(*t, [0.0; 8])).collect()),
                None => Err(OcrError::Recognition("corrupt page".to_string())),
            }
        }
    }

    fn example_page() -> String {
        format!(
            "... {} ... 10:15:30 ... TOMADOR : Acme Ltd\n ... DISCRIMINAÇÃO DOS SERVIÇOS : Consulting\n VALOR TOTAL DA NOTA\nR$ 150,00",
            DEFAULT_MARKER
        )
    }

    fn row(values: [&str; 4]) -> Row {
        values.map(String::from)
    }

    #[test]
    fn test_two_page_example() {
        let extractor = BatchExtractor::new(ExtractorConfig::default());
        let page = example_page();
        let doc = FakeDocument::new("nota.pdf", &[&page, ""]);

        let outcome = extractor.extract_document(&doc);

        assert_eq!(
            outcome.record.to_row(),
            row(["10:15:30", "Acme Ltd", "Consulting", "150,00"])
        );
        assert_eq!(outcome.status, DocumentStatus::Complete);
        assert_eq!(outcome.pages.len(), 1);
        assert_eq!(outcome.pages[0].origin, PageOrigin::TextLayer);
    }

    #[test]
    fn test_no_marker_is_all_sentinel() {
        let extractor = BatchExtractor::new(ExtractorConfig::default())
            .with_recognizer(FakeRecognizer::new(&[(1, vec!["TOMADOR : Ghost"]), (2, vec![])]));
        let doc = FakeDocument::new("other.pdf", &["TOMADOR : Acme Ltd\n10:15:30", ""]);

        let outcome = extractor.extract_document(&doc);

        assert_eq!(outcome.record.to_row(), row([SENTINEL; 4]));
        assert_eq!(outcome.status, DocumentStatus::NoMarker);
    }

    #[test]
    fn test_first_page_hour_wins() {
        let extractor = BatchExtractor::new(ExtractorConfig::default());
        let first = format!("{} 10:00:00", DEFAULT_MARKER);
        let second = format!("{} 22:30:00\nTOMADOR : Acme Ltd\n", DEFAULT_MARKER);
        let doc = FakeDocument::new("two.pdf", &[&first, &second]);

        let outcome = extractor.extract_document(&doc);

        assert_eq!(outcome.record.hour, "10:00:00");
        assert_eq!(outcome.record.counterparty, "Acme Ltd");
        assert_eq!(
            outcome.status,
            DocumentStatus::Partial {
                missing: vec![Field::Description, Field::Amount]
            }
        );
    }

    #[test]
    fn test_ocr_fallback_for_scanned_page() {
        let recognizer = FakeRecognizer::new(&[(
            1,
            vec![
                "NOTA FISCAL DE ELETRÔNICA DE SERVIÇOS 14:02:59",
                "TOMADOR : Clínica Sorriso",
                "DISCRIMINAÇÃO DOS SERVIÇOS : Limpeza",
                "VALOR TOTAL DA NOTA\nR$ 80,00",
            ],
        )]);
        let extractor = BatchExtractor::new(ExtractorConfig::default()).with_recognizer(recognizer);
        let doc = FakeDocument::new("scan.pdf", &[""]);

        let outcome = extractor.extract_document(&doc);

        assert_eq!(
            outcome.record.to_row(),
            row(["14:02:59", "Clínica Sorriso", "Limpeza", "80,00"])
        );
        assert_eq!(outcome.pages[0].origin, PageOrigin::Ocr);
    }

    #[test]
    fn test_ocr_failure_is_not_fatal() {
        // Page 1 fails OCR, page 2 has a text layer.
        let recognizer = FakeRecognizer::new(&[]);
        let calls = recognizer.calls.clone();
        let extractor = BatchExtractor::new(ExtractorConfig::default()).with_recognizer(recognizer);
        let second = format!("{}\nTOMADOR : Beta SA\n", DEFAULT_MARKER);
        let doc = FakeDocument::new("mixed.pdf", &["", &second]);

        let outcome = extractor.extract_document(&doc);

        assert_eq!(calls.get(), 1);
        assert_eq!(outcome.pages[0].origin, PageOrigin::OcrFailed);
        assert_eq!(outcome.record.counterparty, "Beta SA");
        assert_eq!(outcome.record.hour, SENTINEL);
    }

    #[test]
    fn test_page_without_image_counts_as_ocr_failure() {
        let recognizer = FakeRecognizer::new(&[(1, vec![DEFAULT_MARKER])]);
        let calls = recognizer.calls.clone();
        let extractor = BatchExtractor::new(ExtractorConfig::default()).with_recognizer(recognizer);
        let second = format!("{}\nTOMADOR : Gama ME\n", DEFAULT_MARKER);
        let doc = FakeDocument::new("vector.pdf", &["", &second]).without_images();

        let outcome = extractor.extract_document(&doc);

        assert_eq!(calls.get(), 0);
        assert_eq!(outcome.pages[0].origin, PageOrigin::OcrFailed);
        assert_eq!(outcome.pages[0].fields_found, 0);
        assert_eq!(outcome.record.counterparty, "Gama ME");
    }

    #[test]
    fn test_ocr_disabled_skips_recognizer() {
        let recognizer = FakeRecognizer::new(&[(1, vec![DEFAULT_MARKER])]);
        let calls = recognizer.calls.clone();
        let config = ExtractorConfig {
            ocr_enabled: false,
            ..ExtractorConfig::default()
        };
        let extractor = BatchExtractor::new(config).with_recognizer(recognizer);

        let outcome = extractor.extract_document(&FakeDocument::new("scan.pdf", &[""]));

        assert_eq!(calls.get(), 0);
        assert_eq!(outcome.pages[0].origin, PageOrigin::OcrUnavailable);
        assert!(!extractor.has_ocr());
    }

    #[test]
    fn test_max_pages_limits_scan() {
        let config = ExtractorConfig {
            max_pages: 1,
            ..ExtractorConfig::default()
        };
        let extractor = BatchExtractor::new(config);
        let second = format!("{} 10:00:00", DEFAULT_MARKER);
        let doc = FakeDocument::new("long.pdf", &["cover", &second]);

        let outcome = extractor.extract_document(&doc);

        assert_eq!(outcome.pages.len(), 1);
        assert_eq!(outcome.status, DocumentStatus::NoMarker);
    }

    #[test]
    fn test_max_pages_beyond_u32_reads_every_page() {
        let config = ExtractorConfig {
            max_pages: usize::MAX,
            ..ExtractorConfig::default()
        };
        let extractor = BatchExtractor::new(config);
        let second = format!("{} 10:00:00", DEFAULT_MARKER);
        let doc = FakeDocument::new("long.pdf", &["cover", &second]);

        let outcome = extractor.extract_document(&doc);

        assert_eq!(outcome.pages.len(), 2);
        assert_eq!(outcome.record.hour, "10:00:00");
    }

    #[test]
    fn test_custom_matcher_replaces_rules() {
        use crate::invoice::{Anchor, FieldRule};
        use regex::Regex;

        let matcher = FieldMatcher::new("RECIBO").with_rules(vec![FieldRule::new(
            Field::Counterparty,
            Anchor::Keyword("CLIENTE"),
            Regex::new(r"CLIENTE:\s*([^\n]+)").unwrap(),
        )]);
        let extractor = BatchExtractor::new(ExtractorConfig::default()).with_matcher(matcher);
        let doc = FakeDocument::new("recibo.pdf", &["RECIBO\nCLIENTE: Delta Ltda\nTOMADOR : Ignored"]);

        let outcome = extractor.extract_document(&doc);

        assert_eq!(outcome.record.counterparty, "Delta Ltda");
        assert_eq!(outcome.record.hour, SENTINEL);
        assert_eq!(
            outcome.status,
            DocumentStatus::Partial {
                missing: vec![Field::Hour, Field::Description, Field::Amount]
            }
        );
    }

    #[test]
    fn test_batch_totality_and_single_append() {
        let extractor = BatchExtractor::new(ExtractorConfig::default());
        let page = example_page();
        let good = FakeDocument::new("a.pdf", &[&page]);
        let blank = FakeDocument::new("b.pdf", &[""]);
        let other = FakeDocument::new("c.pdf", &["boleto"]);

        let report = extractor.extract_sources(&[&good, &blank, &other]);
        let mut sink = MemorySink::new();
        let written = report.write_to(&mut sink).unwrap();

        assert_eq!(report.len(), 3);
        assert_eq!(written, 3);
        assert_eq!(sink.appends(), 1);
        assert_eq!(sink.rows()[0], row(["10:15:30", "Acme Ltd", "Consulting", "150,00"]));
        assert_eq!(sink.rows()[2], row([SENTINEL; 4]));
        assert_eq!(report.count("complete"), 1);
        assert_eq!(report.count("no_marker"), 2);
        assert_eq!(report.total_amount(), Decimal::new(15000, 2));
    }

    #[test]
    fn test_empty_batch_makes_no_sink_call() {
        let extractor = BatchExtractor::new(ExtractorConfig::default());
        let mut sink = MemorySink::new();

        let report = extractor.run::<&str>(&[], &mut sink).unwrap();

        assert!(report.is_empty());
        assert_eq!(sink.appends(), 0);
    }

    #[test]
    fn test_unreadable_file_still_yields_a_row() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("corrupt.pdf");
        std::fs::write(&bad, b"%PDF-garbage").unwrap();
        let missing = dir.path().join("missing.pdf");

        let extractor = BatchExtractor::new(ExtractorConfig::default());
        let mut sink = MemorySink::new();
        let report = extractor.run(&[bad, missing], &mut sink).unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(report.outcomes[0].name, "corrupt.pdf");
        assert!(matches!(report.outcomes[0].status, DocumentStatus::Failed(_)));
        assert!(matches!(report.outcomes[1].status, DocumentStatus::Failed(_)));
        assert_eq!(sink.rows(), &[row([SENTINEL; 4]), row([SENTINEL; 4])]);
    }

    #[test]
    fn test_malformed_font_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad-font.pdf");
        std::fs::write(&bad, crate::pdf::pdf_with_undeclared_font()).unwrap();
        let missing = dir.path().join("missing.pdf");

        let extractor = BatchExtractor::new(ExtractorConfig::default());
        let mut sink = MemorySink::new();
        let report = extractor.run(&[bad, missing], &mut sink).unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(report.outcomes[0].name, "bad-font.pdf");
        assert_eq!(report.outcomes[0].status, DocumentStatus::NoMarker);
        assert_eq!(sink.appends(), 1);
        assert_eq!(sink.rows().len(), 2);
    }

    #[test]
    fn test_sink_failure_propagates() {
        struct FailingSink;
        impl RowSink for FailingSink {
            fn append_rows(&mut self, _rows: &[Row]) -> Result<(), SinkError> {
                Err(SinkError::Write("network down".to_string()))
            }
        }

        let extractor = BatchExtractor::new(ExtractorConfig::default());
        let page = example_page();
        let report = extractor.extract_sources(&[&FakeDocument::new("a.pdf", &[&page])]);

        assert!(matches!(report.write_to(&mut FailingSink), Err(SinkError::Write(_))));
    }
}
