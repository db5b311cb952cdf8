//! Anchor-then-pattern field matching over text units.

use tracing::trace;

use crate::models::record::PartialRecord;
use crate::ocr::TextBox;

use super::rules::{default_rules, FieldRule};

/// Text available for one page.
///
/// The text layer is a single unit; OCR output is one unit per box.
#[derive(Debug, Clone, PartialEq)]
pub enum PageText {
    /// Whole-page text layer.
    Layer(String),
    /// Recognized boxes, in recognizer order.
    Boxes(Vec<TextBox>),
}

impl PageText {
    /// Iterate the text units of the page.
    pub fn units(&self) -> impl Iterator<Item = &str> + '_ {
        let (layer, boxes) = match self {
            PageText::Layer(text) => (Some(text.as_str()), &[][..]),
            PageText::Boxes(boxes) => (None, boxes.as_slice()),
        };
        layer
            .into_iter()
            .chain(boxes.iter().map(|b| b.text.as_str()))
    }

    /// Whether any unit contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.units().any(|unit| unit.contains(needle))
    }

    pub fn unit_count(&self) -> usize {
        match self {
            PageText::Layer(_) => 1,
            PageText::Boxes(boxes) => boxes.len(),
        }
    }
}

/// Extracts fields from text units with a rule table.
#[derive(Debug, Clone)]
pub struct FieldMatcher {
    marker: String,
    rules: Vec<FieldRule>,
}

impl FieldMatcher {
    /// Matcher with the built-in NFS-e rules.
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            rules: default_rules(),
        }
    }

    /// Replace the rule table.
    pub fn with_rules(mut self, rules: Vec<FieldRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Match every unit of a page into `partial`.
    ///
    /// Pages where no unit carries the document-type marker are skipped.
    /// Returns the number of fields newly set.
    pub fn match_page(&self, page: &PageText, partial: &mut PartialRecord) -> usize {
        if !page.contains(&self.marker) {
            trace!("Marker absent from {} units, skipping page", page.unit_count());
            return 0;
        }

        let mut found = 0;
        for unit in page.units() {
            if partial.is_complete() {
                break;
            }
            found += self.match_unit(unit, partial);
        }
        found
    }

    /// Match a single text, gated on the marker like a one-unit page.
    pub fn match_text(&self, text: &str, partial: &mut PartialRecord) -> usize {
        if !text.contains(&self.marker) {
            return 0;
        }
        self.match_unit(text, partial)
    }

    /// Try each rule whose anchor occurs in `unit`.
    fn match_unit(&self, unit: &str, partial: &mut PartialRecord) -> usize {
        let mut found = 0;
        for rule in &self.rules {
            if partial.is_set(rule.field) || !unit.contains(rule.anchor_text(&self.marker)) {
                continue;
            }
            if let Some(value) = rule.capture(unit) {
                trace!("Matched {} = {:?}", rule.field, value);
                if partial.set_if_absent(rule.field, value) {
                    found += 1;
                }
            }
        }
        found
    }
}
