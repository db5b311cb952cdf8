//! Declarative field rules for NFS-e documents.
//!
//! Each rule pairs an anchor (a substring that must occur in a text unit
//! before the rule is tried) with a single-capture pattern. Adding a field
//! means adding a row to [`default_rules`]; the matcher does not change.

use chrono::NaiveTime;
use lazy_static::lazy_static;
use regex::Regex;

use crate::models::record::Field;

pub const TOMADOR_ANCHOR: &str = "TOMADOR";
pub const DISCRIMINACAO_ANCHOR: &str = "DISCRIMINAÇÃO DOS SERVIÇOS";
pub const VALOR_TOTAL_ANCHOR: &str = "VALOR TOTAL DA NOTA";

lazy_static! {
    // Emission time printed in the header block; often glued to the date
    pub static ref HOUR_PATTERN: Regex = Regex::new(
        r"(\d{2}:\d{2}:\d{2})"
    ).unwrap();

    pub static ref TOMADOR_PATTERN: Regex = Regex::new(
        r"TOMADOR[ \t]*:[ \t]*([^\r\n]+)"
    ).unwrap();

    pub static ref DISCRIMINACAO_PATTERN: Regex = Regex::new(
        r"DISCRIMINAÇÃO DOS SERVIÇOS[ \t]*:[ \t]*([^\r\n]+)"
    ).unwrap();

    // Total sits on the line after its label: "VALOR TOTAL DA NOTA\nR$ 1.234,56"
    pub static ref VALOR_TOTAL_PATTERN: Regex = Regex::new(
        r"VALOR TOTAL DA NOTA[^\r\n]*\r?\n[^\r\n]*?(R\$[ \t]*\d+(?:[.,]\d{3})*(?:[.,]\d{2})?)"
    ).unwrap();
}

/// What must occur in a text unit before a rule is tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// The document-type marker configured on the matcher.
    Marker,
    /// A fixed keyword.
    Keyword(&'static str),
}

/// One row of the rule table.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: Field,
    pub anchor: Anchor,
    /// Must contain exactly one capture group.
    pub pattern: Regex,
    /// Extra check on a capture; a rejected capture lets the next one through.
    pub validate: Option<fn(&str) -> bool>,
}

impl FieldRule {
    pub fn new(field: Field, anchor: Anchor, pattern: Regex) -> Self {
        Self {
            field,
            anchor,
            pattern,
            validate: None,
        }
    }

    pub fn with_validator(mut self, validate: fn(&str) -> bool) -> Self {
        self.validate = Some(validate);
        self
    }

    /// The anchor text given the matcher's marker.
    pub fn anchor_text<'a>(&'a self, marker: &'a str) -> &'a str {
        match &self.anchor {
            Anchor::Marker => marker,
            Anchor::Keyword(keyword) => keyword,
        }
    }

    /// First trimmed, non-empty capture in `text` that passes validation.
    pub fn capture(&self, text: &str) -> Option<String> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .find(|value| !value.is_empty() && self.validate.is_none_or(|check| check(value)))
            .map(str::to_string)
    }
}

/// A valid 24-hour `HH:MM:SS` time.
pub fn is_valid_hour(value: &str) -> bool {
    NaiveTime::parse_from_str(value, "%H:%M:%S").is_ok()
}

/// The built-in NFS-e rule table, in column order.
pub fn default_rules() -> Vec<FieldRule> {
    vec![
        FieldRule::new(Field::Hour, Anchor::Marker, HOUR_PATTERN.clone())
            .with_validator(is_valid_hour),
        FieldRule::new(
            Field::Counterparty,
            Anchor::Keyword(TOMADOR_ANCHOR),
            TOMADOR_PATTERN.clone(),
        ),
        FieldRule::new(
            Field::Description,
            Anchor::Keyword(DISCRIMINACAO_ANCHOR),
            DISCRIMINACAO_PATTERN.clone(),
        ),
        FieldRule::new(
            Field::Amount,
            Anchor::Keyword(VALOR_TOTAL_ANCHOR),
            VALOR_TOTAL_PATTERN.clone(),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rule(field: Field) -> FieldRule {
        default_rules()
            .into_iter()
            .find(|r| r.field == field)
            .unwrap()
    }

    #[test]
    fn test_every_field_has_one_rule() {
        let fields: Vec<Field> = default_rules().iter().map(|r| r.field).collect();
        assert_eq!(fields, Field::ALL.to_vec());
        for r in default_rules() {
            assert_eq!(r.pattern.captures_len(), 2, "{} rule", r.field);
        }
    }

    #[test]
    fn test_hour_skips_invalid_times() {
        let hour = rule(Field::Hour);
        assert_eq!(hour.capture("Emitida 99:61:00 - 23:59:59"), Some("23:59:59".to_string()));
        assert_eq!(hour.capture("Emitida 25:00:00"), None);
    }

    #[test]
    fn test_hour_glued_to_date() {
        let hour = rule(Field::Hour);
        assert_eq!(hour.capture("Emissão: 12/03/202310:15:30"), Some("10:15:30".to_string()));
        assert_eq!(hour.capture("2023-03-12T10:15:30-03:00"), Some("10:15:30".to_string()));
    }

    #[test]
    fn test_counterparty_stops_at_end_of_line() {
        let tomador = rule(Field::Counterparty);
        assert_eq!(
            tomador.capture("TOMADOR : Acme Ltd\nCNPJ 00.000.000/0001-00"),
            Some("Acme Ltd".to_string())
        );
        assert_eq!(tomador.capture("TOMADOR:Clínica Sorriso"), Some("Clínica Sorriso".to_string()));
    }

    #[test]
    fn test_label_without_value_does_not_match() {
        let tomador = rule(Field::Counterparty);
        assert_eq!(tomador.capture("TOMADOR :\nAcme Ltd"), None);
    }

    #[test]
    fn test_description() {
        let desc = rule(Field::Description);
        assert_eq!(
            desc.capture("DISCRIMINAÇÃO DOS SERVIÇOS : Consulting\nmore"),
            Some("Consulting".to_string())
        );
    }

    #[test]
    fn test_amount_on_following_line() {
        let amount = rule(Field::Amount);
        assert_eq!(
            amount.capture("VALOR TOTAL DA NOTA\nR$ 150,00"),
            Some("R$ 150,00".to_string())
        );
        assert_eq!(
            amount.capture("VALOR TOTAL DA NOTA =\r\nTotal: R$1.234,56 pago"),
            Some("R$1.234,56".to_string())
        );
        assert_eq!(amount.capture("VALOR TOTAL DA NOTA R$ 150,00"), None);
    }

    #[test]
    fn test_anchor_text() {
        assert_eq!(rule(Field::Hour).anchor_text("HEADER"), "HEADER");
        assert_eq!(rule(Field::Counterparty).anchor_text("HEADER"), TOMADOR_ANCHOR);
    }
}
