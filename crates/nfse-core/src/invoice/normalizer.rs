//! Turning partial matches into finalized records.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::models::record::{Field, PartialRecord, Record, SENTINEL};

/// Finalize a partial record.
///
/// Unset or blank fields become [`SENTINEL`]; the amount loses its currency
/// prefix. Applying this to the same partial record always yields the same
/// record.
pub fn finalize(partial: &PartialRecord) -> Record {
    let value = |field: Field| {
        let raw = partial.get(field).unwrap_or_default().trim();
        let cleaned = match field {
            Field::Amount => strip_currency(raw),
            _ => raw,
        };
        if cleaned.is_empty() {
            SENTINEL.to_string()
        } else {
            cleaned.to_string()
        }
    };

    Record {
        hour: value(Field::Hour),
        counterparty: value(Field::Counterparty),
        description: value(Field::Description),
        amount: value(Field::Amount),
    }
}

/// Strip a leading currency prefix (`R$`, `US$`, `BRL`, ...) and whitespace.
///
/// The sentinel is returned untouched; stripping an already bare amount is a
/// no-op.
pub fn strip_currency(value: &str) -> &str {
    let value = value.trim();
    if value == SENTINEL {
        return value;
    }
    value
        .trim_start_matches(|c: char| !(c.is_ascii_digit() || c == '-'))
        .trim()
}

/// Parse a Brazilian-formatted amount ("1.234,56", "R$ 150,00", "150.00").
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned: String = strip_currency(s)
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // Both separators: whichever comes last is the decimal one
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        // Dots only: "1.234" and "1.234.567" are thousands groups
        (None, Some(d)) if cleaned.len() - d - 1 == 3 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    Decimal::from_str(&normalized).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn partial(values: &[(Field, &str)]) -> PartialRecord {
        let mut partial = PartialRecord::new();
        for (field, value) in values {
            partial.set_if_absent(*field, *value);
        }
        partial
    }

    #[test]
    fn test_empty_partial_is_all_sentinel() {
        assert_eq!(finalize(&PartialRecord::new()), Record::sentinel());
    }

    #[test]
    fn test_amount_prefix_stripped() {
        let record = finalize(&partial(&[
            (Field::Hour, "10:15:30"),
            (Field::Amount, "R$ 150,00"),
        ]));
        assert_eq!(record.hour, "10:15:30");
        assert_eq!(record.counterparty, SENTINEL);
        assert_eq!(record.amount, "150,00");
    }

    #[test]
    fn test_blank_values_become_sentinel() {
        let record = finalize(&partial(&[(Field::Counterparty, "   "), (Field::Amount, "R$ ")]));
        assert_eq!(record.counterparty, SENTINEL);
        assert_eq!(record.amount, SENTINEL);
    }

    #[test]
    fn test_strip_currency_is_idempotent() {
        for input in ["R$ 1.234,56", "US$99,90", "BRL 10,00", "150,00", SENTINEL] {
            let once = strip_currency(input);
            assert_eq!(strip_currency(once), once, "input {:?}", input);
        }
        assert_eq!(strip_currency(SENTINEL), SENTINEL);
    }

    #[test]
    fn test_finalize_twice_is_stable() {
        let p = partial(&[(Field::Description, " Consulting "), (Field::Amount, "R$ 150,00")]);
        assert_eq!(finalize(&p), finalize(&p));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("R$ 1.234,56"), Some(Decimal::from_str("1234.56").unwrap()));
        assert_eq!(parse_amount("150,00"), Some(Decimal::from_str("150.00").unwrap()));
        assert_eq!(parse_amount("1.234"), Some(Decimal::from_str("1234").unwrap()));
        assert_eq!(parse_amount("99.90"), Some(Decimal::from_str("99.90").unwrap()));
        assert_eq!(parse_amount(SENTINEL), None);
    }
}
