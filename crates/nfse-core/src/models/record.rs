//! Per-document extraction records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder stored for a field nothing matched.
pub const SENTINEL: &str = "N/A";

/// One output row, in sink column order.
pub type Row = [String; 4];

/// The four fields extracted from every document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Emission time (HH:MM:SS).
    Hour,
    /// Service taker ("TOMADOR").
    Counterparty,
    /// Service description ("DISCRIMINAÇÃO DOS SERVIÇOS").
    Description,
    /// Invoice total ("VALOR TOTAL DA NOTA").
    Amount,
}

impl Field {
    /// All fields in column order.
    pub const ALL: [Field; 4] = [
        Field::Hour,
        Field::Counterparty,
        Field::Description,
        Field::Amount,
    ];

    /// Column position in a [`Row`].
    pub fn index(self) -> usize {
        match self {
            Field::Hour => 0,
            Field::Counterparty => 1,
            Field::Description => 2,
            Field::Amount => 3,
        }
    }

    /// Column header used by file sinks.
    pub fn column_name(self) -> &'static str {
        match self {
            Field::Hour => "hour",
            Field::Counterparty => "counterparty",
            Field::Description => "description",
            Field::Amount => "amount",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// Fields collected so far for one document.
///
/// A slot is written at most once; later matches for a filled slot are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialRecord {
    slots: [Option<String>; 4],
}

impl PartialRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` for `field` unless the field is already set.
    ///
    /// Returns `true` if the value was stored.
    pub fn set_if_absent(&mut self, field: Field, value: impl Into<String>) -> bool {
        let slot = &mut self.slots[field.index()];
        if slot.is_some() {
            return false;
        }
        *slot = Some(value.into());
        true
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.slots[field.index()].as_deref()
    }

    pub fn is_set(&self, field: Field) -> bool {
        self.slots[field.index()].is_some()
    }

    /// True once every field has a value.
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// True if no field has a value.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Fields still without a value, in column order.
    pub fn missing(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|f| !self.is_set(*f))
            .collect()
    }
}

/// Finalized result for one document.
///
/// Every field holds either an extracted value or [`SENTINEL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub hour: String,
    pub counterparty: String,
    pub description: String,
    pub amount: String,
}

impl Record {
    /// A record with every field set to the sentinel.
    pub fn sentinel() -> Self {
        Self {
            hour: SENTINEL.to_string(),
            counterparty: SENTINEL.to_string(),
            description: SENTINEL.to_string(),
            amount: SENTINEL.to_string(),
        }
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Hour => &self.hour,
            Field::Counterparty => &self.counterparty,
            Field::Description => &self.description,
            Field::Amount => &self.amount,
        }
    }

    /// Whether `field` holds the sentinel.
    pub fn is_missing(&self, field: Field) -> bool {
        self.get(field) == SENTINEL
    }

    /// Fields holding the sentinel, in column order.
    pub fn missing(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|f| self.is_missing(*f))
            .collect()
    }

    /// Convert into a sink row (Hour, Counterparty, Description, Amount).
    pub fn to_row(&self) -> Row {
        [
            self.hour.clone(),
            self.counterparty.clone(),
            self.description.clone(),
            self.amount.clone(),
        ]
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::sentinel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_first_value_is_kept() {
        let mut partial = PartialRecord::new();
        assert!(partial.set_if_absent(Field::Hour, "10:15:30"));
        assert!(!partial.set_if_absent(Field::Hour, "11:00:00"));
        assert_eq!(partial.get(Field::Hour), Some("10:15:30"));
    }

    #[test]
    fn test_missing_fields_in_column_order() {
        let mut partial = PartialRecord::new();
        partial.set_if_absent(Field::Counterparty, "Acme Ltd");
        assert_eq!(
            partial.missing(),
            vec![Field::Hour, Field::Description, Field::Amount]
        );
        assert!(!partial.is_empty());
        assert!(!partial.is_complete());
    }

    #[test]
    fn test_sentinel_record_row() {
        let record = Record::sentinel();
        assert_eq!(record.to_row(), ["N/A", "N/A", "N/A", "N/A"].map(String::from));
        assert_eq!(record.missing(), Field::ALL.to_vec());
    }
}
