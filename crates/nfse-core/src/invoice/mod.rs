//! NFS-e field extraction: rule table, matcher and record normalization.

mod matcher;
mod normalizer;
pub mod rules;

pub use matcher::{FieldMatcher, PageText};
pub use normalizer::{finalize, parse_amount, strip_currency};
pub use rules::{default_rules, Anchor, FieldRule};
