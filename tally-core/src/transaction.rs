//! Transaction records as read from a bank export.
//!
//! A transaction carries a date, an amount and any number of named text
//! fields. The set of field names is the transaction's schema; a field that
//! is present in the schema can still be null for a given row.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    /// Positive = income, negative = expense (after any cost/income indicator)
    pub amount: f64,
    fields: BTreeMap<String, Option<String>>,
}

impl Transaction {
    pub fn new(date: NaiveDate, amount: f64) -> Self {
        Self {
            date,
            amount,
            fields: BTreeMap::new(),
        }
    }

    /// Add a named field. Empty or whitespace-only values are stored as null.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        let value = if value.trim().is_empty() { None } else { Some(value) };
        self.fields.insert(name.into(), value);
        self
    }

    /// Add a field that is part of the schema but has no value on this row.
    pub fn with_null_field(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), None);
        self
    }

    /// Copy of this transaction with a different amount.
    pub fn with_amount(&self, amount: f64) -> Self {
        Self {
            amount,
            ..self.clone()
        }
    }

    /// Value of a field, or `None` when the field is null or not in the schema.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_deref())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn is_expense(&self) -> bool {
        self.amount < 0.0
    }

    pub fn is_income(&self) -> bool {
        self.amount > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
    }

    #[test]
    fn test_blank_values_are_null() {
        let t = Transaction::new(day(), -12.5)
            .with_field("description", "  ")
            .with_field("notification", "Card payment");
        assert!(t.has_field("description"));
        assert_eq!(t.field("description"), None);
        assert_eq!(t.field("notification"), Some("Card payment"));
        assert_eq!(t.field("missing"), None);
        assert!(!t.has_field("missing"));
    }

    #[test]
    fn test_with_amount_keeps_fields() {
        let t = Transaction::new(day(), 20.0).with_field("description", "Refund");
        let flipped = t.with_amount(-20.0);
        assert_eq!(flipped.amount, -20.0);
        assert!(flipped.is_expense());
        assert_eq!(flipped.field("description"), Some("Refund"));
        assert!(t.is_income());
    }
}
