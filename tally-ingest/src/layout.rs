//! Column layout of a bank export and the row -> [`Transaction`] mapping.

use anyhow::{Context, Result, anyhow, bail};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tally_core::Transaction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecimalSeparator {
    #[default]
    #[serde(rename = ".")]
    Dot,
    #[serde(rename = ",")]
    Comma,
}

/// Which columns hold the date, amount and free text of an export.
///
/// Column names are compared lower-cased. For date and amount the first
/// candidate present in the header is used; every description candidate that
/// is present is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLayout {
    pub date_columns: Vec<String>,
    pub date_format: String,
    pub description_columns: Vec<String>,
    pub amount_columns: Vec<String>,
    pub decimal_separator: DecimalSeparator,
    pub delimiter: u8,
}

impl Default for StatementLayout {
    fn default() -> Self {
        Self {
            date_columns: vec!["date".to_string()],
            date_format: "%Y-%m-%d".to_string(),
            description_columns: vec!["description".to_string()],
            amount_columns: vec!["amount".to_string()],
            decimal_separator: DecimalSeparator::Dot,
            delimiter: b',',
        }
    }
}

/// Header positions resolved against one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub headers: Vec<String>,
    pub date: usize,
    pub amount: usize,
    pub descriptions: Vec<String>,
}

impl StatementLayout {
    pub fn resolve<S: AsRef<str>>(&self, headers: &[S]) -> Result<ResolvedColumns> {
        let headers: Vec<String> = headers
            .iter()
            .map(|h| h.as_ref().trim().to_lowercase())
            .collect();
        let position = |name: &str| headers.iter().position(|h| *h == name.trim().to_lowercase());

        let date = self
            .date_columns
            .iter()
            .find_map(|c| position(c.as_str()))
            .ok_or_else(|| anyhow!("no date column found (looked for {:?})", self.date_columns))?;
        let amount = self
            .amount_columns
            .iter()
            .find_map(|c| position(c.as_str()))
            .ok_or_else(|| anyhow!("no amount column found (looked for {:?})", self.amount_columns))?;
        let descriptions: Vec<String> = self
            .description_columns
            .iter()
            .filter_map(|c| position(c.as_str()).map(|i| headers[i].clone()))
            .collect();
        if descriptions.is_empty() {
            bail!(
                "no description column found (looked for {:?})",
                self.description_columns
            );
        }

        Ok(ResolvedColumns {
            headers,
            date,
            amount,
            descriptions,
        })
    }

    pub fn amount_parser(&self) -> Result<AmountParser> {
        AmountParser::new(self.decimal_separator)
    }

    /// Build a transaction from one row. Every column becomes a field.
    pub fn to_transaction<S: AsRef<str>>(
        &self,
        cols: &ResolvedColumns,
        amounts: &AmountParser,
        cells: &[S],
    ) -> Result<Transaction> {
        let cell = |i: usize| cells.get(i).map(|c| c.as_ref().trim()).unwrap_or("");

        let raw_date = cell(cols.date);
        let date = parse_date(raw_date, &self.date_format)
            .with_context(|| format!("unparseable date '{raw_date}'"))?;
        let raw_amount = cell(cols.amount);
        let amount = amounts
            .parse(raw_amount)
            .ok_or_else(|| anyhow!("unparseable amount '{raw_amount}'"))?;

        let mut txn = Transaction::new(date, amount);
        for (i, name) in cols.headers.iter().enumerate() {
            if name.is_empty() {
                continue;
            }
            txn = txn.with_field(name.clone(), cell(i));
        }
        Ok(txn)
    }
}

/// Parse with the layout's format, falling back to ISO `YYYY-MM-DD`.
pub fn parse_date(raw: &str, format: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, format) {
        return Ok(d);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
        return Ok(dt.date());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("expected date in format {format}"))
}

/// Turns exported amount strings like `€ 1.234,56` or `(12.00)` into numbers.
#[derive(Debug, Clone)]
pub struct AmountParser {
    separator: DecimalSeparator,
    noise: Regex,
}

impl AmountParser {
    pub fn new(separator: DecimalSeparator) -> Result<Self> {
        Ok(Self {
            separator,
            noise: Regex::new(r"[^0-9.,+\-]")?,
        })
    }

    pub fn parse(&self, raw: &str) -> Option<f64> {
        let raw = raw.trim();
        let (negate, raw) = match raw.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
            Some(inner) => (true, inner),
            None => (false, raw),
        };
        let cleaned = self.noise.replace_all(raw, "");
        let normalized = match self.separator {
            DecimalSeparator::Dot => cleaned.replace(',', ""),
            DecimalSeparator::Comma => cleaned.replace('.', "").replace(',', "."),
        };
        if normalized.is_empty() {
            return None;
        }
        let value: f64 = normalized.parse().ok()?;
        Some(if negate { -value } else { value })
    }
}
