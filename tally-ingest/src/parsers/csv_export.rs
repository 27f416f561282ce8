//! Delimited-text bank exports.
//!
//! The first record is the header row. Rows whose date or amount cannot be
//! parsed are skipped with a warning; a bad header fails the whole file.

use anyhow::{Context, Result};
use std::path::Path;
use tally_core::Transaction;
use tracing::{debug, warn};

use crate::layout::StatementLayout;

pub fn read_csv_statement(path: impl AsRef<Path>, layout: &StatementLayout) -> Result<Vec<Transaction>> {
    let path = path.as_ref();
    let rdr = csv::ReaderBuilder::new()
        .delimiter(layout.delimiter)
        .flexible(true)
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    parse_csv(rdr, layout).with_context(|| format!("reading {}", path.display()))
}

/// Parse CSV text already in memory.
pub fn parse_csv_text(text: &str, layout: &StatementLayout) -> Result<Vec<Transaction>> {
    let rdr = csv::ReaderBuilder::new()
        .delimiter(layout.delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());
    parse_csv(rdr, layout)
}

fn parse_csv<R: std::io::Read>(mut rdr: csv::Reader<R>, layout: &StatementLayout) -> Result<Vec<Transaction>> {
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    let cols = layout.resolve(&headers)?;
    let amounts = layout.amount_parser()?;

    let mut txns = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let cells: Vec<&str> = record.iter().collect();
        match layout.to_transaction(&cols, &amounts, &cells) {
            Ok(txn) => txns.push(txn),
            // header is line 1
            Err(e) => warn!(line = i + 2, error = %e, "skipping row"),
        }
    }

    debug!(rows = txns.len(), "parsed csv statement");
    Ok(txns)
}
