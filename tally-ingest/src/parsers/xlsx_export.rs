//! Excel (`.xlsx`) bank exports: first worksheet, first row is the header.

use anyhow::{Context, Result, anyhow};
use calamine::{Data, Reader, open_workbook_auto};
use chrono::{NaiveDate, TimeDelta};
use std::path::Path;
use tally_core::Transaction;
use tracing::{debug, warn};

use crate::layout::{DecimalSeparator, StatementLayout};

pub fn read_xlsx_statement(path: impl AsRef<Path>, layout: &StatementLayout) -> Result<Vec<Transaction>> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| anyhow!("opening {}: {e}", path.display()))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("{} has no worksheets", path.display()))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| anyhow!("reading sheet '{sheet}' of {}: {e}", path.display()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|r| r.iter().map(cell_text).collect())
        .unwrap_or_default();
    let cols = layout
        .resolve(&headers)
        .with_context(|| format!("reading {}", path.display()))?;
    let amounts = layout.amount_parser()?;

    let mut txns = Vec::new();
    for (i, row) in rows.enumerate() {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(col, c)| {
                if col == cols.date {
                    date_cell_text(c)
                } else if col == cols.amount {
                    amount_cell_text(c, layout.decimal_separator)
                } else {
                    cell_text(c)
                }
            })
            .collect();
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        match layout.to_transaction(&cols, &amounts, &cells) {
            Ok(txn) => txns.push(txn),
            Err(e) => warn!(row = i + 2, error = %e, "skipping row"),
        }
    }

    debug!(rows = txns.len(), sheet = %sheet, "parsed xlsx statement");
    Ok(txns)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Numeric amounts are rendered with the layout's decimal mark so the
/// amount parser reads them the same way as text cells.
fn amount_cell_text(cell: &Data, separator: DecimalSeparator) -> String {
    let text = match cell {
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        other => return cell_text(other),
    };
    match separator {
        DecimalSeparator::Dot => text,
        DecimalSeparator::Comma => text.replace('.', ","),
    }
}

/// Date cells come through as Excel serials; render them as ISO dates.
fn date_cell_text(cell: &Data) -> String {
    match cell {
        Data::DateTime(dt) => excel_serial_to_iso(dt.as_f64()),
        Data::Float(f) => excel_serial_to_iso(*f),
        Data::Int(i) => excel_serial_to_iso(*i as f64),
        other => cell_text(other),
    }
}

/// Empty when the serial is out of range, so the row is rejected as undated.
fn excel_serial_to_iso(serial: f64) -> String {
    if !serial.is_finite() {
        return String::new();
    }
    // 1899-12-30 absorbs the 1900 leap-year bug
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .zip(TimeDelta::try_days(serial.trunc() as i64))
        .and_then(|(base, days)| base.checked_add_signed(days))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
