//! Reading and consolidating one or more statement files.

use anyhow::{Context, Result, bail};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tally_core::Transaction;
use tracing::{debug, info, warn};

use crate::layout::StatementLayout;
use crate::parsers;

const SUPPORTED: &[&str] = &["csv", "txt", "xlsx", "xlsm", "xls", "ods"];

/// Read a single statement, dispatching on the file extension.
pub fn read_statement(path: impl AsRef<Path>, layout: &StatementLayout) -> Result<Vec<Transaction>> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("csv") | Some("txt") => parsers::read_csv_statement(path, layout),
        #[cfg(feature = "xlsx")]
        Some("xlsx") | Some("xlsm") | Some("xls") | Some("ods") => {
            parsers::read_xlsx_statement(path, layout)
        }
        _ => bail!("unsupported statement format: {}", path.display()),
    }
}

/// Expand directories into their supported files, sorted by name.
pub fn collect_files<P: AsRef<Path>>(locations: &[P]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for location in locations {
        let location = location.as_ref();
        if location.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(location)
                .with_context(|| format!("listing {}", location.display()))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_supported(p))
                .collect();
            entries.sort();
            debug!(dir = %location.display(), files = entries.len(), "expanded directory");
            files.extend(entries);
        } else if location.is_file() {
            files.push(location.to_path_buf());
        } else {
            bail!("statement location does not exist: {}", location.display());
        }
    }
    Ok(files)
}

/// Read every location into one date-ordered list of transactions.
///
/// With `adjust_duplicates`, identical rows inside one file are merged into a
/// single row carrying the summed amount, and rows from a later file that were
/// already read from an earlier file are dropped.
pub fn read_statements<P: AsRef<Path>>(
    locations: &[P],
    layout: &StatementLayout,
    adjust_duplicates: bool,
) -> Result<Vec<Transaction>> {
    let files = collect_files(locations)?;
    if files.is_empty() {
        bail!("no statement files found");
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut all = Vec::new();
    for file in &files {
        let mut txns = read_statement(file, layout)?;
        debug!(file = %file.display(), rows = txns.len(), "read statement");
        if adjust_duplicates {
            txns = merge_identical(txns);
            let before = txns.len();
            let fresh: Vec<Transaction> = txns
                .into_iter()
                .filter(|t| !seen.contains(&row_key(t)))
                .collect();
            let dropped = before - fresh.len();
            if dropped > 0 {
                warn!(file = %file.display(), dropped, "dropped rows already read from an earlier file");
            }
            seen.extend(fresh.iter().map(row_key));
            all.extend(fresh);
        } else {
            all.extend(txns);
        }
    }

    if all.is_empty() {
        bail!("statements contain no transactions");
    }
    all.sort_by_key(|t| t.date);
    info!(files = files.len(), transactions = all.len(), "loaded statements");
    Ok(all)
}

/// Merge identical rows of one file, keeping the first occurrence's position.
fn merge_identical(txns: Vec<Transaction>) -> Vec<Transaction> {
    let mut merged: Vec<Transaction> = Vec::with_capacity(txns.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for txn in txns {
        let key = row_key(&txn);
        match index.get(&key) {
            Some(&i) => {
                let total = merged[i].amount + txn.amount;
                merged[i] = merged[i].with_amount(total);
            }
            None => {
                index.insert(key, merged.len());
                merged.push(txn);
            }
        }
    }
    merged
}

fn row_key(txn: &Transaction) -> String {
    let mut key = format!("{}|{}", txn.date, txn.amount);
    for (name, value) in txn.fields() {
        key.push('|');
        key.push_str(name);
        key.push('=');
        key.push_str(value.unwrap_or("\u{0}"));
    }
    key
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn is_supported(path: &Path) -> bool {
    extension(path).is_some_and(|e| SUPPORTED.contains(&e.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;

    const HEADER: &str = "date,description,amount\n";

    #[test]
    fn test_directory_expansion_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), format!("{HEADER}2024-01-02,B,1\n")).unwrap();
        fs::write(dir.path().join("a.csv"), format!("{HEADER}2024-01-03,A,1\n")).unwrap();
        fs::write(dir.path().join("notes.md"), "ignore me").unwrap();

        let files = collect_files(&[dir.path()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn test_missing_location_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_files(&[dir.path().join("gone")]).is_err());
    }

    /// Regression test: two identical coffees on the same day are one merged
    /// row, and an overlapping second export must not count them again.
    #[test]
    fn test_duplicates_merged_within_and_dropped_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let jan = format!("{HEADER}2024-01-05,COFFEE,-3\n2024-01-05,COFFEE,-3\n2024-01-06,UBER,-10\n");
        let overlap = format!("{HEADER}2024-01-06,UBER,-10\n2024-01-07,SALARY,2000\n");
        fs::write(dir.path().join("01.csv"), jan).unwrap();
        fs::write(dir.path().join("02.csv"), overlap).unwrap();

        let txns = read_statements(&[dir.path()], &StatementLayout::default(), true).unwrap();
        assert_eq!(txns.len(), 3);
        assert_eq!(txns[0].field("description"), Some("COFFEE"));
        assert_eq!(txns[0].amount, -6.0);
        assert_eq!(txns[2].amount, 2000.0);

        let raw = read_statements(&[dir.path()], &StatementLayout::default(), false).unwrap();
        assert_eq!(raw.len(), 5);
    }

    #[test]
    fn test_output_sorted_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desc.csv");
        fs::write(&path, format!("{HEADER}2024-03-01,C,1\n2024-01-01,A,1\n2024-02-01,B,1\n")).unwrap();
        let txns = read_statements(&[&path], &StatementLayout::default(), true).unwrap();
        let dates: Vec<NaiveDate> = txns.iter().map(|t| t.date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
    }

    #[test]
    fn test_empty_statements_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, HEADER).unwrap();
        let err = read_statements(&[&path], &StatementLayout::default(), true).unwrap_err();
        assert!(err.to_string().contains("no transactions"));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statement.pdf");
        fs::write(&path, "%PDF").unwrap();
        assert!(read_statement(&path, &StatementLayout::default()).is_err());
    }
}
