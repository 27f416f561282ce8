//! Period buckets and per-category period overviews.

use anyhow::{Result, bail};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tally_core::LabeledTransaction;

pub const TOTALS: &str = "Totals";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Period {
    pub const ALL: [Period; 4] = [
        Period::Weekly,
        Period::Monthly,
        Period::Quarterly,
        Period::Yearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
            Period::Quarterly => "quarterly",
            Period::Yearly => "yearly",
        }
    }

    /// Bucket label for a date. Labels of one period sort chronologically.
    ///
    /// Weeks end on Sunday and are labelled with that Sunday's date.
    pub fn label(&self, date: NaiveDate) -> String {
        match self {
            Period::Weekly => {
                let to_sunday = 6 - date.weekday().num_days_from_monday() as i64;
                (date + Duration::days(to_sunday)).format("%Y-%m-%d").to_string()
            }
            Period::Monthly => date.format("%Y-%m").to_string(),
            Period::Quarterly => format!("{}Q{}", date.year(), (date.month() - 1) / 3 + 1),
            Period::Yearly => date.year().to_string(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            "quarterly" => Ok(Period::Quarterly),
            "yearly" => Ok(Period::Yearly),
            other => bail!(
                "unsupported period '{other}', use weekly, monthly, quarterly or yearly"
            ),
        }
    }
}

/// Summed amounts per period (rows) and category (columns).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodOverview {
    pub period: Period,
    /// Column names; starts with `Totals` when totals were requested
    pub columns: Vec<String>,
    pub rows: Vec<PeriodRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRow {
    pub label: String,
    pub values: Vec<f64>,
}

impl PeriodOverview {
    pub fn value(&self, label: &str, column: &str) -> Option<f64> {
        let col = self.columns.iter().position(|c| c == column)?;
        let row = self.rows.iter().find(|r| r.label == label)?;
        row.values.get(col).copied()
    }
}

/// Build the overview. Only periods containing at least one transaction
/// appear; excluded categories are removed before totals are computed.
pub fn period_overview<S: AsRef<str>>(
    labeled: &[LabeledTransaction],
    period: Period,
    categories: &[S],
    exclusions: &[S],
    include_totals: bool,
) -> PeriodOverview {
    let shown: Vec<&str> = categories
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| !exclusions.iter().any(|e| e.as_ref() == *c))
        .collect();

    let mut sums: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for l in labeled {
        let row = sums
            .entry(period.label(l.transaction.date))
            .or_insert_with(|| vec![0.0; shown.len()]);
        if let Some(i) = shown.iter().position(|c| *c == l.category) {
            row[i] += l.transaction.amount;
        }
    }

    let mut columns: Vec<String> = shown.iter().map(|c| c.to_string()).collect();
    if include_totals {
        columns.insert(0, TOTALS.to_string());
    }

    let rows = sums
        .into_iter()
        .map(|(label, mut values)| {
            if include_totals {
                let total: f64 = values.iter().sum();
                values.insert(0, total);
            }
            PeriodRow { label, values }
        })
        .collect();

    PeriodOverview {
        period,
        columns,
        rows,
    }
}
