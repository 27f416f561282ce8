//! Run summaries and CSV output files.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tally_core::{Categorization, KeywordStatistics, LabeledTransaction};
use tracing::info;

use crate::period::PeriodOverview;

/// What a categorization run achieved, for printing or JSON output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorizationSummary {
    pub total: usize,
    pub categorized_percentage: f64,
    pub threshold: f64,
    pub category_counts: BTreeMap<String, usize>,
    /// Keywords whose best score never reached the threshold, weakest first
    pub low_keywords: Vec<(String, u8)>,
}

impl CategorizationSummary {
    pub fn new(result: &Categorization, threshold: f64) -> Self {
        Self {
            total: result.len(),
            categorized_percentage: result.categorized_percentage(),
            threshold,
            category_counts: result.category_counts(),
            low_keywords: result
                .keyword_stats
                .below(threshold)
                .into_iter()
                .map(|(k, s)| (k.to_string(), s))
                .collect(),
        }
    }
}

impl fmt::Display for CategorizationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:.2}% of the cash flow dataset has been categorized.",
            self.categorized_percentage
        )?;
        if !self.low_keywords.is_empty() {
            writeln!(
                f,
                "The following keywords have not led to any category matches (threshold is {:.2}%). \
                 Consider removing or updating them:",
                self.threshold
            )?;
            let list: Vec<String> = self
                .low_keywords
                .iter()
                .map(|(k, s)| format!("{k} ({:.2}%)", f64::from(*s)))
                .collect();
            writeln!(f, "{}", list.join(", "))?;
        }
        Ok(())
    }
}

/// One row per transaction: date, amount, the requested fields, then the label.
pub fn write_labeled_csv<S: AsRef<str>>(
    path: impl AsRef<Path>,
    labeled: &[LabeledTransaction],
    fields: &[S],
) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut header = vec!["date".to_string(), "amount".to_string()];
    header.extend(fields.iter().map(|f| f.as_ref().to_string()));
    header.extend(["category", "keyword", "certainty"].map(String::from));
    wtr.write_record(&header)?;

    for l in labeled {
        let t = &l.transaction;
        let mut record = vec![t.date.format("%Y-%m-%d").to_string(), format!("{:.2}", t.amount)];
        record.extend(fields.iter().map(|f| t.field(f.as_ref()).unwrap_or("").to_string()));
        record.push(l.category.clone());
        record.push(l.keyword.clone().unwrap_or_default());
        record.push(format!("{:.2}", l.certainty));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    info!(path = %path.display(), rows = labeled.len(), "wrote categorized transactions");
    Ok(())
}

pub fn write_overview_csv(path: impl AsRef<Path>, overview: &PeriodOverview) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut header = vec![overview.period.as_str().to_string()];
    header.extend(overview.columns.iter().cloned());
    wtr.write_record(&header)?;
    for row in &overview.rows {
        let mut record = vec![row.label.clone()];
        record.extend(row.values.iter().map(|v| format!("{v:.2}")));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    info!(path = %path.display(), periods = overview.rows.len(), "wrote overview");
    Ok(())
}

/// Keyword, best score; weakest keywords first.
pub fn write_keyword_stats_csv(path: impl AsRef<Path>, stats: &KeywordStatistics) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record(["keyword", "best_score"])?;
    for (keyword, score) in stats.sorted() {
        wtr.write_record([keyword, score.to_string().as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Render an overview as an aligned text table.
pub fn render_overview(overview: &PeriodOverview) -> String {
    let mut header = vec![overview.period.as_str().to_string()];
    header.extend(overview.columns.iter().cloned());
    let mut table = vec![header];
    for row in &overview.rows {
        let mut line = vec![row.label.clone()];
        line.extend(row.values.iter().map(|v| format!("{v:.2}")));
        table.push(line);
    }

    let widths: Vec<usize> = (0..table[0].len())
        .map(|i| table.iter().map(|r| r[i].chars().count()).max().unwrap_or(0))
        .collect();

    let mut out = String::new();
    for line in &table {
        let cells: Vec<String> = line
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if i == 0 {
                    format!("{c:<w$}", w = widths[i])
                } else {
                    format!("{c:>w$}", w = widths[i])
                }
            })
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }
    out
}
