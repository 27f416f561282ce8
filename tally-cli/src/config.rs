use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tally_core::{CategoryRules, OTHER};
use tally_finance::{CostOrIncome, Period};
use tally_ingest::{DecimalSeparator, StatementLayout};
use tracing::debug;

use crate::state::{default_config_path, ensure_tally_home};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralSection,
    pub categories: Vec<CategorySection>,
    pub report: ReportSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSection {
    /// Statement files or directories
    pub file_location: Vec<PathBuf>,
    pub adjust_duplicates: bool,
    pub date_columns: Vec<String>,
    pub date_format: String,
    pub description_columns: Vec<String>,
    pub amount_columns: Vec<String>,
    pub decimal_separator: String,
    pub delimiter: String,
    pub categorization_threshold: f64,
    pub category_exclusions: Vec<String>,
    /// 0 = available parallelism
    pub workers: usize,
    pub cost_or_income: Option<CostOrIncomeSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostOrIncomeSection {
    pub column: String,
    pub criteria: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySection {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    pub output_dir: PathBuf,
    pub overviews: Vec<String>,
    pub include_totals: bool,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            file_location: Vec::new(),
            adjust_duplicates: true,
            date_columns: vec!["date".to_string()],
            date_format: "%Y-%m-%d".to_string(),
            description_columns: vec!["description".to_string()],
            amount_columns: vec!["amount".to_string()],
            decimal_separator: ".".to_string(),
            delimiter: ",".to_string(),
            categorization_threshold: 90.0,
            category_exclusions: Vec::new(),
            workers: 0,
            cost_or_income: None,
        }
    }
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("reports"),
            overviews: Period::ALL.iter().map(|p| p.to_string()).collect(),
            include_totals: true,
        }
    }
}

/// Written by `tally init`.
pub const DEFAULT_CONFIG: &str = r#"# tally configuration

[general]
# Statement files or directories (directories are expanded to .csv/.xlsx files)
file_location = []
# Merge identical rows within a file, drop rows repeated by a later file
adjust_duplicates = true
# First column present in the export wins
date_columns = ["date"]
date_format = "%Y-%m-%d"
# Every listed column that is present is searched for keywords
description_columns = ["description"]
amount_columns = ["amount"]
decimal_separator = "."
delimiter = ","
# Minimum partial-ratio score (0-100) for a keyword to count as a match
categorization_threshold = 90
# Categories hidden from period overviews
category_exclusions = []
# Worker threads, 0 = one per core
workers = 0

# Banks that export unsigned amounts with a direction column:
# [general.cost_or_income]
# column = "debit/credit"
# criteria = { debit = -1.0, credit = 1.0 }

# [[categories]]
# name = "Groceries"
# keywords = ["supermarket", "albert heijn"]
#
# [[categories]]
# name = "Transport"
# keywords = ["uber", "ns groep"]

[report]
output_dir = "reports"
overviews = ["weekly", "monthly", "quarterly", "yearly"]
include_totals = true
"#;

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(s).context("parse config.toml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let g = &self.general;
        self.decimal_separator()?;
        self.delimiter()?;
        if !(0.0..=100.0).contains(&g.categorization_threshold) {
            bail!(
                "categorization_threshold must be within 0..=100, got {}",
                g.categorization_threshold
            );
        }
        for (name, cols) in [
            ("date_columns", &g.date_columns),
            ("description_columns", &g.description_columns),
            ("amount_columns", &g.amount_columns),
        ] {
            if cols.iter().all(|c| c.trim().is_empty()) {
                bail!("{name} must name at least one column");
            }
        }
        if let Some(ci) = &g.cost_or_income {
            if ci.column.trim().is_empty() {
                bail!("cost_or_income.column must not be empty");
            }
        }
        self.overview_periods()?;

        let mut seen = HashSet::new();
        for c in &self.categories {
            let name = c.name.trim();
            if name.is_empty() {
                bail!("category names must not be blank");
            }
            if name.eq_ignore_ascii_case(OTHER) {
                bail!("'{OTHER}' is reserved for uncategorized transactions");
            }
            if !seen.insert(name.to_string()) {
                bail!("duplicate category '{name}'");
            }
            if c.keywords.iter().any(|k| k.trim().is_empty()) {
                bail!("category '{name}' has a blank keyword");
            }
        }
        Ok(())
    }

    fn decimal_separator(&self) -> Result<DecimalSeparator> {
        match self.general.decimal_separator.as_str() {
            "." => Ok(DecimalSeparator::Dot),
            "," => Ok(DecimalSeparator::Comma),
            other => bail!("decimal_separator must be \".\" or \",\", got {other:?}"),
        }
    }

    fn delimiter(&self) -> Result<u8> {
        match self.general.delimiter.as_bytes() {
            [b] if b.is_ascii() => Ok(*b),
            _ => bail!(
                "delimiter must be a single ASCII character, got {:?}",
                self.general.delimiter
            ),
        }
    }

    pub fn layout(&self) -> Result<StatementLayout> {
        let g = &self.general;
        Ok(StatementLayout {
            date_columns: g.date_columns.clone(),
            date_format: g.date_format.clone(),
            description_columns: g.description_columns.clone(),
            amount_columns: g.amount_columns.clone(),
            decimal_separator: self.decimal_separator()?,
            delimiter: self.delimiter()?,
        })
    }

    pub fn rules(&self) -> Result<CategoryRules> {
        let rules = CategoryRules::from_pairs(
            self.categories
                .iter()
                .map(|c| (c.name.clone(), c.keywords.clone())),
        )?;
        Ok(rules)
    }

    /// Description columns as transaction field names.
    pub fn description_fields(&self) -> Vec<String> {
        self.general
            .description_columns
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect()
    }

    pub fn cost_or_income(&self) -> Option<CostOrIncome> {
        self.general.cost_or_income.as_ref().map(|ci| CostOrIncome {
            column: ci.column.trim().to_lowercase(),
            criteria: ci.criteria.clone(),
        })
    }

    pub fn overview_periods(&self) -> Result<Vec<Period>> {
        self.report.overviews.iter().map(|p| p.parse()).collect()
    }
}

/// Load from `path`, or from `~/.tally/config.toml` when none is given.
/// A missing default file yields the defaults; a missing explicit file is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let p = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = default_config_path()?;
            if !p.exists() {
                debug!(path = %p.display(), "no config file, using defaults");
                return Ok(Config::default());
            }
            p
        }
    };
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    Config::from_toml_str(&s).with_context(|| format!("invalid config {}", p.display()))
}

pub fn init_config(path: Option<&Path>, force: bool) -> Result<PathBuf> {
    let p = match path {
        Some(p) => p.to_path_buf(),
        None => ensure_tally_home()?.join("config.toml"),
    };
    if p.exists() && !force {
        bail!("config already exists: {} (pass --force to overwrite)", p.display());
    }
    if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&p, DEFAULT_CONFIG).with_context(|| format!("write {}", p.display()))?;
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_text_parses() {
        let cfg = Config::from_toml_str(DEFAULT_CONFIG).unwrap();
        assert!(cfg.general.adjust_duplicates);
        assert_eq!(cfg.general.categorization_threshold, 90.0);
        assert!(cfg.categories.is_empty());
        assert_eq!(cfg.overview_periods().unwrap().len(), 4);
    }

    #[test]
    fn test_full_config() {
        let cfg = Config::from_toml_str(
            r#"
[general]
file_location = ["statements/"]
date_columns = ["Date"]
date_format = "%Y%m%d"
description_columns = ["Name / Description", "Notifications"]
amount_columns = ["Amount (EUR)"]
decimal_separator = ","
delimiter = ";"
categorization_threshold = 85

[general.cost_or_income]
column = "Debit/credit"
criteria = { Debit = -1.0, Credit = 1.0 }

[[categories]]
name = "Groceries"
keywords = ["Albert Heijn", "jumbo"]

[[categories]]
name = "Transport"
keywords = ["uber"]

[report]
overviews = ["monthly"]
include_totals = false
"#,
        )
        .unwrap();

        let layout = cfg.layout().unwrap();
        assert_eq!(layout.delimiter, b';');
        assert_eq!(layout.decimal_separator, DecimalSeparator::Comma);
        assert_eq!(cfg.description_fields(), vec!["name / description", "notifications"]);

        let rules = cfg.rules().unwrap();
        assert_eq!(rules.names(), vec!["Groceries", "Transport", OTHER]);
        assert_eq!(rules.keywords().next(), Some("albert heijn"));

        let ci = cfg.cost_or_income().unwrap();
        assert_eq!(ci.column, "debit/credit");
        assert_eq!(ci.multiplier("debit"), Some(-1.0));
        assert_eq!(cfg.overview_periods().unwrap(), vec![Period::Monthly]);
        assert_eq!(cfg.report.output_dir, PathBuf::from("reports"));
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            ("[general]\ndecimal_separator = \";\"", "decimal_separator"),
            ("[general]\ndelimiter = \"ab\"", "delimiter"),
            ("[general]\ncategorization_threshold = 101", "categorization_threshold"),
            ("[general]\ndescription_columns = []", "description_columns"),
            ("[report]\noverviews = [\"daily\"]", "unsupported period"),
            ("[[categories]]\nname = \"Other\"\nkeywords = [\"x\"]", "reserved"),
            ("[[categories]]\nname = \" \"\nkeywords = [\"x\"]", "blank"),
            (
                "[[categories]]\nname = \"A\"\nkeywords = [\"x\"]\n[[categories]]\nname = \"A\"\nkeywords = [\"y\"]",
                "duplicate",
            ),
            ("[[categories]]\nname = \"A\"\nkeywords = [\"\"]", "blank keyword"),
        ];
        for (text, expected) in cases {
            let err = Config::from_toml_str(text).unwrap_err();
            assert!(
                format!("{err:#}").contains(expected),
                "{text:?}: expected '{expected}' in '{err:#}'"
            );
        }
    }

    #[test]
    fn test_load_and_init() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert!(load_config(Some(&path)).is_err());

        init_config(Some(&path), false).unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.report.output_dir, PathBuf::from("reports"));

        assert!(init_config(Some(&path), false).is_err());
        assert!(init_config(Some(&path), true).is_ok());
    }
}
