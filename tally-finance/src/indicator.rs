//! Cost/income indicator columns.
//!
//! Some banks export every amount as a positive number and put the direction
//! in a separate column ("Debit"/"Credit", "Af"/"Bij"). The indicator maps
//! each value to a multiplier that restores the sign.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_core::Transaction;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostOrIncome {
    /// Field name as it appears on the transaction (lower-cased header)
    pub column: String,
    pub criteria: BTreeMap<String, f64>,
}

impl CostOrIncome {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into().trim().to_lowercase(),
            criteria: BTreeMap::new(),
        }
    }

    pub fn with_criterion(mut self, value: impl Into<String>, multiplier: f64) -> Self {
        self.criteria.insert(value.into(), multiplier);
        self
    }

    /// Multiplier for an indicator value, compared case-insensitively.
    pub fn multiplier(&self, value: &str) -> Option<f64> {
        let value = value.trim();
        self.criteria
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(value))
            .map(|(_, m)| *m)
    }
}

/// Rows whose indicator value is missing or unknown keep their amount.
pub fn apply_cost_or_income(transactions: &[Transaction], indicator: &CostOrIncome) -> Vec<Transaction> {
    let mut unknown = 0usize;
    let out: Vec<Transaction> = transactions
        .iter()
        .map(|t| match t.field(&indicator.column).and_then(|v| indicator.multiplier(v)) {
            Some(m) => t.with_amount(t.amount * m),
            None => {
                unknown += 1;
                t.clone()
            }
        })
        .collect();
    debug!(column = %indicator.column, unknown, "applied cost/income indicator");
    out
}
