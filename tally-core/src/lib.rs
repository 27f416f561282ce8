//! tally-core: transactions, category rules, partial-ratio matcher and the
//! best-match categorizer.

pub mod categorizer;
pub mod error;
pub mod fuzzy;
pub mod rules;
pub mod transaction;

pub use categorizer::{
    CancelToken, Categorization, Categorizer, KeywordStatistics, LabeledTransaction, MatchResult,
    ProgressObserver, categorize,
};
pub use error::{CategorizeError, Result};
pub use fuzzy::{partial_ratio, ratio};
pub use rules::{CategoryRule, CategoryRules, OTHER};
pub use transaction::Transaction;
