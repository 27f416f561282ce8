use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CategorizeError {
    /// Structurally invalid fields, rules, threshold or input. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Categorization cancelled after {processed} transactions")]
    Cancelled { processed: usize },
}

impl CategorizeError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        CategorizeError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CategorizeError>;
