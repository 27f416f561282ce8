//! Category -> keyword rules.
//!
//! Keywords are stored trimmed and lower-cased. Category order is kept only so
//! that exact score ties resolve the same way on every run.

use serde::Serialize;

use crate::error::{CategorizeError, Result};

/// Label given to transactions no keyword matched.
pub const OTHER: &str = "Other";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRule {
    pub name: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryRules {
    categories: Vec<CategoryRule>,
}

impl CategoryRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build rules from `(category, keywords)` pairs, validating each one.
    pub fn from_pairs<I, N, K, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, K)>,
        N: Into<String>,
        K: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Self::new();
        for (name, keywords) in pairs {
            rules.insert(name, keywords)?;
        }
        Ok(rules)
    }

    /// Builder form of [`CategoryRules::insert`].
    pub fn with_category<N, K, S>(mut self, name: N, keywords: K) -> Result<Self>
    where
        N: Into<String>,
        K: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.insert(name, keywords)?;
        Ok(self)
    }

    pub fn insert<N, K, S>(&mut self, name: N, keywords: K) -> Result<()>
    where
        N: Into<String>,
        K: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(CategorizeError::config("category name is blank"));
        }
        if name.eq_ignore_ascii_case(OTHER) {
            return Err(CategorizeError::config(format!(
                "category name '{name}' is reserved for unmatched transactions"
            )));
        }
        if self.categories.iter().any(|c| c.name == name) {
            return Err(CategorizeError::config(format!(
                "category '{name}' is defined more than once"
            )));
        }

        let mut normalized = Vec::new();
        for kw in keywords {
            let kw = kw.as_ref().trim().to_lowercase();
            if kw.is_empty() {
                return Err(CategorizeError::config(format!(
                    "category '{name}' has a blank keyword"
                )));
            }
            normalized.push(kw);
        }

        self.categories.push(CategoryRule {
            name,
            keywords: normalized,
        });
        Ok(())
    }

    pub fn categories(&self) -> &[CategoryRule] {
        &self.categories
    }

    /// Every keyword in category-then-keyword order (duplicates included).
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.categories
            .iter()
            .flat_map(|c| c.keywords.iter().map(|k| k.as_str()))
    }

    /// Category names in rule order followed by the `Other` fallback.
    pub fn names(&self) -> Vec<String> {
        self.categories
            .iter()
            .map(|c| c.name.clone())
            .chain(std::iter::once(OTHER.to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_are_normalized() {
        let rules = CategoryRules::new()
            .with_category("Groceries", ["  SuperMarket ", "Grocer"])
            .unwrap();
        assert_eq!(rules.categories()[0].keywords, vec!["supermarket", "grocer"]);
    }

    #[test]
    fn test_rejects_duplicate_category() {
        let err = CategoryRules::from_pairs([("Transport", vec!["uber"]), ("Transport", vec!["train"])])
            .unwrap_err();
        assert!(matches!(err, CategorizeError::Configuration(_)));
    }

    #[test]
    fn test_rejects_blank_keyword_and_name() {
        assert!(CategoryRules::new().with_category("Food", ["pizza", " "]).is_err());
        assert!(CategoryRules::new().with_category("  ", ["pizza"]).is_err());
    }

    #[test]
    fn test_other_is_reserved() {
        let err = CategoryRules::new().with_category("other", ["misc"]).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_names_end_with_other() {
        let rules = CategoryRules::from_pairs([("A", vec!["a"]), ("B", vec!["b"])]).unwrap();
        assert_eq!(rules.names(), vec!["A", "B", "Other"]);
        assert_eq!(rules.keywords().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(CategoryRules::new().is_empty());
    }
}
