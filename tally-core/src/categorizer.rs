//! Best-match keyword categorizer.
//!
//! Every transaction is scored against every keyword of every category on
//! every configured text field. The single highest-scoring candidate that
//! clears the threshold decides the category, so a description like
//! "Apple Bandit" lands in the category owning "apple bandit" rather than the
//! one owning "apple", whatever order the categories were declared in.
//! Exact ties go to the first candidate in category -> field -> keyword order.
//!
//! Large inputs can be sharded over scoped worker threads; each shard keeps its
//! own [`KeywordStatistics`] and the shards are max-merged afterwards.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::error::{CategorizeError, Result};
use crate::fuzzy::partial_ratio;
use crate::rules::{CategoryRules, OTHER};
use crate::transaction::Transaction;

/// Outcome for a single transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub category: String,
    pub keyword: Option<String>,
    /// Winning partial-ratio score, 0..=100
    pub score: u8,
}

impl MatchResult {
    pub fn other() -> Self {
        Self {
            category: OTHER.to_string(),
            keyword: None,
            score: 0,
        }
    }

    /// Score normalized to 0.0..=1.0
    pub fn certainty(&self) -> f64 {
        f64::from(self.score) / 100.0
    }

    pub fn is_other(&self) -> bool {
        self.category == OTHER
    }
}

/// Best score each keyword reached against any field of any transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeywordStatistics {
    best: BTreeMap<String, u8>,
}

impl KeywordStatistics {
    /// Statistics with every keyword of `rules` present at score 0.
    pub fn for_rules(rules: &CategoryRules) -> Self {
        Self {
            best: rules.keywords().map(|k| (k.to_string(), 0)).collect(),
        }
    }

    pub fn observe(&mut self, keyword: &str, score: u8) {
        match self.best.get_mut(keyword) {
            Some(best) if *best >= score => {}
            Some(best) => *best = score,
            None => {
                self.best.insert(keyword.to_string(), score);
            }
        }
    }

    /// Per-keyword max; merge order does not matter.
    pub fn merge(&mut self, other: &KeywordStatistics) {
        for (keyword, score) in &other.best {
            self.observe(keyword, *score);
        }
    }

    pub fn best(&self, keyword: &str) -> Option<u8> {
        self.best.get(keyword).copied()
    }

    /// All entries, ascending by score then keyword.
    pub fn sorted(&self) -> Vec<(&str, u8)> {
        let mut out: Vec<(&str, u8)> = self.best.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        out.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        out
    }

    /// Keywords whose best score never reached `threshold`, ascending by score.
    pub fn below(&self, threshold: f64) -> Vec<(&str, u8)> {
        self.sorted()
            .into_iter()
            .filter(|(_, score)| f64::from(*score) < threshold)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.best.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.best.len()
    }

    pub fn is_empty(&self) -> bool {
        self.best.is_empty()
    }
}

/// A transaction together with its derived label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledTransaction {
    pub transaction: Transaction,
    pub category: String,
    pub keyword: Option<String>,
    pub certainty: f64,
}

impl LabeledTransaction {
    fn new(transaction: &Transaction, result: MatchResult) -> Self {
        let certainty = result.certainty();
        Self {
            transaction: transaction.clone(),
            category: result.category,
            keyword: result.keyword,
            certainty,
        }
    }

    pub fn is_other(&self) -> bool {
        self.category == OTHER
    }
}

/// Output of a categorization run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Categorization {
    /// Same order as the input
    pub labeled: Vec<LabeledTransaction>,
    pub keyword_stats: KeywordStatistics,
}

impl Categorization {
    /// Share of transactions that received a category other than `Other`, 0..=100.
    pub fn categorized_percentage(&self) -> f64 {
        if self.labeled.is_empty() {
            return 0.0;
        }
        let matched = self.labeled.iter().filter(|l| !l.is_other()).count();
        matched as f64 / self.labeled.len() as f64 * 100.0
    }

    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for l in &self.labeled {
            *counts.entry(l.category.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.labeled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labeled.is_empty()
    }
}

/// Cooperative cancellation, checked once per transaction.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives `(done, total)` after each transaction. Called from worker threads.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, done: usize, total: usize);
}

impl<F> ProgressObserver for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_progress(&self, done: usize, total: usize) {
        self(done, total)
    }
}

/// Validated `(rules, fields, threshold)` plus run options.
#[derive(Clone)]
pub struct Categorizer {
    rules: CategoryRules,
    fields: Vec<String>,
    threshold: f64,
    workers: usize,
    cancel: Option<CancelToken>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl std::fmt::Debug for Categorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Categorizer")
            .field("categories", &self.rules.len())
            .field("fields", &self.fields)
            .field("threshold", &self.threshold)
            .field("workers", &self.workers)
            .finish()
    }
}

impl Categorizer {
    pub fn new<S: AsRef<str>>(rules: CategoryRules, fields: &[S], threshold: f64) -> Result<Self> {
        if fields.is_empty() {
            return Err(CategorizeError::config(
                "no description fields configured to search for keywords",
            ));
        }
        if !(0.0..=100.0).contains(&threshold) {
            return Err(CategorizeError::config(format!(
                "threshold {threshold} is outside 0..=100"
            )));
        }
        Ok(Self {
            rules,
            fields: fields.iter().map(|f| f.as_ref().to_string()).collect(),
            threshold,
            workers: 1,
            cancel: None,
            observer: None,
        })
    }

    /// Number of worker threads; 0 picks the available parallelism.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = if workers == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            workers
        };
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_observer(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn rules(&self) -> &CategoryRules {
        &self.rules
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn run(&self, transactions: &[Transaction]) -> Result<Categorization> {
        self.check_input(transactions)?;

        let total = transactions.len();
        let workers = self.workers.clamp(1, total);
        let done = AtomicUsize::new(0);

        let shards: Vec<(Vec<MatchResult>, KeywordStatistics)> = if workers == 1 {
            vec![self.run_shard(0, transactions, &done, total)?]
        } else {
            let chunk = total.div_ceil(workers);
            std::thread::scope(|scope| {
                let handles: Vec<_> = transactions
                    .chunks(chunk)
                    .enumerate()
                    .map(|(i, shard)| {
                        let done = &done;
                        scope.spawn(move || self.run_shard(i, shard, done, total))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| match h.join() {
                        Ok(res) => res,
                        Err(panic) => std::panic::resume_unwind(panic),
                    })
                    .collect::<Result<Vec<_>>>()
            })?
        };

        let mut keyword_stats = KeywordStatistics::for_rules(&self.rules);
        let mut labeled = Vec::with_capacity(total);
        let mut offset = 0;
        for (results, stats) in shards {
            keyword_stats.merge(&stats);
            for result in results {
                labeled.push(LabeledTransaction::new(&transactions[offset], result));
                offset += 1;
            }
        }

        let out = Categorization {
            labeled,
            keyword_stats,
        };
        info!(
            transactions = total,
            workers,
            categorized_pct = out.categorized_percentage(),
            "categorization finished"
        );
        Ok(out)
    }

    fn check_input(&self, transactions: &[Transaction]) -> Result<()> {
        if transactions.is_empty() {
            return Err(CategorizeError::config("no transactions to categorize"));
        }
        for field in &self.fields {
            if !transactions.iter().any(|t| t.has_field(field)) {
                return Err(CategorizeError::config(format!(
                    "field '{field}' does not exist on any transaction"
                )));
            }
        }
        Ok(())
    }

    fn run_shard(
        &self,
        index: usize,
        shard: &[Transaction],
        done: &AtomicUsize,
        total: usize,
    ) -> Result<(Vec<MatchResult>, KeywordStatistics)> {
        debug!(shard = index, transactions = shard.len(), "categorizing shard");
        let mut stats = KeywordStatistics::for_rules(&self.rules);
        let mut results = Vec::with_capacity(shard.len());

        for txn in shard {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                return Err(CategorizeError::Cancelled {
                    processed: done.load(Ordering::SeqCst),
                });
            }
            results.push(self.classify(txn, &mut stats));
            let n = done.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(observer) = &self.observer {
                observer.on_progress(n, total);
            }
        }

        Ok((results, stats))
    }

    /// Score one transaction, recording every keyword score in `stats`.
    pub fn classify(&self, txn: &Transaction, stats: &mut KeywordStatistics) -> MatchResult {
        let texts: Vec<String> = self
            .fields
            .iter()
            .filter_map(|f| txn.field(f))
            .map(|v| v.to_lowercase())
            .collect();

        let mut best: Option<(&str, &str)> = None;
        let mut highest = 0u8;

        for category in self.rules.categories() {
            for text in &texts {
                for keyword in &category.keywords {
                    let score = partial_ratio(text, keyword);
                    stats.observe(keyword, score);
                    if f64::from(score) >= self.threshold && score > highest {
                        highest = score;
                        best = Some((category.name.as_str(), keyword.as_str()));
                    }
                }
            }
        }

        match best {
            Some((category, keyword)) => MatchResult {
                category: category.to_string(),
                keyword: Some(keyword.to_string()),
                score: highest,
            },
            None => MatchResult::other(),
        }
    }
}

/// Categorize `transactions` with a single worker.
pub fn categorize<S: AsRef<str>>(
    transactions: &[Transaction],
    rules: &CategoryRules,
    fields: &[S],
    threshold: f64,
) -> Result<Categorization> {
    Categorizer::new(rules.clone(), fields, threshold)?.run(transactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const FIELDS: [&str; 2] = ["description", "notification"];

    fn txn(description: &str) -> Transaction {
        Transaction::new(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), -10.0)
            .with_field("description", description)
            .with_null_field("notification")
    }

    fn example_rules() -> CategoryRules {
        CategoryRules::from_pairs([
            ("Groceries", vec!["supermarket", "grocer"]),
            ("Transport", vec!["uber", "train"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_uber_eats_is_transport() {
        let out = categorize(&[txn("UBER EATS PAYMENT")], &example_rules(), &FIELDS, 80.0).unwrap();
        let l = &out.labeled[0];
        assert_eq!(l.category, "Transport");
        assert_eq!(l.keyword.as_deref(), Some("uber"));
        assert_eq!(l.certainty, 1.0);
    }

    #[test]
    fn test_salary_falls_back_to_other() {
        let out = categorize(&[txn("Monthly Salary")], &example_rules(), &FIELDS, 80.0).unwrap();
        let l = &out.labeled[0];
        assert_eq!(l.category, "Other");
        assert_eq!(l.keyword, None);
        assert_eq!(l.certainty, 0.0);
    }

    /// Exact tie: both keywords occur verbatim, first enumerated category wins.
    #[test]
    fn test_tie_goes_to_first_enumerated_category() {
        let groceries_first = CategoryRules::from_pairs([
            ("Groceries", vec!["apple"]),
            ("Electronics", vec!["apple store"]),
        ])
        .unwrap();
        let out = categorize(&[txn("Apple Store Purchase")], &groceries_first, &FIELDS, 80.0).unwrap();
        assert_eq!(out.labeled[0].category, "Groceries");
        assert_eq!(out.labeled[0].keyword.as_deref(), Some("apple"));

        let electronics_first = CategoryRules::from_pairs([
            ("Electronics", vec!["apple store"]),
            ("Groceries", vec!["apple"]),
        ])
        .unwrap();
        let out = categorize(&[txn("Apple Store Purchase")], &electronics_first, &FIELDS, 80.0).unwrap();
        assert_eq!(out.labeled[0].category, "Electronics");
    }

    /// A later category with a stronger match beats an earlier weaker one.
    #[test]
    fn test_best_match_beats_first_match() {
        let rules = CategoryRules::from_pairs([
            ("Groceries", vec!["apple bandits"]),
            ("Drinks", vec!["apple bandit"]),
        ])
        .unwrap();
        let out = categorize(&[txn("APPLE BANDIT CIDER")], &rules, &FIELDS, 80.0).unwrap();
        assert_eq!(out.labeled[0].category, "Drinks");
        assert_eq!(out.labeled[0].certainty, 1.0);
    }

    #[test]
    fn test_order_of_categories_does_not_matter() {
        let txns = vec![
            txn("UBER TRIP"),
            txn("Albert Heijn supermarket"),
            txn("NS train ticket"),
            txn("Green grocer"),
            txn("Rent"),
        ];
        let forward = example_rules();
        let reversed = CategoryRules::from_pairs([
            ("Transport", vec!["uber", "train"]),
            ("Groceries", vec!["supermarket", "grocer"]),
        ])
        .unwrap();

        let a = categorize(&txns, &forward, &FIELDS, 80.0).unwrap();
        let b = categorize(&txns, &reversed, &FIELDS, 80.0).unwrap();
        assert_eq!(a.labeled, b.labeled);
        assert_eq!(a.keyword_stats, b.keyword_stats);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let txns = vec![txn("UBER"), txn("supermarkt"), txn("nothing here")];
        let a = categorize(&txns, &example_rules(), &FIELDS, 70.0).unwrap();
        let b = categorize(&txns, &example_rules(), &FIELDS, 70.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_threshold_is_monotonic() {
        let txns = vec![
            txn("UBER EATS"),
            txn("supermrkt amsterdam"),
            txn("grocery outlet"),
            txn("trainee salary"),
            txn("Monthly Salary"),
        ];
        let thresholds = [0.0, 40.0, 60.0, 80.0, 90.0, 100.0];
        let runs: Vec<Categorization> = thresholds
            .iter()
            .map(|t| categorize(&txns, &example_rules(), &FIELDS, *t).unwrap())
            .collect();

        for pair in runs.windows(2) {
            for (low, high) in pair[0].labeled.iter().zip(&pair[1].labeled) {
                if !high.is_other() {
                    assert_eq!(low.category, high.category);
                    assert_eq!(low.keyword, high.keyword);
                }
                if low.is_other() {
                    assert!(high.is_other());
                }
            }
        }
    }

    #[test]
    fn test_all_null_fields_resolve_to_other() {
        let t = Transaction::new(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), 5.0)
            .with_null_field("description")
            .with_field("notification", "");
        let out = categorize(&[t, txn("uber")], &example_rules(), &FIELDS, 0.0).unwrap();
        assert!(out.labeled[0].is_other());
        assert_eq!(out.labeled[0].keyword, None);
        assert_eq!(out.labeled[0].certainty, 0.0);
        assert_eq!(out.labeled[1].category, "Transport");
    }

    #[test]
    fn test_second_field_is_searched() {
        let t = Transaction::new(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), -3.0)
            .with_field("description", "Payment terminal 0042")
            .with_field("notification", "NS Groep train Utrecht");
        let out = categorize(&[t], &example_rules(), &FIELDS, 90.0).unwrap();
        assert_eq!(out.labeled[0].category, "Transport");
        assert_eq!(out.labeled[0].keyword.as_deref(), Some("train"));
    }

    #[test]
    fn test_keyword_stats_cover_every_keyword() {
        let rules = CategoryRules::from_pairs([
            ("Groceries", vec!["supermarket", "zzz"]),
            ("Transport", vec!["uber"]),
        ])
        .unwrap();
        let out = categorize(&[txn("UBER EATS")], &rules, &FIELDS, 80.0).unwrap();
        assert_eq!(out.keyword_stats.len(), 3);
        assert_eq!(out.keyword_stats.best("zzz"), Some(0));
        assert_eq!(out.keyword_stats.best("uber"), Some(100));

        let below = out.keyword_stats.below(80.0);
        assert_eq!(below.first().map(|(k, _)| *k), Some("zzz"));
        assert!(below.iter().all(|(k, _)| *k != "uber"));
        assert!(below.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_no_categories_everything_is_other() {
        let out = categorize(&[txn("UBER")], &CategoryRules::new(), &FIELDS, 50.0).unwrap();
        assert!(out.labeled[0].is_other());
        assert!(out.keyword_stats.is_empty());
        assert_eq!(out.categorized_percentage(), 0.0);
    }

    #[test]
    fn test_configuration_errors() {
        let rules = example_rules();
        let empty: [&str; 0] = [];
        assert!(matches!(
            categorize(&[txn("x")], &rules, &empty, 80.0),
            Err(CategorizeError::Configuration(_))
        ));
        assert!(matches!(
            categorize(&[txn("x")], &rules, &["memo"], 80.0),
            Err(CategorizeError::Configuration(_))
        ));
        assert!(matches!(
            categorize(&[txn("x")], &rules, &FIELDS, 100.5),
            Err(CategorizeError::Configuration(_))
        ));
        assert!(matches!(
            categorize(&[], &rules, &FIELDS, 80.0),
            Err(CategorizeError::Configuration(_))
        ));
    }

    #[test]
    fn test_categorized_percentage_and_counts() {
        let txns = vec![txn("UBER"), txn("train"), txn("grocer"), txn("salary")];
        let out = categorize(&txns, &example_rules(), &FIELDS, 90.0).unwrap();
        assert_eq!(out.categorized_percentage(), 75.0);
        let counts = out.category_counts();
        assert_eq!(counts.get("Transport"), Some(&2));
        assert_eq!(counts.get("Other"), Some(&1));
    }

    #[test]
    fn test_parallel_matches_serial() {
        let words = ["uber", "supermarket", "train", "grocer", "rent", "salary", "uver", "tram"];
        let txns: Vec<Transaction> = (0..97)
            .map(|i| txn(&format!("{} #{i}", words[i % words.len()])))
            .collect();

        let serial = Categorizer::new(example_rules(), &FIELDS, 75.0).unwrap().run(&txns).unwrap();
        let parallel = Categorizer::new(example_rules(), &FIELDS, 75.0)
            .unwrap()
            .with_workers(4)
            .run(&txns)
            .unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancelToken::new();
        token.cancel();
        let err = Categorizer::new(example_rules(), &FIELDS, 80.0)
            .unwrap()
            .with_cancel_token(token)
            .run(&[txn("UBER")])
            .unwrap_err();
        assert_eq!(err, CategorizeError::Cancelled { processed: 0 });
    }

    #[test]
    fn test_observer_sees_every_transaction() {
        let calls = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));
        let (c, l) = (calls.clone(), last.clone());
        let txns: Vec<Transaction> = (0..10).map(|_| txn("uber")).collect();

        Categorizer::new(example_rules(), &FIELDS, 80.0)
            .unwrap()
            .with_workers(3)
            .with_observer(move |done: usize, total: usize| {
                assert_eq!(total, 10);
                c.fetch_add(1, Ordering::SeqCst);
                l.fetch_max(done, Ordering::SeqCst);
            })
            .run(&txns)
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(last.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_labeled_transaction_serializes() {
        let out = categorize(&[txn("UBER")], &example_rules(), &FIELDS, 80.0).unwrap();
        let json = serde_json::to_value(&out.labeled[0]).unwrap();
        assert_eq!(json["category"], "Transport");
        assert_eq!(json["keyword"], "uber");
        assert_eq!(json["certainty"], 1.0);
    }
}
