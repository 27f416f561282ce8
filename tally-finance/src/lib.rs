//! tally-finance: cost/income indicators, period overviews and report output.

pub mod indicator;
pub mod period;
pub mod report;

pub use indicator::{CostOrIncome, apply_cost_or_income};
pub use period::{Period, PeriodOverview, PeriodRow, TOTALS, period_overview};
pub use report::{
    CategorizationSummary, render_overview, write_keyword_stats_csv, write_labeled_csv,
    write_overview_csv,
};
