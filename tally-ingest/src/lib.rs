//! tally-ingest: bank export layouts and CSV/XLSX statement readers.

pub mod layout;
pub mod parsers;
pub mod statements;

pub use layout::{AmountParser, DecimalSeparator, ResolvedColumns, StatementLayout, parse_date};
pub use statements::{collect_files, read_statement, read_statements};
