//! File-format readers. Each one turns an export into transactions using a
//! [`StatementLayout`](crate::layout::StatementLayout).

pub mod csv_export;
#[cfg(feature = "xlsx")]
pub mod xlsx_export;

pub use csv_export::read_csv_statement;
#[cfg(feature = "xlsx")]
pub use xlsx_export::read_xlsx_statement;
