//! `taxgrid-vat`: marketplace VAT classification and aggregation engine.
//!
//! Pure engine crate: receives raw rows one at a time, folds them into
//! per-category running totals, and lays out the final report.
//! No file IO; see `taxgrid-io` for the CSV reader and workbook writer.

pub mod aggregate;
pub mod allocate;
pub mod classify;
pub mod engine;
pub mod error;
pub mod model;
pub mod normalize;
pub mod periods;
pub mod rates;
pub mod report;
pub mod summary;
pub mod tables;

pub use engine::{run, validate_header, TaxEngine, TaxOutcome};
pub use error::TransformError;
pub use model::{CategoryTag, Header, NormalizedRow, RawRow};
pub use rates::RateTable;
pub use report::{build_report, Report};
pub use summary::RunSummary;
