use thiserror::Error;

/// Fatal failures of a transform run. Any of these aborts the run and no
/// report is written.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Input could not be opened or read, or the report could not be saved.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed CSV record.
    #[error("CSV error at line {line}: {message}")]
    Csv { line: u64, message: String },
    /// Header present but no data rows (or no header at all).
    #[error("input file contains no data rows")]
    EmptyFile,
    /// A required column is missing from the header.
    #[error("missing required column '{column}'")]
    MissingColumn { column: String },
    /// More than the allowed number of distinct activity periods.
    #[error("transactions span more than {max} distinct activity periods: {}", periods.join(", "))]
    TooManyPeriods { max: usize, periods: Vec<String> },
    /// Rate table could not be parsed or failed validation.
    #[error("rate table error: {0}")]
    RateConfig(String),
    /// Workbook rendering failed.
    #[error("report error: {0}")]
    Report(String),
    /// A running sum no longer fits in a decimal.
    #[error("amount overflow while summing {context}")]
    Overflow { context: String },
}

impl TransformError {
    pub fn csv(line: u64, message: impl Into<String>) -> Self {
        Self::Csv { line, message: message.into() }
    }

    pub fn overflow(context: impl Into<String>) -> Self {
        Self::Overflow { context: context.into() }
    }
}
