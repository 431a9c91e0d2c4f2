//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `tgrid` exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success                                              |
//! | 1    | General error (unspecified, report rendering, amount overflow) |
//! | 2    | Usage error (bad arguments)                          |
//! | 3    | Input/output error (unreadable input, unwritable output, malformed CSV) |
//! | 4    | Input has no header or no data rows                  |
//! | 5    | More than three activity periods in one file         |
//! | 6    | Required column missing from the header              |
//! | 7    | Rate table could not be loaded or is invalid         |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Map it in [`transform_exit_code`] if it comes from the engine

use taxgrid_vat::TransformError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Input could not be read or output could not be written.
pub const EXIT_IO: u8 = 3;

/// Input has no header, or a header and no data rows.
pub const EXIT_EMPTY: u8 = 4;

/// The file spans more activity periods than one filing allows.
pub const EXIT_TOO_MANY_PERIODS: u8 = 5;

/// A required column (e.g. `ACTIVITY_PERIOD`) is absent.
pub const EXIT_MISSING_COLUMN: u8 = 6;

/// Rate table TOML unreadable or invalid.
pub const EXIT_RATE_CONFIG: u8 = 7;

/// Map an engine error onto its exit code.
pub fn transform_exit_code(err: &TransformError) -> u8 {
    match err {
        TransformError::Io(_) | TransformError::Csv { .. } => EXIT_IO,
        TransformError::EmptyFile => EXIT_EMPTY,
        TransformError::TooManyPeriods { .. } => EXIT_TOO_MANY_PERIODS,
        TransformError::MissingColumn { .. } => EXIT_MISSING_COLUMN,
        TransformError::RateConfig(_) => EXIT_RATE_CONFIG,
        TransformError::Report(_) | TransformError::Overflow { .. } => EXIT_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_IO,
            EXIT_EMPTY,
            EXIT_TOO_MANY_PERIODS,
            EXIT_MISSING_COLUMN,
            EXIT_RATE_CONFIG,
        ];
        let mut sorted = codes.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }

    #[test]
    fn engine_errors_map() {
        assert_eq!(transform_exit_code(&TransformError::EmptyFile), EXIT_EMPTY);
        assert_eq!(
            transform_exit_code(&TransformError::TooManyPeriods { max: 3, periods: vec![] }),
            EXIT_TOO_MANY_PERIODS
        );
        assert_eq!(
            transform_exit_code(&TransformError::MissingColumn { column: "ACTIVITY_PERIOD".into() }),
            EXIT_MISSING_COLUMN
        );
        assert_eq!(transform_exit_code(&TransformError::csv(4, "bad")), EXIT_IO);
        assert_eq!(transform_exit_code(&TransformError::RateConfig("x".into())), EXIT_RATE_CONFIG);
        assert_eq!(transform_exit_code(&TransformError::overflow("oss")), EXIT_ERROR);
    }
}
