use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::aggregate::CategoryAggregates;
use crate::model::{CategoryTag, ParseFailure};
use crate::periods::FilingPeriod;

/// Samples kept in [`ParseWarnings`]; counts keep going past this.
pub const MAX_WARNING_SAMPLES: usize = 20;

/// One unparseable amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    pub line: u64,
    pub column: String,
    pub text: String,
}

/// Bounded record of amounts that defaulted to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseWarnings {
    pub total: usize,
    pub by_column: BTreeMap<String, usize>,
    pub samples: Vec<ParseWarning>,
}

impl ParseWarnings {
    /// Returns true the first time `failure.column` is seen.
    pub fn record(&mut self, line: u64, failure: &ParseFailure) -> bool {
        self.total += 1;
        let count = self.by_column.entry(failure.column.to_string()).or_insert(0);
        *count += 1;
        if self.samples.len() < MAX_WARNING_SAMPLES {
            self.samples.push(ParseWarning {
                line,
                column: failure.column.to_string(),
                text: failure.text.clone(),
            });
        }
        *count == 1
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// What a transform run saw and produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Data rows read, RETURN rows included.
    pub rows_read: usize,
    /// Rows folded into at least one category.
    pub rows_aggregated: usize,
    pub returns_skipped: usize,
    /// Non-RETURN rows that matched no category.
    pub rows_unclassified: usize,
    pub periods: Vec<String>,
    pub filing_period: FilingPeriod,
    /// Distinct aggregate keys per category.
    pub categories: BTreeMap<String, usize>,
    pub uk_pool: Option<Decimal>,
    pub uk_allocation: Option<Decimal>,
    pub parse_warnings: ParseWarnings,
    /// Currencies without a rate, with the number of rows left unconverted.
    pub unconverted_currencies: BTreeMap<String, usize>,
}

/// Aggregate key counts for every category tag.
pub fn category_counts(aggs: &CategoryAggregates) -> BTreeMap<String, usize> {
    CategoryTag::ALL
        .iter()
        .map(|tag| (tag.to_string(), aggs.len(*tag)))
        .collect()
}
