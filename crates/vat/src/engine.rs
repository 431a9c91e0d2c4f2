use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::aggregate::CategoryAggregates;
use crate::allocate::allocate_uk_pool;
use crate::classify::{classify, is_return};
use crate::error::TransformError;
use crate::model::{Conversion, Header, RawRow};
use crate::normalize::normalize;
use crate::periods::{ActivityPeriodTracker, FilingPeriod};
use crate::rates::RateTable;
use crate::report::{build_report, Report};
use crate::summary::{category_counts, ParseWarnings, RunSummary};
use crate::tables::ACTIVITY_PERIOD;

const PROGRESS_EVERY: usize = 10_000;

/// Columns without which a file cannot be processed.
pub const REQUIRED_COLUMNS: [&str; 1] = [ACTIVITY_PERIOD];

/// Reject a header that lacks a required column.
pub fn validate_header(header: &Header) -> Result<(), TransformError> {
    match REQUIRED_COLUMNS.iter().find(|c| !header.contains(c)) {
        Some(column) => Err(TransformError::MissingColumn {
            column: column.to_string(),
        }),
        None => Ok(()),
    }
}

/// Result of a completed scan.
#[derive(Debug, Clone)]
pub struct TaxOutcome {
    /// Aggregates after UK pool allocation.
    pub aggregates: CategoryAggregates,
    pub report: Report,
    pub summary: RunSummary,
}

/// Single-pass fold of raw rows into category aggregates.
///
/// Rows are dropped after folding; memory grows with distinct keys only.
/// Allocation and layout happen in [`TaxEngine::finish`], after the last row.
pub struct TaxEngine<'a> {
    rates: &'a RateTable,
    aggregates: CategoryAggregates,
    periods: ActivityPeriodTracker,
    warnings: ParseWarnings,
    unconverted: BTreeMap<String, usize>,
    rows_read: usize,
    rows_aggregated: usize,
    returns_skipped: usize,
    rows_unclassified: usize,
}

impl<'a> TaxEngine<'a> {
    pub fn new(rates: &'a RateTable) -> Self {
        Self {
            rates,
            aggregates: CategoryAggregates::new(),
            periods: ActivityPeriodTracker::new(),
            warnings: ParseWarnings::default(),
            unconverted: BTreeMap::new(),
            rows_read: 0,
            rows_aggregated: 0,
            returns_skipped: 0,
            rows_unclassified: 0,
        }
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    /// Fold one row. Fails only when a running sum overflows.
    pub fn process(&mut self, raw: RawRow) -> Result<(), TransformError> {
        self.rows_read += 1;
        if self.rows_read % PROGRESS_EVERY == 0 {
            debug!(rows = self.rows_read, "progress");
        }

        self.periods.observe(raw.text(ACTIVITY_PERIOD));
        if is_return(&raw) {
            self.returns_skipped += 1;
            return Ok(());
        }

        let line = raw.line();
        let row = normalize(raw, self.rates);

        for failure in &row.parse_failures {
            if self.warnings.record(line, failure) {
                warn!(line, column = failure.column, text = %failure.text, "amount is not a usable number, using 0");
            }
        }
        if row.conversion == Conversion::MissingRate {
            let count = self
                .unconverted
                .entry(row.original_currency.clone())
                .or_insert(0);
            *count += 1;
            if *count == 1 {
                warn!(currency = %row.original_currency, line, "no exchange rate, amounts left unconverted");
            }
        }

        let tags = classify(&row);
        if tags.is_empty() {
            self.rows_unclassified += 1;
            return Ok(());
        }
        let mut folded = false;
        for tag in tags {
            folded |= self.aggregates.fold(tag, &row, self.rates)?;
        }
        if folded {
            self.rows_aggregated += 1;
        }
        Ok(())
    }

    /// Validate periods, apply the UK allocation, and lay out the report.
    pub fn finish(mut self) -> Result<TaxOutcome, TransformError> {
        if self.rows_read == 0 {
            return Err(TransformError::EmptyFile);
        }
        self.periods.validate()?;

        let uk_allocation = allocate_uk_pool(&mut self.aggregates);
        let report = build_report(&self.aggregates)?;

        let summary = RunSummary {
            rows_read: self.rows_read,
            rows_aggregated: self.rows_aggregated,
            returns_skipped: self.returns_skipped,
            rows_unclassified: self.rows_unclassified,
            filing_period: FilingPeriod::from_first(self.periods.periods()),
            periods: self.periods.periods().to_vec(),
            categories: category_counts(&self.aggregates),
            uk_pool: self.aggregates.uk_pool,
            uk_allocation,
            parse_warnings: self.warnings,
            unconverted_currencies: self.unconverted,
        };
        debug!(
            rows = summary.rows_read,
            aggregated = summary.rows_aggregated,
            returns = summary.returns_skipped,
            "scan complete"
        );

        Ok(TaxOutcome {
            aggregates: self.aggregates,
            report,
            summary,
        })
    }
}

/// Fold every row and finish. Stops at the first read error.
pub fn run<I>(rows: I, rates: &RateTable) -> Result<TaxOutcome, TransformError>
where
    I: IntoIterator<Item = Result<RawRow, TransformError>>,
{
    let mut engine = TaxEngine::new(rates);
    for row in rows {
        engine.process(row?)?;
    }
    engine.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategoryTag, Totals};
    use crate::report::{SHEET_INTERNATIONAL, SHEET_REGULAR};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    const COLUMNS: [&str; 14] = [
        "ACTIVITY_PERIOD",
        "TRANSACTION_TYPE",
        "TAX_REPORTING_SCHEME",
        "TAX_COLLECTION_RESPONSIBILITY",
        "SALE_DEPART_COUNTRY",
        "SALE_ARRIVAL_COUNTRY",
        "TAXABLE_JURISDICTION",
        "TRANSACTION_CURRENCY_CODE",
        "PRICE_OF_ITEMS_VAT_RATE_PERCENT",
        "PRICE_OF_ITEMS_AMT_VAT_EXCL",
        "PRICE_OF_ITEMS_VAT_AMT",
        "PRICE_OF_ITEMS_AMT_VAT_INCL",
        "TOTAL_ACTIVITY_VALUE_VAT_AMT",
        "DEPARTURE_COUNTRY",
    ];

    /// Rows share one header; unspecified columns are empty.
    struct Fixture {
        header: Arc<Header>,
        line: u64,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                header: Arc::new(Header::new(COLUMNS.iter().map(|c| c.to_string()).collect())),
                line: 1,
            }
        }

        fn row(&mut self, pairs: &[(&str, &str)]) -> Result<RawRow, TransformError> {
            self.line += 1;
            let fields = COLUMNS
                .iter()
                .map(|c| {
                    pairs
                        .iter()
                        .find(|(k, _)| k == c)
                        .map_or(String::new(), |(_, v)| v.to_string())
                })
                .collect();
            Ok(RawRow::new(self.header.clone(), fields, self.line))
        }
    }

    fn sale(period: &str, scheme: &str, resp: &str, from: &str, to: &str) -> Vec<(&'static str, String)> {
        vec![
            ("ACTIVITY_PERIOD", period.to_string()),
            ("TRANSACTION_TYPE", "SALE".to_string()),
            ("TAX_REPORTING_SCHEME", scheme.to_string()),
            ("TAX_COLLECTION_RESPONSIBILITY", resp.to_string()),
            ("SALE_DEPART_COUNTRY", from.to_string()),
            ("SALE_ARRIVAL_COUNTRY", to.to_string()),
        ]
    }

    fn pairs<'a>(owned: &'a [(&'static str, String)]) -> Vec<(&'static str, &'a str)> {
        owned.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }

    #[test]
    fn empty_input_fails() {
        let err = run(Vec::new(), &RateTable::legacy()).unwrap_err();
        assert!(matches!(err, TransformError::EmptyFile));
    }

    #[test]
    fn missing_activity_period_column() {
        let header = Header::new(vec!["TRANSACTION_TYPE".into()]);
        match validate_header(&header) {
            Err(TransformError::MissingColumn { column }) => assert_eq!(column, "ACTIVITY_PERIOD"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
        assert!(validate_header(&Header::new(vec!["ACTIVITY_PERIOD".into()])).is_ok());
    }

    #[test]
    fn spanish_domestic_exempt_scenario() {
        let mut f = Fixture::new();
        let mut row = sale("2024-JAN", "REGULAR", "SELLER", "ES", "ES");
        row.extend([
            ("TAXABLE_JURISDICTION", "SPAIN".to_string()),
            ("TRANSACTION_CURRENCY_CODE", "EUR".to_string()),
            ("PRICE_OF_ITEMS_VAT_RATE_PERCENT", "0".to_string()),
            ("PRICE_OF_ITEMS_AMT_VAT_EXCL", "40".to_string()),
            ("PRICE_OF_ITEMS_AMT_VAT_INCL", "40".to_string()),
            ("TOTAL_ACTIVITY_VALUE_VAT_AMT", "0".to_string()),
            ("DEPARTURE_COUNTRY", "ES".to_string()),
        ]);
        let out = run(vec![f.row(&pairs(&row))], &RateTable::legacy()).unwrap();

        assert_eq!(out.aggregates.domestic["SPAIN"].no_vat, dec!(40));
        assert_eq!(out.aggregates.exempt.len(), 1);
        assert_eq!(out.summary.rows_aggregated, 1);
        assert_eq!(out.summary.categories["domestic"], 1);
        assert_eq!(out.summary.categories["domestic_exempt"], 1);
        assert!(out.report.sheet(SHEET_REGULAR).is_some());
    }

    #[test]
    fn uk_pool_scenario() {
        let mut f = Fixture::new();
        let mut rows = Vec::new();
        for _ in 0..10 {
            let mut r = sale("2024-JAN", "UK_VOEC-DOMESTIC", "MARKETPLACE", "GB", "GB");
            r.extend([
                ("TRANSACTION_CURRENCY_CODE", "EUR".to_string()),
                ("PRICE_OF_ITEMS_AMT_VAT_EXCL", "100".to_string()),
            ]);
            rows.push(f.row(&pairs(&r)));
        }
        for (jurisdiction, currency) in [("CZECH REPUBLIC", "EUR"), ("POLAND", "PLN")] {
            let mut r = sale("2024-JAN", "REGULAR", "SELLER", "PL", "PL");
            r.extend([
                ("TAXABLE_JURISDICTION", jurisdiction.to_string()),
                ("TRANSACTION_CURRENCY_CODE", currency.to_string()),
                ("PRICE_OF_ITEMS_VAT_RATE_PERCENT", "0".to_string()),
                ("PRICE_OF_ITEMS_AMT_VAT_EXCL", "9".to_string()),
                ("TOTAL_ACTIVITY_VALUE_VAT_AMT", "1".to_string()),
            ]);
            rows.push(f.row(&pairs(&r)));
        }
        let out = run(rows, &RateTable::legacy()).unwrap();

        assert_eq!(out.summary.uk_pool, Some(dec!(1000)));
        assert_eq!(out.summary.uk_allocation, Some(dec!(47)));
        assert_eq!(out.aggregates.domestic["CZECH REPUBLIC"].no_vat, dec!(47.0));
        assert_eq!(out.aggregates.domestic["POLAND"].no_vat, dec!(47.0));
        assert_eq!(out.aggregates.marketplace.len(), 1);
    }

    #[test]
    fn returns_counted_for_periods_but_never_aggregated() {
        let mut f = Fixture::new();
        let mut ret = sale("2024-FEB", "UNION-OSS", "SELLER", "ES", "DE");
        ret[1].1 = "RETURN".to_string();
        ret.push(("PRICE_OF_ITEMS_AMT_VAT_EXCL", "-10".to_string()));
        let oss = sale("2024-JAN", "UNION-OSS", "SELLER", "ES", "DE");

        let out = run(
            vec![f.row(&pairs(&oss)), f.row(&pairs(&ret))],
            &RateTable::legacy(),
        )
        .unwrap();
        assert_eq!(out.summary.returns_skipped, 1);
        assert_eq!(out.summary.periods, vec!["2024-JAN", "2024-FEB"]);
        assert_eq!(out.aggregates.oss.values().next(), Some(&Totals::default()));
        assert_eq!(out.summary.filing_period.label(), "M 1");
    }

    #[test]
    fn four_periods_fail() {
        let mut f = Fixture::new();
        let rows = ["2024-JAN", "2024-FEB", "2024-MAR", "2024-APR"]
            .iter()
            .map(|p| f.row(&pairs(&sale(p, "UNION-OSS", "SELLER", "ES", "DE"))))
            .collect::<Vec<_>>();
        let err = run(rows, &RateTable::legacy()).unwrap_err();
        assert!(matches!(err, TransformError::TooManyPeriods { ref periods, .. } if periods.len() == 4));
    }

    #[test]
    fn read_errors_propagate() {
        let rows = vec![Err(TransformError::csv(3, "bad quote"))];
        assert!(matches!(
            run(rows, &RateTable::legacy()),
            Err(TransformError::Csv { line: 3, .. })
        ));
    }

    #[test]
    fn warnings_and_unconverted_currencies_recorded() {
        let mut f = Fixture::new();
        let mut r = sale("2024Q1", "UNION-OSS", "SELLER", "ES", "FR");
        r.extend([
            ("TRANSACTION_CURRENCY_CODE", "USD".to_string()),
            ("PRICE_OF_ITEMS_AMT_VAT_EXCL", "n/a".to_string()),
        ]);
        let out = run(vec![f.row(&pairs(&r)), f.row(&pairs(&r))], &RateTable::legacy()).unwrap();
        assert_eq!(out.summary.unconverted_currencies["USD"], 2);
        assert_eq!(out.summary.parse_warnings.total, 2);
        assert_eq!(out.summary.parse_warnings.samples[0].line, 2);
        assert_eq!(out.summary.filing_period.label(), "T 1");
    }

    #[test]
    fn overflowing_totals_abort_the_run() {
        let mut f = Fixture::new();
        let mut r = sale("2024-JAN", "UNION-OSS", "SELLER", "ES", "DE");
        r.extend([
            ("TRANSACTION_CURRENCY_CODE", "EUR".to_string()),
            ("PRICE_OF_ITEMS_AMT_VAT_EXCL", "70000000000000000000000000000".to_string()),
        ]);
        let err = run(vec![f.row(&pairs(&r)), f.row(&pairs(&r))], &RateTable::legacy()).unwrap_err();
        assert!(matches!(err, TransformError::Overflow { ref context } if context == "oss"));
    }

    #[test]
    fn aggregates_match_row_sums() {
        let mut f = Fixture::new();
        let mut rows = Vec::new();
        let mut expected = Decimal::ZERO;
        for (i, to) in ["DE", "FR", "DE", "IT"].iter().enumerate() {
            let base = Decimal::from(10 * (i as i64 + 1));
            expected += base;
            let mut r = sale("2024-JAN", "UNION-OSS", "SELLER", "ES", to);
            r.push(("PRICE_OF_ITEMS_AMT_VAT_EXCL", base.to_string()));
            rows.push(f.row(&pairs(&r)));
        }
        let out = run(rows, &RateTable::legacy()).unwrap();
        let summed: Decimal = out.aggregates.oss.values().map(|t| t.base).sum();
        assert_eq!(summed, expected);
        assert_eq!(out.aggregates.len(CategoryTag::Oss), 3);
        let intl = out.report.sheet(SHEET_INTERNATIONAL).unwrap();
        assert_eq!(intl.blocks.len(), 2);
    }
}
