// End-to-end runs: CSV in, workbook, Form 349 or Form 369 out

use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use taxgrid_vat::periods::{ActivityPeriodTracker, FilingPeriod};
use taxgrid_vat::tables::{ACTIVITY_PERIOD, MAX_ACTIVITY_PERIODS};
use taxgrid_vat::{run, validate_header, RateTable, RunSummary, TaxOutcome, TransformError};
use tracing::info;

use crate::csv::RowSource;
use crate::form349::write_form349;
use crate::form369::{write_form369, Declarant, Form369Regime};
use crate::write_atomic;
use crate::xlsx::write_report;

#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// Field delimiter; sniffed from the file when `None`.
    pub delimiter: Option<u8>,
}

/// Read a rate table from a TOML file.
pub fn load_rates(path: &Path) -> Result<RateTable, TransformError> {
    let text = std::fs::read_to_string(path)?;
    RateTable::from_toml(&text)
}

pub fn open_source(input: &Path, options: &TransformOptions) -> Result<RowSource, TransformError> {
    match options.delimiter {
        Some(d) => RowSource::with_delimiter(input, d),
        None => RowSource::open(input),
    }
}

/// Stream `input` through the engine. The header is checked before any row.
pub fn aggregate_file(
    input: &Path,
    rates: &RateTable,
    options: &TransformOptions,
) -> Result<TaxOutcome, TransformError> {
    let source = open_source(input, options)?;
    let rows = source.rows()?;
    validate_header(rows.header())?;
    run(rows, rates)
}

/// Transform `input` into the two-sheet workbook at `output`.
pub fn transform(input: &Path, output: &Path, rates: &RateTable) -> Result<RunSummary, TransformError> {
    transform_with(input, output, rates, &TransformOptions::default())
}

pub fn transform_with(
    input: &Path,
    output: &Path,
    rates: &RateTable,
    options: &TransformOptions,
) -> Result<RunSummary, TransformError> {
    let started = Instant::now();
    info!(input = %input.display(), output = %output.display(), "transform started");

    let outcome = aggregate_file(input, rates, options)?;
    write_report(&outcome.report, output)?;

    info!(
        rows = outcome.summary.rows_read,
        aggregated = outcome.summary.rows_aggregated,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "transform finished"
    );
    Ok(outcome.summary)
}

/// Activity periods found in a file, without aggregating it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodAnalysis {
    pub periods: Vec<String>,
    /// Distinct periods; a lower bound when `truncated`.
    pub count: usize,
    pub truncated: bool,
    /// Within the per-file limit.
    pub acceptable: bool,
    pub max_periods: usize,
    pub filing_period: FilingPeriod,
    pub rows: usize,
}

pub fn analyze_periods(input: &Path, options: &TransformOptions) -> Result<PeriodAnalysis, TransformError> {
    let source = open_source(input, options)?;
    let rows = source.rows()?;
    validate_header(rows.header())?;

    let mut tracker = ActivityPeriodTracker::new();
    let mut count = 0usize;
    for row in rows {
        let row = row?;
        tracker.observe(row.text(ACTIVITY_PERIOD));
        count += 1;
    }
    if count == 0 {
        return Err(TransformError::EmptyFile);
    }

    Ok(PeriodAnalysis {
        periods: tracker.periods().to_vec(),
        count: tracker.len(),
        truncated: tracker.is_truncated(),
        acceptable: tracker.is_acceptable(),
        max_periods: MAX_ACTIVITY_PERIODS,
        filing_period: FilingPeriod::from_first(tracker.periods()),
        rows: count,
    })
}

/// Outcome of a Form 349 export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Form349Summary {
    pub records: usize,
    pub filing_period: FilingPeriod,
}

/// Aggregate `input` and write its intra-community supplies as a Form 349 file.
/// Validation problems refuse the write and come back as one `Report` error.
pub fn export_form349(
    input: &Path,
    output: &Path,
    rates: &RateTable,
    options: &TransformOptions,
) -> Result<Form349Summary, TransformError> {
    let outcome = aggregate_file(input, rates, options)?;
    let records = write_form349(&outcome.aggregates.intra_community, output)?;
    info!(records, output = %output.display(), "form 349 written");
    Ok(Form349Summary {
        records,
        filing_period: outcome.summary.filing_period,
    })
}

/// What a Form 369 return declares and who files it.
#[derive(Debug, Clone)]
pub struct Form369Options {
    pub regime: Form369Regime,
    pub declarant: Declarant,
    /// Taken from the first activity period when `None`.
    pub period: Option<FilingPeriod>,
}

/// Outcome of a Form 369 export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Form369Summary {
    pub entries: usize,
    pub regime: Form369Regime,
    pub filing_period: FilingPeriod,
}

/// Aggregate `input` and write its OSS (union scheme) or IOSS (import
/// scheme) totals as a Form 369 return. A file with neither writes an
/// empty return file.
pub fn export_form369(
    input: &Path,
    output: &Path,
    rates: &RateTable,
    options: &TransformOptions,
    form: &Form369Options,
) -> Result<Form369Summary, TransformError> {
    let outcome = aggregate_file(input, rates, options)?;
    let aggs = &outcome.aggregates;
    let filing_period = form.period.unwrap_or(outcome.summary.filing_period);

    let entries = if aggs.oss.is_empty() && aggs.ioss.is_empty() {
        write_atomic(output, &[])?;
        0
    } else {
        let data = match form.regime {
            Form369Regime::Union => &aggs.oss,
            Form369Regime::Import => &aggs.ioss,
        };
        write_form369(form.regime, &form.declarant, &filing_period, data, output)?
    };
    info!(entries, regime = form.regime.code(), output = %output.display(), "form 369 written");
    Ok(Form369Summary {
        entries,
        regime: form.regime,
        filing_period,
    })
}
