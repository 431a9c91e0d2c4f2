// Command handlers

use std::path::{Path, PathBuf};

use serde::Serialize;
use taxgrid_io::{
    analyze_periods, export_form349, export_form369, load_rates, transform_with, Declarant,
    Form369Options, Form369Regime, PeriodAnalysis, TransformOptions,
};
use taxgrid_vat::periods::FilingPeriod;
use taxgrid_vat::{RateTable, RunSummary};

use crate::exit_codes::EXIT_TOO_MANY_PERIODS;
use crate::CliError;

/// `"tab"`, `"\t"` or a single ASCII character.
pub fn parse_delimiter(arg: Option<&str>) -> Result<Option<u8>, CliError> {
    let Some(arg) = arg else {
        return Ok(None);
    };
    match arg {
        "tab" | "\\t" | "\t" => Ok(Some(b'\t')),
        s if s.len() == 1 && s.is_ascii() => Ok(Some(s.as_bytes()[0])),
        s => Err(CliError::args(format!("invalid delimiter '{}'", s))
            .with_hint("use a single ASCII character such as ';' or ',' or the word 'tab'")),
    }
}

fn rate_table(path: Option<&Path>) -> Result<RateTable, CliError> {
    match path {
        Some(p) => load_rates(p).map_err(CliError::rates),
        None => Ok(RateTable::legacy()),
    }
}

fn options(delimiter: Option<String>) -> Result<TransformOptions, CliError> {
    Ok(TransformOptions {
        delimiter: parse_delimiter(delimiter.as_deref())?,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::general(format!("failed to serialize output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

pub fn cmd_transform(
    input: PathBuf,
    output: PathBuf,
    rates: Option<PathBuf>,
    delimiter: Option<String>,
    json: bool,
) -> Result<(), CliError> {
    let rates = rate_table(rates.as_deref())?;
    let options = options(delimiter)?;
    let summary = transform_with(&input, &output, &rates, &options)?;

    if json {
        return print_json(&summary);
    }
    println!("wrote {}", output.display());
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("  rows read:        {}", summary.rows_read);
    println!("  rows aggregated:  {}", summary.rows_aggregated);
    println!("  returns skipped:  {}", summary.returns_skipped);
    if summary.rows_unclassified > 0 {
        println!("  unclassified:     {}", summary.rows_unclassified);
    }
    println!(
        "  periods:          {} ({} {})",
        summary.periods.join(", "),
        summary.filing_period.year,
        summary.filing_period.label()
    );
    for (category, count) in summary.categories.iter().filter(|(_, c)| **c > 0) {
        println!("  {:<18}{}", format!("{}:", category), count);
    }
    if let Some(allocation) = summary.uk_allocation {
        println!("  uk allocation:    {}", allocation);
    }
    if !summary.parse_warnings.is_empty() {
        println!("  parse warnings:   {}", summary.parse_warnings.total);
    }
    for (currency, rows) in &summary.unconverted_currencies {
        println!("  no rate for {}:  {} rows left unconverted", currency, rows);
    }
}

pub fn cmd_periods(input: PathBuf, delimiter: Option<String>, json: bool) -> Result<(), CliError> {
    let options = options(delimiter)?;
    let analysis = analyze_periods(&input, &options)?;

    if json {
        print_json(&analysis)?;
    } else {
        print_periods(&analysis);
    }

    if analysis.acceptable {
        Ok(())
    } else {
        Err(CliError {
            code: EXIT_TOO_MANY_PERIODS,
            message: format!(
                "{} activity periods found, at most {} allowed per file",
                analysis.count, analysis.max_periods
            ),
            hint: None,
        })
    }
}

fn print_periods(analysis: &PeriodAnalysis) {
    for period in &analysis.periods {
        println!("{}", period);
    }
    let more = if analysis.truncated { "+" } else { "" };
    println!(
        "{}{} period(s) in {} rows, filing period {} {}",
        analysis.count,
        more,
        analysis.rows,
        analysis.filing_period.year,
        analysis.filing_period.label()
    );
}

pub fn cmd_form349(
    input: PathBuf,
    output: PathBuf,
    rates: Option<PathBuf>,
    delimiter: Option<String>,
) -> Result<(), CliError> {
    let rates = rate_table(rates.as_deref())?;
    let options = options(delimiter)?;
    let summary = export_form349(&input, &output, &rates, &options)?;
    println!(
        "wrote {} ({} record(s), {} {})",
        output.display(),
        summary.records,
        summary.filing_period.year,
        summary.filing_period.label()
    );
    Ok(())
}

/// `--period` as `2024Q1` or `2024-JAN`.
fn parse_period(arg: Option<&str>) -> Result<Option<FilingPeriod>, CliError> {
    let Some(arg) = arg else {
        return Ok(None);
    };
    match FilingPeriod::try_parse(arg) {
        Some(period) => Ok(Some(period)),
        None => Err(CliError::args(format!("invalid period '{}'", arg))
            .with_hint("use a quarter like 2024Q1 or a month like 2024-JAN")),
    }
}

pub fn cmd_form369(
    input: PathBuf,
    output: PathBuf,
    rates: Option<PathBuf>,
    delimiter: Option<String>,
    regime: Form369Regime,
    declarant: Declarant,
    period: Option<String>,
) -> Result<(), CliError> {
    let form = Form369Options {
        regime,
        declarant,
        period: parse_period(period.as_deref())?,
    };
    let rates = rate_table(rates.as_deref())?;
    let options = options(delimiter)?;
    let summary = export_form369(&input, &output, &rates, &options, &form)?;
    println!(
        "wrote {} ({} entries, {}, {} {})",
        output.display(),
        summary.entries,
        regime.code(),
        summary.filing_period.year,
        summary.filing_period.label()
    );
    Ok(())
}

pub fn cmd_rates(rates: Option<PathBuf>) -> Result<(), CliError> {
    let table = rate_table(rates.as_deref())?;
    print!("{}", table.to_toml());
    Ok(())
}
