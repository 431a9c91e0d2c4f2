//! Form 369 (OSS / IOSS return) export.
//!
//! A tagged fixed-width text: a `<T369…>` header carrying the declarant NIF,
//! one run of page sections for the chosen scheme, and a closing tag. The
//! first page section lists up to 28 destination country / VAT rate entries;
//! a second page takes the overflow and is flagged complementary. Encoded as
//! Windows-1252 like the other filing files.

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use taxgrid_vat::model::{RateKey, Totals};
use taxgrid_vat::periods::FilingPeriod;
use taxgrid_vat::tables::is_eu;
use taxgrid_vat::TransformError;

use crate::write_atomic;

/// Entries that fit on one page section.
pub const ENTRIES_PER_PAGE: usize = 28;
/// Pages a return may use: the main page plus one complementary page.
const MAX_PAGES: usize = 2;

const SECTION_WIDTH: usize = 2100;
const HEADER_NIF_COLUMN: usize = 84;
const HEADER_SECTION_COLUMN: usize = 204;
const FLAGS_COLUMN: usize = 41;
const NIF_WIDTH: usize = 9;
const IOSS_WIDTH: usize = 12;
const NAME_WIDTH: usize = 80;
const PERIOD_GAP: usize = 15;
const RATE_FIELD_WIDTH: usize = 20;
const BASE_WIDTH: usize = 10;
const AMOUNT_GAP: usize = 13;
const VAT_WIDTH: usize = 8;
const MAX_RATE: u32 = 9999;

/// Rates (hundredths of a percent) filed as standard; everything else is reduced.
const STANDARD_RATES: [u32; 7] = [1900, 2000, 2100, 2200, 2300, 2400, 2500];

/// Which special scheme the return declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Form369Regime {
    /// Union scheme, filled from the OSS aggregate.
    Union,
    /// Import scheme, filled from the IOSS aggregate.
    Import,
}

impl Form369Regime {
    pub fn code(self) -> &'static str {
        match self {
            Form369Regime::Union => "MOSS",
            Form369Regime::Import => "IMPO",
        }
    }

    /// Page section tags in file order; the first holds the entries.
    fn sections(self) -> &'static [&'static str] {
        match self {
            Form369Regime::Union => &["T36904", "T36905", "T36906", "T36907", "T36908", "T36909"],
            Form369Regime::Import => &["T36910", "T36911", "T36912"],
        }
    }
}

/// Who files the return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declarant {
    pub nif: String,
    pub name: String,
    /// Required for the import scheme.
    pub ioss_number: Option<String>,
}

/// One destination country at one VAT rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form369Entry {
    pub country: String,
    /// Hundredths of a percent: 19% is 1900.
    pub rate: u32,
    pub base: Decimal,
    pub vat: Decimal,
}

impl Form369Entry {
    pub fn is_standard_rate(&self) -> bool {
        STANDARD_RATES.contains(&self.rate)
    }
}

/// Split a "DE - 19.00%" destination label into country and rate.
///
/// IOSS labels carry the raw fraction ("AT - 0.2%" for 20%), so rates below
/// one are read as fractions.
pub fn parse_destination(label: &str) -> Option<(&str, u32)> {
    let (country, rate) = label.split_once(" - ")?;
    let country = country.trim();
    if country.len() != 2 || !country.bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }
    let mut rate: Decimal = rate.trim().strip_suffix('%')?.trim().parse().ok()?;
    if rate < Decimal::ONE {
        rate *= Decimal::ONE_HUNDRED;
    }
    let hundredths = (rate * Decimal::ONE_HUNDRED).round().to_u32()?;
    Some((country, hundredths))
}

/// Merge aggregate keys into entries per destination and rate, across
/// origins. Labels that do not parse are left out; validation reports them.
pub fn form369_entries(data: &BTreeMap<RateKey, Totals>) -> Result<Vec<Form369Entry>, TransformError> {
    let mut merged: BTreeMap<(String, u32), Totals> = BTreeMap::new();
    for (key, totals) in data {
        let Some((country, rate)) = parse_destination(&key.destination) else {
            continue;
        };
        let entry = merged.entry((country.to_string(), rate)).or_default();
        *entry = entry
            .checked_add(totals)
            .ok_or_else(|| TransformError::overflow(format!("form 369 entry {country}")))?;
    }
    Ok(merged
        .into_iter()
        .map(|((country, rate), t)| Form369Entry {
            country,
            rate,
            base: t.base,
            vat: t.vat,
        })
        .collect())
}

/// Problems that would make the return invalid. Empty when it is fileable.
pub fn validate_form369(
    regime: Form369Regime,
    declarant: &Declarant,
    data: &BTreeMap<RateKey, Totals>,
) -> Vec<String> {
    let mut issues = Vec::new();

    let nif = declarant.nif.trim();
    if nif.is_empty() {
        issues.push("Empty declarant NIF".to_string());
    } else if nif.chars().count() > NIF_WIDTH {
        issues.push(format!("Declarant NIF longer than {NIF_WIDTH} characters: {nif}"));
    }
    if declarant.name.trim().is_empty() {
        issues.push("Empty declarant name".to_string());
    } else if encoding_rs::WINDOWS_1252.encode(&declarant.name).2 {
        issues.push(format!("Declarant name is not Windows-1252 text: {}", declarant.name));
    }
    if regime == Form369Regime::Import
        && declarant.ioss_number.as_deref().map_or(true, |n| n.trim().is_empty())
    {
        issues.push("IOSS number required for the import scheme".to_string());
    }

    for (key, totals) in data {
        let label = format!("{} / {}", key.origin, key.destination);
        match parse_destination(&key.destination) {
            None => issues.push(format!("Could not parse destination for key: {label}")),
            Some((country, _)) if !is_eu(country) => {
                issues.push(format!("Invalid country code {country} for key: {label}"))
            }
            Some((_, rate)) if rate > MAX_RATE => issues.push(format!("VAT rate out of range for key: {label}")),
            Some(_) => {}
        }
        if totals.base < Decimal::ZERO {
            issues.push(format!("Negative base amount for key: {label}"));
        }
        if totals.vat < Decimal::ZERO {
            issues.push(format!("Negative VAT amount for key: {label}"));
        }
    }

    match form369_entries(data) {
        Ok(entries) => {
            if entries.len() > ENTRIES_PER_PAGE * MAX_PAGES {
                issues.push(format!(
                    "{} entries do not fit on {MAX_PAGES} pages of {ENTRIES_PER_PAGE}",
                    entries.len()
                ));
            }
            for entry in &entries {
                if cents(entry.base).map_or(true, |c| c.len() > BASE_WIDTH) {
                    issues.push(format!("Base amount too large for {} at {}", entry.country, entry.rate));
                }
                if cents(entry.vat).map_or(true, |c| c.len() > VAT_WIDTH) {
                    issues.push(format!("VAT amount too large for {} at {}", entry.country, entry.rate));
                }
            }
        }
        Err(e) => issues.push(e.to_string()),
    }
    issues
}

/// Encode the return for `period`.
pub fn render_form369(
    regime: Form369Regime,
    declarant: &Declarant,
    period: &FilingPeriod,
    data: &BTreeMap<RateKey, Totals>,
) -> Result<Vec<u8>, TransformError> {
    render_entries(regime, declarant, period, &form369_entries(data)?)
}

/// Validate, render and save. Refuses to write when validation fails.
/// Returns the number of entries filed.
pub fn write_form369(
    regime: Form369Regime,
    declarant: &Declarant,
    period: &FilingPeriod,
    data: &BTreeMap<RateKey, Totals>,
    path: &Path,
) -> Result<usize, TransformError> {
    let issues = validate_form369(regime, declarant, data);
    if !issues.is_empty() {
        return Err(TransformError::Report(issues.join("; ")));
    }
    let entries = form369_entries(data)?;
    write_atomic(path, &render_entries(regime, declarant, period, &entries)?)?;
    Ok(entries.len())
}

fn render_entries(
    regime: Form369Regime,
    declarant: &Declarant,
    period: &FilingPeriod,
    entries: &[Form369Entry],
) -> Result<Vec<u8>, TransformError> {
    let complementary = entries.len() > ENTRIES_PER_PAGE;
    let activity = entries
        .iter()
        .any(|e| e.base > Decimal::ZERO || e.vat > Decimal::ZERO);
    let page = PageHead {
        regime,
        declarant,
        period,
        complementary,
        activity,
    };

    let mut text = header(declarant, period);
    let mut pages = entries.chunks(ENTRIES_PER_PAGE);
    for (i, tag) in regime.sections().iter().enumerate() {
        let section = match pages.next() {
            Some(chunk) => page.section(tag, chunk)?,
            None if i == 0 => page.section(tag, &[])?,
            None => close_section(format!("<{tag}>"), tag),
        };
        text.push_str(&section);
    }
    text.push_str(&format!("</{}>", form_tag(period)));

    let (encoded, _, _) = encoding_rs::WINDOWS_1252.encode(&text);
    Ok(encoded.into_owned())
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Fields repeated at the top of every data page.
struct PageHead<'a> {
    regime: Form369Regime,
    declarant: &'a Declarant,
    period: &'a FilingPeriod,
    complementary: bool,
    activity: bool,
}

impl PageHead<'_> {
    fn section(&self, tag: &str, entries: &[Form369Entry]) -> Result<String, TransformError> {
        let mut s = format!("<{tag}>{} DO", self.regime.code());
        fill(&mut s, FLAGS_COLUMN);
        s.push(if self.complementary { 'C' } else { ' ' });
        s.push_str(" ES");
        s.push_str(&fixed(self.declarant.nif.trim(), NIF_WIDTH));
        match self.regime {
            Form369Regime::Union => s.push_str("      "),
            Form369Regime::Import => {
                s.push_str("   ");
                let ioss = self.declarant.ioss_number.as_deref().unwrap_or_default();
                s.push_str(&fixed(ioss.trim(), IOSS_WIDTH));
            }
        }
        s.push_str(&fixed(self.declarant.name.trim(), NAME_WIDTH));
        s.push_str(&period_field(self.period));
        s.push_str(&" ".repeat(PERIOD_GAP));
        // "1" declares a period without activity
        s.push(if self.activity { '0' } else { '1' });
        for entry in entries {
            s.push_str(&entry_field(entry)?);
        }
        Ok(close_section(s, tag))
    }
}

fn form_tag(period: &FilingPeriod) -> String {
    format!("T369{}{}0000", period.year, period.code())
}

fn header(declarant: &Declarant, period: &FilingPeriod) -> String {
    let mut s = format!("<{}>", form_tag(period));
    fill(&mut s, HEADER_NIF_COLUMN);
    s.push_str(&fixed(declarant.nif.trim(), NIF_WIDTH));
    fill(&mut s, HEADER_SECTION_COLUMN);
    s.push_str("<T36900></T36900>");
    s
}

/// `2024T 1` for a quarter, `2024M 01` for a month.
fn period_field(period: &FilingPeriod) -> String {
    if period.quarterly {
        format!("{}T {}", period.year, period.number)
    } else {
        format!("{}M {:02}", period.year, period.number)
    }
}

/// `CC RRRRK` padded to 20, base cents in 10 digits, 13 spaces, VAT cents in 8.
fn entry_field(entry: &Form369Entry) -> Result<String, TransformError> {
    let kind = if entry.is_standard_rate() { 'S' } else { 'R' };
    let mut s = format!("{:>2} {:04}{kind}", entry.country, entry.rate);
    fill(&mut s, RATE_FIELD_WIDTH);
    let base = cents(entry.base).ok_or_else(|| TransformError::overflow("form 369 base"))?;
    let vat = cents(entry.vat).ok_or_else(|| TransformError::overflow("form 369 VAT"))?;
    s.push_str(&format!("{base:0>width$}", width = BASE_WIDTH));
    s.push_str(&" ".repeat(AMOUNT_GAP));
    s.push_str(&format!("{vat:0>width$}", width = VAT_WIDTH));
    Ok(s)
}

/// Whole cents, rounded half away from zero.
fn cents(amount: Decimal) -> Option<String> {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    Some(rounded.checked_mul(Decimal::ONE_HUNDRED)?.trunc().normalize().to_string())
}

/// Pad with spaces up to `width` characters.
fn fill(out: &mut String, width: usize) {
    let len = out.chars().count();
    out.extend(std::iter::repeat(' ').take(width.saturating_sub(len)));
}

/// Cut or pad to exactly `width` characters.
fn fixed(text: &str, width: usize) -> String {
    let mut s: String = text.chars().take(width).collect();
    fill(&mut s, width);
    s
}

fn close_section(mut body: String, tag: &str) -> String {
    let close = format!("</{tag}>");
    fill(&mut body, SECTION_WIDTH - close.len());
    body.push_str(&close);
    body
}
