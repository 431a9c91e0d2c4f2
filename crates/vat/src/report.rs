//! Report layout: which blocks go on which sheet, their columns, rows and
//! total lines. Rendering to a workbook lives in `taxgrid-io`.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::aggregate::CategoryAggregates;
use crate::error::TransformError;
use crate::model::{CategoryTag, RateKey, Totals};
use crate::normalize::round_cents;

pub const SHEET_REGULAR: &str = "REGULAR";
pub const SHEET_INTERNATIONAL: &str = "INTERNATIONAL";
pub const OSS_BREAKDOWN_TITLE: &str = "Totales por país de destino en OSS";
pub const TOTAL_LABEL: &str = "Total";

/// Marker in a column header for columns summed into the total line.
const EURO_MARKER: &str = "(€)";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ReportCell {
    Text(String),
    Amount(Decimal),
}

impl ReportCell {
    pub fn text(s: impl Into<String>) -> Self {
        ReportCell::Text(s.into())
    }

    pub fn as_amount(&self) -> Option<Decimal> {
        match self {
            ReportCell::Amount(d) => Some(*d),
            ReportCell::Text(_) => None,
        }
    }
}

/// One titled table: header, column names, data rows and a total line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportBlock {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ReportCell>>,
    pub total: Vec<ReportCell>,
}

impl ReportBlock {
    /// Build a block and its total line. `None` when there are no rows.
    pub fn new(
        title: &str,
        columns: &[&str],
        rows: Vec<Vec<ReportCell>>,
    ) -> Result<Option<Self>, TransformError> {
        if rows.is_empty() {
            return Ok(None);
        }
        let total: Vec<ReportCell> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                if column.contains(EURO_MARKER) {
                    rows.iter()
                        .filter_map(|r| r.get(i).and_then(ReportCell::as_amount))
                        .try_fold(Decimal::ZERO, |acc, d| acc.checked_add(d))
                        .map(ReportCell::Amount)
                        .ok_or_else(|| TransformError::overflow(format!("{title} / {column}")))
                } else if i == 0 {
                    Ok(ReportCell::text(TOTAL_LABEL))
                } else {
                    Ok(ReportCell::text(""))
                }
            })
            .collect::<Result<_, TransformError>>()?;
        Ok(Some(Self {
            title: title.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            total,
        }))
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Total-line value of the named column.
    pub fn total_of(&self, column: &str) -> Option<Decimal> {
        let i = self.columns.iter().position(|c| c == column)?;
        self.total.get(i).and_then(ReportCell::as_amount)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSheet {
    pub name: String,
    pub blocks: Vec<ReportBlock>,
}

impl ReportSheet {
    pub fn block(&self, title: &str) -> Option<&ReportBlock> {
        self.blocks.iter().find(|b| b.title == title)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub sheets: Vec<ReportSheet>,
}

impl Report {
    pub fn sheet(&self, name: &str) -> Option<&ReportSheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

const DOMESTIC_COLUMNS: [&str; 6] = [
    "TAXABLE_JURISDICTION",
    "Calculated Base (€)",
    "No IVA (€)",
    "IVA (€)",
    "Total (€)",
    "Currency",
];
const EXEMPT_COLUMNS: [&str; 6] = [
    "País de origen / Datos del comprador",
    "Datos del comprador",
    "Detalle",
    "Base (€)",
    "IVA (€)",
    "Total (€)",
];
const INTRA_COLUMNS: [&str; 6] = [
    "País de origen",
    "Nombre del comprador",
    "NIF del comprador",
    "Base (€)",
    "IVA (€)",
    "Total (€)",
];
const RATE_COLUMNS: [&str; 5] = [
    "País de origen",
    "País de destino / Tipo de IVA repercutido",
    "Base (€)",
    "IVA (€)",
    "Total (€)",
];
const ROUTE_COLUMNS: [&str; 5] = [
    "País de Origen",
    "País de Destino",
    "Base (€)",
    "IVA (€)",
    "Total (€)",
];
const EXPORT_COLUMNS: [&str; 6] = [
    "País de Origen",
    "País de Destino",
    "Ciudad de Destino",
    "Base (€)",
    "IVA (€)",
    "Total (€)",
];
const BREAKDOWN_COLUMNS: [&str; 4] = ["País de destino", "Base (€)", "IVA (€)", "Total (€)"];

fn with_totals(mut cells: Vec<ReportCell>, t: &Totals) -> Vec<ReportCell> {
    cells.extend([
        ReportCell::Amount(t.base),
        ReportCell::Amount(t.vat),
        ReportCell::Amount(t.total),
    ]);
    cells
}

/// Lay out the final (post-allocation) aggregates as sheets of blocks.
///
/// `REGULAR` appears only when one of its blocks has rows; `INTERNATIONAL`
/// is always present. Purchases from Amazon are aggregated but not shown.
pub fn build_report(aggs: &CategoryAggregates) -> Result<Report, TransformError> {
    let mut sheets = Vec::with_capacity(2);

    let regular: Vec<ReportBlock> = [domestic_block(aggs)?, exempt_block(aggs)?]
        .into_iter()
        .flatten()
        .collect();
    if !regular.is_empty() {
        sheets.push(ReportSheet {
            name: SHEET_REGULAR.to_string(),
            blocks: regular,
        });
    }

    let international = [
        intra_community_block(aggs)?,
        rate_block(CategoryTag::Oss, &aggs.oss)?,
        oss_breakdown_block(aggs)?,
        rate_block(CategoryTag::Ioss, &aggs.ioss)?,
        marketplace_block(aggs)?,
        exports_block(aggs)?,
    ]
    .into_iter()
    .flatten()
    .collect();
    sheets.push(ReportSheet {
        name: SHEET_INTERNATIONAL.to_string(),
        blocks: international,
    });

    Ok(Report { sheets })
}

fn domestic_block(aggs: &CategoryAggregates) -> Result<Option<ReportBlock>, TransformError> {
    let rows = aggs
        .domestic
        .iter()
        .map(|(name, d)| {
            vec![
                ReportCell::text(name),
                ReportCell::Amount(d.calculated_base),
                ReportCell::Amount(d.no_vat),
                ReportCell::Amount(d.vat),
                ReportCell::Amount(d.total),
                ReportCell::text(d.currency),
            ]
        })
        .collect();
    ReportBlock::new(CategoryTag::Domestic.title(), &DOMESTIC_COLUMNS, rows)
}

fn exempt_block(aggs: &CategoryAggregates) -> Result<Option<ReportBlock>, TransformError> {
    let rows = aggs
        .exempt
        .iter()
        .map(|(k, t)| {
            with_totals(
                vec![
                    ReportCell::text(&k.departure_country),
                    ReportCell::text(&k.buyer),
                    ReportCell::text(k.detail),
                ],
                t,
            )
        })
        .collect();
    ReportBlock::new(CategoryTag::DomesticExempt.title(), &EXEMPT_COLUMNS, rows)
}

fn intra_community_block(aggs: &CategoryAggregates) -> Result<Option<ReportBlock>, TransformError> {
    let rows = aggs
        .intra_community
        .iter()
        .map(|(k, t)| {
            with_totals(
                vec![
                    ReportCell::text(&k.country),
                    ReportCell::text(&k.buyer_name),
                    ReportCell::text(&k.buyer_vat),
                ],
                t,
            )
        })
        .collect();
    ReportBlock::new(CategoryTag::IntraCommunity.title(), &INTRA_COLUMNS, rows)
}

fn rate_block(
    tag: CategoryTag,
    map: &BTreeMap<RateKey, Totals>,
) -> Result<Option<ReportBlock>, TransformError> {
    let rows = map
        .iter()
        .map(|(k, t)| {
            with_totals(
                vec![ReportCell::text(&k.origin), ReportCell::text(&k.destination)],
                t,
            )
        })
        .collect();
    ReportBlock::new(tag.title(), &RATE_COLUMNS, rows)
}

fn marketplace_block(aggs: &CategoryAggregates) -> Result<Option<ReportBlock>, TransformError> {
    let rows = aggs
        .marketplace
        .iter()
        .map(|(k, t)| {
            with_totals(
                vec![ReportCell::text(&k.origin), ReportCell::text(&k.destination)],
                t,
            )
        })
        .collect();
    ReportBlock::new(CategoryTag::Marketplace.title(), &ROUTE_COLUMNS, rows)
}

fn exports_block(aggs: &CategoryAggregates) -> Result<Option<ReportBlock>, TransformError> {
    let rows = aggs
        .exports
        .iter()
        .filter(|(_, t)| !t.is_zero())
        .map(|(k, t)| {
            with_totals(
                vec![
                    ReportCell::text(&k.origin),
                    ReportCell::text(&k.destination),
                    ReportCell::text(&k.city),
                ],
                t,
            )
        })
        .collect();
    ReportBlock::new(CategoryTag::Exports.title(), &EXPORT_COLUMNS, rows)
}

/// OSS totals regrouped by destination country (the part of the destination
/// label before " - "), rounded to cents.
pub fn oss_destination_totals(
    aggs: &CategoryAggregates,
) -> Result<BTreeMap<String, Totals>, TransformError> {
    let mut by_country: BTreeMap<String, Totals> = BTreeMap::new();
    for (key, totals) in &aggs.oss {
        let country = key
            .destination
            .split(" - ")
            .next()
            .unwrap_or_default()
            .to_string();
        let entry = by_country.entry(country).or_default();
        *entry = entry
            .checked_add(totals)
            .ok_or_else(|| TransformError::overflow(OSS_BREAKDOWN_TITLE))?;
    }
    for t in by_country.values_mut() {
        *t = Totals::new(round_cents(t.base), round_cents(t.vat), round_cents(t.total));
    }
    Ok(by_country)
}

fn oss_breakdown_block(aggs: &CategoryAggregates) -> Result<Option<ReportBlock>, TransformError> {
    let rows = oss_destination_totals(aggs)?
        .iter()
        .map(|(country, t)| with_totals(vec![ReportCell::text(country)], t))
        .collect();
    ReportBlock::new(OSS_BREAKDOWN_TITLE, &BREAKDOWN_COLUMNS, rows)
}
