use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::tables::{numeric_index, NUMERIC_COLUMNS};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Column names of one input file, shared by every row read from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Header {
    /// Later duplicates of a column name shadow earlier ones.
    pub fn new(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, index }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

/// One CSV data line as column name → text. Dropped once folded.
#[derive(Debug, Clone)]
pub struct RawRow {
    header: Arc<Header>,
    fields: Vec<String>,
    /// 1-based line number in the source file.
    line: u64,
}

impl RawRow {
    pub fn new(header: Arc<Header>, fields: Vec<String>, line: u64) -> Self {
        Self {
            header,
            fields,
            line,
        }
    }

    /// Build a row from literal pairs. Mostly for fixtures.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let header = Header::new(pairs.iter().map(|(k, _)| k.to_string()).collect());
        let fields = pairs.iter().map(|(_, v)| v.to_string()).collect();
        Self::new(Arc::new(header), fields, 2)
    }

    /// Field text, `None` if the column is absent or the line is short.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.header
            .position(name)
            .and_then(|i| self.fields.get(i))
            .map(String::as_str)
    }

    /// Field text with absent treated as empty.
    pub fn text(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    /// Field text with absent and empty both treated as `None`.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn header(&self) -> &Header {
        &self.header
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// What happened to a row's amounts during currency normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversion {
    /// Already in EUR.
    NotNeeded,
    /// Multiplied by the rate table entry and rounded to cents.
    Converted,
    /// No rate for this currency; amounts stay in the source currency.
    MissingRate,
}

/// A numeric field that was present but not a number. Treated as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseFailure {
    pub column: &'static str,
    pub text: String,
}

/// A raw row with parsed amounts, converted currency, and derived totals.
#[derive(Debug, Clone)]
pub struct NormalizedRow {
    pub raw: RawRow,
    /// Parsed values aligned with [`NUMERIC_COLUMNS`].
    pub amounts: [Decimal; NUMERIC_COLUMNS.len()],
    pub original_currency: String,
    pub currency: String,
    pub conversion: Conversion,
    pub base: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
    pub parse_failures: Vec<ParseFailure>,
}

impl NormalizedRow {
    /// Parsed amount for a numeric column, zero for anything else.
    pub fn amount(&self, column: &str) -> Decimal {
        numeric_index(column)
            .map(|i| self.amounts[i])
            .unwrap_or(Decimal::ZERO)
    }

    pub fn text(&self, name: &str) -> &str {
        self.raw.text(name)
    }

    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.raw.non_empty(name)
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Tax categories a row can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryTag {
    Domestic,
    DomesticExempt,
    IntraCommunity,
    Oss,
    Ioss,
    Marketplace,
    AmazonPurchases,
    Exports,
    /// Internal: UK marketplace base collected for reallocation. Never rendered.
    UkMarketplacePool,
}

impl CategoryTag {
    /// Every tag in report order.
    pub const ALL: [CategoryTag; 9] = [
        CategoryTag::Domestic,
        CategoryTag::DomesticExempt,
        CategoryTag::IntraCommunity,
        CategoryTag::Oss,
        CategoryTag::Ioss,
        CategoryTag::Marketplace,
        CategoryTag::AmazonPurchases,
        CategoryTag::Exports,
        CategoryTag::UkMarketplacePool,
    ];

    /// Block title shown in the workbook.
    pub fn title(&self) -> &'static str {
        match self {
            CategoryTag::Domestic => "Ventas locales al consumidor final - B2C y B2B (EUR)",
            CategoryTag::DomesticExempt => "Ventas locales SIN IVA (EUR)",
            CategoryTag::IntraCommunity => "Ventas Intracomunitarias de bienes - B2B (EUR)",
            CategoryTag::Oss => "Ventanilla Única - OSS esquema europeo (EUR)",
            CategoryTag::Ioss => "Ventanilla Única - IOSS esquema de importación (EUR)",
            CategoryTag::Marketplace => "IVA recaudado y remitido por Amazon Marketplace (EUR)",
            CategoryTag::AmazonPurchases => "Compras a Amazon (EUR)",
            CategoryTag::Exports => "Exportaciones (EUR)",
            CategoryTag::UkMarketplacePool => "UK_MARKETPLACE_ALLOCATION",
        }
    }
}

impl fmt::Display for CategoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CategoryTag::Domestic => "domestic",
            CategoryTag::DomesticExempt => "domestic_exempt",
            CategoryTag::IntraCommunity => "intra_community",
            CategoryTag::Oss => "oss",
            CategoryTag::Ioss => "ioss",
            CategoryTag::Marketplace => "marketplace",
            CategoryTag::AmazonPurchases => "amazon_purchases",
            CategoryTag::Exports => "exports",
            CategoryTag::UkMarketplacePool => "uk_marketplace_pool",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Running base / VAT / total sums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub base: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
}

impl Totals {
    pub fn new(base: Decimal, vat: Decimal, total: Decimal) -> Self {
        Self { base, vat, total }
    }

    /// Field-wise sum, `None` when any field overflows.
    pub fn checked_add(&self, rhs: &Totals) -> Option<Totals> {
        Some(Totals {
            base: self.base.checked_add(rhs.base)?,
            vat: self.vat.checked_add(rhs.vat)?,
            total: self.total.checked_add(rhs.total)?,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.base.is_zero() && self.vat.is_zero() && self.total.is_zero()
    }
}

/// Per-jurisdiction domestic sales.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomesticAggregate {
    /// Base of rows taxed at the jurisdiction's standard rate.
    pub calculated_base: Decimal,
    /// Base of zero-rated rows, or the UK pool allocation once applied.
    pub no_vat: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
    /// Currency label shown next to the amounts.
    pub currency: &'static str,
}

/// Key for domestic VAT-exempt sales.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExemptKey {
    pub departure_country: String,
    /// Buyer tax ID, or the no-identification placeholder.
    pub buyer: String,
    pub detail: &'static str,
}

/// Key for intra-community B2B sales.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BuyerKey {
    pub country: String,
    pub buyer_name: String,
    pub buyer_vat: String,
}

/// Key for OSS and IOSS sales: origin plus a "DE - 19.00%" style label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RateKey {
    pub origin: String,
    pub destination: String,
}

/// Key for marketplace-collected VAT and Amazon purchases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RouteKey {
    pub origin: String,
    pub destination: String,
}

/// Key for exports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExportKey {
    pub origin: String,
    pub destination: String,
    pub city: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn raw_row_lookup() {
        let row = RawRow::from_pairs(&[("A", "1"), ("B", ""), ("C", "x")]);
        assert_eq!(row.get("A"), Some("1"));
        assert_eq!(row.get("B"), Some(""));
        assert_eq!(row.non_empty("B"), None);
        assert_eq!(row.get("MISSING"), None);
        assert_eq!(row.text("MISSING"), "");
    }

    #[test]
    fn short_line_reads_as_absent() {
        let header = Arc::new(Header::new(vec!["A".into(), "B".into()]));
        let row = RawRow::new(header, vec!["1".into()], 7);
        assert_eq!(row.get("B"), None);
        assert_eq!(row.line(), 7);
    }

    #[test]
    fn duplicate_header_last_wins() {
        let header = Header::new(vec!["A".into(), "A".into()]);
        assert_eq!(header.position("A"), Some(1));
    }

    #[test]
    fn totals_accumulate() {
        let t = Totals::default()
            .checked_add(&Totals::new(dec!(10), dec!(2.1), dec!(12.1)))
            .and_then(|t| t.checked_add(&Totals::new(dec!(-1), dec!(0), dec!(-1))))
            .unwrap();
        assert_eq!(t, Totals::new(dec!(9), dec!(2.1), dec!(11.1)));
        assert!(!t.is_zero());
        assert!(Totals::default().is_zero());
    }

    #[test]
    fn totals_overflow_is_none() {
        let big = Totals::new(Decimal::MAX, dec!(0), Decimal::MAX);
        assert_eq!(big.checked_add(&Totals::new(dec!(1), dec!(0), dec!(0))), None);
        assert_eq!(big.checked_add(&Totals::default()), Some(big));
    }

    #[test]
    fn tag_labels() {
        assert_eq!(CategoryTag::Exports.title(), "Exportaciones (EUR)");
        assert_eq!(CategoryTag::IntraCommunity.to_string(), "intra_community");
    }
}
