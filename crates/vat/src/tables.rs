//! Fixed business tables: column groups, country sets, jurisdiction rules.

use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

pub const ACTIVITY_PERIOD: &str = "ACTIVITY_PERIOD";
pub const TRANSACTION_TYPE: &str = "TRANSACTION_TYPE";
pub const TRANSACTION_CURRENCY_CODE: &str = "TRANSACTION_CURRENCY_CODE";
pub const SALE_DEPART_COUNTRY: &str = "SALE_DEPART_COUNTRY";
pub const SALE_ARRIVAL_COUNTRY: &str = "SALE_ARRIVAL_COUNTRY";
pub const DEPARTURE_COUNTRY: &str = "DEPARTURE_COUNTRY";
pub const ARRIVAL_COUNTRY: &str = "ARRIVAL_COUNTRY";
pub const ARRIVAL_CITY: &str = "ARRIVAL_CITY";
pub const BUYER_VAT_NUMBER_COUNTRY: &str = "BUYER_VAT_NUMBER_COUNTRY";
pub const BUYER_VAT_NUMBER: &str = "BUYER_VAT_NUMBER";
pub const BUYER_NAME: &str = "BUYER_NAME";
pub const TAX_REPORTING_SCHEME: &str = "TAX_REPORTING_SCHEME";
pub const TAX_COLLECTION_RESPONSIBILITY: &str = "TAX_COLLECTION_RESPONSIBILITY";
pub const SUPPLIER_NAME: &str = "SUPPLIER_NAME";
pub const TAXABLE_JURISDICTION: &str = "TAXABLE_JURISDICTION";
pub const PRICE_OF_ITEMS_VAT_RATE_PERCENT: &str = "PRICE_OF_ITEMS_VAT_RATE_PERCENT";

pub const TOTAL_ACTIVITY_VALUE_AMT_VAT_EXCL: &str = "TOTAL_ACTIVITY_VALUE_AMT_VAT_EXCL";
pub const TOTAL_ACTIVITY_VALUE_VAT_AMT: &str = "TOTAL_ACTIVITY_VALUE_VAT_AMT";
pub const TOTAL_ACTIVITY_VALUE_AMT_VAT_INCL: &str = "TOTAL_ACTIVITY_VALUE_AMT_VAT_INCL";

/// Summed into a row's `base`.
pub const VAT_EXCL_COLUMNS: [&str; 6] = [
    "PRICE_OF_ITEMS_AMT_VAT_EXCL",
    "PROMO_PRICE_OF_ITEMS_AMT_VAT_EXCL",
    "SHIP_CHARGE_AMT_VAT_EXCL",
    "PROMO_SHIP_CHARGE_AMT_VAT_EXCL",
    "GIFT_WRAP_AMT_VAT_EXCL",
    "PROMO_GIFT_WRAP_AMT_VAT_EXCL",
];

/// Summed into a row's `vat`.
pub const VAT_COLUMNS: [&str; 6] = [
    "PRICE_OF_ITEMS_VAT_AMT",
    "PROMO_PRICE_OF_ITEMS_VAT_AMT",
    "SHIP_CHARGE_VAT_AMT",
    "PROMO_SHIP_CHARGE_VAT_AMT",
    "GIFT_WRAP_VAT_AMT",
    "PROMO_GIFT_WRAP_VAT_AMT",
];

/// Summed into a row's `total`.
pub const VAT_INCL_COLUMNS: [&str; 6] = [
    "PRICE_OF_ITEMS_AMT_VAT_INCL",
    "PROMO_PRICE_OF_ITEMS_AMT_VAT_INCL",
    "SHIP_CHARGE_AMT_VAT_INCL",
    "PROMO_SHIP_CHARGE_AMT_VAT_INCL",
    "GIFT_WRAP_AMT_VAT_INCL",
    "PROMO_GIFT_WRAP_AMT_VAT_INCL",
];

/// Amount columns parsed as decimals and converted to EUR.
pub const NUMERIC_COLUMNS: [&str; 31] = [
    "COST_PRICE_OF_ITEMS",
    "PRICE_OF_ITEMS_AMT_VAT_EXCL",
    "PROMO_PRICE_OF_ITEMS_AMT_VAT_EXCL",
    "TOTAL_PRICE_OF_ITEMS_AMT_VAT_EXCL",
    "SHIP_CHARGE_AMT_VAT_EXCL",
    "PROMO_SHIP_CHARGE_AMT_VAT_EXCL",
    "TOTAL_SHIP_CHARGE_AMT_VAT_EXCL",
    "GIFT_WRAP_AMT_VAT_EXCL",
    "PROMO_GIFT_WRAP_AMT_VAT_EXCL",
    "TOTAL_GIFT_WRAP_AMT_VAT_EXCL",
    TOTAL_ACTIVITY_VALUE_AMT_VAT_EXCL,
    "PRICE_OF_ITEMS_VAT_AMT",
    "PROMO_PRICE_OF_ITEMS_VAT_AMT",
    "TOTAL_PRICE_OF_ITEMS_VAT_AMT",
    "SHIP_CHARGE_VAT_AMT",
    "PROMO_SHIP_CHARGE_VAT_AMT",
    "TOTAL_SHIP_CHARGE_VAT_AMT",
    "GIFT_WRAP_VAT_AMT",
    "PROMO_GIFT_WRAP_VAT_AMT",
    "TOTAL_GIFT_WRAP_VAT_AMT",
    TOTAL_ACTIVITY_VALUE_VAT_AMT,
    "PRICE_OF_ITEMS_AMT_VAT_INCL",
    "PROMO_PRICE_OF_ITEMS_AMT_VAT_INCL",
    "TOTAL_PRICE_OF_ITEMS_AMT_VAT_INCL",
    "SHIP_CHARGE_AMT_VAT_INCL",
    "PROMO_SHIP_CHARGE_AMT_VAT_INCL",
    "TOTAL_SHIP_CHARGE_AMT_VAT_INCL",
    "GIFT_WRAP_AMT_VAT_INCL",
    "PROMO_GIFT_WRAP_AMT_VAT_INCL",
    "TOTAL_GIFT_WRAP_AMT_VAT_INCL",
    TOTAL_ACTIVITY_VALUE_AMT_VAT_INCL,
];

/// Position of `column` in [`NUMERIC_COLUMNS`].
pub fn numeric_index(column: &str) -> Option<usize> {
    NUMERIC_COLUMNS.iter().position(|c| *c == column)
}

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

pub const BASE_CURRENCY: &str = "EUR";
pub const RETURN: &str = "RETURN";
pub const SALE: &str = "SALE";

pub const SCHEME_REGULAR: &str = "REGULAR";
pub const SCHEME_UK_VOEC_DOMESTIC: &str = "UK_VOEC-DOMESTIC";
pub const SCHEME_UNION_OSS: &str = "UNION-OSS";
pub const SCHEME_DEEMED_RESELLER_IOSS: &str = "DEEMED_RESELLER-IOSS";

pub const RESPONSIBILITY_SELLER: &str = "SELLER";
pub const RESPONSIBILITY_MARKETPLACE: &str = "MARKETPLACE";

pub const AMAZON_SUPPLIER: &str = "Amazon Services Europe Sarl";

// ---------------------------------------------------------------------------
// Countries
// ---------------------------------------------------------------------------

pub const EU_COUNTRIES: [&str; 27] = [
    "AT", "BE", "BG", "CY", "CZ", "DE", "DK", "EE", "ES", "FI", "FR", "GR", "HR", "HU",
    "IE", "IT", "LT", "LU", "LV", "MT", "NL", "PL", "PT", "RO", "SE", "SI", "SK",
];

/// Departure hubs that qualify a shipment as an export when it leaves the set.
pub const EXPORT_HUBS: [&str; 5] = ["ES", "DE", "FR", "IT", "PL"];

pub const GREAT_BRITAIN: &str = "GB";

pub fn is_eu(country: &str) -> bool {
    EU_COUNTRIES.contains(&country)
}

pub fn is_export_hub(country: &str) -> bool {
    EXPORT_HUBS.contains(&country)
}

// ---------------------------------------------------------------------------
// Jurisdictions (domestic B2C/B2B rules)
// ---------------------------------------------------------------------------

/// Per-item rates within this distance of a target rate count as a match.
pub const RATE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

/// Standard rate assumed for jurisdictions missing from [`JURISDICTIONS`].
pub const DEFAULT_STANDARD_RATE: Decimal = Decimal::from_parts(22, 0, 0, false, 2);

/// Domestic reporting rules for one taxable jurisdiction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jurisdiction {
    pub name: &'static str,
    /// Currency shown in the report's `Currency` column.
    pub local_currency: &'static str,
    /// Original transaction currencies accepted into the aggregate.
    pub accepted_currencies: &'static [&'static str],
    pub standard_rate: Decimal,
    /// Whether 0% rows feed the no-VAT column.
    pub zero_rate_counts: bool,
}

const fn rate(percent: u32) -> Decimal {
    Decimal::from_parts(percent, 0, 0, false, 2)
}

pub const JURISDICTIONS: [Jurisdiction; 7] = [
    Jurisdiction {
        name: "CZECH REPUBLIC",
        local_currency: "EUR",
        accepted_currencies: &["EUR"],
        standard_rate: rate(21),
        zero_rate_counts: true,
    },
    Jurisdiction {
        name: "FRANCE",
        local_currency: "EUR",
        accepted_currencies: &["EUR"],
        standard_rate: rate(20),
        zero_rate_counts: true,
    },
    Jurisdiction {
        name: "GERMANY",
        local_currency: "EUR",
        accepted_currencies: &["EUR"],
        standard_rate: rate(19),
        zero_rate_counts: true,
    },
    Jurisdiction {
        name: "ITALY",
        local_currency: "EUR",
        accepted_currencies: &["EUR"],
        standard_rate: rate(22),
        zero_rate_counts: true,
    },
    Jurisdiction {
        name: "POLAND",
        local_currency: "PLN",
        accepted_currencies: &["PLN", "EUR"],
        standard_rate: rate(23),
        zero_rate_counts: true,
    },
    Jurisdiction {
        name: "SPAIN",
        local_currency: "EUR",
        accepted_currencies: &["EUR"],
        standard_rate: rate(21),
        zero_rate_counts: true,
    },
    Jurisdiction {
        name: "UNITED KINGDOM",
        local_currency: "GBP",
        accepted_currencies: &["GBP"],
        standard_rate: rate(20),
        zero_rate_counts: false,
    },
];

pub fn jurisdiction(name: &str) -> Option<&'static Jurisdiction> {
    JURISDICTIONS.iter().find(|j| j.name == name)
}

// ---------------------------------------------------------------------------
// UK marketplace reallocation
// ---------------------------------------------------------------------------

/// Share of the UK marketplace pool written into each target's no-VAT column.
pub const UK_ALLOCATION_FACTOR: Decimal = Decimal::from_parts(47, 0, 0, false, 3);

pub const UK_ALLOCATION_TARGETS: [&str; 2] = ["CZECH REPUBLIC", "POLAND"];

// ---------------------------------------------------------------------------
// Activity periods
// ---------------------------------------------------------------------------

pub const MAX_ACTIVITY_PERIODS: usize = 3;
