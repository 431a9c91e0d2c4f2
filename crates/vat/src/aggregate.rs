use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::error::TransformError;
use crate::model::{
    BuyerKey, CategoryTag, DomesticAggregate, ExemptKey, ExportKey, NormalizedRow, RateKey,
    RouteKey, Totals,
};
use crate::normalize::{parse_amount, round_cents};
use crate::rates::RateTable;
use crate::tables::{
    jurisdiction, ARRIVAL_CITY, ARRIVAL_COUNTRY, BASE_CURRENCY, BUYER_NAME, BUYER_VAT_NUMBER,
    DEFAULT_STANDARD_RATE, DEPARTURE_COUNTRY, PRICE_OF_ITEMS_VAT_RATE_PERCENT, RATE_TOLERANCE,
    SALE, SALE_ARRIVAL_COUNTRY, SALE_DEPART_COUNTRY, TAXABLE_JURISDICTION,
    TOTAL_ACTIVITY_VALUE_AMT_VAT_EXCL, TOTAL_ACTIVITY_VALUE_AMT_VAT_INCL,
    TOTAL_ACTIVITY_VALUE_VAT_AMT, TRANSACTION_TYPE,
};

pub const NO_TAX_ID: &str = "Sin identificación fiscal";
pub const DETAIL_SHIPMENTS: &str = "Envíos SIN IVA";
pub const DETAIL_PRODUCTS: &str = "Productos SIN IVA";

/// Running totals for every category, keyed per category. Holds no rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryAggregates {
    pub domestic: BTreeMap<String, DomesticAggregate>,
    pub exempt: BTreeMap<ExemptKey, Totals>,
    pub intra_community: BTreeMap<BuyerKey, Totals>,
    pub oss: BTreeMap<RateKey, Totals>,
    pub ioss: BTreeMap<RateKey, Totals>,
    pub marketplace: BTreeMap<RouteKey, Totals>,
    pub amazon_purchases: BTreeMap<RouteKey, Totals>,
    pub exports: BTreeMap<ExportKey, Totals>,
    /// Base collected for UK reallocation; `None` until a pool row is seen.
    pub uk_pool: Option<Decimal>,
}

impl CategoryAggregates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one row into the aggregate for `tag`. Returns false when the
    /// category's own filters drop the row, and an error when a running sum
    /// overflows.
    pub fn fold(
        &mut self,
        tag: CategoryTag,
        row: &NormalizedRow,
        rates: &RateTable,
    ) -> Result<bool, TransformError> {
        let folded = match tag {
            CategoryTag::Domestic => self.fold_domestic(row)?,
            CategoryTag::DomesticExempt => self.fold_exempt(row)?,
            CategoryTag::IntraCommunity => self.fold_intra_community(row)?,
            CategoryTag::Oss => {
                let arrival = row.text(SALE_ARRIVAL_COUNTRY);
                let rate = rates.oss_rate(arrival).unwrap_or(Decimal::ZERO);
                let key = RateKey {
                    origin: row.text(SALE_DEPART_COUNTRY).to_string(),
                    destination: oss_label(arrival, rate),
                };
                add_row(&mut self.oss, key, row, tag)?;
                true
            }
            CategoryTag::Ioss => {
                let rate = row.raw.get(PRICE_OF_ITEMS_VAT_RATE_PERCENT).unwrap_or("0");
                let key = RateKey {
                    origin: row.text(SALE_DEPART_COUNTRY).to_string(),
                    destination: format!("{} - {}%", row.text(ARRIVAL_COUNTRY), rate),
                };
                add_row(&mut self.ioss, key, row, tag)?;
                true
            }
            CategoryTag::Marketplace => {
                add_row(&mut self.marketplace, route(row), row, tag)?;
                true
            }
            CategoryTag::AmazonPurchases => {
                add_row(&mut self.amazon_purchases, route(row), row, tag)?;
                true
            }
            CategoryTag::Exports => {
                let key = ExportKey {
                    origin: row.text(SALE_DEPART_COUNTRY).to_string(),
                    destination: row.text(SALE_ARRIVAL_COUNTRY).to_string(),
                    city: row.text(ARRIVAL_CITY).to_string(),
                };
                let totals = Totals::new(
                    row.amount(TOTAL_ACTIVITY_VALUE_AMT_VAT_EXCL),
                    row.amount(TOTAL_ACTIVITY_VALUE_VAT_AMT),
                    row.amount(TOTAL_ACTIVITY_VALUE_AMT_VAT_INCL),
                );
                accumulate(&mut self.exports, key, &totals, tag)?;
                true
            }
            CategoryTag::UkMarketplacePool => {
                let pool = self.uk_pool.unwrap_or(Decimal::ZERO);
                self.uk_pool = Some(checked_sum(pool, row.base, tag)?);
                true
            }
        };
        Ok(folded)
    }

    fn fold_domestic(&mut self, row: &NormalizedRow) -> Result<bool, TransformError> {
        let name = row.text(TAXABLE_JURISDICTION);
        if name.is_empty() {
            return Ok(false);
        }
        let rules = jurisdiction(name);
        if let Some(rules) = rules {
            if !rules.accepted_currencies.contains(&row.original_currency.as_str()) {
                return Ok(false);
            }
        }

        let standard = rules.map_or(DEFAULT_STANDARD_RATE, |r| r.standard_rate);
        let zero_rate_counts = rules.map_or(true, |r| r.zero_rate_counts);
        let item_rate = parse_amount(row.text(PRICE_OF_ITEMS_VAT_RATE_PERCENT))
            .unwrap_or(Decimal::ZERO);

        let entry = self
            .domestic
            .entry(name.to_string())
            .or_insert_with(|| DomesticAggregate {
                calculated_base: Decimal::ZERO,
                no_vat: Decimal::ZERO,
                vat: Decimal::ZERO,
                total: Decimal::ZERO,
                currency: rules.map_or(BASE_CURRENCY, |r| r.local_currency),
            });

        let tag = CategoryTag::Domestic;
        if (item_rate - standard).abs() < RATE_TOLERANCE {
            entry.calculated_base = checked_sum(entry.calculated_base, row.base, tag)?;
        } else if item_rate.abs() < RATE_TOLERANCE && zero_rate_counts {
            entry.no_vat = checked_sum(entry.no_vat, row.base, tag)?;
        }
        entry.vat = checked_sum(entry.vat, row.vat, tag)?;
        entry.total = checked_sum(entry.total, row.total, tag)?;
        Ok(true)
    }

    fn fold_exempt(&mut self, row: &NormalizedRow) -> Result<bool, TransformError> {
        if row.base < Decimal::ZERO || row.total < Decimal::ZERO {
            return Ok(false);
        }
        let detail = if row.text(TRANSACTION_TYPE) == SALE {
            DETAIL_SHIPMENTS
        } else {
            DETAIL_PRODUCTS
        };
        let key = ExemptKey {
            departure_country: row.text(DEPARTURE_COUNTRY).to_string(),
            buyer: row.non_empty(BUYER_VAT_NUMBER).unwrap_or(NO_TAX_ID).to_string(),
            detail,
        };
        add_row(&mut self.exempt, key, row, CategoryTag::DomesticExempt)?;
        Ok(true)
    }

    fn fold_intra_community(&mut self, row: &NormalizedRow) -> Result<bool, TransformError> {
        let buyer_name = row.text(BUYER_NAME).trim();
        if buyer_name.is_empty() {
            return Ok(false);
        }
        let key = BuyerKey {
            country: row.text(SALE_DEPART_COUNTRY).to_string(),
            buyer_name: buyer_name.to_string(),
            buyer_vat: row.text(BUYER_VAT_NUMBER).trim().to_string(),
        };
        // Exempt supply: VAT is forced to zero and total equals base.
        let totals = Totals::new(row.base, Decimal::ZERO, row.base);
        accumulate(&mut self.intra_community, key, &totals, CategoryTag::IntraCommunity)?;
        Ok(true)
    }

    /// Number of distinct keys held for `tag` (pool counts as one once seen).
    pub fn len(&self, tag: CategoryTag) -> usize {
        match tag {
            CategoryTag::Domestic => self.domestic.len(),
            CategoryTag::DomesticExempt => self.exempt.len(),
            CategoryTag::IntraCommunity => self.intra_community.len(),
            CategoryTag::Oss => self.oss.len(),
            CategoryTag::Ioss => self.ioss.len(),
            CategoryTag::Marketplace => self.marketplace.len(),
            CategoryTag::AmazonPurchases => self.amazon_purchases.len(),
            CategoryTag::Exports => self.exports.len(),
            CategoryTag::UkMarketplacePool => usize::from(self.uk_pool.is_some()),
        }
    }
}

/// "DE - 19.00%" style destination label for OSS keys.
pub fn oss_label(arrival: &str, rate: Decimal) -> String {
    format!("{arrival} - {:.2}%", round_cents(rate * Decimal::ONE_HUNDRED))
}

fn route(row: &NormalizedRow) -> RouteKey {
    RouteKey {
        origin: row.text(SALE_DEPART_COUNTRY).to_string(),
        destination: row.text(SALE_ARRIVAL_COUNTRY).to_string(),
    }
}

fn checked_sum(acc: Decimal, value: Decimal, tag: CategoryTag) -> Result<Decimal, TransformError> {
    acc.checked_add(value)
        .ok_or_else(|| TransformError::overflow(tag.to_string()))
}

fn accumulate<K: Ord>(
    map: &mut BTreeMap<K, Totals>,
    key: K,
    totals: &Totals,
    tag: CategoryTag,
) -> Result<(), TransformError> {
    let entry = map.entry(key).or_default();
    *entry = entry
        .checked_add(totals)
        .ok_or_else(|| TransformError::overflow(tag.to_string()))?;
    Ok(())
}

fn add_row<K: Ord>(
    map: &mut BTreeMap<K, Totals>,
    key: K,
    row: &NormalizedRow,
    tag: CategoryTag,
) -> Result<(), TransformError> {
    accumulate(map, key, &Totals::new(row.base, row.vat, row.total), tag)
}
