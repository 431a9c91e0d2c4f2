use rust_decimal::Decimal;

use crate::model::{CategoryTag, NormalizedRow, RawRow};
use crate::tables::{
    is_eu, is_export_hub, AMAZON_SUPPLIER, BUYER_VAT_NUMBER_COUNTRY, GREAT_BRITAIN,
    RESPONSIBILITY_MARKETPLACE, RESPONSIBILITY_SELLER, RETURN, SALE_ARRIVAL_COUNTRY,
    SALE_DEPART_COUNTRY, SCHEME_DEEMED_RESELLER_IOSS, SCHEME_REGULAR, SCHEME_UK_VOEC_DOMESTIC,
    SCHEME_UNION_OSS, SUPPLIER_NAME, TAX_COLLECTION_RESPONSIBILITY, TAX_REPORTING_SCHEME,
    TOTAL_ACTIVITY_VALUE_VAT_AMT, TRANSACTION_TYPE,
};

/// RETURN rows are excluded before classification and never aggregated.
pub fn is_return(row: &RawRow) -> bool {
    row.text(TRANSACTION_TYPE) == RETURN
}

/// The fields the rule cascade looks at.
#[derive(Debug, Clone, Copy)]
struct Facts<'a> {
    depart: &'a str,
    arrival: &'a str,
    buyer_vat_country: Option<&'a str>,
    vat_amount: Decimal,
    scheme: Option<&'a str>,
    responsibility: Option<&'a str>,
    supplier: &'a str,
}

impl<'a> Facts<'a> {
    fn of(row: &'a NormalizedRow) -> Self {
        Self {
            depart: row.text(SALE_DEPART_COUNTRY),
            arrival: row.text(SALE_ARRIVAL_COUNTRY),
            buyer_vat_country: row.non_empty(BUYER_VAT_NUMBER_COUNTRY),
            vat_amount: row.amount(TOTAL_ACTIVITY_VALUE_VAT_AMT),
            scheme: row.non_empty(TAX_REPORTING_SCHEME),
            responsibility: row.non_empty(TAX_COLLECTION_RESPONSIBILITY),
            supplier: row.text(SUPPLIER_NAME),
        }
    }

    fn scheme_is(&self, scheme: &str) -> bool {
        self.scheme == Some(scheme)
    }

    fn responsibility_is(&self, party: &str) -> bool {
        self.responsibility == Some(party)
    }

    fn cross_border_eu(&self) -> bool {
        self.depart != self.arrival && is_eu(self.depart) && is_eu(self.arrival)
    }
}

/// Map a row to its category tags, in evaluation order.
///
/// Independent rules run first and may co-occur with anything. At most one
/// exclusive rule then fires, first match wins.
pub fn classify(row: &NormalizedRow) -> Vec<CategoryTag> {
    let facts = Facts::of(row);
    let mut tags = independent_tags(&facts);
    if let Some(tag) = exclusive_tag(&facts) {
        tags.push(tag);
    }
    tags
}

fn independent_tags(f: &Facts<'_>) -> Vec<CategoryTag> {
    let mut tags = Vec::with_capacity(2);
    if f.scheme_is(SCHEME_REGULAR) && f.responsibility_is(RESPONSIBILITY_SELLER) {
        tags.push(CategoryTag::Domestic);
    }
    if f.scheme_is(SCHEME_UK_VOEC_DOMESTIC) && f.responsibility_is(RESPONSIBILITY_MARKETPLACE) {
        tags.push(CategoryTag::UkMarketplacePool);
    }
    tags
}

fn exclusive_tag(f: &Facts<'_>) -> Option<CategoryTag> {
    let seller = f.responsibility_is(RESPONSIBILITY_SELLER);

    if f.depart == f.arrival && f.vat_amount.is_zero() && f.buyer_vat_country.is_none() && seller
    {
        Some(CategoryTag::DomesticExempt)
    } else if f.cross_border_eu()
        && f.depart != GREAT_BRITAIN
        && f.arrival != GREAT_BRITAIN
        && f.buyer_vat_country.is_some()
        && seller
        && f.scheme_is(SCHEME_REGULAR)
        && f.vat_amount.is_zero()
    {
        Some(CategoryTag::IntraCommunity)
    } else if f.scheme_is(SCHEME_UNION_OSS) {
        Some(CategoryTag::Oss)
    } else if f.scheme_is(SCHEME_DEEMED_RESELLER_IOSS) && f.cross_border_eu() {
        Some(CategoryTag::Ioss)
    } else if f.responsibility_is(RESPONSIBILITY_MARKETPLACE) {
        Some(CategoryTag::Marketplace)
    } else if f.supplier == AMAZON_SUPPLIER {
        Some(CategoryTag::AmazonPurchases)
    } else if is_export_hub(f.depart) && !is_export_hub(f.arrival) {
        Some(CategoryTag::Exports)
    } else {
        None
    }
}
