use rust_decimal::Decimal;
use tracing::debug;

use crate::aggregate::CategoryAggregates;
use crate::tables::{UK_ALLOCATION_FACTOR, UK_ALLOCATION_TARGETS};

/// Replace the no-VAT column of each target jurisdiction with a share of the
/// UK marketplace pool.
///
/// Must run after every row is folded. Targets without a domestic aggregate
/// are left absent. Returns the allocated amount, or `None` when no row fed
/// the pool.
pub fn allocate_uk_pool(aggs: &mut CategoryAggregates) -> Option<Decimal> {
    let pool = aggs.uk_pool?;
    let allocation = pool * UK_ALLOCATION_FACTOR;

    for name in UK_ALLOCATION_TARGETS {
        if let Some(entry) = aggs.domestic.get_mut(name) {
            debug!(jurisdiction = name, %allocation, replaced = %entry.no_vat, "uk pool allocation");
            entry.no_vat = allocation;
        }
    }
    Some(allocation)
}
