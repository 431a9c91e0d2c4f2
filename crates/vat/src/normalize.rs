use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::model::{Conversion, NormalizedRow, ParseFailure, RawRow};
use crate::rates::RateTable;
use crate::tables::{
    numeric_index, BASE_CURRENCY, NUMERIC_COLUMNS, TRANSACTION_CURRENCY_CODE, VAT_COLUMNS,
    VAT_EXCL_COLUMNS, VAT_INCL_COLUMNS,
};

/// Round to cents, halves away from zero.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse an amount field. Accepts plain and scientific notation.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let t = text.trim();
    Decimal::from_str(t)
        .or_else(|_| Decimal::from_scientific(t))
        .ok()
}

/// Text recorded for a derived sum that does not fit in a decimal.
const OVERFLOW_TEXT: &str = "overflow";

/// Parse numeric columns, convert to EUR, and derive base / VAT / total.
///
/// Empty or absent amounts are zero. Text that is not a number is also zero
/// and is reported in `parse_failures`, as is an amount or sum that
/// overflows. A blank currency code stays blank and is never EUR.
pub fn normalize(raw: RawRow, rates: &RateTable) -> NormalizedRow {
    let mut amounts = [Decimal::ZERO; NUMERIC_COLUMNS.len()];
    let mut parse_failures = Vec::new();

    for (i, column) in NUMERIC_COLUMNS.iter().copied().enumerate() {
        let text = raw.text(column);
        if text.trim().is_empty() {
            continue;
        }
        match parse_amount(text) {
            Some(value) => amounts[i] = value,
            None => parse_failures.push(ParseFailure {
                column,
                text: text.to_string(),
            }),
        }
    }

    let original_currency = raw.text(TRANSACTION_CURRENCY_CODE).trim().to_string();

    let (currency, conversion) = if original_currency == BASE_CURRENCY {
        (original_currency.clone(), Conversion::NotNeeded)
    } else if let Some(rate) = rates.exchange_rate(&original_currency) {
        for (amount, column) in amounts.iter_mut().zip(NUMERIC_COLUMNS) {
            match amount.checked_mul(rate) {
                Some(converted) => *amount = round_cents(converted),
                None => {
                    parse_failures.push(ParseFailure {
                        column,
                        text: raw.text(column).to_string(),
                    });
                    *amount = Decimal::ZERO;
                }
            }
        }
        (BASE_CURRENCY.to_string(), Conversion::Converted)
    } else {
        (original_currency.clone(), Conversion::MissingRate)
    };

    let mut sum = |name: &'static str, columns: &[&str]| -> Decimal {
        let summed = columns
            .iter()
            .filter_map(|c| numeric_index(c))
            .try_fold(Decimal::ZERO, |acc, i| acc.checked_add(amounts[i]));
        summed.unwrap_or_else(|| {
            parse_failures.push(ParseFailure {
                column: name,
                text: OVERFLOW_TEXT.to_string(),
            });
            Decimal::ZERO
        })
    };
    let base = sum("base", &VAT_EXCL_COLUMNS[..]);
    let vat = sum("vat", &VAT_COLUMNS[..]);
    let total = sum("total", &VAT_INCL_COLUMNS[..]);

    NormalizedRow {
        raw,
        amounts,
        original_currency,
        currency,
        conversion,
        base,
        vat,
        total,
        parse_failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rates() -> RateTable {
        RateTable::legacy()
    }

    #[test]
    fn groups_sum_into_totals() {
        let row = RawRow::from_pairs(&[
            ("TRANSACTION_CURRENCY_CODE", "EUR"),
            ("PRICE_OF_ITEMS_AMT_VAT_EXCL", "100"),
            ("SHIP_CHARGE_AMT_VAT_EXCL", "5.50"),
            ("PROMO_SHIP_CHARGE_AMT_VAT_EXCL", "-5.50"),
            ("PRICE_OF_ITEMS_VAT_AMT", "21"),
            ("PRICE_OF_ITEMS_AMT_VAT_INCL", "121"),
            ("TOTAL_PRICE_OF_ITEMS_AMT_VAT_EXCL", "999"),
        ]);
        let n = normalize(row, &rates());
        assert_eq!(n.base, dec!(100));
        assert_eq!(n.vat, dec!(21));
        assert_eq!(n.total, dec!(121));
        assert_eq!(n.total, n.base + n.vat);
        assert_eq!(n.amount("TOTAL_PRICE_OF_ITEMS_AMT_VAT_EXCL"), dec!(999));
        assert_eq!(n.conversion, Conversion::NotNeeded);
        assert!(n.parse_failures.is_empty());
    }

    #[test]
    fn pln_converts_and_rounds() {
        let row = RawRow::from_pairs(&[
            ("TRANSACTION_CURRENCY_CODE", "PLN"),
            ("PRICE_OF_ITEMS_AMT_VAT_EXCL", "100"),
        ]);
        let n = normalize(row, &rates());
        assert_eq!(n.base, dec!(31.90));
        assert_eq!(n.currency, "EUR");
        assert_eq!(n.original_currency, "PLN");
        assert_eq!(n.conversion, Conversion::Converted);
    }

    #[test]
    fn each_column_rounds_before_summing() {
        // 0.05 * 0.087 = 0.00435 -> 0.00, twice.
        let row = RawRow::from_pairs(&[
            ("TRANSACTION_CURRENCY_CODE", "SEK"),
            ("PRICE_OF_ITEMS_AMT_VAT_EXCL", "0.05"),
            ("SHIP_CHARGE_AMT_VAT_EXCL", "0.05"),
        ]);
        let n = normalize(row, &rates());
        assert_eq!(n.base, dec!(0));
    }

    #[test]
    fn unknown_currency_left_unconverted() {
        let row = RawRow::from_pairs(&[
            ("TRANSACTION_CURRENCY_CODE", "USD"),
            ("PRICE_OF_ITEMS_AMT_VAT_EXCL", "10"),
        ]);
        let n = normalize(row, &rates());
        assert_eq!(n.base, dec!(10));
        assert_eq!(n.currency, "USD");
        assert_eq!(n.conversion, Conversion::MissingRate);
    }

    #[test]
    fn blank_currency_is_not_eur() {
        let row = RawRow::from_pairs(&[("PRICE_OF_ITEMS_AMT_VAT_EXCL", "10")]);
        let n = normalize(row, &rates());
        assert_eq!(n.original_currency, "");
        assert_eq!(n.currency, "");
        assert_eq!(n.conversion, Conversion::MissingRate);
        assert_eq!(n.base, dec!(10));

        let row = RawRow::from_pairs(&[("TRANSACTION_CURRENCY_CODE", " "), ("PRICE_OF_ITEMS_AMT_VAT_EXCL", "10")]);
        assert_eq!(normalize(row, &rates()).conversion, Conversion::MissingRate);
    }

    #[test]
    fn conversion_overflow_is_zero_with_failure() {
        let row = RawRow::from_pairs(&[
            ("TRANSACTION_CURRENCY_CODE", "USD"),
            ("PRICE_OF_ITEMS_AMT_VAT_EXCL", "79228162514264337593543950335"),
            ("SHIP_CHARGE_AMT_VAT_EXCL", "10"),
        ]);
        let rates = RateTable::from_toml("[exchange_rates]\nUSD = 2.0\n").unwrap();
        let n = normalize(row, &rates);
        assert_eq!(n.conversion, Conversion::Converted);
        assert_eq!(n.amount("PRICE_OF_ITEMS_AMT_VAT_EXCL"), dec!(0));
        assert_eq!(n.base, dec!(20));
        assert_eq!(n.parse_failures.len(), 1);
        assert_eq!(n.parse_failures[0].column, "PRICE_OF_ITEMS_AMT_VAT_EXCL");
    }

    #[test]
    fn overflowing_sum_is_zero_with_failure() {
        let row = RawRow::from_pairs(&[
            ("TRANSACTION_CURRENCY_CODE", "EUR"),
            ("PRICE_OF_ITEMS_AMT_VAT_EXCL", "79228162514264337593543950335"),
            ("SHIP_CHARGE_AMT_VAT_EXCL", "1"),
            ("PRICE_OF_ITEMS_VAT_AMT", "5"),
        ]);
        let n = normalize(row, &rates());
        assert_eq!(n.base, dec!(0));
        assert_eq!(n.vat, dec!(5));
        assert_eq!(n.parse_failures.len(), 1);
        assert_eq!(n.parse_failures[0].column, "base");
        assert_eq!(n.parse_failures[0].text, OVERFLOW_TEXT);
    }

    #[test]
    fn garbage_is_zero_with_failure() {
        let row = RawRow::from_pairs(&[
            ("PRICE_OF_ITEMS_AMT_VAT_EXCL", "abc"),
            ("SHIP_CHARGE_AMT_VAT_EXCL", "  "),
            ("GIFT_WRAP_AMT_VAT_EXCL", "1e1"),
        ]);
        let n = normalize(row, &rates());
        assert_eq!(n.base, dec!(10));
        assert_eq!(n.parse_failures.len(), 1);
        assert_eq!(n.parse_failures[0].column, "PRICE_OF_ITEMS_AMT_VAT_EXCL");
        assert_eq!(n.parse_failures[0].text, "abc");
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_cents(dec!(0.125)), dec!(0.13));
        assert_eq!(round_cents(dec!(-0.125)), dec!(-0.13));
    }
}
