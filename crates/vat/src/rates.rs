use std::collections::BTreeMap;
use std::fmt::Write as _;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::tables::BASE_CURRENCY;

/// Read-only lookup of currency→EUR multipliers and destination OSS rates.
///
/// ```toml
/// [exchange_rates]
/// PLN = 0.319033
///
/// [oss_vat_rates]
/// DE = 0.19
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    #[serde(default)]
    pub exchange_rates: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub oss_vat_rates: BTreeMap<String, Decimal>,
}

const fn fraction(units: u32, scale: u32) -> Decimal {
    Decimal::from_parts(units, 0, 0, false, scale)
}

const LEGACY_EXCHANGE_RATES: [(&str, Decimal); 4] = [
    ("PLN", fraction(319033, 6)),
    ("EUR", fraction(1, 0)),
    ("SEK", fraction(87, 3)),
    ("GBP", fraction(1169827, 6)),
];

const LEGACY_OSS_RATES: [(&str, Decimal); 25] = [
    ("AT", fraction(20, 2)),
    ("BE", fraction(21, 2)),
    ("BG", fraction(20, 2)),
    ("CY", fraction(19, 2)),
    ("CZ", fraction(21, 2)),
    ("DE", fraction(19, 2)),
    ("DK", fraction(25, 2)),
    ("EE", fraction(20, 2)),
    ("ES", fraction(21, 2)),
    ("FI", fraction(24, 2)),
    ("FR", fraction(20, 2)),
    ("GR", fraction(24, 2)),
    ("HR", fraction(25, 2)),
    ("HU", fraction(27, 2)),
    ("IE", fraction(23, 2)),
    ("IT", fraction(22, 2)),
    ("LT", fraction(21, 2)),
    ("LU", fraction(17, 2)),
    ("LV", fraction(21, 2)),
    ("NL", fraction(21, 2)),
    ("PL", fraction(23, 2)),
    ("PT", fraction(23, 2)),
    ("RO", fraction(19, 2)),
    ("SE", fraction(25, 2)),
    ("SI", fraction(22, 2)),
];

impl Default for RateTable {
    fn default() -> Self {
        Self::legacy()
    }
}

impl RateTable {
    /// Built-in table used when no rate file is supplied.
    pub fn legacy() -> Self {
        Self {
            exchange_rates: LEGACY_EXCHANGE_RATES
                .iter()
                .map(|(code, rate)| (code.to_string(), *rate))
                .collect(),
            oss_vat_rates: LEGACY_OSS_RATES
                .iter()
                .map(|(code, rate)| (code.to_string(), *rate))
                .collect(),
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, TransformError> {
        let table: RateTable =
            toml::from_str(input).map_err(|e| TransformError::RateConfig(e.to_string()))?;
        table.validated()
    }

    /// Normalize codes to upper case, check rates, and pin EUR at 1.
    pub fn validated(self) -> Result<Self, TransformError> {
        let mut exchange_rates = normalize_codes("exchange_rates", self.exchange_rates)?;
        let oss_vat_rates = normalize_codes("oss_vat_rates", self.oss_vat_rates)?;

        match exchange_rates.get(BASE_CURRENCY) {
            Some(rate) if *rate != Decimal::ONE => {
                return Err(TransformError::RateConfig(format!(
                    "exchange_rates.{BASE_CURRENCY} must be 1, got {rate}"
                )));
            }
            Some(_) => {}
            None => {
                exchange_rates.insert(BASE_CURRENCY.to_string(), Decimal::ONE);
            }
        }

        Ok(Self {
            exchange_rates,
            oss_vat_rates,
        })
    }

    pub fn exchange_rate(&self, currency: &str) -> Option<Decimal> {
        self.exchange_rates.get(currency).copied()
    }

    pub fn oss_rate(&self, country: &str) -> Option<Decimal> {
        self.oss_vat_rates.get(country).copied()
    }

    /// Render as TOML with bare numeric literals.
    pub fn to_toml(&self) -> String {
        let mut out = String::from("[exchange_rates]\n");
        for (code, rate) in &self.exchange_rates {
            let _ = writeln!(out, "{code} = {}", literal(*rate));
        }
        out.push_str("\n[oss_vat_rates]\n");
        for (code, rate) in &self.oss_vat_rates {
            let _ = writeln!(out, "{code} = {}", literal(*rate));
        }
        out
    }
}

fn normalize_codes(
    section: &str,
    rates: BTreeMap<String, Decimal>,
) -> Result<BTreeMap<String, Decimal>, TransformError> {
    let mut out = BTreeMap::new();
    for (code, rate) in rates {
        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Err(TransformError::RateConfig(format!("{section}: empty code")));
        }
        if rate < Decimal::ZERO {
            return Err(TransformError::RateConfig(format!(
                "{section}.{code}: rate must be non-negative, got {rate}"
            )));
        }
        if out.insert(code.clone(), rate).is_some() {
            return Err(TransformError::RateConfig(format!(
                "{section}: duplicate code '{code}'"
            )));
        }
    }
    Ok(out)
}

/// TOML float literal: always carries a fractional part.
fn literal(rate: Decimal) -> String {
    let text = rate.normalize().to_string();
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}
