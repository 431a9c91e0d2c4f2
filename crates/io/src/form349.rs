//! Form 349 (recapitulative statement of intra-community supplies) export.
//!
//! One record per intra-community buyer key, `;`-separated, CRLF-terminated,
//! encoded as Windows-1252 for the filing portal.

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::{Decimal, RoundingStrategy};
use taxgrid_vat::model::{BuyerKey, Totals};
use taxgrid_vat::TransformError;

use crate::write_atomic;

const OPERATION_KEY: &str = "31";
const DELIVERY_TERMS: &str = "FOB";
const TRANSPORT_MODE: &str = "11";
const NATURE: &str = "3";
const COMMODITY_CODE: &str = "85182190";
const UNITS: &str = "1";

/// Problems that would make a filing invalid. Empty when the data is fileable.
pub fn validate_form349(intra: &BTreeMap<BuyerKey, Totals>) -> Vec<String> {
    let mut issues = Vec::new();
    for (key, totals) in intra {
        let label = format!("{} / {} / {}", key.country, key.buyer_name, key.buyer_vat);
        if key.buyer_name.trim().is_empty() {
            issues.push(format!("Empty buyer name for key: {label}"));
        }
        if key.buyer_vat.trim().is_empty() {
            issues.push(format!("Empty buyer VAT for key: {label}"));
        }
        if totals.base < Decimal::ZERO {
            issues.push(format!("Negative base amount for key: {label}"));
        }
    }
    issues
}

/// Field values of one record.
pub fn form349_record(key: &BuyerKey, totals: &Totals) -> [String; 14] {
    let amount = decimal_comma(totals.base);
    [
        key.buyer_vat.chars().take(2).collect(),
        OPERATION_KEY.to_string(),
        DELIVERY_TERMS.to_string(),
        TRANSPORT_MODE.to_string(),
        NATURE.to_string(),
        String::new(),
        COMMODITY_CODE.to_string(),
        key.country.clone(),
        UNITS.to_string(),
        totals.base.trunc().to_string(),
        totals.vat.trunc().to_string(),
        amount.clone(),
        amount,
        key.buyer_vat.clone(),
    ]
}

/// Encode all records. No intra-community data gives an empty buffer.
pub fn render_form349(intra: &BTreeMap<BuyerKey, Totals>) -> Result<Vec<u8>, TransformError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .terminator(csv::Terminator::CRLF)
        .has_headers(false)
        .from_writer(Vec::new());
    for (key, totals) in intra {
        writer
            .write_record(form349_record(key, totals))
            .map_err(|e| TransformError::Report(e.to_string()))?;
    }
    let utf8 = writer
        .into_inner()
        .map_err(|e| TransformError::Report(e.to_string()))?;
    let text = String::from_utf8(utf8).map_err(|e| TransformError::Report(e.to_string()))?;
    let (encoded, _, _) = encoding_rs::WINDOWS_1252.encode(&text);
    Ok(encoded.into_owned())
}

/// Validate, render and save. Refuses to write when validation fails.
pub fn write_form349(intra: &BTreeMap<BuyerKey, Totals>, path: &Path) -> Result<usize, TransformError> {
    let issues = validate_form349(intra);
    if !issues.is_empty() {
        return Err(TransformError::Report(issues.join("; ")));
    }
    write_atomic(path, &render_form349(intra)?)?;
    Ok(intra.len())
}

fn decimal_comma(d: Decimal) -> String {
    let rounded = d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.2}").replace('.', ",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn key(name: &str, vat: &str) -> BuyerKey {
        BuyerKey {
            country: "ES".into(),
            buyer_name: name.into(),
            buyer_vat: vat.into(),
        }
    }

    #[test]
    fn record_layout() {
        let record = form349_record(&key("Dupont SA", "FR12345"), &Totals::new(dec!(1234.567), dec!(0), dec!(1234.567)));
        assert_eq!(
            record.join(";"),
            "FR;31;FOB;11;3;;85182190;ES;1;1234;0;1234,57;1234,57;FR12345"
        );
    }

    #[test]
    fn integer_fields_truncate() {
        let record = form349_record(&key("A", "DE1"), &Totals::new(dec!(99.99), dec!(19.99), dec!(119.98)));
        assert_eq!(record[9], "99");
        assert_eq!(record[10], "19");
        assert_eq!(record[11], "99,99");
    }

    #[test]
    fn render_encodes_windows_1252_with_crlf() {
        let mut intra = BTreeMap::new();
        intra.insert(key("Müller GmbH", "DEÑ99"), Totals::new(dec!(10), dec!(0), dec!(10)));
        intra.insert(key("Dupont", "FR1"), Totals::new(dec!(5), dec!(0), dec!(5)));
        let bytes = render_form349(&intra).unwrap();
        let lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
        // two records, each ending "\r\n"
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(b"FR;"));
        assert!(lines[0].ends_with(b"\r"));
        assert!(lines[1].starts_with(b"DE;"));
        assert!(lines[1].ends_with(b";DE\xD199\r"));
        assert!(lines[2].is_empty());
    }

    #[test]
    fn empty_data_renders_nothing() {
        assert!(render_form349(&BTreeMap::new()).unwrap().is_empty());
    }

    #[test]
    fn validation_messages() {
        let mut intra = BTreeMap::new();
        intra.insert(key("", "FR1"), Totals::new(dec!(1), dec!(0), dec!(1)));
        intra.insert(key("B", ""), Totals::new(dec!(-1), dec!(0), dec!(-1)));
        let issues = validate_form349(&intra);
        assert_eq!(issues.len(), 3);
        assert!(issues[0].starts_with("Empty buyer name for key:"));
        assert!(issues[1].starts_with("Empty buyer VAT for key:"));
        assert!(issues[2].starts_with("Negative base amount for key:"));
    }
}
