//! Address parsing: turn a raw [`Address`] into a [`StreetAddress`].
//!
//! Grounded on the teacher's `libpostal` geocoder (calling
//! `libpostal_rust::parse_address` on a joined address string) and its
//! `Normalizer` decorator (which maps libpostal's component names back onto
//! address fields: `po_box`, `house_number`, `house`, `road`, `unit`, ...).
//! Here the same component map feeds a [`StreetAddress`] instead of a flat
//! `Address`.

use libpostal_rust::{parse_address, ParseAddressOptions};

use crate::Result;

use super::{Address, Directional, StreetAddress};

static STREET_TYPE_SUFFIXES: &[(&str, &str)] = &[
    ("STREET", "ST"),
    ("AVENUE", "AVE"),
    ("BOULEVARD", "BLVD"),
    ("ROAD", "RD"),
    ("DRIVE", "DR"),
    ("LANE", "LN"),
    ("COURT", "CT"),
    ("PLACE", "PL"),
    ("TERRACE", "TER"),
    ("CIRCLE", "CIR"),
    ("PARKWAY", "PKWY"),
    ("HIGHWAY", "HWY"),
    ("SQUARE", "SQ"),
    ("TRAIL", "TRL"),
    ("WAY", "WAY"),
];

static UNIT_TYPES: &[&str] = &[
    "APT", "APARTMENT", "UNIT", "STE", "SUITE", "FL", "FLOOR", "RM", "ROOM", "BLDG",
];

/// Parse a raw `Address` into a `StreetAddress`.
///
/// Runs libpostal over the joined address line to split out the building
/// number, directionals, street name/type, and unit, then layers the
/// caller-supplied city/state/zip on top (libpostal's own locality guesses
/// are less reliable than fields the caller already typed in separately).
pub fn parse(address: &Address) -> Result<StreetAddress> {
    if let Some(box_num) = extract_po_box(&address.addr1) {
        return Ok(StreetAddress {
            bldg_num: 0,
            pre_dir: None,
            street_name: String::new(),
            street_type: None,
            post_dir: None,
            unit_type: None,
            unit_num: None,
            city: address.city.trim().to_uppercase(),
            state: address.state.trim().to_uppercase(),
            zip5: address.zip5.trim().to_owned(),
            zip4: address.zip4.trim().to_owned(),
            po_box: Some(box_num),
        });
    }

    let line = format!(
        "{} {} {} {} {}",
        address.addr1, address.addr2, address.city, address.state, address.zip5
    );
    let opts = ParseAddressOptions::default();
    let components = parse_address(&line, &opts)?;

    let bldg_num = components
        .get("house_number")
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);

    let mut road_tokens: Vec<&str> = components
        .get("road")
        .map(|s| s.split_whitespace().collect())
        .unwrap_or_default();

    let pre_dir = road_tokens
        .first()
        .and_then(|t| Directional::from_token(t))
        .inspect(|_| {
            road_tokens.remove(0);
        });

    let post_dir = road_tokens
        .last()
        .and_then(|t| Directional::from_token(t))
        .inspect(|_| {
            road_tokens.pop();
        });

    let street_type = road_tokens
        .last()
        .and_then(|t| canonical_street_type(t))
        .inspect(|_| {
            road_tokens.pop();
        });

    let street_name = road_tokens.join(" ").to_uppercase();

    let (unit_type, unit_num) = components
        .get("unit")
        .map(|unit| split_unit(unit))
        .unwrap_or((None, None));

    Ok(StreetAddress {
        bldg_num,
        pre_dir,
        street_name,
        street_type,
        post_dir,
        unit_type,
        unit_num,
        city: components
            .get("city")
            .cloned()
            .unwrap_or_else(|| address.city.clone())
            .to_uppercase(),
        state: components
            .get("state")
            .cloned()
            .unwrap_or_else(|| address.state.clone())
            .to_uppercase(),
        zip5: extract_zip5(components.get("postcode"), &address.zip5),
        zip4: address.zip4.trim().to_owned(),
        po_box: None,
    })
}

fn canonical_street_type(token: &str) -> Option<String> {
    let upper = token.to_uppercase();
    STREET_TYPE_SUFFIXES
        .iter()
        .find(|(long, short)| *long == upper || *short == upper)
        .map(|(_, short)| (*short).to_owned())
}

fn split_unit(unit: &str) -> (Option<String>, Option<String>) {
    let upper = unit.to_uppercase();
    for &unit_type in UNIT_TYPES {
        if let Some(rest) = upper.strip_prefix(unit_type) {
            let num = rest.trim();
            return (
                Some(unit_type.to_owned()),
                (!num.is_empty()).then(|| num.to_owned()),
            );
        }
    }
    (None, Some(upper))
}

/// Recognize `PO Box 7016`, `P.O. Box 7016`, `Box 7016`, case-insensitively.
fn extract_po_box(addr1: &str) -> Option<u32> {
    let normalized = addr1
        .to_uppercase()
        .replace('.', "")
        .replace("P O", "PO");
    let rest = normalized
        .strip_prefix("PO BOX")
        .or_else(|| normalized.strip_prefix("BOX"))?;
    rest.trim().parse::<u32>().ok()
}

fn extract_zip5(parsed: Option<&String>, fallback: &str) -> String {
    let candidate = parsed.map(|s| s.as_str()).unwrap_or(fallback);
    candidate.chars().take(5).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(addr1: &str, city: &str, state: &str, zip5: &str) -> Address {
        Address {
            addr1: addr1.to_owned(),
            addr2: String::new(),
            city: city.to_owned(),
            state: state.to_owned(),
            zip5: zip5.to_owned(),
            zip4: String::new(),
            is_parsed: false,
        }
    }

    #[test]
    fn recognizes_po_box_variants() {
        assert_eq!(extract_po_box("PO Box 7016"), Some(7016));
        assert_eq!(extract_po_box("P.O. Box 7016"), Some(7016));
        assert_eq!(extract_po_box("Box 7016"), Some(7016));
        assert_eq!(extract_po_box("200 State St"), None);
    }

    #[test]
    fn parse_builds_po_box_street_address_without_libpostal() {
        let address = addr("PO Box 7016", "Albany", "NY", "12225");
        let parsed = parse(&address).unwrap();
        assert_eq!(parsed.po_box, Some(7016));
        assert_eq!(parsed.city, "ALBANY");
        assert_eq!(parsed.state, "NY");
        assert_eq!(parsed.zip5, "12225");
        assert!(parsed.is_po_box_like());
    }

    #[test]
    fn canonical_street_type_normalizes_long_and_short_forms() {
        assert_eq!(canonical_street_type("street"), Some("ST".to_owned()));
        assert_eq!(canonical_street_type("ST"), Some("ST".to_owned()));
        assert_eq!(canonical_street_type("blvd"), Some("BLVD".to_owned()));
        assert_eq!(canonical_street_type("xyz"), None);
    }
}
