//! Address types: the raw [`Address`] a caller supplies, and the
//! [`StreetAddress`] that the parser normalizes it into.

mod parser;

pub use parser::parse;

use serde::{Deserialize, Serialize};

/// A raw address as supplied by a caller (query params or a JSON body).
///
/// Either `addr1` or (`city`/`state`/`zip5`) must be populated; see
/// [`Address::is_empty`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub addr1: String,
    #[serde(default)]
    pub addr2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip5: String,
    #[serde(default)]
    pub zip4: String,
    /// Set once this address has been run through [`parse`]; never set by
    /// callers.
    #[serde(default, skip_serializing)]
    pub is_parsed: bool,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.addr1.trim().is_empty()
            && self.addr2.trim().is_empty()
            && self.city.trim().is_empty()
            && self.state.trim().is_empty()
            && self.zip5.trim().is_empty()
    }
}

/// Pre/post directional qualifiers used in street names (`N Pearl St`,
/// `Pearl St NE`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Directional {
    N,
    S,
    E,
    W,
    Ne,
    Nw,
    Se,
    Sw,
}

impl Directional {
    pub fn from_token(token: &str) -> Option<Directional> {
        match token.to_ascii_uppercase().as_str() {
            "N" | "NORTH" => Some(Directional::N),
            "S" | "SOUTH" => Some(Directional::S),
            "E" | "EAST" => Some(Directional::E),
            "W" | "WEST" => Some(Directional::W),
            "NE" | "NORTHEAST" => Some(Directional::Ne),
            "NW" | "NORTHWEST" => Some(Directional::Nw),
            "SE" | "SOUTHEAST" => Some(Directional::Se),
            "SW" | "SOUTHWEST" => Some(Directional::Sw),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Directional::N => "N",
            Directional::S => "S",
            Directional::E => "E",
            Directional::W => "W",
            Directional::Ne => "NE",
            Directional::Nw => "NW",
            Directional::Se => "SE",
            Directional::Sw => "SW",
        }
    }
}

/// A parsed, normalized street address.
///
/// `bldgNum == 0` means "absent" (PO box, city/state/zip-only address).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StreetAddress {
    pub bldg_num: u32,
    pub pre_dir: Option<Directional>,
    /// Upper-case canonical street name, with directionals and the street
    /// type stripped out.
    pub street_name: String,
    /// `ST`, `AVE`, `RD`, ... or `None` if not recognized.
    pub street_type: Option<String>,
    pub post_dir: Option<Directional>,
    pub unit_type: Option<String>,
    pub unit_num: Option<String>,
    pub city: String,
    pub state: String,
    pub zip5: String,
    pub zip4: String,
    pub po_box: Option<u32>,
}

impl StreetAddress {
    /// Matches the cache's "cacheable" predicate from the lifecycle
    /// invariant: exactly one of {street populated, PO box populated,
    /// city+state or zip5 only} holds for any address worth caching.
    pub fn is_cacheable(&self) -> bool {
        self.is_street_address() || self.is_po_box_like()
    }

    pub fn is_street_address(&self) -> bool {
        self.po_box.is_none() && self.bldg_num > 0 && !self.street_name.is_empty()
    }

    pub fn is_po_box_like(&self) -> bool {
        self.po_box.is_some()
            || (self.street_name.is_empty()
                && self.bldg_num == 0
                && ((!self.city.is_empty() && !self.state.is_empty())
                    || !self.zip5.is_empty()))
    }

    pub fn is_retrievable(&self) -> bool {
        (!self.street_name.is_empty() && self.bldg_num > 0)
            || (self.street_name.is_empty()
                && ((!self.city.is_empty() && !self.state.is_empty())
                    || !self.zip5.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> StreetAddress {
        StreetAddress {
            bldg_num: 0,
            pre_dir: None,
            street_name: String::new(),
            street_type: None,
            post_dir: None,
            unit_type: None,
            unit_num: None,
            city: String::new(),
            state: String::new(),
            zip5: String::new(),
            zip4: String::new(),
            po_box: None,
        }
    }

    #[test]
    fn directional_from_token_is_case_insensitive() {
        assert_eq!(Directional::from_token("ne"), Some(Directional::Ne));
        assert_eq!(Directional::from_token("North"), Some(Directional::N));
        assert_eq!(Directional::from_token("xyz"), None);
    }

    #[test]
    fn street_address_is_cacheable_covers_street_and_po_box() {
        let mut street = blank();
        street.bldg_num = 200;
        street.street_name = "STATE".to_owned();
        assert!(street.is_street_address());
        assert!(street.is_cacheable());

        let mut po_box = blank();
        po_box.po_box = Some(7016);
        po_box.city = "ALBANY".to_owned();
        po_box.state = "NY".to_owned();
        assert!(po_box.is_po_box_like());
        assert!(po_box.is_cacheable());

        let empty = blank();
        assert!(!empty.is_cacheable());
    }

    #[test]
    fn is_retrievable_matches_cache_lookup_rule() {
        let mut street = blank();
        street.street_name = "STATE".to_owned();
        street.bldg_num = 200;
        assert!(street.is_retrievable());

        let mut city_state = blank();
        city_state.city = "ALBANY".to_owned();
        city_state.state = "NY".to_owned();
        assert!(city_state.is_retrievable());

        let mut zip_only = blank();
        zip_only.zip5 = "12210".to_owned();
        assert!(zip_only.is_retrievable());

        assert!(!blank().is_retrievable());
    }
}
