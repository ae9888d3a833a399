//! Geocodes: the `(lat, lon, quality, method)` records produced by
//! geocoding an address or reverse-geocoding a point.

pub mod cache;
pub mod pipeline;

use serde::{Deserialize, Serialize};

use crate::addresses::Address;

/// Geocode precision, in ascending order. `HOUSE` is the building-level
/// threshold used throughout the resolution pipeline; most comparisons are
/// `quality >= Quality::House`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    Unknown,
    State,
    County,
    City,
    Zip,
    Street,
    House,
    Point,
}

/// A geocoded point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geocode {
    pub lat: f64,
    pub lon: f64,
    /// The provider tag that produced this geocode (`"usps"`, `"tiger"`,
    /// `"cache"`, ...).
    pub method: String,
    pub quality: Quality,
    pub cached: bool,
}

impl Geocode {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// An `Address` paired with its `Geocode`. Either half may be empty/null;
/// the pair is valid iff both halves pass their own validity check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeocodedAddress {
    pub address: Address,
    pub geocode: Option<Geocode>,
}

impl GeocodedAddress {
    pub fn is_valid(&self) -> bool {
        !self.address.is_empty()
            && self.geocode.as_ref().is_some_and(Geocode::is_valid)
    }

    pub fn quality(&self) -> Quality {
        self.geocode
            .as_ref()
            .map(|g| g.quality)
            .unwrap_or(Quality::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_is_totally_ordered_house_threshold() {
        assert!(Quality::House >= Quality::House);
        assert!(Quality::Point >= Quality::House);
        assert!(Quality::Street < Quality::House);
        assert!(Quality::Zip < Quality::House);
    }

    #[test]
    fn geocode_is_valid_rejects_out_of_range_coordinates() {
        let mut geocode = Geocode {
            lat: 42.6526,
            lon: -73.7562,
            method: "usps".to_owned(),
            quality: Quality::House,
            cached: false,
        };
        assert!(geocode.is_valid());
        geocode.lat = 200.0;
        assert!(!geocode.is_valid());
    }
}
