//! District types and the data model shared by the shapefile store, the
//! street-file store, the assigner, and the multi-match path.

pub mod assigner;
pub mod cityzip;
pub mod multimatch;
pub mod shapefile;
pub mod streetfile;
pub mod wfs;

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    errors::StatusCode,
    geocode::GeocodedAddress,
};

/// The political/administrative district kinds this service resolves.
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistrictType {
    Senate,
    Assembly,
    Congressional,
    County,
    School,
    Town,
    Election,
    Fire,
    Village,
    City,
}

impl DistrictType {
    /// All district types, in the canonical iteration order used by
    /// `getDistrictInfo`'s set-union and by the consolidation step.
    pub const ALL: [DistrictType; 10] = [
        DistrictType::Senate,
        DistrictType::Assembly,
        DistrictType::Congressional,
        DistrictType::County,
        DistrictType::School,
        DistrictType::Town,
        DistrictType::Election,
        DistrictType::Fire,
        DistrictType::Village,
        DistrictType::City,
    ];

    /// District types whose codes are not globally unique (e.g. school
    /// district "1" exists in many counties), so `cacheDistrictMaps` fetches
    /// their per-code maps on demand instead of bulk-loading them.
    pub fn codes_are_globally_unique(self) -> bool {
        !matches!(self, DistrictType::School | DistrictType::Fire)
    }
}

/// The precision at which district assignment succeeded. Declaration order
/// is the ranking order (`NoMatch` lowest, `House` highest).
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchLevel {
    NoMatch,
    City,
    Zip5,
    Street,
    House,
}

/// One polygon ring, stored as `(lat, lon)` pairs (the wire/GeoJSON format
/// is `(lon, lat)`; this is converted at the store boundary).
pub type Ring = Vec<(f64, f64)>;

/// Geometry type tag mirroring GeoJSON's `Polygon`/`MultiPolygon`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryType {
    Polygon,
    MultiPolygon,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictMetadata {
    pub district_type: DistrictType,
    pub name: String,
    pub code: String,
}

/// A district's boundary geometry, in the internal `(lat, lon)` format.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictMap {
    pub geometry_type: GeometryType,
    pub rings: Vec<Ring>,
    pub metadata: Option<DistrictMetadata>,
}

/// The area of intersection between a set of target districts and a
/// reference region.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictOverlap {
    pub reference_type: DistrictType,
    pub target_type: DistrictType,
    pub reference_codes: Vec<String>,
    pub total_area_sq_meters: f64,
    pub target_area_sq_meters: BTreeMap<String, f64>,
    pub target_intersections: Option<BTreeMap<String, DistrictMap>>,
}

impl DistrictOverlap {
    /// The target codes ordered by descending intersected area, as used to
    /// pick a "best" code when a candidate set collapses to one winner.
    pub fn codes_by_area_desc(&self) -> Vec<String> {
        let mut codes: Vec<(String, f64)> = self
            .target_area_sq_meters
            .iter()
            .map(|(code, area)| (code.clone(), *area))
            .collect();
        codes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        codes.into_iter().map(|(code, _)| code).collect()
    }
}

/// One resolved district entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictEntry {
    pub name: String,
    pub code: String,
    pub map: Option<DistrictMap>,
    /// Great-circle distance, in meters, from the geocode to this
    /// district's boundary.
    pub proximity_meters: Option<f64>,
    pub overlap: Option<DistrictOverlap>,
}

/// The per-type district assignment for a single geocoded address.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictInfo {
    pub districts: BTreeMap<DistrictType, DistrictEntry>,
    /// Districts whose geocode fell within the proximity threshold of the
    /// polygon boundary and which the consolidator could not confirm
    /// against the street-file.
    pub uncertain_districts: HashSet<DistrictType>,
    /// At CITY/ZIP match levels, the unioned boundary of the zips the
    /// multi-match path resolved the address to (there's no dedicated ZIP
    /// polygon layer, so this is a union of CITY-type boundaries).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_map: Option<DistrictMap>,
}

impl DistrictInfo {
    pub fn assigned_districts(&self) -> HashSet<DistrictType> {
        self.districts.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.districts.is_empty()
    }
}

/// A set of district codes per type, as returned by a range/street-file
/// lookup before it's turned into a full `DistrictInfo`.
pub type CodeSetsByType = HashMap<DistrictType, HashSet<String>>;

/// The final outcome of resolving one address or point.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictResult {
    pub geocoded_address: GeocodedAddress,
    pub district_info: DistrictInfo,
    pub match_level: MatchLevel,
    pub status_code: StatusCode,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: time::OffsetDateTime,
    /// Member metadata (senator/assemblyman/etc.) keyed by district code,
    /// attached only when the caller asked for it. The roster lookup
    /// itself is an external collaborator outside this crate's scope; this
    /// is populated through an injected hook, never computed here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<serde_json::Value>,
}

/// Strip leading zeros from a district code, per the leading-zero
/// normalization invariant that applies to every code returned through any
/// public result.
pub fn normalize_code(code: &str) -> String {
    let trimmed = code.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_code_strips_leading_zeros() {
        assert_eq!(normalize_code("041"), "41");
        assert_eq!(normalize_code("00"), "0");
        assert_eq!(normalize_code("7"), "7");
        assert_eq!(normalize_code(""), "0");
    }

    #[test]
    fn codes_by_area_desc_orders_descending() {
        let mut overlap = DistrictOverlap {
            reference_type: DistrictType::County,
            target_type: DistrictType::Senate,
            reference_codes: vec!["1".to_owned()],
            total_area_sq_meters: 100.0,
            target_area_sq_meters: BTreeMap::new(),
            target_intersections: None,
        };
        overlap.target_area_sq_meters.insert("40".to_owned(), 10.0);
        overlap.target_area_sq_meters.insert("41".to_owned(), 90.0);
        assert_eq!(overlap.codes_by_area_desc(), vec!["41", "40"]);
    }

    #[test]
    fn school_and_fire_codes_are_not_globally_unique() {
        assert!(!DistrictType::School.codes_are_globally_unique());
        assert!(!DistrictType::Fire.codes_are_globally_unique());
        assert!(DistrictType::Senate.codes_are_globally_unique());
    }
}
