//! Consolidates the shapefile store's point-in-polygon result with the
//! street-file's tabular result into one `DistrictInfo`.
//!
//! The two stores are queried concurrently (`tokio::join!`), matching the
//! "runs both in parallel" wording of the district-resolution step. The
//! actual reconciliation is split into a separate, synchronous
//! `consolidate` function so that it stays a pure function of its inputs:
//! any "nearby district" candidates it might need are fetched by `assign`
//! beforehand and handed in as plain data.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    district::{
        shapefile::{NearbyDistrictEntry, ShapefileStore},
        streetfile::StreetFileStore,
        DistrictEntry, DistrictInfo, DistrictType,
    },
    geocode::GeocodedAddress,
    Result,
};

/// Candidates are searched out to 50x the proximity threshold; beyond that
/// a nearby match is no longer a plausible boundary-digitization error.
const NEARBY_SEARCH_MULTIPLE: f64 = 50.0;
const NEARBY_CANDIDATE_LIMIT: usize = 8;

pub struct Assigner {
    shapefile: Arc<ShapefileStore>,
    streetfile: Arc<StreetFileStore>,
}

impl Assigner {
    pub fn new(shapefile: Arc<ShapefileStore>, streetfile: Arc<StreetFileStore>) -> Assigner {
        Assigner {
            shapefile,
            streetfile,
        }
    }

    /// Resolve districts for a geocoded address, reconciling the shapefile
    /// and street-file stores per their respective proximities to each
    /// district's boundary.
    pub async fn assign(
        &self,
        geocoded: &GeocodedAddress,
        types: &[DistrictType],
        proximity_threshold_meters: f64,
    ) -> Result<DistrictInfo> {
        let Some(geocode) = &geocoded.geocode else {
            return Ok(DistrictInfo::default());
        };
        let point = (geocode.lat, geocode.lon);

        let (shapefile_info, streetfile_info) = tokio::join!(
            self.shapefile.get_district_info(point, types, true, true),
            self.streetfile.assign_districts(geocoded),
        );
        let shapefile_info = shapefile_info?;
        let streetfile_info = streetfile_info?.unwrap_or_default();

        let mut nearby: HashMap<DistrictType, Vec<NearbyDistrictEntry>> = HashMap::new();
        for (&district_type, entry) in &shapefile_info.districts {
            let Some(proximity) = entry.proximity_meters else {
                continue;
            };
            if proximity >= proximity_threshold_meters {
                continue;
            }
            let streetfile_code = streetfile_info.districts.get(&district_type).map(|e| &e.code);
            if streetfile_code == Some(&entry.code) {
                continue;
            }
            let candidates = self
                .shapefile
                .get_nearby_districts(
                    district_type,
                    point,
                    proximity_threshold_meters * NEARBY_SEARCH_MULTIPLE,
                    NEARBY_CANDIDATE_LIMIT,
                )
                .await?;
            nearby.insert(district_type, candidates);
        }

        Ok(consolidate(
            &shapefile_info,
            &streetfile_info,
            &nearby,
            proximity_threshold_meters,
        ))
    }
}

/// Reconcile the shapefile result (the base) against the street-file
/// result and a precomputed set of "nearby district" candidates.
///
/// For each shapefile district whose proximity to its boundary is under
/// the threshold:
///   - if the street-file agrees, the shapefile entry is left as-is;
///   - if the street-file disagrees but one of the nearby candidates
///     matches the street-file's code, that candidate's code, name, and
///     map are swapped in;
///   - otherwise the shapefile entry is kept but flagged uncertain.
///
/// Districts at or beyond the threshold are taken from the shapefile
/// without consulting the street-file at all. District types present only
/// in the street-file (not returned by the shapefile store, e.g. because
/// that layer failed to load) are unioned in as-is. A street-file result
/// that is completely empty can't confirm anything, so every under-
/// threshold shapefile district is marked uncertain in that case.
///
/// This function is deterministic and has no side effects: given the same
/// three inputs, it always returns the same `DistrictInfo`.
pub fn consolidate(
    shapefile_info: &DistrictInfo,
    streetfile_info: &DistrictInfo,
    nearby: &HashMap<DistrictType, Vec<NearbyDistrictEntry>>,
    proximity_threshold_meters: f64,
) -> DistrictInfo {
    let mut result = DistrictInfo::default();
    let streetfile_is_empty = streetfile_info.is_empty();

    for &district_type in &DistrictType::ALL {
        let Some(shapefile_entry) = shapefile_info.districts.get(&district_type) else {
            if let Some(streetfile_entry) = streetfile_info.districts.get(&district_type) {
                result
                    .districts
                    .insert(district_type, streetfile_entry.clone());
            }
            continue;
        };

        let under_threshold = shapefile_entry
            .proximity_meters
            .is_some_and(|p| p < proximity_threshold_meters);

        if !under_threshold {
            result
                .districts
                .insert(district_type, shapefile_entry.clone());
            continue;
        }

        if streetfile_is_empty {
            result
                .districts
                .insert(district_type, shapefile_entry.clone());
            result.uncertain_districts.insert(district_type);
            continue;
        }

        let streetfile_code = streetfile_info.districts.get(&district_type).map(|e| &e.code);
        if streetfile_code == Some(&shapefile_entry.code) || streetfile_code.is_none() {
            result
                .districts
                .insert(district_type, shapefile_entry.clone());
            continue;
        }

        let nearby_match = nearby
            .get(&district_type)
            .and_then(|candidates| candidates.iter().find(|c| Some(&c.code) == streetfile_code));

        match nearby_match {
            Some(candidate) => {
                result.districts.insert(
                    district_type,
                    DistrictEntry {
                        name: candidate.name.clone(),
                        code: candidate.code.clone(),
                        map: Some(candidate.map.clone()),
                        proximity_meters: Some(candidate.distance_meters),
                        overlap: shapefile_entry.overlap.clone(),
                    },
                );
            }
            None => {
                result
                    .districts
                    .insert(district_type, shapefile_entry.clone());
                result.uncertain_districts.insert(district_type);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::district::{DistrictMap, GeometryType};

    fn entry(code: &str, proximity: Option<f64>) -> DistrictEntry {
        DistrictEntry {
            name: format!("District {code}"),
            code: code.to_owned(),
            map: Some(DistrictMap {
                geometry_type: GeometryType::Polygon,
                rings: Vec::new(),
                metadata: None,
            }),
            proximity_meters: proximity,
            overlap: None,
        }
    }

    fn info(districts: &[(DistrictType, DistrictEntry)]) -> DistrictInfo {
        let mut info = DistrictInfo::default();
        for (district_type, entry) in districts {
            info.districts.insert(*district_type, entry.clone());
        }
        info
    }

    #[test]
    fn agreement_under_threshold_is_kept_without_uncertainty() {
        let shapefile = info(&[(DistrictType::Senate, entry("40", Some(10.0)))]);
        let streetfile = info(&[(DistrictType::Senate, entry("40", None))]);
        let result = consolidate(&shapefile, &streetfile, &HashMap::new(), 100.0);
        assert_eq!(result.districts[&DistrictType::Senate].code, "40");
        assert!(result.uncertain_districts.is_empty());
    }

    #[test]
    fn disagreement_over_threshold_keeps_shapefile_silently() {
        let shapefile = info(&[(DistrictType::Senate, entry("40", Some(500.0)))]);
        let streetfile = info(&[(DistrictType::Senate, entry("41", None))]);
        let result = consolidate(&shapefile, &streetfile, &HashMap::new(), 100.0);
        assert_eq!(result.districts[&DistrictType::Senate].code, "40");
        assert!(result.uncertain_districts.is_empty());
    }

    #[test]
    fn disagreement_under_threshold_without_nearby_match_is_uncertain() {
        let shapefile = info(&[(DistrictType::Senate, entry("40", Some(10.0)))]);
        let streetfile = info(&[(DistrictType::Senate, entry("41", None))]);
        let result = consolidate(&shapefile, &streetfile, &HashMap::new(), 100.0);
        assert_eq!(result.districts[&DistrictType::Senate].code, "40");
        assert!(result.uncertain_districts.contains(&DistrictType::Senate));
    }

    #[test]
    fn disagreement_under_threshold_with_nearby_match_swaps_in_candidate() {
        let shapefile = info(&[(DistrictType::Senate, entry("40", Some(10.0)))]);
        let streetfile = info(&[(DistrictType::Senate, entry("41", None))]);
        let mut nearby = HashMap::new();
        nearby.insert(
            DistrictType::Senate,
            vec![NearbyDistrictEntry {
                code: "41".to_owned(),
                name: "District 41".to_owned(),
                distance_meters: 12.0,
                map: DistrictMap {
                    geometry_type: GeometryType::Polygon,
                    rings: Vec::new(),
                    metadata: None,
                },
            }],
        );
        let result = consolidate(&shapefile, &streetfile, &nearby, 100.0);
        let resolved = &result.districts[&DistrictType::Senate];
        assert_eq!(resolved.code, "41");
        assert_eq!(resolved.proximity_meters, Some(12.0));
        assert!(result.uncertain_districts.is_empty());
    }

    #[test]
    fn empty_streetfile_marks_every_under_threshold_district_uncertain() {
        let shapefile = info(&[(DistrictType::Senate, entry("40", Some(10.0)))]);
        let streetfile = DistrictInfo::default();
        let result = consolidate(&shapefile, &streetfile, &HashMap::new(), 100.0);
        assert_eq!(result.districts[&DistrictType::Senate].code, "40");
        assert!(result.uncertain_districts.contains(&DistrictType::Senate));
    }

    #[test]
    fn streetfile_only_type_is_unioned_in() {
        let shapefile = DistrictInfo::default();
        let streetfile = info(&[(DistrictType::Election, entry("12", None))]);
        let result = consolidate(&shapefile, &streetfile, &HashMap::new(), 100.0);
        assert_eq!(result.districts[&DistrictType::Election].code, "12");
    }

    #[test]
    fn consolidation_is_deterministic_under_repeated_application() {
        let shapefile = info(&[(DistrictType::Senate, entry("40", Some(10.0)))]);
        let streetfile = info(&[(DistrictType::Senate, entry("41", None))]);
        let first = consolidate(&shapefile, &streetfile, &HashMap::new(), 100.0);
        let second = consolidate(&shapefile, &streetfile, &HashMap::new(), 100.0);
        assert_eq!(first.districts[&DistrictType::Senate].code, second.districts[&DistrictType::Senate].code);
        assert_eq!(first.uncertain_districts, second.uncertain_districts);
    }
}
