//! Multi-match overlap resolution: the fallback path taken when a geocode
//! didn't reach HOUSE precision (and the input isn't a PO box). Instead of
//! a single confident district per type, the street-file's candidate code
//! set is intersected against a reference boundary built from the zips the
//! address falls in, so the caller at least gets an area-weighted split.
//!
//! The "zip reference boundary" has no dedicated shapefile layer of its
//! own (this service doesn't carry ZIP code polygons); it's built instead
//! from the CITY-type boundaries whose codes the street-file already
//! associates with the chosen zips, via `all_standard_district_matches`.

use std::sync::Arc;

use crate::{
    addresses::Address,
    district::{
        shapefile::{multi_polygon_to_district_map, ShapefileStore},
        streetfile::StreetFileStore,
        DistrictEntry, DistrictInfo, DistrictType, MatchLevel,
    },
    geocode::{GeocodedAddress, Quality},
    providers::CityZipService,
    Result,
};

pub struct MultiMatch {
    shapefile: Arc<ShapefileStore>,
    streetfile: Arc<StreetFileStore>,
    city_zip: Arc<dyn CityZipService>,
}

impl MultiMatch {
    pub fn new(
        shapefile: Arc<ShapefileStore>,
        streetfile: Arc<StreetFileStore>,
        city_zip: Arc<dyn CityZipService>,
    ) -> MultiMatch {
        MultiMatch {
            shapefile,
            streetfile,
            city_zip,
        }
    }

    /// Resolve districts for a geocode below HOUSE precision. Returns
    /// `None` when even the CITY sub-level can't be reached (no usable
    /// zip or city).
    pub async fn resolve(
        &self,
        geocoded: &GeocodedAddress,
        types: &[DistrictType],
    ) -> Result<Option<(DistrictInfo, MatchLevel)>> {
        let quality = geocoded.quality();
        let address = &geocoded.address;
        let zip5_given = !address.zip5.trim().is_empty();
        let city_given = !address.city.trim().is_empty();

        let level = if quality >= Quality::Street && (zip5_given || city_given) {
            MatchLevel::Street
        } else if quality >= Quality::Zip && zip5_given {
            MatchLevel::Zip5
        } else if quality >= Quality::City && city_given {
            MatchLevel::City
        } else {
            return Ok(None);
        };

        let zips = self.resolve_zips(address).await?;
        if zips.is_empty() {
            return Ok(None);
        }

        let street_names = match level {
            MatchLevel::Street => Some(vec![canonical_street_name(address)?]),
            _ => None,
        };

        let candidates = self
            .streetfile
            .all_standard_district_matches(street_names.as_deref(), &zips)
            .await?;

        let city_codes: Vec<String> = candidates
            .get(&DistrictType::City)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        let reference_boundary = if !city_codes.is_empty() {
            self.shapefile
                .get_overlap_reference_boundary(DistrictType::City, &city_codes)
                .await?
        } else {
            None
        };

        let mut info = DistrictInfo::default();
        info.reference_map = reference_boundary
            .as_ref()
            .map(|boundary| multi_polygon_to_district_map(boundary, None));
        let mut resolved_any = false;

        for &district_type in types {
            let Some(candidate_set) = candidates.get(&district_type) else {
                continue;
            };
            if candidate_set.is_empty() {
                continue;
            }
            let mut candidate_codes: Vec<String> = candidate_set.iter().cloned().collect();
            candidate_codes.sort();

            if candidate_codes.len() == 1 {
                info.districts.insert(
                    district_type,
                    DistrictEntry {
                        name: String::new(),
                        code: candidate_codes[0].clone(),
                        map: None,
                        proximity_meters: None,
                        overlap: None,
                    },
                );
                resolved_any = true;
                continue;
            }

            let needs_overlap = candidate_codes.len() > 1 || district_type == DistrictType::Senate;
            if !needs_overlap || reference_boundary.is_none() {
                continue;
            }

            let overlap = self
                .shapefile
                .get_district_overlap(
                    district_type,
                    Some(candidate_codes.as_slice()),
                    DistrictType::City,
                    &city_codes,
                )
                .await?;
            let Some(overlap) = overlap else { continue };

            let by_area = overlap.codes_by_area_desc();
            let Some(best_code) = by_area.first().cloned() else {
                continue;
            };

            // A candidate set that narrows to a single district with
            // nonzero intersected area collapses to that code, same as a
            // singleton candidate set would.
            let collapsed = by_area.len() == 1;

            info.districts.insert(
                district_type,
                DistrictEntry {
                    name: String::new(),
                    code: best_code,
                    map: None,
                    proximity_meters: None,
                    overlap: if collapsed { None } else { Some(overlap) },
                },
            );
            resolved_any = true;
        }

        if !resolved_any {
            return Ok(None);
        }
        Ok(Some((info, level)))
    }

    async fn resolve_zips(&self, address: &Address) -> Result<Vec<String>> {
        if !address.zip5.trim().is_empty() {
            return Ok(vec![address.zip5.clone()]);
        }
        if !address.city.trim().is_empty() {
            return self.city_zip.zips_for_city(&address.city).await;
        }
        Ok(Vec::new())
    }
}

/// `StreetFileStore::all_standard_district_matches` expects a normalized
/// street name, the same way a parsed `StreetAddress` carries one.
fn canonical_street_name(address: &Address) -> Result<String> {
    let street = crate::addresses::parse(address)?;
    Ok(street.street_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_level_order_matches_quality_thresholds() {
        assert!(MatchLevel::Street > MatchLevel::Zip5);
        assert!(MatchLevel::Zip5 > MatchLevel::City);
    }
}
