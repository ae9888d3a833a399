//! Shapefile district lookup: point-in-polygon, proximity-to-boundary,
//! nearby-district, and district-intersection queries against polygons
//! loaded from the geospatial schema.
//!
//! Grounded directly on `crime_map_spatial`'s `SpatialIndex`: load each
//! layer's polygons from the database once, decode GeoJSON into
//! `geo-types`, and build an `rstar::RTree` per layer for point-in-polygon
//! and nearest-neighbor queries, exactly as `SpatialIndex::load` does for
//! its `tracts`/`places` layers. Here one `RTree<BoundaryEntry>` is built
//! per `DistrictType` instead of per census layer, matching this spec's
//! "one table per DistrictType" schema and its `cacheDistrictMaps`
//! bulk-load operation. `crumplecup-arcgis`'s `geometry/convert` module
//! contributes the GeoJSON/`geo-types` coordinate-order handling
//! (`(lon, lat)` on the wire, `(lat, lon)` internally).

use std::collections::{BTreeMap, HashMap};

use geo::{BooleanOps, Contains};
use geo_types::{LineString, MultiPolygon, Point, Polygon};
use geojson::GeoJson;
use rstar::{RTree, RTreeObject, AABB};
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;

use crate::{
    district::{
        normalize_code, DistrictEntry, DistrictInfo, DistrictMap, DistrictMetadata,
        DistrictOverlap, DistrictType, GeometryType,
    },
    Result,
};

/// Per-`DistrictType` table/column layout. Invented but plausible names for
/// the "per-type shape-code descriptor" the spec names.
struct ShapeDescriptor {
    table: &'static str,
    name_column: &'static str,
    code_column: &'static str,
}

fn descriptor(district_type: DistrictType) -> ShapeDescriptor {
    use DistrictType::*;
    match district_type {
        Senate => ShapeDescriptor {
            table: "geo.senate",
            name_column: "senate_name",
            code_column: "sennum",
        },
        Assembly => ShapeDescriptor {
            table: "geo.assembly",
            name_column: "assembly_name",
            code_column: "assemblynum",
        },
        Congressional => ShapeDescriptor {
            table: "geo.congressional",
            name_column: "cong_name",
            code_column: "congnum",
        },
        County => ShapeDescriptor {
            table: "geo.county",
            name_column: "county_name",
            code_column: "countynum",
        },
        School => ShapeDescriptor {
            table: "geo.school",
            name_column: "school_name",
            code_column: "schoolnum",
        },
        Town => ShapeDescriptor {
            table: "geo.town",
            name_column: "town_name",
            code_column: "townnum",
        },
        Election => ShapeDescriptor {
            table: "geo.election",
            name_column: "ed_name",
            code_column: "ednum",
        },
        Fire => ShapeDescriptor {
            table: "geo.fire",
            name_column: "fire_name",
            code_column: "firenum",
        },
        Village => ShapeDescriptor {
            table: "geo.village",
            name_column: "village_name",
            code_column: "villagenum",
        },
        City => ShapeDescriptor {
            table: "geo.city",
            name_column: "city_name",
            code_column: "citynum",
        },
    }
}

struct BoundaryEntry {
    name: String,
    code: String,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Decode a GeoJSON geometry value into `geo-types`, accepting `Polygon`
/// and `MultiPolygon` as the spec requires.
fn parse_geojson_to_multipolygon(value: &serde_json::Value) -> Result<MultiPolygon<f64>> {
    let geojson: GeoJson = value.clone().try_into()?;
    let geometry = match geojson {
        GeoJson::Geometry(g) => g,
        other => {
            return Err(anyhow::anyhow!(
                "expected a GeoJSON geometry, got {:?}",
                other
            ))
        }
    };
    match geometry.value {
        geojson::Value::Polygon(_) => {
            let polygon: Polygon<f64> = geo_types::Geometry::try_from(geometry)?.try_into()?;
            Ok(MultiPolygon(vec![polygon]))
        }
        geojson::Value::MultiPolygon(_) => {
            Ok(geo_types::Geometry::try_from(geometry)?.try_into()?)
        }
        other => Err(anyhow::anyhow!("unsupported geometry type {:?}", other)),
    }
}

fn compute_envelope(polygon: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    use geo::BoundingRect;
    match polygon.bounding_rect() {
        Some(rect) => AABB::from_corners(
            [rect.min().x, rect.min().y],
            [rect.max().x, rect.max().y],
        ),
        None => AABB::from_point([0.0, 0.0]),
    }
}

const METERS_PER_DEGREE_LAT: f64 = 110_574.0;

fn meters_per_degree_lon(lat_deg: f64) -> f64 {
    111_320.0 * lat_deg.to_radians().cos()
}

/// Project `(lat, lon)` to meters on a plane tangent at `origin`. Good
/// enough for the small (sub-state) extents district proximity/area
/// queries operate over; see the Open Question decision in DESIGN.md for
/// why a full geodesic/UTM reprojection crate was not introduced.
fn to_local_meters(point: (f64, f64), origin: (f64, f64)) -> (f64, f64) {
    let (lat, lon) = point;
    let (origin_lat, origin_lon) = origin;
    (
        (lon - origin_lon) * meters_per_degree_lon(origin_lat),
        (lat - origin_lat) * METERS_PER_DEGREE_LAT,
    )
}

fn point_to_segment_distance_meters(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (ax, ay) = to_local_meters(a, p);
    let (bx, by) = to_local_meters(b, p);
    let (dx, dy) = (bx - ax, by - ay);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return (ax * ax + ay * ay).sqrt();
    }
    let t = ((-ax * dx - ay * dy) / len2).clamp(0.0, 1.0);
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    (cx * cx + cy * cy).sqrt()
}

fn distance_to_boundary_meters(point: (f64, f64), polygon: &MultiPolygon<f64>) -> f64 {
    let mut best = f64::INFINITY;
    for poly in &polygon.0 {
        for ring in std::iter::once(poly.exterior()).chain(poly.interiors()) {
            let coords: Vec<_> = ring.coords().collect();
            for window in coords.windows(2) {
                let a = (window[0].y, window[0].x);
                let b = (window[1].y, window[1].x);
                let distance = point_to_segment_distance_meters(point, a, b);
                if distance < best {
                    best = distance;
                }
            }
        }
    }
    best
}

fn ring_signed_area_sq_meters(ring: &LineString<f64>, origin: (f64, f64)) -> f64 {
    let projected: Vec<(f64, f64)> = ring
        .coords()
        .map(|c| to_local_meters((c.y, c.x), origin))
        .collect();
    let mut area = 0.0;
    for window in projected.windows(2) {
        area += window[0].0 * window[1].1 - window[1].0 * window[0].1;
    }
    area / 2.0
}

fn multi_polygon_area_sq_meters(polygon: &MultiPolygon<f64>, origin: (f64, f64)) -> f64 {
    polygon
        .0
        .iter()
        .map(|p| {
            let mut area = ring_signed_area_sq_meters(p.exterior(), origin).abs();
            for interior in p.interiors() {
                area -= ring_signed_area_sq_meters(interior, origin).abs();
            }
            area
        })
        .sum()
}

pub(crate) fn multi_polygon_to_district_map(
    polygon: &MultiPolygon<f64>,
    metadata: Option<DistrictMetadata>,
) -> DistrictMap {
    let rings = polygon
        .0
        .iter()
        .map(|p| p.exterior().coords().map(|c| (c.y, c.x)).collect())
        .collect();
    DistrictMap {
        geometry_type: GeometryType::MultiPolygon,
        rings,
        metadata,
    }
}

/// The process-wide, once-built shapefile index: one `RTree` per
/// `DistrictType`, plus a code -> geometry map for types whose codes are
/// globally unique (§4.3's `cacheDistrictMaps`).
struct Layer {
    tree: RTree<BoundaryEntry>,
    by_code: HashMap<String, MultiPolygon<f64>>,
}

/// One candidate from `getNearbyDistricts`.
#[derive(Clone, Debug)]
pub struct NearbyDistrictEntry {
    pub code: String,
    pub name: String,
    pub distance_meters: f64,
    pub map: DistrictMap,
}

pub struct ShapefileStore {
    pool: PgPool,
    layers: RwLock<HashMap<DistrictType, Layer>>,
    fips_to_county_id: RwLock<HashMap<String, String>>,
}

impl ShapefileStore {
    pub fn new(pool: PgPool) -> ShapefileStore {
        ShapefileStore {
            pool,
            layers: RwLock::new(HashMap::new()),
            fips_to_county_id: RwLock::new(HashMap::new()),
        }
    }

    /// `cacheDistrictMaps()`: bulk-load every district type's geometry into
    /// the process-wide cache. Called once at startup; `clear_cache` is the
    /// administrative re-load operation.
    pub async fn cache_district_maps(&self) -> Result<()> {
        let mut layers = HashMap::new();
        for &district_type in &DistrictType::ALL {
            layers.insert(district_type, self.load_layer(district_type).await?);
        }
        *self.layers.write().await = layers;

        let rows = sqlx::query("select fips, county_id from districts_map")
            .fetch_all(&self.pool)
            .await?;
        let mut fips_map = HashMap::new();
        for row in rows {
            let fips: String = row.try_get("fips")?;
            let county_id: String = row.try_get("county_id")?;
            fips_map.insert(fips, county_id);
        }
        *self.fips_to_county_id.write().await = fips_map;
        Ok(())
    }

    /// Administrative cache invalidation. Must not race with readers; the
    /// write lock taken here blocks new lookups until the reload finishes.
    pub async fn clear_cache(&self) -> Result<()> {
        self.cache_district_maps().await
    }

    async fn load_layer(&self, district_type: DistrictType) -> Result<Layer> {
        let descriptor = descriptor(district_type);
        let query = format!(
            "select {} as name, {} as code, st_asgeojson(geom) as geojson from {}",
            descriptor.name_column, descriptor.code_column, descriptor.table
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut entries = Vec::with_capacity(rows.len());
        let mut by_code = HashMap::new();
        for row in rows {
            let name: String = row.try_get("name")?;
            let raw_code: String = row.try_get("code")?;
            let geojson_text: String = row.try_get("geojson")?;
            let value: serde_json::Value = serde_json::from_str(&geojson_text)?;
            let polygon = parse_geojson_to_multipolygon(&value)?;
            let code = normalize_code(&raw_code);

            if district_type.codes_are_globally_unique() {
                by_code
                    .entry(code.clone())
                    .and_modify(|existing: &mut MultiPolygon<f64>| {
                        existing.0.extend(polygon.0.clone());
                    })
                    .or_insert_with(|| polygon.clone());
            }

            entries.push(BoundaryEntry {
                name,
                code,
                envelope: compute_envelope(&polygon),
                polygon,
            });
        }
        Ok(Layer {
            tree: RTree::bulk_load(entries),
            by_code,
        })
    }

    /// **getDistrictInfo**: for each requested type, emit name/code/map/
    /// proximity. Rows are unioned across types. FIPS county codes are
    /// translated via the metadata table; district codes have leading
    /// zeros trimmed.
    pub async fn get_district_info(
        &self,
        point: (f64, f64),
        types: &[DistrictType],
        fetch_maps: bool,
        fetch_proximity: bool,
    ) -> Result<DistrictInfo> {
        let layers = self.layers.read().await;
        let geo_point = Point::new(point.1, point.0);
        let mut info = DistrictInfo::default();

        for &district_type in types {
            let Some(layer) = layers.get(&district_type) else {
                continue;
            };
            let Some(entry) = layer
                .tree
                .iter()
                .find(|entry| entry.polygon.contains(&geo_point))
            else {
                continue;
            };

            let code = if district_type == DistrictType::County {
                self.fips_to_county_id
                    .read()
                    .await
                    .get(&entry.code)
                    .cloned()
                    .unwrap_or_else(|| entry.code.clone())
            } else {
                entry.code.clone()
            };

            let proximity_meters = fetch_proximity
                .then(|| distance_to_boundary_meters(point, &entry.polygon));
            let map = fetch_maps.then(|| {
                multi_polygon_to_district_map(
                    &entry.polygon,
                    Some(DistrictMetadata {
                        district_type,
                        name: entry.name.clone(),
                        code: code.clone(),
                    }),
                )
            });

            info.districts.insert(
                district_type,
                DistrictEntry {
                    name: entry.name.clone(),
                    code,
                    map,
                    proximity_meters,
                    overlap: None,
                },
            );
        }
        Ok(info)
    }

    /// **getNearbyDistricts**: districts whose geometry excludes the point,
    /// ordered ascending by closest-point distance, limited to `limit`.
    /// Carries each candidate's boundary map along, since the consolidator
    /// (§4.7) swaps it in for the shapefile's own map on a street-file
    /// override.
    pub async fn get_nearby_districts(
        &self,
        district_type: DistrictType,
        point: (f64, f64),
        max_distance_meters: f64,
        limit: usize,
    ) -> Result<Vec<NearbyDistrictEntry>> {
        let layers = self.layers.read().await;
        let Some(layer) = layers.get(&district_type) else {
            return Ok(Vec::new());
        };
        let geo_point = Point::new(point.1, point.0);

        let mut candidates: Vec<(&BoundaryEntry, f64)> = layer
            .tree
            .nearest_neighbor_iter_with_distance_2(&[point.1, point.0])
            .filter(|(entry, _)| !entry.polygon.contains(&geo_point))
            .map(|(entry, _)| {
                let distance = distance_to_boundary_meters(point, &entry.polygon);
                (entry, distance)
            })
            .filter(|(_, distance)| *distance <= max_distance_meters)
            .take(limit * 4)
            .collect();

        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(limit);

        Ok(candidates
            .into_iter()
            .map(|(entry, distance)| NearbyDistrictEntry {
                code: entry.code.clone(),
                name: entry.name.clone(),
                distance_meters: distance,
                map: multi_polygon_to_district_map(
                    &entry.polygon,
                    Some(DistrictMetadata {
                        district_type,
                        name: entry.name.clone(),
                        code: entry.code.clone(),
                    }),
                ),
            })
            .collect())
    }

    /// City-name lookup used by `cityZipLookup`: every CITY-layer code
    /// whose boundary name matches (case-insensitively, since callers pass
    /// free-text city names, not codes).
    pub async fn city_codes_by_name(&self, name: &str) -> Result<Vec<String>> {
        let layers = self.layers.read().await;
        let Some(layer) = layers.get(&DistrictType::City) else {
            return Ok(Vec::new());
        };
        Ok(layer
            .tree
            .iter()
            .filter(|entry| entry.name.eq_ignore_ascii_case(name))
            .map(|entry| entry.code.clone())
            .collect())
    }

    /// **getOverlapReferenceBoundary**: the polygonized union of the
    /// reference district set.
    pub async fn get_overlap_reference_boundary(
        &self,
        ref_type: DistrictType,
        ref_codes: &[String],
    ) -> Result<Option<MultiPolygon<f64>>> {
        let layers = self.layers.read().await;
        let Some(layer) = layers.get(&ref_type) else {
            return Ok(None);
        };
        let normalized: Vec<String> = ref_codes.iter().map(|c| normalize_code(c)).collect();
        let mut union: Option<MultiPolygon<f64>> = None;
        for entry in layer.tree.iter() {
            if normalized.contains(&entry.code) {
                union = Some(match union {
                    Some(existing) => existing.union(&entry.polygon),
                    None => entry.polygon.clone(),
                });
            }
        }
        Ok(union)
    }

    /// **getDistrictOverlap**: intersection area between each target
    /// district and the union of reference districts, in square meters.
    /// Rows with zero area are discarded; for SENATE targets the
    /// intersection polygon is also returned.
    pub async fn get_district_overlap(
        &self,
        target_type: DistrictType,
        target_codes: Option<&[String]>,
        ref_type: DistrictType,
        ref_codes: &[String],
    ) -> Result<Option<DistrictOverlap>> {
        let Some(reference) = self
            .get_overlap_reference_boundary(ref_type, ref_codes)
            .await?
        else {
            return Ok(None);
        };
        let reference_centroid = {
            use geo::Centroid;
            reference
                .centroid()
                .map(|c| (c.y(), c.x()))
                .unwrap_or((0.0, 0.0))
        };

        let layers = self.layers.read().await;
        let Some(layer) = layers.get(&target_type) else {
            return Ok(None);
        };

        let wanted: Option<Vec<String>> =
            target_codes.map(|codes| codes.iter().map(|c| normalize_code(c)).collect());

        let mut target_area = BTreeMap::new();
        let mut target_intersections = BTreeMap::new();
        for entry in layer.tree.iter() {
            if let Some(wanted) = &wanted {
                if !wanted.contains(&entry.code) {
                    continue;
                }
            }
            let intersection = entry.polygon.intersection(&reference);
            let area = multi_polygon_area_sq_meters(&intersection, reference_centroid);
            if area <= 0.0 {
                continue;
            }
            target_area.insert(entry.code.clone(), area);
            if target_type == DistrictType::Senate {
                target_intersections.insert(
                    entry.code.clone(),
                    multi_polygon_to_district_map(&intersection, None),
                );
            }
        }

        if target_area.is_empty() {
            return Ok(None);
        }

        let total_area = multi_polygon_area_sq_meters(&reference, reference_centroid);
        Ok(Some(DistrictOverlap {
            reference_type: ref_type,
            target_type,
            reference_codes: ref_codes.iter().map(|c| normalize_code(c)).collect(),
            total_area_sq_meters: total_area,
            target_area_sq_meters: target_area,
            target_intersections: (!target_intersections.is_empty())
                .then_some(target_intersections),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min: (f64, f64), max: (f64, f64)) -> MultiPolygon<f64> {
        // min/max are (lat, lon); build a closed ring in (lon, lat) order.
        let ring = LineString(vec![
            geo_types::coord! { x: min.1, y: min.0 },
            geo_types::coord! { x: max.1, y: min.0 },
            geo_types::coord! { x: max.1, y: max.0 },
            geo_types::coord! { x: min.1, y: max.0 },
            geo_types::coord! { x: min.1, y: min.0 },
        ]);
        MultiPolygon(vec![Polygon::new(ring, vec![])])
    }

    #[test]
    fn distance_to_boundary_is_zero_on_the_edge() {
        let polygon = square((42.0, -74.0), (43.0, -73.0));
        let on_edge = (42.0, -73.5);
        assert!(distance_to_boundary_meters(on_edge, &polygon) < 1.0);
    }

    #[test]
    fn distance_to_boundary_is_positive_outside() {
        let polygon = square((42.0, -74.0), (43.0, -73.0));
        let far_outside = (50.0, -73.5);
        assert!(distance_to_boundary_meters(far_outside, &polygon) > 500_000.0);
    }

    #[test]
    fn multi_polygon_area_is_positive_and_roughly_right() {
        // Roughly 1 degree lat x 1 degree lon near 42N: about 111km x 83km.
        let polygon = square((42.0, -74.0), (43.0, -73.0));
        let area = multi_polygon_area_sq_meters(&polygon, (42.5, -73.5));
        assert!(area > 5.0e9 && area < 1.2e10);
    }
}
