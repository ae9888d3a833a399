//! The top-level district resolution pipeline: the only component that
//! talks to every other one. Parses the input address, optionally runs it
//! through USPS validation, geocodes it, assigns districts (falling back
//! to the multi-match overlap path below HOUSE precision), and attaches
//! boundary maps.

use std::sync::Arc;

use crate::{
    addresses::{self, Address},
    district::{
        assigner::Assigner, multimatch::MultiMatch, DistrictInfo, DistrictResult, DistrictType,
        MatchLevel,
    },
    errors::{ResolverError, StatusCode},
    geocode::{
        pipeline::{GeocodePipeline, GeocodeRequest},
        Geocode, GeocodedAddress, Quality,
    },
    providers::{
        AddressService, DistrictCapability, DistrictService, GeocodeCapability, GeocodeService,
        MapService, ProviderRegistry,
    },
    Result,
};

/// Converts the config's `proximity.threshold` (given in the shapefile
/// store's native degree-ish units, default 0.001) into the meters the
/// assigner works in. `0.001` comes out to roughly 111 meters, a plausible
/// "boundary is close" threshold for this service's polygon precision.
pub fn proximity_threshold_meters(proximity_threshold: f64) -> f64 {
    const METERS_PER_DEGREE_LAT: f64 = 110_574.0;
    proximity_threshold * METERS_PER_DEGREE_LAT
}

/// Per-call flags carried by both the single-address and "bluebird"
/// endpoints.
#[derive(Clone, Debug, Default)]
pub struct DistrictRequest {
    pub usps_validate: bool,
    pub skip_geocode: bool,
    pub show_maps: bool,
    pub show_members: bool,
    /// Named district-assignment strategy (`district.strategy.single` /
    /// `.bluebird`); `"standard"` is the shapefile/street-file consolidator,
    /// any other name is looked up as an explicit `DistrictService`.
    pub district_strategy: Option<String>,
    pub provider: Option<String>,
    pub geo_provider: Option<String>,
    pub types: Option<Vec<DistrictType>>,
    /// `showMultiMatch`: force the overlap path even when the geocode
    /// reached HOUSE precision, so a caller can inspect the area split for
    /// diagnostic purposes.
    pub force_multi_match: bool,
}

/// Member-metadata attachment (senator/assemblyman rosters, etc.) is an
/// external collaborator outside this crate's scope (see the metadata
/// scraper Non-goal). `showMembers` only does something when a caller
/// wires a lookup in here.
pub type MemberLookup =
    Arc<dyn Fn(DistrictType, &str) -> Option<serde_json::Value> + Send + Sync>;

pub struct Resolver {
    geocode: Arc<GeocodePipeline>,
    geocode_registry: Arc<ProviderRegistry<GeocodeCapability>>,
    assigner: Arc<Assigner>,
    multimatch: Arc<MultiMatch>,
    usps: Option<Arc<dyn AddressService>>,
    map_provider: Option<Arc<dyn MapService>>,
    member_lookup: Option<MemberLookup>,
    proximity_threshold_meters: f64,
    /// Named alternates to the standard shapefile/street-file consolidator
    /// (e.g. a WFS-backed strategy, or "bluebird"'s different tie-break
    /// rules), looked up by `districtStrategy`/`district.strategy.*`.
    /// `"standard"` (or nothing registered under the requested name) always
    /// falls through to the assigner/multi-match path below.
    district_registry: Option<Arc<ProviderRegistry<DistrictCapability>>>,
}

impl Resolver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        geocode: Arc<GeocodePipeline>,
        geocode_registry: Arc<ProviderRegistry<GeocodeCapability>>,
        assigner: Arc<Assigner>,
        multimatch: Arc<MultiMatch>,
        usps: Option<Arc<dyn AddressService>>,
        map_provider: Option<Arc<dyn MapService>>,
        member_lookup: Option<MemberLookup>,
        proximity_threshold_meters: f64,
        district_registry: Option<Arc<ProviderRegistry<DistrictCapability>>>,
    ) -> Resolver {
        Resolver {
            geocode,
            geocode_registry,
            assigner,
            multimatch,
            usps,
            map_provider,
            member_lookup,
            proximity_threshold_meters,
            district_registry,
        }
    }

    /// Look up a non-"standard" `districtStrategy` override, if the request
    /// names one and it's registered.
    async fn strategy_override(
        &self,
        request: &DistrictRequest,
        geocoded: &GeocodedAddress,
        types: &[DistrictType],
    ) -> Result<Option<DistrictInfo>> {
        let Some(name) = request.district_strategy.as_deref() else {
            return Ok(None);
        };
        if name.eq_ignore_ascii_case("standard") {
            return Ok(None);
        }
        let Some(registry) = &self.district_registry else {
            return Ok(None);
        };
        let Some(provider) = registry.new_instance(Some(name)) else {
            return Ok(None);
        };
        Ok(Some(provider.assign_districts(geocoded, Some(types)).await?))
    }

    /// Resolve an address input. §4.6 steps 1-8.
    #[tracing::instrument(skip(self, request), fields(addr1 = %address.addr1))]
    pub async fn resolve_address(
        &self,
        mut address: Address,
        request: &DistrictRequest,
    ) -> Result<DistrictResult> {
        if address.is_empty() {
            return Err(ResolverError::msg(StatusCode::MissingAddress, "no address fields supplied").into());
        }
        if !address.state.trim().is_empty() && !address.state.eq_ignore_ascii_case("ny") {
            return Err(ResolverError::msg(
                StatusCode::NonNyState,
                format!("address state {:?} is not NY", address.state),
            )
            .into());
        }

        let street = addresses::parse(&address)?;
        let is_po_box = street.po_box.is_some();
        let was_usps_validated;

        if request.usps_validate {
            if let Some(usps) = &self.usps {
                match usps.validate(&address).await {
                    Ok(result) if result.validated => {
                        address = result.address;
                        was_usps_validated = true;
                    }
                    _ => {
                        was_usps_validated = false;
                    }
                }
            } else {
                was_usps_validated = false;
            }
        } else {
            was_usps_validated = false;
        }

        let geocode: Option<Geocode> = if request.skip_geocode {
            None
        } else {
            let geocode_address = if is_po_box {
                Address {
                    addr1: String::new(),
                    ..address.clone()
                }
            } else {
                address.clone()
            };
            let geocoded = self
                .geocode
                .geocode(GeocodeRequest {
                    address: geocode_address,
                    provider: request.geo_provider.clone().or_else(|| request.provider.clone()),
                })
                .await?;
            geocoded.geocode
        };

        let geocoded = GeocodedAddress {
            address: address.clone(),
            geocode: geocode.clone(),
        };

        let types: Vec<DistrictType> = request
            .types
            .clone()
            .unwrap_or_else(|| DistrictType::ALL.to_vec());

        let quality = geocode.as_ref().map(|g| g.quality).unwrap_or(Quality::Unknown);
        let (mut district_info, match_level) = if let Some(info) =
            self.strategy_override(request, &geocoded, &types).await?
        {
            let match_level = if info.is_empty() {
                MatchLevel::NoMatch
            } else if quality >= Quality::House {
                MatchLevel::House
            } else {
                MatchLevel::Zip5
            };
            (info, match_level)
        } else if !request.force_multi_match && (quality >= Quality::House || is_po_box) {
            let info = self
                .assigner
                .assign(&geocoded, &types, self.proximity_threshold_meters)
                .await?;
            let match_level = if info.is_empty() {
                MatchLevel::NoMatch
            } else if quality >= Quality::House {
                MatchLevel::House
            } else {
                MatchLevel::Zip5
            };
            (info, match_level)
        } else {
            match self.multimatch.resolve(&geocoded, &types).await? {
                Some((info, level)) => (info, level),
                None => (DistrictInfo::default(), MatchLevel::NoMatch),
            }
        };

        let mut output_address = address;
        if is_po_box && !was_usps_validated {
            if let Some(po_box) = street.po_box {
                output_address.addr1 = format!("PO Box {po_box}");
            }
        }

        if request.show_maps {
            if let Some(map_provider) = &self.map_provider {
                for (district_type, entry) in district_info.districts.iter_mut() {
                    if entry.map.is_none() {
                        entry.map = map_provider
                            .district_map(*district_type, &entry.code)
                            .await?;
                    }
                }
            }
        }

        let members = if request.show_members {
            self.member_lookup.as_ref().map(|lookup| {
                let mut map = serde_json::Map::new();
                for (district_type, entry) in &district_info.districts {
                    if let Some(value) = lookup(*district_type, &entry.code) {
                        map.insert(format!("{district_type:?}"), value);
                    }
                }
                serde_json::Value::Object(map)
            })
        } else {
            None
        };

        let status_code = self.status_for(&district_info, match_level, &types);

        Ok(DistrictResult {
            geocoded_address: GeocodedAddress {
                address: output_address,
                geocode,
            },
            district_info,
            match_level,
            status_code,
            timestamp: time::OffsetDateTime::now_utc(),
            members,
        })
    }

    /// Resolve a batch of addresses through the bounded worker pool
    /// (`geocode.threads`), same concurrency discipline as
    /// `GeocodePipeline::geocode_batch`; results come back in input order.
    pub async fn resolve_batch(
        self: &Arc<Self>,
        addresses: Vec<Address>,
        request: DistrictRequest,
        concurrency: usize,
    ) -> Vec<Option<Result<DistrictResult>>> {
        let resolver = Arc::clone(self);
        crate::batch::execute_ordered(addresses, concurrency, None, move |address| {
            let resolver = Arc::clone(&resolver);
            let request = request.clone();
            async move { resolver.resolve_address(address, &request).await }
        })
        .await
    }

    /// Resolve a point input: skip parsing/USPS/geocoding, reverse-geocode
    /// to obtain an address, then proceed as if a geocode of quality POINT
    /// had been supplied.
    #[tracing::instrument(skip(self, request))]
    pub async fn resolve_point(
        &self,
        lat: f64,
        lon: f64,
        request: &DistrictRequest,
    ) -> Result<DistrictResult> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(ResolverError::msg(StatusCode::InvalidGeocode, "point out of range").into());
        }

        let name = request.geo_provider.as_deref().or(request.provider.as_deref());
        let Some(provider): Option<Arc<dyn GeocodeService>> = self
            .geocode_registry
            .new_instance(name)
            .map(Arc::from)
        else {
            return Err(ResolverError::msg(StatusCode::MissingPoint, "no geocode provider available for reverse geocoding").into());
        };
        let address = provider
            .reverse_geocode(lat, lon)
            .await?
            .ok_or_else(|| ResolverError::msg(StatusCode::NoReverseGeocodeResult, "reverse geocode returned nothing"))?;

        let geocoded = GeocodedAddress {
            address: address.clone(),
            geocode: Some(Geocode {
                lat,
                lon,
                method: provider.tag().to_owned(),
                quality: Quality::Point,
                cached: false,
            }),
        };

        let types: Vec<DistrictType> = request
            .types
            .clone()
            .unwrap_or_else(|| DistrictType::ALL.to_vec());
        let mut district_info = match self.strategy_override(request, &geocoded, &types).await? {
            Some(info) => info,
            None => {
                self.assigner
                    .assign(&geocoded, &types, self.proximity_threshold_meters)
                    .await?
            }
        };
        let match_level = if district_info.is_empty() {
            MatchLevel::NoMatch
        } else {
            MatchLevel::House
        };

        if request.show_maps {
            if let Some(map_provider) = &self.map_provider {
                for (district_type, entry) in district_info.districts.iter_mut() {
                    if entry.map.is_none() {
                        entry.map = map_provider
                            .district_map(*district_type, &entry.code)
                            .await?;
                    }
                }
            }
        }

        let status_code = self.status_for(&district_info, match_level, &types);

        Ok(DistrictResult {
            geocoded_address: geocoded,
            district_info,
            match_level,
            status_code,
            timestamp: time::OffsetDateTime::now_utc(),
            members: None,
        })
    }

    fn status_for(
        &self,
        district_info: &DistrictInfo,
        match_level: MatchLevel,
        requested_types: &[DistrictType],
    ) -> StatusCode {
        if match_level == MatchLevel::NoMatch || district_info.is_empty() {
            return StatusCode::NoDistrictResult;
        }
        let assigned = district_info.assigned_districts();
        let missing = requested_types.iter().any(|t| !assigned.contains(t));
        if missing || !district_info.uncertain_districts.is_empty() {
            return StatusCode::PartialDistrictResult;
        }
        let has_multi_match = district_info.districts.values().any(|e| e.overlap.is_some());
        if has_multi_match {
            return StatusCode::MultipleDistrictResult;
        }
        StatusCode::Success
    }
}
