//! WFS (Web Feature Service) fallback district provider: an external
//! geospatial server consulted when the local shapefile/street-file stores
//! don't have a district type covered.
//!
//! Grounded on the teacher's `geocoders::smarty::client::SmartyClient`: a
//! shared `hyper` client, a GET request built from query parameters, and
//! `#[instrument]`ed request handling with `metrics::histogram!` timing.

use std::time::Instant;

use async_trait::async_trait;
use metrics::{describe_histogram, histogram};
use serde::Deserialize;

use crate::{
    district::{normalize_code, DistrictEntry, DistrictInfo, DistrictType},
    geocode::GeocodedAddress,
    http_client::SharedHttpClient,
    providers::{DistrictService, NearbyDistrict},
    Result,
};

/// A WFS endpoint for one `DistrictType`, identified by its feature type
/// name (the `TYPENAME` WFS query parameter).
fn feature_type_name(district_type: DistrictType) -> &'static str {
    use DistrictType::*;
    match district_type {
        Senate => "nysenate:senate_districts",
        Assembly => "nysenate:assembly_districts",
        Congressional => "nysenate:congressional_districts",
        County => "nysenate:counties",
        School => "nysenate:school_districts",
        Town => "nysenate:towns",
        Election => "nysenate:election_districts",
        Fire => "nysenate:fire_districts",
        Village => "nysenate:villages",
        City => "nysenate:cities",
    }
}

#[derive(Debug, Deserialize)]
struct WfsFeatureCollection {
    features: Vec<WfsFeature>,
}

#[derive(Debug, Deserialize)]
struct WfsFeature {
    properties: WfsProperties,
}

#[derive(Debug, Deserialize)]
struct WfsProperties {
    name: String,
    code: String,
}

pub struct WfsDistrictService {
    client: SharedHttpClient,
    base_url: url::Url,
}

impl WfsDistrictService {
    pub fn new(client: SharedHttpClient, base_url: url::Url) -> WfsDistrictService {
        describe_histogram!(
            "districts.wfs_request.duration_seconds",
            "Time spent waiting for the WFS endpoint"
        );
        WfsDistrictService { client, base_url }
    }

    #[tracing::instrument(skip(self))]
    async fn query_feature(
        &self,
        district_type: DistrictType,
        lat: f64,
        lon: f64,
    ) -> Result<Option<(String, String)>> {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("SERVICE", "WFS")
            .append_pair("REQUEST", "GetFeature")
            .append_pair("TYPENAME", feature_type_name(district_type))
            .append_pair("OUTPUTFORMAT", "json")
            .append_pair(
                "CQL_FILTER",
                &format!("INTERSECTS(the_geom, POINT({lon} {lat}))"),
            );

        let request = hyper::Request::get(url.as_str())
            .body(hyper::Body::empty())
            .map_err(anyhow::Error::from)?;

        let start = Instant::now();
        let response = self.client.request(request).await?;
        let body = hyper::body::to_bytes(response.into_body()).await?;
        histogram!(
            "districts.wfs_request.duration_seconds",
            start.elapsed().as_secs_f64()
        );

        let parsed: WfsFeatureCollection = serde_json::from_slice(&body)?;
        Ok(parsed
            .features
            .into_iter()
            .next()
            .map(|f| (f.properties.name, f.properties.code)))
    }
}

#[async_trait]
impl DistrictService for WfsDistrictService {
    fn tag(&self) -> &str {
        "wfs"
    }

    async fn assign_districts(
        &self,
        geocoded: &GeocodedAddress,
        types: Option<&[DistrictType]>,
    ) -> Result<DistrictInfo> {
        let Some(geocode) = &geocoded.geocode else {
            return Ok(DistrictInfo::default());
        };
        let types: Vec<DistrictType> = types
            .map(|t| t.to_vec())
            .unwrap_or_else(|| DistrictType::ALL.to_vec());

        let mut info = DistrictInfo::default();
        for district_type in types {
            if let Some((name, code)) = self
                .query_feature(district_type, geocode.lat, geocode.lon)
                .await?
            {
                info.districts.insert(
                    district_type,
                    DistrictEntry {
                        name,
                        code: normalize_code(&code),
                        map: None,
                        proximity_meters: None,
                        overlap: None,
                    },
                );
            }
        }
        Ok(info)
    }

    async fn nearby_districts(
        &self,
        _geocoded: &GeocodedAddress,
        _district_type: DistrictType,
        _max_distance_meters: f64,
        _limit: usize,
    ) -> Result<Vec<NearbyDistrict>> {
        // The WFS fallback is only consulted for point-in-polygon
        // assignment; nearest-district ranking stays on the shapefile
        // store, which already holds the full layer in memory.
        Ok(Vec::new())
    }
}
