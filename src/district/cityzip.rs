//! `cityZipLookup(city)`: the zip codes on file for a named city, used by
//! the multi-match path when the caller supplied a city but no zip.
//!
//! No dedicated city/zip table exists; this is resolved from data the
//! shapefile and street-file stores already carry: the shapefile store maps
//! a free-text city name to its CITY-type district codes, and the
//! street-file links those codes to the zips that appear in its ranges.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    district::{shapefile::ShapefileStore, streetfile::StreetFileStore},
    providers::CityZipService,
    Result,
};

pub struct CityZipLookup {
    shapefile: Arc<ShapefileStore>,
    streetfile: Arc<StreetFileStore>,
}

impl CityZipLookup {
    pub fn new(shapefile: Arc<ShapefileStore>, streetfile: Arc<StreetFileStore>) -> CityZipLookup {
        CityZipLookup {
            shapefile,
            streetfile,
        }
    }
}

#[async_trait]
impl CityZipService for CityZipLookup {
    async fn zips_for_city(&self, city: &str) -> Result<Vec<String>> {
        let codes = self.shapefile.city_codes_by_name(city).await?;
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        self.streetfile.distinct_zip5_for_city_codes(&codes).await
    }
}
