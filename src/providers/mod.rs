//! The provider framework: capability traits that external collaborators
//! (USPS, WFS, the various commercial geocoders) implement, and a generic
//! registry that maps a provider name to a constructor.
//!
//! The source leans on a base class plus a generic registry keyed by name.
//! Recast here as a small capability-typed registry: providers implement
//! capability traits directly, with no shared implementation base, and a
//! fresh instance is built per lookup (the registry owns constructors, not
//! instances) so a `fetch_maps` flag or an HTTP client can be configured
//! per-request without cross-request contamination.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    addresses::Address,
    district::{DistrictInfo, DistrictMap, DistrictType},
    geocode::{Geocode, GeocodedAddress},
    Result,
};

/// Result of an `AddressService` call: the (possibly corrected) address,
/// whether it validated, and any diagnostic messages.
#[derive(Clone, Debug, Serialize)]
pub struct AddressResult {
    pub address: Address,
    pub validated: bool,
    pub messages: Vec<String>,
}

/// External address validator/normalizer (USPS and friends).
#[async_trait]
pub trait AddressService: Send + Sync {
    fn tag(&self) -> &str;
    async fn validate(&self, address: &Address) -> Result<AddressResult>;
    async fn validate_batch(
        &self,
        addresses: &[Address],
    ) -> Result<Vec<AddressResult>> {
        let mut out = Vec::with_capacity(addresses.len());
        for address in addresses {
            out.push(self.validate(address).await?);
        }
        Ok(out)
    }
    async fn lookup_city_state(&self, address: &Address) -> Result<AddressResult>;
    async fn lookup_zipcode(&self, address: &Address) -> Result<AddressResult>;
}

/// External (or cache-backed) forward/reverse geocoder.
#[async_trait]
pub trait GeocodeService: Send + Sync {
    fn tag(&self) -> &str;
    async fn geocode(&self, address: &Address) -> Result<Option<Geocode>>;
    async fn geocode_batch(
        &self,
        addresses: &[Address],
    ) -> Result<Vec<Option<Geocode>>> {
        let mut out = Vec::with_capacity(addresses.len());
        for address in addresses {
            out.push(self.geocode(address).await?);
        }
        Ok(out)
    }
    async fn reverse_geocode(&self, lat: f64, lon: f64) -> Result<Option<Address>>;
    /// Whether a caller still needs to run geocoding after this provider
    /// runs (false for providers, like a cache hit, that already supply a
    /// usable geocode).
    fn requires_geocode(&self) -> bool {
        true
    }
    /// Toggle whether this provider also fetches boundary maps as a side
    /// effect of geocoding. Most providers ignore this.
    fn fetch_maps(&mut self, _fetch: bool) {}
}

/// One row of `getNearbyDistricts`.
#[derive(Clone, Debug)]
pub struct NearbyDistrict {
    pub code: String,
    pub name: String,
    pub distance_meters: f64,
}

/// District assignment, backed by a shapefile store, a street-file store,
/// a WFS fallback, or the consolidating assigner that combines the first
/// two.
#[async_trait]
pub trait DistrictService: Send + Sync {
    fn tag(&self) -> &str;
    async fn assign_districts(
        &self,
        geocoded: &GeocodedAddress,
        types: Option<&[DistrictType]>,
    ) -> Result<DistrictInfo>;
    async fn assign_districts_batch(
        &self,
        geocoded: &[GeocodedAddress],
        types: Option<&[DistrictType]>,
    ) -> Result<Vec<DistrictInfo>> {
        let mut out = Vec::with_capacity(geocoded.len());
        for address in geocoded {
            out.push(self.assign_districts(address, types).await?);
        }
        Ok(out)
    }
    async fn nearby_districts(
        &self,
        geocoded: &GeocodedAddress,
        district_type: DistrictType,
        max_distance_meters: f64,
        limit: usize,
    ) -> Result<Vec<NearbyDistrict>>;
}

/// Boundary map lookups, independent of assignment.
#[async_trait]
pub trait MapService: Send + Sync {
    async fn district_map(
        &self,
        district_type: DistrictType,
        code: &str,
    ) -> Result<Option<DistrictMap>>;
    async fn district_maps(&self, district_type: DistrictType) -> Result<Vec<DistrictMap>>;
}

/// The tabular street-range store, as its own capability (used directly by
/// the assigner and the multi-match path, in addition to being wrapped by a
/// `DistrictService` impl).
#[async_trait]
pub trait StreetLookupService: Send + Sync {
    async fn assign_districts(
        &self,
        geocoded: &GeocodedAddress,
    ) -> Result<Option<DistrictInfo>>;
    async fn all_standard_district_matches(
        &self,
        street_names: Option<&[String]>,
        zip5s: &[String],
    ) -> Result<crate::district::CodeSetsByType>;
}

/// `cityZipLookup(city)`: zip codes that overlap a named city, used by the
/// multi-match path when the caller didn't supply a zip.
#[async_trait]
pub trait CityZipService: Send + Sync {
    async fn zips_for_city(&self, city: &str) -> Result<Vec<String>>;
}

/// Marker trait tying a capability to its trait-object provider type.
/// `?Sized` because `Provider` is always a `dyn Trait`.
pub trait Capability {
    type Provider: ?Sized;
}

pub struct GeocodeCapability;
impl Capability for GeocodeCapability {
    type Provider = dyn GeocodeService;
}

pub struct AddressCapability;
impl Capability for AddressCapability {
    type Provider = dyn AddressService;
}

pub struct DistrictCapability;
impl Capability for DistrictCapability {
    type Provider = dyn DistrictService;
}

pub struct MapCapability;
impl Capability for MapCapability {
    type Provider = dyn MapService;
}

type Factory<C> = Arc<dyn Fn() -> Box<<C as Capability>::Provider> + Send + Sync>;

/// A capability-keyed registry: name -> constructor, plus a default name,
/// an ordered fallback chain, and a cacheable-provider set.
///
/// Populated once during bootstrap and then read-only; see the
/// "Shared state" section of the concurrency model.
pub struct ProviderRegistry<C: Capability> {
    factories: RwLock<HashMap<String, Factory<C>>>,
    default_name: RwLock<Option<String>>,
    fallback_chain: RwLock<Vec<String>>,
    cacheable: RwLock<HashSet<String>>,
}

impl<C: Capability> Default for ProviderRegistry<C> {
    fn default() -> Self {
        ProviderRegistry {
            factories: RwLock::new(HashMap::new()),
            default_name: RwLock::new(None),
            fallback_chain: RwLock::new(Vec::new()),
            cacheable: RwLock::new(HashSet::new()),
        }
    }
}

impl<C: Capability> ProviderRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Box<C::Provider> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .expect("provider registry lock poisoned")
            .insert(name.to_ascii_lowercase(), Arc::new(factory));
    }

    pub fn register_default<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Box<C::Provider> + Send + Sync + 'static,
    {
        self.register(name, factory);
        *self
            .default_name
            .write()
            .expect("provider registry lock poisoned") = Some(name.to_ascii_lowercase());
    }

    pub fn set_fallback_chain(&self, names: Vec<String>) {
        *self
            .fallback_chain
            .write()
            .expect("provider registry lock poisoned") =
            names.into_iter().map(|n| n.to_ascii_lowercase()).collect();
    }

    pub fn mark_cacheable(&self, name: &str) {
        self.cacheable
            .write()
            .expect("provider registry lock poisoned")
            .insert(name.to_ascii_lowercase());
    }

    /// Build a fresh provider instance for `name`, or the default provider
    /// if `name` is `None`. Returns `None` if nothing matches.
    pub fn new_instance(&self, name: Option<&str>) -> Option<Box<C::Provider>> {
        let key = match name {
            Some(n) => n.to_ascii_lowercase(),
            None => self
                .default_name
                .read()
                .expect("provider registry lock poisoned")
                .clone()?,
        };
        let factories = self.factories.read().expect("provider registry lock poisoned");
        factories.get(&key).map(|factory| factory())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories
            .read()
            .expect("provider registry lock poisoned")
            .contains_key(&name.to_ascii_lowercase())
    }

    pub fn is_cacheable(&self, name: &str) -> bool {
        self.cacheable
            .read()
            .expect("provider registry lock poisoned")
            .contains(&name.to_ascii_lowercase())
    }

    pub fn fallback_chain(&self) -> Vec<String> {
        self.fallback_chain
            .read()
            .expect("provider registry lock poisoned")
            .clone()
    }

    pub fn default_name(&self) -> Option<String> {
        self.default_name
            .read()
            .expect("provider registry lock poisoned")
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::Quality;

    struct Dummy(&'static str);

    #[async_trait]
    impl GeocodeService for Dummy {
        fn tag(&self) -> &str {
            self.0
        }

        async fn geocode(&self, _address: &Address) -> Result<Option<Geocode>> {
            Ok(Some(Geocode {
                lat: 0.0,
                lon: 0.0,
                method: self.0.to_owned(),
                quality: Quality::House,
                cached: false,
            }))
        }

        async fn reverse_geocode(&self, _lat: f64, _lon: f64) -> Result<Option<Address>> {
            Ok(None)
        }
    }

    #[test]
    fn registry_is_case_insensitive_and_falls_back_to_default() {
        let registry: ProviderRegistry<GeocodeCapability> = ProviderRegistry::new();
        registry.register_default("usps", || Box::new(Dummy("usps")));
        registry.register("tiger", || Box::new(Dummy("tiger")));
        registry.set_fallback_chain(vec!["Tiger".to_owned()]);
        registry.mark_cacheable("tiger");

        assert!(registry.is_registered("USPS"));
        assert!(registry.is_registered("tiger"));
        assert!(!registry.is_registered("yahoo"));
        assert!(registry.is_cacheable("TIGER"));
        assert!(!registry.is_cacheable("usps"));
        assert_eq!(registry.fallback_chain(), vec!["tiger".to_owned()]);

        let default_provider = registry.new_instance(None).unwrap();
        assert_eq!(default_provider.tag(), "usps");

        let named_provider = registry.new_instance(Some("TIGER")).unwrap();
        assert_eq!(named_provider.tag(), "tiger");

        assert!(registry.new_instance(Some("nope")).is_none());
    }
}
