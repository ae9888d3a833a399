//! `geocode(GeocodeRequest)`: walks providers in order (caller override,
//! then default, then fallback chain), consulting the cache first and
//! writing successful cacheable results back through it.

use std::sync::Arc;

use crate::{
    addresses::{self, Address},
    batch::{execute_ordered, CancellationToken},
    geocode::{cache::GeocodeCache, GeocodedAddress, Quality},
    providers::{GeocodeCapability, ProviderRegistry},
    Result,
};

/// A single geocode request.
#[derive(Clone, Debug)]
pub struct GeocodeRequest {
    pub address: Address,
    /// Explicit provider override (`provider` query param); falls back to
    /// the registry default, then its fallback chain.
    pub provider: Option<String>,
}

pub struct GeocodePipeline {
    registry: Arc<ProviderRegistry<GeocodeCapability>>,
    cache: Arc<GeocodeCache>,
}

impl GeocodePipeline {
    pub fn new(
        registry: Arc<ProviderRegistry<GeocodeCapability>>,
        cache: Arc<GeocodeCache>,
    ) -> GeocodePipeline {
        GeocodePipeline { registry, cache }
    }

    /// Walk the provider chain for one address. Consults the cache first; a
    /// `HOUSE`-quality hit short-circuits the whole chain. Blanks the
    /// address line before calling providers when the parsed address is a
    /// PO box.
    #[tracing::instrument(skip(self), fields(addr1 = %request.address.addr1))]
    pub async fn geocode(&self, request: GeocodeRequest) -> Result<GeocodedAddress> {
        let street = addresses::parse(&request.address)?;

        if let Some(hit) = self.cache.lookup(&street).await? {
            if hit.quality() >= Quality::House {
                return Ok(hit);
            }
        }

        let provider_address = if street.po_box.is_some() {
            Address {
                addr1: String::new(),
                ..request.address.clone()
            }
        } else {
            request.address.clone()
        };

        let mut chain: Vec<String> = Vec::new();
        if let Some(name) = &request.provider {
            chain.push(name.clone());
        } else if let Some(default) = self.registry.default_name() {
            chain.push(default);
        }
        for name in self.registry.fallback_chain() {
            if !chain.contains(&name) {
                chain.push(name);
            }
        }

        let mut last_unsuccessful: Option<GeocodedAddress> = None;
        for name in &chain {
            let Some(provider) = self.registry.new_instance(Some(name)) else {
                continue;
            };
            let geocode = match provider.geocode(&provider_address).await {
                Ok(geocode) => geocode,
                Err(err) => {
                    tracing::warn!(provider = %name, error = %err, "geocode provider failed");
                    continue;
                }
            };
            let Some(geocode) = geocode else { continue };
            let candidate = GeocodedAddress {
                address: request.address.clone(),
                geocode: Some(geocode),
            };
            if candidate.quality() >= Quality::House {
                if self.registry.is_cacheable(name) {
                    self.cache.put(candidate.clone()).await?;
                }
                return Ok(candidate);
            }
            last_unsuccessful = Some(candidate);
        }

        Ok(last_unsuccessful.unwrap_or(GeocodedAddress {
            address: request.address,
            geocode: None,
        }))
    }

    /// Batch geocoding via the bounded worker pool (`geocode.threads`,
    /// default 3); used whenever a provider has no native batch path.
    pub async fn geocode_batch(
        self: &Arc<Self>,
        requests: Vec<GeocodeRequest>,
        concurrency: usize,
        cancellation: Option<CancellationToken>,
    ) -> Vec<Option<Result<GeocodedAddress>>> {
        let pipeline = Arc::clone(self);
        execute_ordered(requests, concurrency, cancellation, move |request| {
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.geocode(request).await }
        })
        .await
    }
}
