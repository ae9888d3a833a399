//! Geocoding and political/administrative district resolution for New York
//! State: address parsing, a provider-backed geocode pipeline with a
//! write-through cache, shapefile/street-file district assignment and
//! consolidation, and the multi-match overlap fallback.

pub use anyhow::Result;

pub mod addresses;
pub mod batch;
pub mod config;
pub mod district;
pub mod errors;
pub mod geocode;
pub mod http_client;
pub mod providers;
pub mod resolution;
pub mod server;
pub mod usps;
