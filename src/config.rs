//! Live-reloadable configuration.
//!
//! The source configuration uses an observer callback to re-read config on
//! change (see Design Notes). We model that instead as an atomic reference
//! to an immutable snapshot: the reloader swaps in a new `Arc<ConfigSnapshot>`
//! and every in-flight reader keeps using the snapshot it already took.

use std::{collections::HashMap, path::Path, time::Duration};

use arc_swap::ArcSwap;
use serde::Deserialize;

use crate::Result;

/// A single provider's URL/API-key pair, as named in the key/value config.
#[derive(Clone, Debug, Deserialize)]
pub struct ProviderCredentials {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// An immutable configuration snapshot.
///
/// Readers call [`Config::snapshot`] once per request and use the returned
/// `Arc` for the lifetime of that request; they never observe a config
/// change mid-request.
#[derive(Clone, Debug, Deserialize)]
pub struct ConfigSnapshot {
    /// Providers that are active for each capability, keyed by capability
    /// name (`"geocode"`, `"address"`, `"district"`, `"map"`).
    #[serde(default)]
    pub geocoder_active: Vec<String>,
    /// Fallback order for geocoder providers.
    #[serde(default)]
    pub geocoder_rank: Vec<String>,
    /// Providers whose successful results are written through to the
    /// geocode cache.
    #[serde(default)]
    pub geocoder_cacheable: Vec<String>,
    /// Worker-pool size for the batch executors.
    #[serde(default = "default_geocode_threads")]
    pub geocode_threads: usize,
    /// Number of pending rows that triggers a geocode-cache flush.
    #[serde(default = "default_geocache_buffer_size")]
    pub geocache_buffer_size: usize,
    /// Boundary-proximity threshold, in the shapefile store's native units.
    #[serde(default = "default_proximity_threshold")]
    pub proximity_threshold: f64,
    /// Default district-assignment strategy for single-address requests.
    #[serde(default = "default_strategy")]
    pub district_strategy_single: String,
    /// Default district-assignment strategy for the "bluebird" endpoint.
    #[serde(default = "default_strategy")]
    pub district_strategy_bluebird: String,
    /// Per-provider URL/API-key pairs, keyed by provider name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderCredentials>,
    /// Postgres connection string for the geospatial schema.
    pub database_url: String,
}

fn default_geocode_threads() -> usize {
    3
}

fn default_geocache_buffer_size() -> usize {
    100
}

fn default_proximity_threshold() -> f64 {
    0.001
}

fn default_strategy() -> String {
    "standard".to_owned()
}

impl ConfigSnapshot {
    pub fn from_toml_str(text: &str) -> Result<ConfigSnapshot> {
        Ok(toml::from_str(text)?)
    }
}

/// An atomically swappable configuration handle.
///
/// This is populated once during bootstrap and handed out as an `Arc`;
/// re-reading config (e.g. from a SIGHUP handler or a watch task) replaces
/// the inner value without requiring readers to take a lock.
pub struct Config {
    inner: ArcSwap<ConfigSnapshot>,
}

impl Config {
    pub fn new(initial: ConfigSnapshot) -> Config {
        Config {
            inner: ArcSwap::from_pointee(initial),
        }
    }

    pub fn load(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        Ok(Config::new(ConfigSnapshot::from_toml_str(&text)?))
    }

    /// Take a reference-counted snapshot of the current configuration. Hold
    /// onto this for the duration of one request; don't call `snapshot`
    /// repeatedly within the same logical operation.
    pub fn snapshot(&self) -> std::sync::Arc<ConfigSnapshot> {
        self.inner.load_full()
    }

    /// Replace the current configuration. Existing snapshots already handed
    /// out are unaffected.
    pub fn reload(&self, new: ConfigSnapshot) {
        self.inner.store(std::sync::Arc::new(new));
    }
}

/// Spawn a background task that reloads `config` from `path` every
/// `interval`, logging and ignoring parse failures (stale config is safer
/// than crashing a running server on an operator typo).
pub fn spawn_reloader(
    config: std::sync::Arc<Config>,
    path: std::path::PathBuf,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match std::fs::read_to_string(&path) {
                Ok(text) => match ConfigSnapshot::from_toml_str(&text) {
                    Ok(snapshot) => config.reload(snapshot),
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to parse config reload, keeping previous snapshot")
                    }
                },
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read config file for reload")
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let text = r#"
            database_url = "postgres://localhost/districts"
        "#;
        let snapshot = ConfigSnapshot::from_toml_str(text).unwrap();
        assert_eq!(snapshot.geocode_threads, 3);
        assert_eq!(snapshot.geocache_buffer_size, 100);
        assert!((snapshot.proximity_threshold - 0.001).abs() < f64::EPSILON);
    }

    #[test]
    fn reload_does_not_affect_existing_snapshot() {
        let config = Config::new(ConfigSnapshot {
            geocoder_active: vec![],
            geocoder_rank: vec![],
            geocoder_cacheable: vec![],
            geocode_threads: 3,
            geocache_buffer_size: 100,
            proximity_threshold: 0.001,
            district_strategy_single: "standard".to_owned(),
            district_strategy_bluebird: "standard".to_owned(),
            providers: HashMap::new(),
            database_url: "postgres://localhost/districts".to_owned(),
        });
        let first = config.snapshot();
        config.reload(ConfigSnapshot {
            geocode_threads: 9,
            ..(*first).clone()
        });
        assert_eq!(first.geocode_threads, 3);
        assert_eq!(config.snapshot().geocode_threads, 9);
    }
}
