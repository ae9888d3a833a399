//! Binary entry point: parses configuration and CLI flags, wires together
//! the geocode/district/address stores, and either starts the HTTP server
//! or runs a one-shot address resolution for ops/debugging.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use nys_districts::{
    addresses::Address,
    config::{spawn_reloader, Config},
    district::{
        assigner::Assigner, cityzip::CityZipLookup, multimatch::MultiMatch,
        shapefile::ShapefileStore, streetfile::StreetFileStore, wfs::WfsDistrictService,
    },
    errors::display_causes_and_backtrace,
    geocode::{cache::GeocodeCache, pipeline::GeocodePipeline},
    http_client::shared_http_client,
    providers::{DistrictCapability, GeocodeCapability, ProviderRegistry},
    resolution::{proximity_threshold_meters, DistrictRequest, Resolver},
    server::{run_server, AppState},
    usps::UspsAddressService,
    Result,
};
use opinionated_metrics::Mode;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info_span, warn};
use tracing_subscriber::{
    fmt::{format::FmtSpan, Subscriber},
    prelude::*,
    EnvFilter,
};

#[cfg(all(feature = "jemallocator", not(target_env = "msvc")))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Our command-line arguments.
#[derive(Debug, Parser)]
#[command(author, version, about = "geocoding and district resolution service for New York State")]
struct Opt {
    /// Path to the key/value config file (TOML).
    #[arg(long = "config", default_value = "config.toml")]
    config_path: PathBuf,

    /// How often to re-read the config file for live reload.
    #[arg(long = "config-reload-seconds", default_value = "30")]
    config_reload_seconds: u64,

    /// Command to run.
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP server. The default when no subcommand is given.
    Serve {
        #[arg(long = "listen-address", default_value = "127.0.0.1:8787")]
        listen_address: String,
    },
    /// Resolve a single address and print the result as JSON. Useful for
    /// verifying a deployment without going through the HTTP surface.
    Resolve {
        #[arg(long)]
        addr1: String,
        #[arg(long, default_value = "")]
        addr2: String,
        #[arg(long)]
        city: String,
        #[arg(long, default_value = "NY")]
        state: String,
        #[arg(long)]
        zip5: String,
        #[arg(long, default_value = "")]
        zip4: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env();
    Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_env_filter(filter)
        .finish()
        .init();
    let _span = info_span!("nys-districts").entered();
    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let opt = Opt::parse();
    if let Err(err) = run(opt).await {
        display_causes_and_backtrace(&err);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(opt: Opt) -> Result<()> {
    let config = Arc::new(Config::load(&opt.config_path)?);
    spawn_reloader(
        Arc::clone(&config),
        opt.config_path.clone(),
        Duration::from_secs(opt.config_reload_seconds),
    );
    let snapshot = config.snapshot();

    let metrics_handle = opinionated_metrics::Builder::new(Mode::Server).install()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&snapshot.database_url)
        .await?;

    let shapefile = Arc::new(ShapefileStore::new(pool.clone()));
    shapefile.cache_district_maps().await?;
    let streetfile = Arc::new(StreetFileStore::new(pool.clone()));

    let assigner = Arc::new(Assigner::new(Arc::clone(&shapefile), Arc::clone(&streetfile)));
    let city_zip = Arc::new(CityZipLookup::new(Arc::clone(&shapefile), Arc::clone(&streetfile)));
    let multimatch = Arc::new(MultiMatch::new(
        Arc::clone(&shapefile),
        Arc::clone(&streetfile),
        city_zip,
    ));

    let http_client = shared_http_client(snapshot.geocode_threads.max(1));

    let geocode_registry: Arc<ProviderRegistry<GeocodeCapability>> = Arc::new(ProviderRegistry::new());
    // Concrete third-party geocoders (Yahoo/Google/MapQuest/OSM/Tiger, or
    // whatever an operator licenses) are pluggable leaf components outside
    // this crate; register them here from `snapshot.providers` when one is
    // available, e.g.:
    //
    //   geocode_registry.register_default("tiger", move || Box::new(TigerGeocoder::new(...)));
    for name in &snapshot.geocoder_cacheable {
        geocode_registry.mark_cacheable(name);
    }
    geocode_registry.set_fallback_chain(snapshot.geocoder_rank.clone());

    let geocache = GeocodeCache::new(pool.clone(), snapshot.geocache_buffer_size);
    let geocode_pipeline = Arc::new(GeocodePipeline::new(Arc::clone(&geocode_registry), geocache));

    let district_registry: Arc<ProviderRegistry<DistrictCapability>> =
        Arc::new(ProviderRegistry::new());
    if let Some(wfs_credentials) = snapshot.providers.get("wfs") {
        let base_url: url::Url = wfs_credentials.url.parse()?;
        let client = Arc::clone(&http_client);
        district_registry.register("wfs", move || {
            Box::new(WfsDistrictService::new(Arc::clone(&client), base_url.clone()))
        });
    }

    let usps: Option<Arc<dyn nys_districts::providers::AddressService>> =
        match snapshot.providers.get("usps") {
            Some(credentials) => {
                let base_url: url::Url = credentials.url.parse()?;
                let user_id = credentials.api_key.clone().unwrap_or_default();
                Some(Arc::new(UspsAddressService::new(
                    Arc::clone(&http_client),
                    base_url,
                    user_id,
                )))
            }
            None => None,
        };

    let resolver = Arc::new(Resolver::new(
        geocode_pipeline,
        geocode_registry,
        assigner,
        multimatch,
        usps.clone(),
        None,
        None,
        proximity_threshold_meters(snapshot.proximity_threshold),
        Some(district_registry),
    ));

    let result = match opt.cmd.unwrap_or(Command::Serve {
        listen_address: "127.0.0.1:8787".to_owned(),
    }) {
        Command::Serve { listen_address } => {
            let state = Arc::new(AppState {
                resolver,
                usps,
                default_strategy_single: snapshot.district_strategy_single.clone(),
                default_strategy_bluebird: snapshot.district_strategy_bluebird.clone(),
                batch_concurrency: snapshot.geocode_threads.max(1),
            });
            run_server(&listen_address, state).await
        }
        Command::Resolve {
            addr1,
            addr2,
            city,
            state,
            zip5,
            zip4,
        } => {
            let address = Address {
                addr1,
                addr2,
                city,
                state,
                zip5,
                zip4,
                is_parsed: false,
            };
            let result = resolver
                .resolve_address(address, &DistrictRequest::default())
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    };

    if let Err(err) = metrics_handle.report().await {
        warn!("could not report metrics: {:?}", err);
    }

    result
}
