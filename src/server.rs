//! HTTP surface: district resolution and address-validation endpoints.
//!
//! Grounded on the teacher's `server.rs`: an `Arc<State>` handed to every
//! handler through `Extension`/`State`, a small `ErrorResponse` JSON shape,
//! and `axum::Server::bind` as the entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    addresses::Address,
    district::DistrictResult,
    errors::{ResolverError, StatusCode},
    providers::AddressResult,
    resolution::{DistrictRequest, Resolver},
};

pub struct AppState {
    pub resolver: Arc<Resolver>,
    pub usps: Option<Arc<dyn crate::providers::AddressService>>,
    /// `district.strategy.single`: the `districtStrategy` default for
    /// `/api/district/assign` when a caller doesn't name one.
    pub default_strategy_single: String,
    /// `district.strategy.bluebird`: same, for `/api/district/bluebird`.
    pub default_strategy_bluebird: String,
    /// `geocode.threads`: worker-pool width for the batch district
    /// assignment executor, shared with `GeocodePipeline::geocode_batch`.
    pub batch_concurrency: usize,
}

/// Run the server. Does not return under normal operation.
pub async fn run_server(listen_addr: &str, state: Arc<AppState>) -> Result<()> {
    let app = Router::new()
        .route("/healthz", get(handle_healthz))
        .route(
            "/api/district/assign",
            get(handle_district_get::<AssignEndpoint>).post(handle_district_post::<AssignEndpoint>),
        )
        .route(
            "/api/district/bluebird",
            get(handle_district_get::<BluebirdEndpoint>).post(handle_district_post::<BluebirdEndpoint>),
        )
        .route(
            "/api/address/validate",
            get(handle_address_get::<ValidateOp>).post(handle_address_post::<ValidateOp>),
        )
        .route(
            "/api/address/citystate",
            get(handle_address_get::<CityStateOp>).post(handle_address_post::<CityStateOp>),
        )
        .route(
            "/api/address/zipcode",
            get(handle_address_get::<ZipcodeOp>).post(handle_address_post::<ZipcodeOp>),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    let listen_addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("could not parse listen address: {listen_addr:?}"))?;

    axum::Server::bind(&listen_addr)
        .serve(app.into_make_service())
        .await
        .context("web server failed to start")
}

async fn handle_healthz() -> &'static str {
    "ok"
}

/// An error response shape uniform across every endpoint:
/// `{statusCode, message}`.
#[derive(Serialize)]
struct ErrorResponse {
    #[serde(rename = "statusCode")]
    status_code: StatusCode,
    message: String,
}

struct ApiError(ResolverError);

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ResolverError>() {
            Ok(resolver_err) => ApiError(resolver_err),
            Err(err) => ApiError(ResolverError::new(StatusCode::InternalError, err)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let http_status = match self.0.status {
            StatusCode::MissingAddress
            | StatusCode::MissingGeocode
            | StatusCode::MissingPoint
            | StatusCode::MissingInputParams
            | StatusCode::InsufficientAddress
            | StatusCode::InvalidAddress
            | StatusCode::InvalidGeocode
            | StatusCode::NonNyState => axum::http::StatusCode::BAD_REQUEST,
            StatusCode::ServiceNotSupported | StatusCode::ProviderNotSupported => {
                axum::http::StatusCode::NOT_FOUND
            }
            StatusCode::NoGeocodeResult
            | StatusCode::NoReverseGeocodeResult
            | StatusCode::NoAddressValidateResult
            | StatusCode::NoDistrictResult => axum::http::StatusCode::NOT_FOUND,
            StatusCode::ResponseMissingError
            | StatusCode::ResponseParseError
            | StatusCode::InternalError
            | StatusCode::DatabaseError => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            _ => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(status = %self.0.status, error = %self.0.source, "request failed");
        (
            http_status,
            Json(ErrorResponse {
                status_code: self.0.status,
                message: self.0.source.to_string(),
            }),
        )
            .into_response()
    }
}

/// Query params shared by `/api/district/{assign,bluebird}`, both forms of
/// address or point input overlaid onto one struct.
#[derive(Debug, Deserialize)]
struct DistrictQuery {
    #[serde(flatten)]
    address: Address,
    lat: Option<f64>,
    lon: Option<f64>,
    provider: Option<String>,
    #[serde(rename = "geoProvider")]
    geo_provider: Option<String>,
    #[serde(rename = "uspsValidate", default)]
    usps_validate: bool,
    #[serde(rename = "skipGeocode", default)]
    skip_geocode: bool,
    #[serde(rename = "showMembers", default)]
    show_members: bool,
    #[serde(rename = "showMaps", default)]
    show_maps: bool,
    #[serde(rename = "showMultiMatch", default)]
    show_multi_match: bool,
    #[serde(rename = "districtStrategy")]
    district_strategy: Option<String>,
}

impl DistrictQuery {
    fn into_request(self, default_strategy: &str) -> (Option<(f64, f64)>, Address, DistrictRequest) {
        let point = match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        };
        let request = DistrictRequest {
            usps_validate: self.usps_validate,
            skip_geocode: self.skip_geocode,
            show_maps: self.show_maps,
            show_members: self.show_members,
            district_strategy: Some(
                self.district_strategy.unwrap_or_else(|| default_strategy.to_owned()),
            ),
            provider: self.provider,
            geo_provider: self.geo_provider,
            types: None,
            force_multi_match: self.show_multi_match,
        };
        (point, self.address, request)
    }
}

/// Picks the `district.strategy.*` default between `/assign` and
/// `/bluebird`, since both routes share one handler body.
trait DistrictEndpoint {
    fn default_strategy(state: &AppState) -> String;
}

struct AssignEndpoint;
impl DistrictEndpoint for AssignEndpoint {
    fn default_strategy(state: &AppState) -> String {
        state.default_strategy_single.clone()
    }
}

struct BluebirdEndpoint;
impl DistrictEndpoint for BluebirdEndpoint {
    fn default_strategy(state: &AppState) -> String {
        state.default_strategy_bluebird.clone()
    }
}

async fn handle_district_get<E: DistrictEndpoint>(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DistrictQuery>,
) -> Result<Json<DistrictResult>, ApiError> {
    let default_strategy = E::default_strategy(&state);
    let (point, address, request) = query.into_request(&default_strategy);
    let result = resolve_one(&state, point, address, &request).await?;
    Ok(Json(result))
}

/// Batch form: a JSON array of address objects, each resolved
/// independently; output stays in input order.
async fn handle_district_post<E: DistrictEndpoint>(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DistrictQuery>,
    Json(body): Json<Vec<Address>>,
) -> Result<Json<Vec<Option<DistrictResult>>>, ApiError> {
    let default_strategy = E::default_strategy(&state);
    let (_, _, request) = query.into_request(&default_strategy);
    let outcomes = state
        .resolver
        .resolve_batch(body, request, state.batch_concurrency)
        .await;
    let results = outcomes
        .into_iter()
        .map(|outcome| match outcome {
            Some(Ok(result)) => Some(result),
            Some(Err(err)) => {
                tracing::warn!(error = %err, "batch district resolution failed for one address");
                None
            }
            None => None,
        })
        .collect();
    Ok(Json(results))
}

async fn resolve_one(
    state: &AppState,
    point: Option<(f64, f64)>,
    address: Address,
    request: &DistrictRequest,
) -> Result<DistrictResult, ApiError> {
    let result = match point {
        Some((lat, lon)) => state.resolver.resolve_point(lat, lon, request).await?,
        None => state.resolver.resolve_address(address, request).await?,
    };
    Ok(result)
}

/// The three address-service operations, as a small trait dispatched at
/// compile time so `/validate`, `/citystate`, and `/zipcode` can share one
/// handler body.
#[async_trait]
trait AddressOp {
    async fn call(
        service: &dyn crate::providers::AddressService,
        address: &Address,
    ) -> Result<AddressResult>;
}

struct ValidateOp;
#[async_trait]
impl AddressOp for ValidateOp {
    async fn call(
        service: &dyn crate::providers::AddressService,
        address: &Address,
    ) -> Result<AddressResult> {
        service.validate(address).await
    }
}

struct CityStateOp;
#[async_trait]
impl AddressOp for CityStateOp {
    async fn call(
        service: &dyn crate::providers::AddressService,
        address: &Address,
    ) -> Result<AddressResult> {
        service.lookup_city_state(address).await
    }
}

struct ZipcodeOp;
#[async_trait]
impl AddressOp for ZipcodeOp {
    async fn call(
        service: &dyn crate::providers::AddressService,
        address: &Address,
    ) -> Result<AddressResult> {
        service.lookup_zipcode(address).await
    }
}

async fn handle_address_get<Op: AddressOp>(
    State(state): State<Arc<AppState>>,
    Query(address): Query<Address>,
) -> Result<Json<AddressResult>, ApiError> {
    let service = state
        .usps
        .as_ref()
        .ok_or_else(|| ResolverError::msg(StatusCode::ServiceNotSupported, "no address service configured"))?;
    let result = Op::call(service.as_ref(), &address).await?;
    Ok(Json(result))
}

async fn handle_address_post<Op: AddressOp>(
    State(state): State<Arc<AppState>>,
    Json(address): Json<Address>,
) -> Result<Json<AddressResult>, ApiError> {
    let service = state
        .usps
        .as_ref()
        .ok_or_else(|| ResolverError::msg(StatusCode::ServiceNotSupported, "no address service configured"))?;
    let result = Op::call(service.as_ref(), &address).await?;
    Ok(Json(result))
}

