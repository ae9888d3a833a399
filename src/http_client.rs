//! A shared `hyper` client with a connection pool, reused across requests
//! for keep-alive. Carried over verbatim from the teacher's
//! `geocoders::shared_http_client` — every HTTP provider (WFS, USPS) wants
//! the same pooling behavior.

use std::sync::Arc;

use hyper::{client::HttpConnector, Client};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};

pub type SharedHttpClient = Arc<Client<HttpsConnector<HttpConnector>>>;

pub fn shared_http_client(concurrency: usize) -> SharedHttpClient {
    Arc::new(
        Client::builder().pool_max_idle_per_host(concurrency).build(
            HttpsConnectorBuilder::new()
                .with_native_roots()
                .https_only()
                .enable_http2()
                .build(),
        ),
    )
}
