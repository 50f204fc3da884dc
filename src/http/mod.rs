use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{Registry, TextEncoder};
use tokio::{net::TcpListener, time::Duration};
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;

use crate::cli::KVPair;
use crate::metrics;
use crate::scrape::ScrapeCoordinator;

#[derive(Clone)]
struct HttpServiceState {
    coordinator: Arc<ScrapeCoordinator>,
    const_labels: Arc<Vec<KVPair>>,
    metrics: Arc<Registry>,
}

/// Serves the HTTP endpoints until `shutdown_token` is cancelled.
///
/// Every request to `/metrics` taking longer than `scrape_timeout` is answered with `408 Request Timeout`.
pub async fn init(
    listen_on: SocketAddr,
    coordinator: Arc<ScrapeCoordinator>,
    const_labels: Vec<KVPair>,
    scrape_timeout: Duration,
    shutdown_token: CancellationToken,
    metrics: Arc<Registry>,
) -> std::io::Result<()> {
    // Assemble the HTTP Service State object, that will be passed to the routes
    let state = HttpServiceState {
        coordinator,
        const_labels: Arc::new(const_labels),
        metrics,
    };

    // Setup Router
    let app = Router::new()
        // `GET /` goes to `root`
        .route("/", get(root))
        .route("/metrics", get(prometheus_metrics))
        .layer(TimeoutLayer::new(scrape_timeout))
        .with_state(state);

    // Setup Server, with Graceful Shutdown
    let listener = TcpListener::bind(listen_on).await?;

    info!("Begin listening on '{}'...", listen_on);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_token.cancelled_owned()).await
}

async fn root() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"), ": metrics at /metrics\n")
}

async fn prometheus_metrics(State(state): State<HttpServiceState>) -> impl IntoResponse {
    let mut status = StatusCode::OK;
    let mut headers = HeaderMap::new();

    // As defined by Prometheus: https://github.com/prometheus/docs/blob/main/content/docs/instrumenting/exposition_formats.md#basic-info
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));

    // --- CLUSTER METRICS ---
    let result = state.coordinator.scrape().await;
    let mut body = metrics::render(&result, &state.const_labels);

    // --- INTERNAL METRICS ---
    let metrics_family = state.metrics.gather();
    if let Err(e) = TextEncoder.encode_utf8(&metrics_family, &mut body) {
        status = StatusCode::INTERNAL_SERVER_ERROR;
        body = format!("Failed to encode metrics: {e}");
    }

    (status, headers, body)
}
