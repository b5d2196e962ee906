//! HTTP/JSON transport
//!
//! # API Endpoints
//!
//! ## GET /analysis/{domain}
//!
//! Analyze a domain. The response is an analysis result; `source` says
//! whether it came from the provider or the local fallback.
//!
//! ```json
//! {
//!   "domain": "crab.io",
//!   "brandability": 88,
//!   "memorability": 91,
//!   "seo_potential": 70,
//!   "rarity": 65,
//!   "investment_grade": "A",
//!   "estimated_value_usd": 4200,
//!   "summary": "Short and catchy.",
//!   "source": "provider",
//!   "analyzed_at": "2024-06-10T12:00:00Z"
//! }
//! ```
//!
//! A request may wait while the queue paces provider calls.
//!
//! ## POST /analyze
//!
//! Same as above with the domain in the body: `{ "domain": "crab.io" }`.
//!
//! ## GET /stats
//!
//! Queue state and counters as JSON.
//!
//! ## POST /quota/reset
//!
//! Clear quota exhaustion and the window counter now. Returns the stats.
//!
//! ## POST /cache/clear
//!
//! Drop every cached result: `{ "removed": 12 }`.
//!
//! ## GET /metrics
//!
//! Prometheus text format.
//!
//! ## GET /health
//!
//! Returns "OK" with 200 status.
//!
//! # Errors
//!
//! Errors are `{ "error": "..." }` with status 400 for an empty domain, 500
//! when the fallback failed and 503 when the queue is gone.

use super::Transport;
use crate::metrics::{Metrics, RequestOutcome};
use crate::types::{AnalyzeRequest, ClearCacheResponse, ErrorResponse, normalize_domain};
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json},
    routing::{get, post},
};
use domainiq::{AnalysisHandle, AnalysisResult, QueueError, QueueStats};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// HTTP transport implementation
pub struct HttpTransport {
    addr: SocketAddr,
    metrics: Arc<Metrics>,
}

impl HttpTransport {
    pub fn new(host: &str, port: u16, metrics: Arc<Metrics>) -> Result<Self> {
        let addr = format!("{host}:{port}").parse()?;
        Ok(Self { addr, metrics })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start(self, queue: AnalysisHandle) -> Result<()> {
        let app = router(queue, self.metrics);

        tracing::info!("HTTP server listening on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

struct AppState {
    queue: AnalysisHandle,
    metrics: Arc<Metrics>,
}

/// Build the API router around a running queue
pub fn router(queue: AnalysisHandle, metrics: Arc<Metrics>) -> Router {
    let state = Arc::new(AppState { queue, metrics });

    Router::new()
        .route("/analysis/{domain}", get(handle_get_analysis))
        .route("/analyze", post(handle_analyze))
        .route("/stats", get(handle_stats))
        .route("/quota/reset", post(handle_quota_reset))
        .route("/cache/clear", post(handle_cache_clear))
        .route("/metrics", get(handle_metrics))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

async fn handle_get_analysis(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> Result<Json<AnalysisResult>, ApiError> {
    analyze(&state, &domain).await
}

async fn handle_analyze(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisResult>, ApiError> {
    analyze(&state, &req.domain).await
}

async fn analyze(state: &AppState, raw: &str) -> Result<Json<AnalysisResult>, ApiError> {
    let start = Instant::now();
    let domain = normalize_domain(raw);

    let outcome = state.queue.get_analysis(&domain).await;
    let latency_us = start.elapsed().as_micros() as u64;

    match outcome {
        Ok(result) => {
            state.metrics.record_request(latency_us, result.source.into());
            Ok(Json(result))
        }
        Err(err) => {
            let status = status_for(&err);
            if status.is_server_error() {
                tracing::error!(domain = %domain, error = %err, "Analysis failed");
                state.metrics.record_request(latency_us, RequestOutcome::Error);
            } else {
                state.metrics.record_request(latency_us, RequestOutcome::Rejected);
            }
            Err(error_response(status, &err))
        }
    }
}

async fn handle_stats(State(state): State<Arc<AppState>>) -> Result<Json<QueueStats>, ApiError> {
    state
        .queue
        .stats()
        .await
        .map(Json)
        .map_err(|err| error_response(status_for(&err), &err))
}

async fn handle_quota_reset(
    State(state): State<Arc<AppState>>,
) -> Result<Json<QueueStats>, ApiError> {
    let reset = async {
        state.queue.reset_quota().await?;
        state.queue.stats().await
    };

    reset
        .await
        .map(Json)
        .map_err(|err| error_response(status_for(&err), &err))
}

async fn handle_cache_clear(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClearCacheResponse>, ApiError> {
    state
        .queue
        .clear_cache()
        .await
        .map(|removed| Json(ClearCacheResponse { removed }))
        .map_err(|err| error_response(status_for(&err), &err))
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.queue.stats().await.ok();
    let body = state.metrics.export_prometheus(stats.as_ref());

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

/// HTTP status for a queue error
pub fn status_for(err: &QueueError) -> StatusCode {
    match err {
        QueueError::EmptyKey => StatusCode::BAD_REQUEST,
        QueueError::Fallback(_) => StatusCode::INTERNAL_SERVER_ERROR,
        QueueError::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_response(status: StatusCode, err: &QueueError) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}
