//! Coordinator HTTP server.
//!
//! Serves the knowledge API consumed by the direct transport. Uploads pass
//! through a token-bucket limiter; everything else is read-only.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::domain::models::{AggregateDocument, CoordinatorConfig};
use crate::infrastructure::transport::wire::{
    DownloadResponse, ErrorResponse, UploadResponse, API_BASE_PATH, CONTRIBUTOR_TOKEN_HEADER,
};
use crate::services::round_coordinator::{CoordinatorStats, RoundCoordinator};

/// Configuration for the coordinator HTTP server.
#[derive(Debug, Clone)]
pub struct CoordinatorHttpConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on; 0 picks an ephemeral port.
    pub port: u16,
    /// Sustained uploads per second.
    pub requests_per_second: u32,
    /// Uploads accepted in a burst.
    pub burst_size: u32,
    /// Whether to enable CORS.
    pub enable_cors: bool,
}

impl Default for CoordinatorHttpConfig {
    fn default() -> Self {
        Self::from(&CoordinatorConfig::default())
    }
}

impl From<&CoordinatorConfig> for CoordinatorHttpConfig {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            requests_per_second: config.requests_per_second,
            burst_size: config.burst_size,
            enable_cors: true,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Shared state for the coordinator HTTP server.
struct AppState {
    coordinator: Arc<RoundCoordinator>,
    limiter: DefaultDirectRateLimiter,
}

/// Coordinator HTTP server.
pub struct CoordinatorServer {
    config: CoordinatorHttpConfig,
    coordinator: Arc<RoundCoordinator>,
}

impl CoordinatorServer {
    pub fn new(coordinator: Arc<RoundCoordinator>, config: CoordinatorHttpConfig) -> Self {
        Self {
            config,
            coordinator,
        }
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        let rate = NonZeroU32::new(self.config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.config.burst_size).unwrap_or(rate);
        let state = Arc::new(AppState {
            coordinator: Arc::clone(&self.coordinator),
            limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
        });

        let api = Router::new()
            .route("/upload", post(upload))
            .route("/download", get(download))
            .route("/stats", get(stats))
            .route("/ping", get(ping));

        let app = Router::new()
            .nest(API_BASE_PATH, api)
            .route("/health", get(health_check))
            .with_state(state);

        if self.config.enable_cors {
            app.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
                .layer(TraceLayer::new_for_http())
        } else {
            app.layer(TraceLayer::new_for_http())
        }
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind coordinator to {addr}"))?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        info!(addr = %listener.local_addr()?, "coordinator HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Coordinator HTTP server failed")
    }
}

// Handler functions

async fn health_check() -> &'static str {
    "OK"
}

async fn ping() -> &'static str {
    "pong"
}

async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    if state.limiter.check().is_err() {
        warn!("upload rate limited");
        return Err(api_error(StatusCode::TOO_MANY_REQUESTS, "rate limited"));
    }

    let token = headers
        .get(CONTRIBUTOR_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("missing {CONTRIBUTOR_TOKEN_HEADER} header"),
            )
        })?;

    let document: AggregateDocument = serde_json::from_slice(&body)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("invalid document: {e}")))?;

    match state.coordinator.contribute(token, &document).await {
        Ok(receipt) => Ok(Json(UploadResponse {
            accepted: true,
            round_number: receipt.round_number,
            round_closed: receipt.round_closed,
        })),
        Err(e) => {
            error!(error = %e, "failed to merge contribution");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn download(State(state): State<Arc<AppState>>) -> Json<DownloadResponse> {
    Json(DownloadResponse::from(state.coordinator.snapshot().await))
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<CoordinatorStats> {
    Json(state.coordinator.stats().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AggregateEntry, StatFamily, TacticKey};
    use crate::domain::ports::SystemClock;
    use crate::services::round_coordinator::RoundPolicy;
    use axum::http::HeaderValue;
    use chrono::Utc;

    fn state(threshold: usize, burst_size: u32) -> Arc<AppState> {
        let coordinator = Arc::new(RoundCoordinator::new(
            RoundPolicy {
                contributor_threshold: threshold,
                ..RoundPolicy::default()
            },
            Arc::new(SystemClock),
        ));
        let quota = Quota::per_second(NonZeroU32::MIN)
            .allow_burst(NonZeroU32::new(burst_size).unwrap());
        Arc::new(AppState {
            coordinator,
            limiter: RateLimiter::direct(quota),
        })
    }

    fn body() -> Bytes {
        let mut doc = AggregateDocument::empty(Utc::now());
        doc.insert(
            StatFamily::Tactics,
            AggregateEntry::new(TacticKey::new("kite", "ranged").unwrap(), 4, 3).unwrap(),
        );
        Bytes::from(serde_json::to_vec(&doc).unwrap())
    }

    fn token_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTRIBUTOR_TOKEN_HEADER, HeaderValue::from_str(token).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_upload_requires_token() {
        let (status, _) = upload(State(state(10, 10)), HeaderMap::new(), body())
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_rejects_malformed_document() {
        let bad = Bytes::from_static(br#"{"produced_at":"2024-03-01T00:00:00Z","tactics":[{"key":{"tactic_id":"x","category":"melee"},"total_attempts":1,"successful_attempts":5}]}"#);
        let (status, Json(error)) = upload(State(state(10, 10)), token_headers("a"), bad)
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error.error.starts_with("invalid document"));
    }

    #[tokio::test]
    async fn test_upload_closes_round_at_threshold() {
        let state = state(2, 10);
        let Json(first) = upload(State(Arc::clone(&state)), token_headers("a"), body())
            .await
            .unwrap();
        assert!(first.accepted);
        assert!(!first.round_closed);

        let Json(second) = upload(State(Arc::clone(&state)), token_headers("b"), body())
            .await
            .unwrap();
        assert_eq!(second.round_number, 1);
        assert!(second.round_closed);

        let Json(snapshot) = download(State(state)).await;
        match snapshot {
            DownloadResponse::Available {
                round_number,
                contributor_count,
                document,
                ..
            } => {
                assert_eq!(round_number, 1);
                assert_eq!(contributor_count, 2);
                assert_eq!(document.total_attempts(), 8);
            }
            DownloadResponse::Unavailable => panic!("expected a finalized snapshot"),
        }
    }

    #[tokio::test]
    async fn test_upload_rate_limited() {
        let state = state(10, 1);
        upload(State(Arc::clone(&state)), token_headers("a"), body())
            .await
            .unwrap();
        let (status, _) = upload(State(state), token_headers("b"), body())
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_download_unavailable_before_first_round() {
        let Json(response) = download(State(state(10, 10))).await;
        assert_eq!(response, DownloadResponse::Unavailable);
    }
}
