//! Axum HTTP surface for the relay.
//!
//! Routes:
//! - `GET /` readiness text, `POST /` wrong-endpoint error
//! - `GET /v1/models` model catalog
//! - `POST /v1/chat/completions` (and its CORS preflight)
//!
//! Every response carries a permissive CORS origin and a fresh request id.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::BytesRejection, ConnectInfo, DefaultBodyLimit, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::app::{App, Completion};
use crate::catalog::list_models;
use crate::error::ErrorBody;
use crate::models::ChatRequest;
use crate::ratelimit::{FixedWindowLimiter, RateLimiter};
use crate::stream::SseStream;
use crate::{Error, Result};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub app: Arc<App>,
    pub limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    /// Wrap an app with the per-minute limiter its config asks for.
    pub fn new(app: App) -> Self {
        let limiter = FixedWindowLimiter::per_minute(app.config().rate_limit_per_minute);
        Self::with_limiter(app, Arc::new(limiter))
    }

    pub fn with_limiter(app: App, limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            app: Arc::new(app),
            limiter,
        }
    }
}

/// Build the full router. Rate limiting covers the `/v1` routes only.
pub fn router(state: AppState) -> Router {
    let body_limit = state.app.config().max_body_bytes;
    let limited = Router::new()
        .route("/v1/models", get(models))
        .route(
            "/v1/chat/completions",
            post(chat_completions).options(preflight),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_rate_limit,
        ));

    Router::new()
        .route("/", get(readiness).post(wrong_endpoint))
        .merge(limited)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::map_response(tag_response))
        .with_state(state)
}

/// Run the relay on a pre-bound listener until Ctrl-C.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Relay listening on {addr}");
    info!("Point OpenAI clients at: http://{addr}/v1");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Relay shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
}

async fn readiness(State(state): State<AppState>) -> String {
    let config = state.app.config();
    format!(
        "Congratulations! Your API is working! You can now make requests to the API.\n\nEndpoint: {}:{}/v1",
        config.host, config.port
    )
}

async fn wrong_endpoint() -> Error {
    Error::WrongEndpoint
}

async fn models(State(state): State<AppState>) -> impl IntoResponse {
    debug!("GET /v1/models");
    Json(list_models(state.app.config()))
}

async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type,Authorization"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
        ],
    )
}

async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Response> {
    debug!("POST /v1/chat/completions");

    let api_key = bearer_token(&headers)?;
    let body = body.map_err(body_error)?;
    let request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| Error::Validation(format!("Invalid request body: {e}")))?;

    info!(
        model = %request.model(),
        streaming = %request.stream,
        messages = request.messages.len(),
        "Processing chat completion request"
    );

    match state.app.chat_completion(request, api_key).await? {
        Completion::Full(response) => Ok(Json(response).into_response()),
        Completion::Stream(stream) => Ok(event_stream_response(stream)),
    }
}

/// Unreadable bodies become taxonomy errors instead of axum's plain-text reply.
fn body_error(rejection: BytesRejection) -> Error {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(rejection.body_text())
    } else {
        Error::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

/// Extract the key from `Authorization: Bearer <key>`.
fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(Error::MissingCredentials)
}

fn event_stream_response(stream: SseStream) -> Response {
    (
        [
            ("content-type", "text/event-stream"),
            ("cache-control", "no-cache"),
            ("x-accel-buffering", "no"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// Reject over-limit clients with 429 before any handler runs.
async fn enforce_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if state.limiter.allow(&key) {
        return next.run(request).await;
    }

    let mut response = Error::RateLimited.into_response();
    let wait = state.limiter.retry_after(&key);
    let retry_after = (wait.as_secs() + u64::from(wait.subsec_nanos() > 0)).max(1);
    if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

async fn tag_response(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    if let Ok(id) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
        headers.insert("x-request-id", id);
    }
    response
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let info = self.info();
        let status =
            StatusCode::from_u16(info.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        error!(
            status = status.as_u16(),
            code = info.code.as_deref().unwrap_or("-"),
            "{}",
            self
        );

        (status, Json(ErrorBody { error: &info })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_capture::ErrorEvents;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_extracted() {
        let headers = headers_with_auth("Bearer sk-123");
        assert_eq!(bearer_token(&headers).unwrap(), "sk-123");
    }

    #[test]
    fn test_bearer_token_missing() {
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(Error::MissingCredentials)
        ));
    }

    #[test]
    fn test_non_bearer_scheme_rejected() {
        let headers = headers_with_auth("Basic abc");
        assert!(matches!(bearer_token(&headers), Err(Error::MissingCredentials)));
    }

    #[test]
    fn test_empty_bearer_rejected() {
        let headers = headers_with_auth("Bearer ");
        assert!(bearer_token(&headers).is_err());
    }

    #[tokio::test]
    async fn test_error_response_status() {
        let response = Error::ModelNotFound("x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = Error::UpstreamTimeout(std::time::Duration::from_secs(1)).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_preflight_headers() {
        let response = preflight().await.into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "POST, OPTIONS"
        );
    }

    #[test]
    fn test_mapped_error_logged_once() {
        let events = ErrorEvents::capture();
        let response = Error::UpstreamHttp {
            status: 503,
            message: "down".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(events.count(), 1);
    }
}
