//! Webhook server exposing a local provider
//!
//! Any [`Provider`] can be served; the daemon uses this to put the configured
//! provider behind the webhook protocol for remote controllers.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use extdns_core::traits::Provider;
use extdns_core::{Changes, Endpoint, Error, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::MEDIA_TYPE;

#[derive(Clone)]
struct ServerState {
    provider: Arc<dyn Provider>,
}

/// Build the webhook router for `provider`
pub fn router(provider: Arc<dyn Provider>) -> Router {
    Router::new()
        .route("/", get(negotiate))
        .route("/healthz", get(healthz))
        .route("/records", get(get_records).post(apply_changes))
        .route("/adjustendpoints", axum::routing::post(adjust_endpoints))
        .layer(TraceLayer::new_for_http())
        .with_state(ServerState { provider })
}

/// Serve `provider` on `listener` until `shutdown` is cancelled
pub async fn serve(
    listener: TcpListener,
    provider: Arc<dyn Provider>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| Error::http(format!("Listener has no local address: {}", e)))?;
    info!("Webhook server for {} listening on {}", provider.name(), addr);

    axum::serve(listener, router(provider))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::http(format!("Webhook server failed: {}", e)))
}

fn webhook_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(MEDIA_TYPE));
    headers
}

/// Whether the client's Accept header admits the webhook media type
fn accepts_media_type(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(header::ACCEPT) else {
        return true;
    };
    let Ok(accept) = accept.to_str() else {
        return false;
    };
    accept.split(',').any(|candidate| {
        let candidate = candidate.trim();
        candidate == "*/*" || candidate.replace(' ', "").starts_with(MEDIA_TYPE)
    })
}

fn error_response(err: &Error) -> Response {
    let status = match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidEndpoint(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn negotiate(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    if !accepts_media_type(&headers) {
        debug!("Rejecting negotiation: client does not accept {}", MEDIA_TYPE);
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }
    match state.provider.domain_filter().await {
        Ok(filter) => {
            let mut headers = webhook_headers();
            headers.insert(header::VARY, HeaderValue::from_static("Content-Type"));
            (headers, Json(filter)).into_response()
        }
        Err(e) => {
            error!("GET / failed: {}", e);
            error_response(&e)
        }
    }
}

async fn get_records(State(state): State<ServerState>) -> Response {
    match state.provider.records().await {
        Ok(records) => {
            debug!("GET /records -> {} endpoint(s)", records.len());
            (webhook_headers(), Json(records)).into_response()
        }
        Err(e) => {
            error!("GET /records failed: {}", e);
            error_response(&e)
        }
    }
}

async fn apply_changes(State(state): State<ServerState>, Json(changes): Json<Changes>) -> Response {
    info!(
        "POST /records: {} create(s), {} update(s), {} delete(s)",
        changes.create.len(),
        changes.update_new.len(),
        changes.delete.len()
    );
    match state.provider.apply_changes(&changes).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("POST /records failed: {}", e);
            error_response(&e)
        }
    }
}

async fn adjust_endpoints(
    State(state): State<ServerState>,
    Json(endpoints): Json<Vec<Endpoint>>,
) -> Response {
    match state.provider.adjust_endpoints(endpoints).await {
        Ok(adjusted) => (webhook_headers(), Json(adjusted)).into_response(),
        Err(e) => {
            error!("POST /adjustendpoints failed: {}", e);
            error_response(&e)
        }
    }
}
