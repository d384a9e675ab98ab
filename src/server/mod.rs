//! HTTP surface: `POST /api/run/` plus a health probe.
//!
//! The router only moves bytes in and out; all classification lives in
//! [`Gateway`](crate::handler::Gateway).

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handler::{Gateway, GatewayError, ResponseBody, ResponseEnvelope};

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match self.body {
            ResponseBody::Passthrough(bytes) => {
                (status, [(header::CONTENT_TYPE, "application/json")], bytes).into_response()
            }
            ResponseBody::Json(value) => (status, Json(value)).into_response(),
        }
    }
}

/// Build the application router. `max_request_bytes` caps how much of a
/// body is buffered before the gateway's own size check runs; anything
/// longer is still answered with the gateway's size error.
pub fn router(gateway: Arc<Gateway>, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/api/run/", post(run))
        .route("/api/run", post(run))
        .route("/api/health", get(health))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

async fn run(
    State(gateway): State<Arc<Gateway>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    match body {
        Ok(body) => gateway.handle(&body).await.into_response(),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => gateway
            .reject(GatewayError::PayloadTooLarge {
                max: gateway.max_input_bytes(),
            })
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn health(State(gateway): State<Arc<Gateway>>) -> Json<Value> {
    let limiter = gateway.limiter();
    Json(json!({
        "ok": true,
        "capacity": limiter.capacity(),
        "available": limiter.available(),
        "requests": gateway.stats(),
    }))
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!(%addr, "dronegate listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")
}
