//! Optional HTTP endpoint exposing Prometheus metrics and liveness checks.

use crate::context::AppContext;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use prometheus_client::encoding::text::encode;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    sessions_online: usize,
    uptime_secs: u64,
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/livez", get(|| async { "ok" }))
        .with_state(ctx)
}

pub async fn start_metrics_server(
    listen_addr: &str,
    ctx: Arc<AppContext>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    serve_metrics(listener, ctx, shutdown).await
}

/// Serve on an already bound listener until `shutdown` fires.
pub async fn serve_metrics(
    listener: TcpListener,
    ctx: Arc<AppContext>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "Metrics server listening");
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn metrics_handler(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let mut buffer = String::new();
    if encode(&mut buffer, &ctx.metrics.registry).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "encoding error").into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}

async fn health_handler(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    if ctx.shutdown.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    Json(HealthResponse {
        status: "ok",
        sessions_online: ctx.registry.count(),
        uptime_secs: ctx.start_time.elapsed().as_secs(),
    })
    .into_response()
}
