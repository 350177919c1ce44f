use crate::api;
use crate::config::types::AppConfig;
use crate::context::AppContext;
use crate::logging::LogBuffer;
use crate::session;
use crate::utils::format_duration;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Main server orchestrator: bind, serve until `/CLOSE` or a signal, then
/// close every session.
pub async fn run(config: AppConfig, log_buffer: Arc<LogBuffer>) -> Result<()> {
    let ctx = Arc::new(AppContext::with_log_buffer(config, log_buffer)?);
    let listener = TcpListener::bind(&ctx.config.server.listen).await?;

    let metrics_task = spawn_metrics_server(&ctx);
    tokio::spawn(handle_signals(ctx.shutdown.clone()));

    serve(listener, ctx.clone()).await?;

    if let Some(task) = metrics_task {
        let _ = task.await;
    }
    Ok(())
}

/// Accept loop on an already bound listener. Returns once shutdown has been
/// requested and every session has finished (or the close deadline passed).
pub async fn serve(listener: TcpListener, ctx: Arc<AppContext>) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(
        addr = %addr,
        users = ctx.credentials.len(),
        max_connections = ctx.config.server.max_connections,
        "Server started"
    );

    let limit = match ctx.config.server.max_connections {
        0 => None,
        n => Some(Arc::new(Semaphore::new(n as usize))),
    };
    let tracker = TaskTracker::new();

    loop {
        let (stream, peer) = tokio::select! {
            result = listener.accept() => match result {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Accept error");
                    continue;
                }
            },
            _ = ctx.shutdown.cancelled() => {
                info!("Server shutting down (no new connections)");
                break;
            }
        };

        let permit = match &limit {
            Some(semaphore) => match semaphore.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!(peer = %peer, "Connection limit reached, dropping connection");
                    drop(stream);
                    continue;
                }
            },
            None => None,
        };

        let ctx = ctx.clone();
        tracker.spawn(async move {
            let _permit = permit;
            if let Err(e) = session::handle_connection(stream, ctx).await {
                // Already logged inside the session span.
                debug!(error = %e, "Connection ended with error");
            }
        });
    }

    drop(listener);
    close_sessions(&ctx);
    tracker.close();

    let deadline = Duration::from_secs(ctx.config.server.shutdown_timeout.saturating_add(1));
    if tokio::time::timeout(deadline, tracker.wait()).await.is_err() {
        warn!(
            remaining = tracker.len(),
            "Sessions still open after shutdown deadline"
        );
    }

    let traffic = ctx.metrics.traffic();
    info!(
        uptime = %format_duration(ctx.start_time.elapsed().as_secs()),
        bytes_sent = traffic.bytes_sent,
        bytes_received = traffic.bytes_received,
        "Server stopped"
    );
    Ok(())
}

/// Empty the registry and close every session that was in it.
fn close_sessions(ctx: &AppContext) {
    let drained = ctx.registry.drain();
    ctx.metrics.set_sessions_online(0);
    if !drained.is_empty() {
        info!(sessions = drained.len(), "Closing online sessions");
    }
    for (user, handle) in drained {
        debug!(user = %user, peer = %handle.peer(), "Closing session");
        handle.close();
    }
}

/// Spawn the metrics server task (if configured)
fn spawn_metrics_server(ctx: &Arc<AppContext>) -> Option<tokio::task::JoinHandle<()>> {
    if !ctx.config.metrics.enabled {
        return None;
    }
    let listen = ctx.config.metrics.listen.clone();
    let shutdown = ctx.shutdown.clone();
    let ctx = ctx.clone();

    Some(tokio::spawn(async move {
        if let Err(e) = api::start_metrics_server(&listen, ctx, shutdown).await {
            error!(error = %e, "Metrics server error");
        }
    }))
}

#[cfg(unix)]
async fn handle_signals(shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown"),
        _ = tokio::signal::ctrl_c() => info!("Interrupt received, initiating graceful shutdown"),
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}

#[cfg(not(unix))]
async fn handle_signals(shutdown: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, initiating graceful shutdown");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}
