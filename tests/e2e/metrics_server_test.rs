#[allow(dead_code, unused_imports)]
mod helpers;

use chatrelay::context::AppContext;
use chatrelay::metrics::outcomes;
use helpers::*;
use std::sync::Arc;
use tokio::net::TcpListener;

async fn start_metrics(ctx: Arc<AppContext>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let shutdown = ctx.shutdown.clone();
    tokio::spawn(async move {
        let _ = chatrelay::api::serve_metrics(listener, ctx, shutdown).await;
    });
    port
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_counters() {
    let ctx = Arc::new(AppContext::new(abc_config()).unwrap());
    ctx.metrics.record_bytes_sent(42);
    ctx.metrics.record_file_relay(outcomes::COMPLETED);
    let port = start_metrics(ctx.clone()).await;

    let body = reqwest::get(format!("http://127.0.0.1:{port}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("chatrelay_bytes_sent_total 42"));
    assert!(body.contains("chatrelay_file_relays_total{outcome=\"completed\"} 1"));
    assert!(body.contains("chatrelay_sessions_online"));
}

#[tokio::test]
async fn test_health_reports_sessions() {
    let server = start_server(abc_config()).await;
    let _a = server.login("A", "a").await;
    let port = start_metrics(server.ctx.clone()).await;

    let resp = reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: serde_json::Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["sessions_online"], 1);
}

#[tokio::test]
async fn test_livez() {
    let ctx = Arc::new(AppContext::new(abc_config()).unwrap());
    let port = start_metrics(ctx).await;
    let resp = reqwest::get(format!("http://127.0.0.1:{port}/livez"))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_traffic_shows_up_in_metrics() {
    let server = start_server(abc_config()).await;
    let mut a = server.login("A", "a").await;
    a.send("/TIME").await;
    let _ = a.recv().await;
    let port = start_metrics(server.ctx.clone()).await;

    let body = reqwest::get(format!("http://127.0.0.1:{port}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains(&format!("chatrelay_bytes_received_total {}", a.written)));
    assert!(body.contains("chatrelay_connections_total 1"));
}
