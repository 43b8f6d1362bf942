use axum::{Router, routing::get};
use owo_colors::OwoColorize;
use std::sync::OnceLock;
use tokio::net::TcpListener;

use crate::shutdown::shutdown_signal;

static PROM_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

fn install_recorder_once() -> &'static metrics_exporter_prometheus::PrometheusHandle {
    PROM_HANDLE.get_or_init(|| {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .install_recorder()
            .expect("install global metrics recorder")
    })
}

/// Starts the `/healthz`, `/readyz`, `/metrics` server on `port` if `Some`, returning
/// immediately. A no-op when `port` is `None` (the ambient metrics surface is optional).
pub fn maybe_spawn_metrics_server(port: Option<u16>) {
    let Some(port) = port else {
        return;
    };
    let _ = install_recorder_once();
    tokio::spawn(run_metrics_server(port));
}

async fn run_metrics_server(port: u16) {
    let handle = install_recorder_once().clone();
    let metrics_route = get(move || async move { handle.render() });
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }))
        .route("/metrics", metrics_route);

    let addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("{}", format!("🛑 failed to bind metrics server to {addr}: {e}").red());
            return;
        }
    };
    println!("{}", format!("📈 metrics server listening on {addr}").green());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("metrics server failed");
}
