use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

use nerve_domain::config::Config;
use nerve_engine::{Engine, ProxyBridge};
use nerve_protocol::EventSink;
use nerve_sessions::SessionRegistry;
use nerve_workflow::WorkflowRegistry;

use nerve_gateway::{framed, http, BroadcastSink, GatewayState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("nerve.yaml"));
    let config = Arc::new(Config::load(&config_path).await?);

    init_tracing(&config.observability);
    tracing::info!(path = %config_path.display(), "nerve gateway starting");

    let workflows = Arc::new(WorkflowRegistry::new());
    let registry = Arc::new(SessionRegistry::new(workflows));
    let proxy_bridge = Arc::new(ProxyBridge::new());

    let broadcast = Arc::new(BroadcastSink::new(1024));
    let sink: Arc<dyn EventSink> = broadcast.clone();
    let engine = Arc::new(Engine::new(registry, config.clone(), proxy_bridge, sink));

    let shutdown = Arc::new(Notify::new());
    let state = GatewayState { engine: engine.clone(), sink: broadcast, shutdown: shutdown.clone() };

    // ── TCP transport ────────────────────────────────────────────
    if let Some(tcp_bind) = config.server.tcp_bind.clone() {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = framed::serve_tcp(&tcp_bind, engine).await {
                tracing::error!(error = %e, "TCP transport exited");
            }
        });
    }

    // ── Unix-socket transport ───────────────────────────────────────
    #[cfg(unix)]
    {
        let unix_path = config.server.unix_socket_path.clone();
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = framed::serve_unix(&unix_path, engine).await {
                tracing::error!(error = %e, path = %unix_path, "Unix-socket transport exited");
            }
        });
    }

    // ── HTTP transport ───────────────────────────────────────────────
    let http_bind = config.server.http_bind.clone();
    let listener = tokio::net::TcpListener::bind(&http_bind).await?;
    tracing::info!(addr = %http_bind, "HTTP transport listening");
    let app = http::router(state);

    axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown(shutdown)).await?;

    engine.shutdown().await;
    tracing::info!("nerve gateway stopped");
    Ok(())
}

async fn wait_for_shutdown(shutdown: Arc<Notify>) {
    tokio::select! {
        _ = shutdown.notified() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

fn init_tracing(observability: &nerve_domain::config::ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(observability.log_filter.clone()));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if observability.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
