//! Per-node local proxy instances (§4.13): each tool-using terminal
//! node that needs to talk to a non-Anthropic backend gets its own
//! ephemeral-port HTTP proxy, started when the node starts and torn
//! down when it stops.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

use nerve_domain::config::{ApiFormat, ProviderSpec, ProxyConfig};
use nerve_domain::error::{Error, Result};

use crate::server::{self, ProxyKind};

pub struct ProxyHandle {
    pub port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl ProxyHandle {
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }
}

pub struct ProxyManager {
    instances: parking_lot::Mutex<HashMap<String, ProxyHandle>>,
}

impl Default for ProxyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyManager {
    pub fn new() -> Self {
        Self { instances: parking_lot::Mutex::new(HashMap::new()) }
    }

    /// Binds an ephemeral local port, starts serving, and registers the
    /// instance under `node_id`. Errors if a proxy is already running
    /// for that node.
    pub async fn start_proxy(&self, node_id: &str, provider: ProviderSpec, config: Arc<ProxyConfig>) -> Result<u16> {
        if self.instances.lock().contains_key(node_id) {
            return Err(Error::conflict(format!("proxy already running for node {node_id:?}")));
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(Error::Io)?;
        let port = listener.local_addr().map_err(Error::Io)?.port();

        let kind = match provider.api_format {
            ApiFormat::Anthropic => ProxyKind::Passthrough,
            ApiFormat::Openai => ProxyKind::Transform,
        };
        let app = server::build_router(kind, provider, config);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        health_check(port).await?;
        info!(node_id, port, "proxy started");

        self.instances.lock().insert(node_id.to_string(), ProxyHandle { port, shutdown: Some(shutdown_tx), join });
        Ok(port)
    }

    pub fn port_for(&self, node_id: &str) -> Option<u16> {
        self.instances.lock().get(node_id).map(|h| h.port)
    }

    pub async fn stop_proxy(&self, node_id: &str) -> Result<()> {
        let handle = self.instances.lock().remove(node_id).ok_or_else(|| Error::not_found(format!("proxy for node {node_id:?}")))?;
        handle.stop().await;
        Ok(())
    }

    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.instances.lock().keys().cloned().collect();
        for id in ids {
            let _ = self.stop_proxy(&id).await;
        }
    }
}

async fn health_check(port: u16) -> Result<()> {
    let client = reqwest::Client::new();
    for _ in 0..20 {
        if client.get(format!("http://127.0.0.1:{port}/health")).send().await.map(|r| r.status().is_success()).unwrap_or(false) {
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    Err(Error::Backend(format!("proxy on port {port} failed health check")))
}
