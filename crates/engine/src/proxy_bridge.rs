//! Thin wrapper tying `nerve_proxy::ProxyManager` lifecycle to node
//! lifecycle: a terminal node declaring a `provider` spec gets a local
//! proxy started before the backend spawns and torn down when the
//! node is deleted (§4.12 NodeLifecycleHandler, §4.13).

use std::sync::Arc;

use nerve_domain::config::{Config, ProviderSpec};
use nerve_domain::error::Result;
use nerve_proxy::ProxyManager;

#[derive(Default)]
pub struct ProxyBridge {
    manager: ProxyManager,
}

impl ProxyBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start_for_node(&self, node_id: &str, provider: ProviderSpec, config: &Config) -> Result<u16> {
        self.manager.start_proxy(node_id, provider, Arc::new(config.proxy.clone())).await
    }

    pub async fn stop_for_node(&self, node_id: &str) {
        let _ = self.manager.stop_proxy(node_id).await;
    }

    pub async fn stop_all(&self) {
        self.manager.stop_all().await;
    }
}
