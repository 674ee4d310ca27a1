use std::sync::Arc;

use tokio::sync::Notify;

use nerve_engine::Engine;

use crate::sink::BroadcastSink;

/// Shared state for every transport. `Clone` is cheap -- everything
/// inside is already behind an `Arc`.
#[derive(Clone)]
pub struct GatewayState {
    pub engine: Arc<Engine>,
    pub sink: Arc<BroadcastSink>,
    pub shutdown: Arc<Notify>,
}
