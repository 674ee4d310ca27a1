//! The engine dispatcher (§4.12): the single `execute(command) ->
//! command_result` surface a transport (gateway) drives. Everything
//! else in this crate -- node construction, proxy lifecycle, and the
//! handler domains -- exists to support that one entry point.

pub mod dispatcher;
pub mod handlers;
pub mod node_factory;
pub mod proxy_bridge;

pub use dispatcher::Engine;
pub use proxy_bridge::ProxyBridge;
