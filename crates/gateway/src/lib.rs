//! Thin transport framings over the command/event envelope (§6). The
//! gateway owns nothing domain-specific -- it builds an `Engine`,
//! wires a broadcast-backed `EventSink` into it, and exposes that one
//! dispatch surface over HTTP, a Unix-domain socket, and TCP.

pub mod framed;
pub mod http;
pub mod sink;
pub mod state;

pub use sink::BroadcastSink;
pub use state::GatewayState;
