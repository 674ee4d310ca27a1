pub mod circuit;
pub mod manager;
pub mod passthrough;
pub mod server;
pub mod tool_id_mapper;
pub mod transform;

pub use circuit::CircuitBreaker;
pub use manager::{ProxyHandle, ProxyManager};
pub use passthrough::PassthroughProxy;
pub use server::ProxyKind;
pub use tool_id_mapper::ToolIdMapper;
