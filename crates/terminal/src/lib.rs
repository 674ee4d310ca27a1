pub mod attach;
pub mod backend;
pub mod parser;
pub mod parsers;
pub mod pty;

pub use attach::{AttachAdapter, AttachBackend};
pub use backend::TerminalBackend;
pub use parser::Parser;
pub use pty::PtyBackend;
