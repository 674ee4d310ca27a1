//! The terminal backend contract (§4.1): a byte pipe to a pseudo
//! terminal, or an attachment to an externally-owned pane, each
//! exposing the same interface to parsers and terminal nodes.

use async_trait::async_trait;
use nerve_domain::error::{Error, Result};

/// Caps the rolling in-memory buffer a PTY backend accumulates so a
/// long-lived chatty child can't grow it without bound.
pub const MAX_BUFFER_BYTES: usize = 4 * 1024 * 1024;

#[async_trait]
pub trait TerminalBackend: Send + Sync {
    /// Deliver raw bytes. The caller is responsible for line endings
    /// and control characters.
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// The current accumulated content (PTY) or fresh snapshot (attach).
    async fn buffer(&self) -> String;

    /// The last `n` lines of `buffer()`.
    async fn read_tail(&self, n: usize) -> String {
        let buf = self.buffer().await;
        buf.lines().rev().take(n).collect::<Vec<_>>().into_iter().rev().collect::<Vec<_>>().join("\n")
    }

    /// Deliver SIGINT (byte 0x03 for PTY backends; backend-specific key
    /// injection for attach backends).
    async fn interrupt(&self) -> Result<()>;

    /// Graceful termination, escalating to forceful after `timeout`.
    async fn stop(&self, timeout: std::time::Duration) -> Result<()>;

    /// Resize the underlying pane, where supported.
    async fn resize(&self, rows: u16, cols: u16) -> Result<()>;

    /// Attach backends only: bring the pane into focus. PTY-fork
    /// backends have no concept of focus.
    async fn focus(&self) -> Result<()> {
        Err(Error::invalid_state("focus() is not supported by this backend"))
    }

    /// True once the underlying process/pane has terminated and no
    /// further writes will succeed.
    fn is_closed(&self) -> bool;
}
