//! Attach-to-external-pane backend.
//!
//! The specific terminal emulator used as an attachment target is out
//! of scope (see §1); this module specifies only the capability set
//! any such backend must expose, via the `AttachAdapter` trait, and
//! wraps an adapter implementation in a `TerminalBackend`.

use async_trait::async_trait;
use nerve_domain::error::{Error, Result};

use crate::backend::TerminalBackend;

/// The minimal capability set an externally-owned pane must expose to
/// be usable as an attach backend.
#[async_trait]
pub trait AttachAdapter: Send + Sync {
    async fn send_keys(&self, data: &[u8]) -> Result<()>;
    /// A fresh snapshot of the pane's current scrollback.
    async fn scrollback(&self) -> Result<String>;
    async fn send_interrupt(&self) -> Result<()>;
    async fn resize(&self, rows: u16, cols: u16) -> Result<()>;
    async fn focus(&self) -> Result<()>;
    fn is_alive(&self) -> bool;
}

pub struct AttachBackend<A: AttachAdapter> {
    pane_id: String,
    adapter: A,
}

impl<A: AttachAdapter> AttachBackend<A> {
    pub fn attach(pane_id: impl Into<String>, adapter: A) -> Self {
        Self { pane_id: pane_id.into(), adapter }
    }

    pub fn pane_id(&self) -> &str {
        &self.pane_id
    }
}

#[async_trait]
impl<A: AttachAdapter> TerminalBackend for AttachBackend<A> {
    async fn write(&self, data: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(Error::invalid_state("pane is no longer alive"));
        }
        self.adapter.send_keys(data).await
    }

    async fn buffer(&self) -> String {
        self.adapter.scrollback().await.unwrap_or_default()
    }

    async fn interrupt(&self) -> Result<()> {
        self.adapter.send_interrupt().await
    }

    async fn stop(&self, _timeout: std::time::Duration) -> Result<()> {
        // We do not own the pane's process; releasing simply means we
        // stop polling it. Nothing to tear down here.
        Ok(())
    }

    async fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        self.adapter.resize(rows, cols).await
    }

    async fn focus(&self) -> Result<()> {
        self.adapter.focus().await
    }

    fn is_closed(&self) -> bool {
        !self.adapter.is_alive()
    }
}
