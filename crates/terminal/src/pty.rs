//! PTY-fork backend: spawns a child attached to a freshly allocated
//! pseudo terminal and accumulates its output into a rolling buffer.
//!
//! Grounded on the reference implementation's `pty_backend.py`
//! (fork + non-blocking `select`-driven reads into a string buffer),
//! re-expressed with `portable-pty` and a `spawn_blocking` reader task
//! feeding a shared buffer instead of a hand-rolled `select` loop.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::oneshot;

use nerve_domain::error::{Error, Result};

use crate::backend::{TerminalBackend, MAX_BUFFER_BYTES};

struct SharedState {
    buffer: Mutex<Vec<u8>>,
    closed: AtomicBool,
}

pub struct PtyBackend {
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    state: Arc<SharedState>,
    _reader_done: oneshot::Receiver<()>,
}

impl PtyBackend {
    /// Fork a child into a new PTY sized `rows`x`cols`, running
    /// `command` with `args` in `cwd`, with `TERM=xterm-256color` and
    /// any caller-supplied environment variables merged in.
    pub fn start(
        command: &str,
        args: &[String],
        cwd: Option<&str>,
        env: &[(String, String)],
        rows: u16,
        cols: u16,
    ) -> Result<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| Error::Backend(format!("openpty failed: {e}")))?;

        let mut builder = CommandBuilder::new(command);
        builder.args(args);
        if let Some(cwd) = cwd {
            builder.cwd(cwd);
        }
        builder.env("TERM", "xterm-256color");
        for (k, v) in env {
            builder.env(k, v);
        }

        let child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| Error::Backend(format!("spawn failed: {e}")))?;
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| Error::Backend(format!("take_writer failed: {e}")))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| Error::Backend(format!("clone_reader failed: {e}")))?;

        let state = Arc::new(SharedState { buffer: Mutex::new(Vec::new()), closed: AtomicBool::new(false) });
        let (done_tx, done_rx) = oneshot::channel();

        let reader_state = state.clone();
        tokio::task::spawn_blocking(move || {
            let mut chunk = [0u8; 4096];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        let mut buf = reader_state.buffer.lock();
                        buf.extend_from_slice(&chunk[..n]);
                        let overflow = buf.len().saturating_sub(MAX_BUFFER_BYTES);
                        if overflow > 0 {
                            buf.drain(0..overflow);
                        }
                    }
                    Err(_) => break,
                }
            }
            reader_state.closed.store(true, Ordering::SeqCst);
            let _ = done_tx.send(());
        });

        Ok(Self {
            master: Mutex::new(pair.master),
            writer: Mutex::new(writer),
            child: Mutex::new(child),
            state,
            _reader_done: done_rx,
        })
    }
}

#[async_trait]
impl TerminalBackend for PtyBackend {
    async fn write(&self, data: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(Error::invalid_state("backend is closed"));
        }
        tokio::task::block_in_place(|| {
            let mut w = self.writer.lock();
            w.write_all(data).map_err(|e| Error::Backend(format!("write failed: {e}")))?;
            w.flush().map_err(|e| Error::Backend(format!("flush failed: {e}")))
        })
    }

    async fn buffer(&self) -> String {
        String::from_utf8_lossy(&self.state.buffer.lock()).to_string()
    }

    async fn interrupt(&self) -> Result<()> {
        self.write(&[0x03]).await
    }

    async fn stop(&self, timeout: Duration) -> Result<()> {
        self.interrupt().await.ok();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_closed() {
                return Ok(());
            }
            {
                let mut child = self.child.lock();
                if let Ok(Some(_)) = child.try_wait() {
                    self.state.closed.store(true, Ordering::SeqCst);
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                let mut child = self.child.lock();
                let _ = child.kill();
                let _ = child.wait();
                self.state.closed.store(true, Ordering::SeqCst);
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        self.master
            .lock()
            .resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| Error::Backend(format!("resize failed: {e}")))
    }

    fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}
