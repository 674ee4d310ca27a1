//! Transports for the MCP node: a stdio subprocess transport (the only
//! one in active use) and an SSE transport stub.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use nerve_domain::config::McpServerConfig;

use crate::protocol::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_SKIP_LINES: u32 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to spawn MCP server: {0}")]
    Spawn(String),
    #[error("MCP transport io error: {0}")]
    Io(String),
    #[error("MCP request timed out")]
    Timeout,
    #[error("MCP transport is not alive")]
    NotAlive,
    #[error("MCP transport does not support this operation")]
    Unsupported,
}

#[async_trait::async_trait]
pub trait McpTransport: Send + Sync {
    async fn send_request(&self, method: &str, params: Option<serde_json::Value>) -> Result<JsonRpcResponse, TransportError>;
    async fn send_notification(&self, method: &str) -> Result<(), TransportError>;
    fn is_alive(&self) -> bool;
    async fn shutdown(&self);
}

pub struct StdioTransport {
    child: Mutex<Child>,
    stdin: Mutex<tokio::process::ChildStdin>,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    request_lock: Mutex<()>,
}

impl StdioTransport {
    pub fn spawn(config: &McpServerConfig) -> Result<Self, TransportError> {
        let mut command = Command::new(&config.command);
        command.args(&config.args);
        for (k, v) in &config.env {
            command.env(k, v);
        }
        command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::null());

        let mut child = command.spawn().map_err(|e| TransportError::Spawn(e.to_string()))?;
        let stdin = child.stdin.take().ok_or_else(|| TransportError::Spawn("no stdin".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| TransportError::Spawn("no stdout".into()))?;

        let alive = Arc::new(AtomicBool::new(true));
        let transport = Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            next_id: AtomicU64::new(1),
            alive,
            request_lock: Mutex::new(()),
        };

        // `send_request` takes `child.stdout` for the duration of the
        // call and puts it back afterwards; only one request is ever in
        // flight at a time, serialized by `request_lock`.
        transport.child.try_lock().expect("freshly constructed").stdout = Some(stdout);
        Ok(transport)
    }
}

#[async_trait::async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(&self, method: &str, params: Option<serde_json::Value>) -> Result<JsonRpcResponse, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::NotAlive);
        }
        let _guard = self.request_lock.lock().await;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);
        let mut line = serde_json::to_string(&req).map_err(|e| TransportError::Io(e.to_string()))?;
        line.push('\n');

        {
            let mut stdin = self.stdin.lock().await;
            stdin.write_all(line.as_bytes()).await.map_err(|e| TransportError::Io(e.to_string()))?;
            stdin.flush().await.map_err(|e| TransportError::Io(e.to_string()))?;
        }

        let stdout = {
            let mut child = self.child.lock().await;
            child.stdout.take()
        };
        let Some(stdout) = stdout else {
            return Err(TransportError::Io("stdout already consumed".into()));
        };
        let mut reader = BufReader::new(stdout);

        let result = tokio::time::timeout(RESPONSE_TIMEOUT, async {
            let mut skipped = 0u32;
            loop {
                let mut line = String::new();
                let n = reader.read_line(&mut line).await.map_err(|e| TransportError::Io(e.to_string()))?;
                if n == 0 {
                    return Err(TransportError::Io("MCP server closed stdout".into()));
                }
                match serde_json::from_str::<JsonRpcResponse>(line.trim()) {
                    Ok(resp) if resp.id == id => return Ok(resp),
                    _ => {
                        skipped += 1;
                        if skipped > MAX_SKIP_LINES {
                            return Err(TransportError::Io("too many unrelated lines on stdout".into()));
                        }
                    }
                }
            }
        })
        .await
        .map_err(|_| TransportError::Timeout)?;

        {
            let mut child = self.child.lock().await;
            child.stdout = Some(reader.into_inner());
        }

        result
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::NotAlive);
        }
        let notif = JsonRpcNotification::new(method);
        let mut line = serde_json::to_string(&notif).map_err(|e| TransportError::Io(e.to_string()))?;
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await.map_err(|e| TransportError::Io(e.to_string()))?;
        stdin.flush().await.map_err(|e| TransportError::Io(e.to_string()))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        {
            // Closing stdin is the graceful signal: most MCP servers
            // treat EOF on stdin as a request to exit.
            let mut stdin = self.stdin.lock().await;
            let _ = stdin.shutdown().await;
        }
        let mut child = self.child.lock().await;
        let waited = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
        if waited.is_err() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }
}

/// SSE transport is not implemented: servers configured with it are
/// registered but non-functional, matching the stdio-only MCP support
/// actually exercised by this control plane.
pub struct SseTransport;

#[async_trait::async_trait]
impl McpTransport for SseTransport {
    async fn send_request(&self, _method: &str, _params: Option<serde_json::Value>) -> Result<JsonRpcResponse, TransportError> {
        Err(TransportError::Unsupported)
    }

    async fn send_notification(&self, _method: &str) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }

    fn is_alive(&self) -> bool {
        false
    }

    async fn shutdown(&self) {}
}
