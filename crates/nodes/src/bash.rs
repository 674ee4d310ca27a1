//! Bash node (§4.5): runs one shell command per execution, ephemeral,
//! with captured stdout/stderr and a strict timeout. Also tool-capable
//! so chat nodes can shell out (contributes a single `bash` tool).

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use nerve_domain::error::{Error, Result};
use nerve_domain::execution::ExecutionContext;
use nerve_domain::node::{NodeCapabilities, NodeDescriptor, NodeState, NodeVariant};
use nerve_domain::tool::ToolDefinition;

use crate::node::{Node, ToolCapable};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct BashNode {
    descriptor: NodeDescriptor,
    current: Arc<Mutex<Option<Child>>>,
}

impl BashNode {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let mut descriptor = NodeDescriptor::new(id, NodeVariant::Bash)?;
        descriptor.persistent = false;
        descriptor.capabilities = NodeCapabilities { tool_capable: true, multi_tool: false, forkable: false };
        Ok(Self { descriptor, current: Arc::new(Mutex::new(None)) })
    }

    fn extract_command(input: &Value) -> Result<String> {
        match input {
            Value::String(s) => Ok(s.clone()),
            Value::Object(map) => map
                .get("command")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::invalid_input("bash node input requires a \"command\" string")),
            _ => Err(Error::invalid_input("bash node input must be a string or {command}")),
        }
    }

    async fn run(&self, command: &str, timeout: Duration) -> Value {
        let start = Instant::now();
        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                return serde_json::json!({
                    "success": false,
                    "stdout": "",
                    "stderr": "",
                    "exit_code": null,
                    "command": command,
                    "error": format!("failed to spawn: {e}"),
                    "interrupted": false,
                    "duration_ms": start.elapsed().as_millis() as u64,
                });
            }
        };

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        *self.current.lock().await = Some(child);

        let current = self.current.clone();
        let wait_fut = async {
            let mut stdout = String::new();
            let mut stderr = String::new();
            if let Some(p) = stdout_pipe.as_mut() {
                let _ = p.read_to_string(&mut stdout).await;
            }
            if let Some(p) = stderr_pipe.as_mut() {
                let _ = p.read_to_string(&mut stderr).await;
            }
            let status = match current.lock().await.as_mut() {
                Some(c) => c.wait().await,
                None => return (None, stdout, stderr),
            };
            (Some(status), stdout, stderr)
        };

        let outcome = tokio::time::timeout(timeout, wait_fut).await;
        *self.current.lock().await = None;

        match outcome {
            Ok((status, stdout, stderr)) => {
                let exit_code = status.and_then(|s| s.ok()).and_then(|s| s.code());
                serde_json::json!({
                    "success": exit_code == Some(0),
                    "stdout": stdout,
                    "stderr": stderr,
                    "exit_code": exit_code,
                    "command": command,
                    "error": Value::Null,
                    "interrupted": false,
                    "duration_ms": start.elapsed().as_millis() as u64,
                })
            }
            Err(_) => serde_json::json!({
                "success": false,
                "stdout": "",
                "stderr": "",
                "exit_code": null,
                "command": command,
                "error": "timed out",
                "interrupted": false,
                "duration_ms": start.elapsed().as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl Node for BashNode {
    fn descriptor(&self) -> NodeDescriptor {
        self.descriptor.clone()
    }

    fn state(&self) -> NodeState {
        NodeState::Ready
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<Value> {
        let command = Self::extract_command(&ctx.input)?;
        let timeout = ctx.timeout.unwrap_or(DEFAULT_TIMEOUT);
        Ok(self.run(&command, timeout).await)
    }

    async fn interrupt(&self) -> Result<()> {
        if let Some(child) = self.current.lock().await.as_mut() {
            let _ = child.start_kill();
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.interrupt().await
    }
}

#[async_trait]
impl ToolCapable for BashNode {
    async fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "bash".to_string(),
            description: "Run a shell command and return its stdout/stderr/exit code.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "command": { "type": "string" } },
                "required": ["command"],
            }),
            owner_node_id: Some(self.descriptor.id.clone()),
        }]
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<String> {
        if name != "bash" {
            return Ok(format!("unknown tool {name:?}"));
        }
        let command = Self::extract_command(&args)?;
        let result = self.run(&command, DEFAULT_TIMEOUT).await;
        Ok(serde_json::to_string(&result).unwrap_or_default())
    }
}
