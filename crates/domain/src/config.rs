//! Top-level configuration, loaded from YAML/TOML and environment
//! overrides. Structured the way the teacher's `domain::config` module
//! aggregates sub-configs: one `Config` struct, one section per
//! concern, `#[serde(default)]` everywhere so partial files are valid.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_unix_socket")]
    pub unix_socket_path: String,
    #[serde(default)]
    pub tcp_bind: Option<String>,
    #[serde(default = "d_http_bind")]
    pub http_bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { unix_socket_path: d_unix_socket(), tcp_bind: None, http_bind: d_http_bind() }
    }
}

fn d_unix_socket() -> String {
    "/tmp/nerve.sock".into()
}

fn d_http_bind() -> String {
    "127.0.0.1:7421".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "d_default_session")]
    pub default_session: String,
    #[serde(default = "d_state_path")]
    pub state_path: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self { default_session: d_default_session(), state_path: d_state_path() }
    }
}

fn d_default_session() -> String {
    "default".into()
}

fn d_state_path() -> String {
    "./.nerve".into()
}

/// Readiness-polling tunables named explicitly as configurable in the
/// design notes, with the source's defaults retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    #[serde(default = "d_poll_interval_ms")]
    pub readiness_poll_interval_ms: u64,
    #[serde(default = "d_consecutive_ready_checks")]
    pub consecutive_ready_checks: u32,
    #[serde(default = "d_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "d_default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default = "d_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            readiness_poll_interval_ms: d_poll_interval_ms(),
            consecutive_ready_checks: d_consecutive_ready_checks(),
            settle_delay_ms: d_settle_delay_ms(),
            default_timeout_secs: d_default_timeout_secs(),
            stop_timeout_secs: d_stop_timeout_secs(),
        }
    }
}

fn d_poll_interval_ms() -> u64 {
    2000
}
fn d_consecutive_ready_checks() -> u32 {
    2
}
fn d_settle_delay_ms() -> u64 {
    150
}
fn d_default_timeout_secs() -> u64 {
    120
}
fn d_stop_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "d_max_workers")]
    pub max_workers: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { max_workers: d_max_workers() }
    }
}

fn d_max_workers() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "d_history_path")]
    pub base_path: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { base_path: d_history_path() }
    }
}

fn d_history_path() -> String {
    "./.nerve/history".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "d_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_filter: d_log_filter(), json_logs: false }
    }
}

fn d_log_filter() -> String {
    "info".into()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum McpTransportKind {
    Stdio,
    Sse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "d_mcp_transport")]
    pub transport: McpTransportKind,
}

fn d_mcp_transport() -> McpTransportKind {
    McpTransportKind::Stdio
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApiFormat {
    Anthropic,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub api_format: ApiFormat,
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "d_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,
    #[serde(default = "d_circuit_recovery_secs")]
    pub circuit_recovery_secs: u64,
    #[serde(default = "d_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "d_retry_statuses")]
    pub retry_statuses: Vec<u16>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            circuit_failure_threshold: d_circuit_failure_threshold(),
            circuit_recovery_secs: d_circuit_recovery_secs(),
            retry_max_attempts: d_retry_max_attempts(),
            retry_statuses: d_retry_statuses(),
        }
    }
}

fn d_circuit_failure_threshold() -> u32 {
    5
}
fn d_circuit_recovery_secs() -> u64 {
    30
}
fn d_retry_max_attempts() -> u32 {
    3
}
fn d_retry_statuses() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

impl Config {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| Error::Other(anyhow::anyhow!("config parse error: {e}")))
    }

    pub async fn load(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            return Ok(Self::default());
        }
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_yaml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_uses_defaults() {
        let cfg = Config::from_yaml_str("").unwrap();
        assert_eq!(cfg.terminal.consecutive_ready_checks, 2);
        assert_eq!(cfg.graph.max_workers, 4);
    }

    #[test]
    fn partial_yaml_overrides_one_field() {
        let cfg = Config::from_yaml_str("graph:\n  max_workers: 8\n").unwrap();
        assert_eq!(cfg.graph.max_workers, 8);
        assert_eq!(cfg.terminal.readiness_poll_interval_ms, 2000);
    }
}
