//! Builds an `AnyNode` from a `CREATE_NODE` command's params (§4.12
//! NodeLifecycleHandler). Each node variant reads its own slice of the
//! params object; unknown or missing fields fail with `invalid_input`.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use nerve_domain::config::{ApiFormat, Config, ProviderSpec};
use nerve_domain::error::{Error, Result};
use nerve_domain::history::HistoryWriter;
use nerve_domain::node::NodeVariant;
use nerve_domain::tool::ToolDefinition;
use nerve_mcp::McpServer;
use nerve_nodes::{AnyNode, BashNode, ChatLlmConfig, ChatLlmNode, McpNode, PollConfig, SingleShotLlmNode, TerminalNode, ToolCapable, ToolCatalog};
use nerve_providers::traits::LlmProvider;
use nerve_providers::{AnthropicProvider, OpenAiCompatProvider};
use nerve_sessions::Session;
use nerve_terminal::parsers;
use nerve_terminal::pty::PtyBackend;

use crate::proxy_bridge::ProxyBridge;

/// Adapts a session-held `Arc<AnyNode>` into `Arc<dyn ToolCapable>` for
/// `ToolCatalog::build`, which needs shared ownership rather than the
/// borrowed reference `AnyNode::tool_capable()` returns.
struct ArcToolCapable(Arc<AnyNode>);

#[async_trait::async_trait]
impl ToolCapable for ArcToolCapable {
    async fn list_tools(&self) -> Vec<ToolDefinition> {
        match self.0.tool_capable() {
            Some(tc) => tc.list_tools().await,
            None => Vec::new(),
        }
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<String> {
        match self.0.tool_capable() {
            Some(tc) => tc.call_tool(name, args).await,
            None => Err(Error::invalid_state("node is not tool-capable")),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum CreateNodeParams {
    Bash,
    LlmSingleShot { provider: ProviderSpec },
    LlmChat {
        provider: ProviderSpec,
        #[serde(default)]
        system_prompt: Option<String>,
        #[serde(default)]
        max_tool_rounds: u32,
        #[serde(default)]
        parallel_tool_calls: bool,
        #[serde(default)]
        tool_choice: Option<String>,
        #[serde(default)]
        tool_nodes: Vec<String>,
    },
    Mcp {
        server: nerve_domain::config::McpServerConfig,
    },
    TerminalPty {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        cwd: Option<String>,
        #[serde(default)]
        env: Vec<(String, String)>,
        #[serde(default = "default_rows")]
        rows: u16,
        #[serde(default = "default_cols")]
        cols: u16,
        #[serde(default = "default_parser")]
        parser: String,
        #[serde(default)]
        provider: Option<ProviderSpec>,
    },
}

fn default_rows() -> u16 {
    24
}
fn default_cols() -> u16 {
    80
}
fn default_parser() -> String {
    "none".to_string()
}

fn build_provider(spec: &ProviderSpec) -> Arc<dyn LlmProvider> {
    let model = spec.model.clone().unwrap_or_default();
    match spec.api_format {
        ApiFormat::Anthropic => Arc::new(AnthropicProvider::new("configured", spec.base_url.clone(), spec.api_key.clone(), model)),
        ApiFormat::Openai => Arc::new(OpenAiCompatProvider::new("configured", spec.base_url.clone(), spec.api_key.clone(), model)),
    }
}

pub async fn create_node(session: &Session, id: &str, params: Value, config: &Config, proxy_bridge: &ProxyBridge) -> Result<AnyNode> {
    let params: CreateNodeParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(format!("invalid node params: {e}")))?;

    match params {
        CreateNodeParams::Bash => Ok(AnyNode::Bash(BashNode::new(id)?)),

        CreateNodeParams::LlmSingleShot { provider } => {
            let model = provider.model.clone();
            let client = build_provider(&provider);
            Ok(AnyNode::LlmSingleShot(SingleShotLlmNode::new(id, client, model)?))
        }

        CreateNodeParams::LlmChat { provider, system_prompt, max_tool_rounds, parallel_tool_calls, tool_choice, tool_nodes } => {
            let model = provider.model.clone();
            let client = build_provider(&provider);
            let chat_config = ChatLlmConfig { system_prompt, max_tool_rounds, parallel_tool_calls, tool_choice };

            let mut owners: Vec<(String, Arc<dyn ToolCapable>)> = Vec::new();
            for node_id in &tool_nodes {
                let node = session.get_node(node_id)?;
                if node.tool_capable().is_none() {
                    return Err(Error::invalid_input(format!("node {node_id:?} is not tool-capable")));
                }
                owners.push((node_id.clone(), Arc::new(ArcToolCapable(node))));
            }
            let (catalog, defs) = ToolCatalog::build(owners).await;
            let executor: Option<Arc<dyn nerve_nodes::ToolExecutor>> = if defs.is_empty() { None } else { Some(Arc::new(catalog)) };

            Ok(AnyNode::LlmChat(ChatLlmNode::new(id, client, model, chat_config, defs, executor)?))
        }

        CreateNodeParams::Mcp { server } => {
            let mcp_server = McpServer::initialize(&server).await.map_err(Error::from)?;
            Ok(AnyNode::Mcp(McpNode::new(id, mcp_server)?))
        }

        CreateNodeParams::TerminalPty { command, args, cwd, mut env, rows, cols, parser, provider } => {
            if let Some(spec) = provider {
                let port = proxy_bridge.start_for_node(id, spec.clone(), config).await?;
                env.push(("ANTHROPIC_BASE_URL".to_string(), format!("http://127.0.0.1:{port}")));
                env.push(("ANTHROPIC_API_KEY".to_string(), "local-proxy".to_string()));
            }
            let backend = PtyBackend::start(&command, &args, cwd.as_deref(), &env, rows, cols)?;
            let parser = parsers::by_name(&parser).ok_or_else(|| Error::invalid_input(format!("unknown parser {parser:?}")))?;
            let history = if config.history.base_path.is_empty() {
                None
            } else {
                Some(HistoryWriter::new(std::path::Path::new(&config.history.base_path), session.name(), id))
            };
            let poll = PollConfig {
                interval: std::time::Duration::from_millis(config.terminal.readiness_poll_interval_ms),
                consecutive_checks: config.terminal.consecutive_ready_checks,
                settle_delay: std::time::Duration::from_millis(config.terminal.settle_delay_ms),
                default_timeout: std::time::Duration::from_secs(config.terminal.default_timeout_secs),
                stop_timeout: std::time::Duration::from_secs(config.terminal.stop_timeout_secs),
            };
            Ok(AnyNode::TerminalPty(TerminalNode::new(id, NodeVariant::TerminalPty, Arc::new(backend), parser, history, poll)?))
        }
    }
}
