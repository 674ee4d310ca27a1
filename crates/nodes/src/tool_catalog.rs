//! Tool catalog composition for chat nodes (§4.7): namespacing
//! contributed tools by owner node id and dispatching calls back to
//! the owning node.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use nerve_domain::error::Result;
use nerve_domain::execution::ExecutionContext;
use nerve_domain::tool::ToolDefinition;

use crate::node::ToolCapable;

/// Tool results larger than this are truncated with a trailing marker
/// naming the original length, so a single runaway tool can't blow up
/// the conversation context.
pub const MAX_TOOL_RESULT_BYTES: usize = 64 * 1024;

pub fn truncate_result(s: String) -> String {
    if s.len() <= MAX_TOOL_RESULT_BYTES {
        return s;
    }
    let original_len = s.len();
    let mut truncated: String = s.chars().take(MAX_TOOL_RESULT_BYTES).collect();
    truncated.push_str(&format!("\n...[truncated, original length {original_len} bytes]"));
    truncated
}

/// `(prefixed_name, args, ctx?) -> string`. Unknown names return a
/// diagnostic string, never an error, so the model calling it can
/// recover within the conversation.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn call(&self, prefixed_name: &str, args: Value, ctx: &ExecutionContext) -> Result<String>;
}

/// Builds a namespaced catalog from a set of tool-capable nodes and
/// dispatches calls back to the owning node by prefix.
pub struct ToolCatalog {
    owners: HashMap<String, Arc<dyn ToolCapable>>,
}

impl ToolCatalog {
    pub async fn build(nodes: Vec<(String, Arc<dyn ToolCapable>)>) -> (Self, Vec<ToolDefinition>) {
        let mut owners = HashMap::new();
        let mut defs = Vec::new();
        let mut seen_names = HashMap::<String, u32>::new();

        for (node_id, node) in nodes {
            owners.insert(node_id.clone(), node.clone());
            for tool in node.list_tools().await {
                let mut prefixed = format!("{node_id}.{}", tool.name);
                let count = seen_names.entry(prefixed.clone()).or_insert(0);
                if *count > 0 {
                    prefixed = format!("{prefixed}#{count}");
                }
                *count += 1;
                defs.push(ToolDefinition {
                    name: prefixed,
                    description: tool.description,
                    parameters: tool.parameters,
                    owner_node_id: Some(node_id.clone()),
                });
            }
        }

        (Self { owners }, defs)
    }
}

#[async_trait]
impl ToolExecutor for ToolCatalog {
    async fn call(&self, prefixed_name: &str, args: Value, _ctx: &ExecutionContext) -> Result<String> {
        let Some((owner_id, tool_name)) = prefixed_name.split_once('.') else {
            return Ok(format!("unknown tool {prefixed_name:?}: expected \"<node>.<tool>\""));
        };
        let tool_name = tool_name.split('#').next().unwrap_or(tool_name);
        let Some(owner) = self.owners.get(owner_id) else {
            return Ok(format!("unknown tool owner {owner_id:?}"));
        };
        match owner.call_tool(tool_name, args).await {
            Ok(result) => Ok(truncate_result(result)),
            Err(e) => Ok(format!("tool {prefixed_name:?} failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyTool;

    #[async_trait]
    impl ToolCapable for DummyTool {
        async fn list_tools(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "read_file".into(),
                description: "read a file".into(),
                parameters: serde_json::json!({}),
                owner_node_id: None,
            }]
        }

        async fn call_tool(&self, _name: &str, _args: Value) -> Result<String> {
            Ok("contents".into())
        }
    }

    #[tokio::test]
    async fn names_are_prefixed_by_owner() {
        let (catalog, defs) = ToolCatalog::build(vec![("fs-mcp".into(), Arc::new(DummyTool))]).await;
        assert_eq!(defs[0].name, "fs-mcp.read_file");
        let ctx = ExecutionContext::new("default", Value::Null);
        let result = catalog.call("fs-mcp.read_file", Value::Null, &ctx).await.unwrap();
        assert_eq!(result, "contents");
    }

    #[tokio::test]
    async fn unknown_owner_is_diagnostic_not_error() {
        let (catalog, _) = ToolCatalog::build(vec![]).await;
        let ctx = ExecutionContext::new("default", Value::Null);
        let result = catalog.call("missing.tool", Value::Null, &ctx).await.unwrap();
        assert!(result.contains("unknown tool owner"));
    }
}
