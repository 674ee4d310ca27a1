//! The engine's single dispatch entry point (§4.12): `execute(command)
//! -> command_result`. Each `CommandType` maps to exactly one handler
//! function; handlers are plain async functions rather than a trait
//! object per command, since every handler domain already groups
//! naturally by the session registry + a slice of shared state it
//! needs (config, proxy bridge, event sink).

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use nerve_domain::config::Config;
use nerve_domain::error::{Error, Result};
use nerve_protocol::{Command, CommandResult, CommandType, EventSink};
use nerve_sessions::SessionRegistry;

use crate::handlers::{graph, node_interaction, node_lifecycle, repl, script, session, workflow};
use crate::proxy_bridge::ProxyBridge;

pub struct Engine {
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
    proxy_bridge: Arc<ProxyBridge>,
    sink: Arc<dyn EventSink>,
    script: script::ScriptHandler,
}

#[derive(Deserialize)]
struct ScriptEvalParams {
    #[serde(default)]
    session: Option<String>,
    code: String,
}

impl Engine {
    pub fn new(registry: Arc<SessionRegistry>, config: Arc<Config>, proxy_bridge: Arc<ProxyBridge>, sink: Arc<dyn EventSink>) -> Self {
        Self { registry, config, proxy_bridge, sink, script: script::ScriptHandler::new() }
    }

    pub async fn execute(&self, command: Command) -> CommandResult {
        let request_id = command.request_id.clone();
        let result = self.dispatch(command).await;
        match result {
            Ok(data) => CommandResult::ok(data).with_request_id(request_id),
            Err(e) => CommandResult::err(&e).with_request_id(request_id),
        }
    }

    async fn dispatch(&self, command: Command) -> Result<Value> {
        let params = command.params;
        match command.r#type {
            CommandType::CreateSession => session::create_session(&self.registry, params, self.sink.as_ref()).await,
            CommandType::DeleteSession => session::delete_session(&self.registry, params, self.sink.as_ref()).await,
            CommandType::ListSessions => session::list_sessions(&self.registry).await,
            CommandType::GetSession => session::get_session(&self.registry, params).await,

            CommandType::CreateNode => {
                node_lifecycle::create_node(&self.registry, &self.config, &self.proxy_bridge, params, self.sink.as_ref()).await
            }
            CommandType::DeleteNode => node_lifecycle::delete_node(&self.registry, &self.proxy_bridge, params, self.sink.as_ref()).await,
            CommandType::ListNodes => node_lifecycle::list_nodes(&self.registry, params).await,
            CommandType::GetNode => node_lifecycle::get_node(&self.registry, params).await,
            CommandType::ForkNode => node_lifecycle::fork_node(&self.registry, params, self.sink.as_ref()).await,

            CommandType::RunCommand | CommandType::ExecuteInput => {
                node_interaction::execute_input(&self.registry, params, self.sink.as_ref()).await
            }
            CommandType::SendInterrupt => node_interaction::send_interrupt(&self.registry, params).await,
            CommandType::WriteData => node_interaction::write_data(&self.registry, params, self.sink.as_ref()).await,
            CommandType::GetBuffer => node_interaction::get_buffer(&self.registry, params).await,
            CommandType::GetHistory => node_interaction::get_history(&self.registry, params).await,

            CommandType::CreateGraph => graph::create_graph(&self.registry, params).await,
            CommandType::DeleteGraph => graph::delete_graph(&self.registry, params).await,
            CommandType::ListGraphs => graph::list_graphs(&self.registry, params).await,
            CommandType::ExecuteGraph => graph::execute_graph(&self.registry, params, self.sink.as_ref()).await,

            CommandType::ExecuteWorkflow => workflow::execute_workflow(&self.registry, params, self.sink.clone()).await,
            CommandType::ListWorkflowRuns => workflow::list_workflow_runs(&self.registry, params).await,
            CommandType::GetWorkflowRun => workflow::get_workflow_run(&self.registry, params).await,
            CommandType::AnswerGate => workflow::answer_gate(&self.registry, params).await,
            CommandType::CancelWorkflow => workflow::cancel_workflow(&self.registry, params).await,

            CommandType::ReplShow => repl::show(&self.registry, params).await,
            CommandType::ReplDry => repl::dry(&self.registry, params).await,
            CommandType::ReplValidate => repl::validate(&self.registry, params).await,
            CommandType::ReplList => repl::list(&self.registry, params).await,
            CommandType::ReplRead => repl::read(&self.registry, params).await,

            CommandType::ScriptEval => {
                let params: ScriptEvalParams = serde_json::from_value(params).map_err(|e| Error::invalid_input(e.to_string()))?;
                let sess = self.registry.get(params.session.as_deref())?;
                self.script.eval(&sess, &params.code)
            }
        }
    }

    /// Stops every session's nodes and every proxy instance (§4.13
    /// "stop_all() is called on engine shutdown").
    pub async fn shutdown(&self) {
        self.registry.stop_all().await;
        self.proxy_bridge.stop_all().await;
    }
}
