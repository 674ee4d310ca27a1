//! `ExecutionContext` -- the immutable snapshot passed into node
//! execution. Modifications produce a new context (copy-on-write);
//! nothing here is mutated in place.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::budget::{Budget, ResourceUsage};
use crate::trace::Trace;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub session: String,
    pub input: Value,
    pub upstream_results: HashMap<String, Value>,
    pub parser_override: Option<String>,
    pub timeout: Option<Duration>,
    pub budget: Option<Budget>,
    pub usage: ResourceUsage,
    pub cancellation_token: CancellationToken,
    pub trace: Option<Trace>,
    pub run_id: Option<String>,
    pub exec_id: String,
    pub correlation_id: Option<String>,
}

impl ExecutionContext {
    pub fn new(session: impl Into<String>, input: Value) -> Self {
        Self {
            session: session.into(),
            input,
            upstream_results: HashMap::new(),
            parser_override: None,
            timeout: None,
            budget: None,
            usage: ResourceUsage::new(),
            cancellation_token: CancellationToken::new(),
            trace: None,
            run_id: None,
            exec_id: uuid::Uuid::new_v4().to_string(),
            correlation_id: None,
        }
    }

    /// Copy-on-write: produce a child context for a nested execution
    /// (a graph step, a nested workflow run). Inherits cancellation and
    /// budget; gets its own usage scope chained to the parent's.
    pub fn child(&self, input: Value) -> Self {
        Self {
            session: self.session.clone(),
            input,
            upstream_results: self.upstream_results.clone(),
            parser_override: self.parser_override.clone(),
            timeout: self.timeout,
            budget: self.budget.clone(),
            usage: self.usage.child(),
            cancellation_token: self.cancellation_token.child_token(),
            trace: self.trace.clone(),
            run_id: self.run_id.clone(),
            exec_id: uuid::Uuid::new_v4().to_string(),
            correlation_id: self.correlation_id.clone(),
        }
    }

    pub fn with_input(&self, input: Value) -> Self {
        let mut ctx = self.clone();
        ctx.input = input;
        ctx.exec_id = uuid::Uuid::new_v4().to_string();
        ctx
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut ctx = self.clone();
        ctx.timeout = Some(timeout);
        ctx
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn check_budget(&self) -> crate::error::Result<()> {
        if let Some(budget) = &self.budget {
            self.usage.check(budget)?;
        }
        Ok(())
    }
}
