//! Step and input-spec data model (§3 "Graph", §4.10).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// How a step's input is produced from the session and upstream
/// outputs. `Function` is boxed as a plain closure rather than a
/// scripting handle -- graph bodies are assembled in Rust by whatever
/// constructs the graph, matching the function-node substrate used
/// elsewhere in this crate family.
#[derive(Clone)]
pub enum InputSpec {
    Literal(Value),
    /// Exact string substitution of `{step_id}` tokens against each
    /// upstream output's string form.
    Template(String),
    Function(Arc<dyn Fn(&HashMap<String, Value>) -> Value + Send + Sync>),
}

impl std::fmt::Debug for InputSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputSpec::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            InputSpec::Template(s) => f.debug_tuple("Template").field(s).finish(),
            InputSpec::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl InputSpec {
    pub fn resolve(&self, upstream: &HashMap<String, Value>) -> Value {
        match self {
            InputSpec::Literal(v) => v.clone(),
            InputSpec::Template(template) => {
                let mut out = template.clone();
                for (step_id, value) in upstream {
                    let token = format!("{{{step_id}}}");
                    let rendered = value_to_template_string(value);
                    out = out.replace(&token, &rendered);
                }
                Value::String(out)
            }
            InputSpec::Function(f) => f(upstream),
        }
    }
}

fn value_to_template_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub id: String,
    pub node_ref: String,
    pub input_spec: InputSpec,
    pub depends_on: Vec<String>,
}

impl Step {
    pub fn new(id: impl Into<String>, node_ref: impl Into<String>, input_spec: InputSpec) -> Self {
        Self { id: id.into(), node_ref: node_ref.into(), input_spec, depends_on: Vec::new() }
    }

    pub fn depends_on(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_substitutes_exact_tokens() {
        let mut upstream = HashMap::new();
        upstream.insert("step1".to_string(), Value::String("4".into()));
        let spec = InputSpec::Template("{step1} + {step1} is what?".into());
        assert_eq!(spec.resolve(&upstream), Value::String("4 + 4 is what?".into()));
    }
}
