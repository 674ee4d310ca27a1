//! Graph executor (§4.10): plan + execute, bounded by a semaphore,
//! with per-step budget/cancellation checks and optional tracing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use nerve_domain::error::{Error, Result};
use nerve_domain::execution::ExecutionContext;
use nerve_domain::trace::StepTrace;
use nerve_nodes::Node;

use crate::graph::Graph;
use crate::step::{TaskResult, TaskStatus};

/// Resolves a `node_ref` to an executable node. Implemented by the
/// session registry; kept as a trait here so this crate does not
/// depend on `nerve-sessions`.
#[async_trait]
pub trait NodeResolver: Send + Sync {
    async fn resolve(&self, node_ref: &str) -> Result<Arc<dyn Node>>;
}

pub struct GraphExecutor<'a> {
    resolver: &'a dyn NodeResolver,
}

impl<'a> GraphExecutor<'a> {
    pub fn new(resolver: &'a dyn NodeResolver) -> Self {
        Self { resolver }
    }

    /// Executes `graph` against `ctx`, returning one `TaskResult` per
    /// step id. Validation errors raise before any step runs.
    pub async fn execute(&self, graph: &Graph, ctx: &ExecutionContext) -> Result<HashMap<String, TaskResult>> {
        graph.validate()?;
        for step in &graph.steps {
            self.resolver.resolve(&step.node_ref).await?;
        }

        let order = graph.topological_order()?;
        let semaphore = Arc::new(Semaphore::new(graph.max_workers.max(1)));
        let mut results: HashMap<String, TaskResult> = HashMap::new();
        let mut upstream_outputs: HashMap<String, Value> = HashMap::new();
        let mut skipped: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut cancelled = false;
        let mut budget_exceeded = false;

        // Steps are grouped into waves by dependency depth so
        // independent steps within a wave can run concurrently
        // (bounded by `semaphore`); a step's output is visible only to
        // later waves, matching the "not to concurrent independent
        // steps" visibility rule.
        let waves = group_into_waves(&order);

        'outer: for wave in waves {
            if ctx.is_cancelled() {
                cancelled = true;
                break;
            }
            let mut handles = Vec::with_capacity(wave.len());
            for step in wave {
                if skipped.contains(&step.id) || budget_exceeded {
                    results.insert(
                        step.id.clone(),
                        TaskResult { status: TaskStatus::Skipped, output: None, error: None, duration_ms: 0 },
                    );
                    continue;
                }

                // Checked against the root `ctx`, not the step's own
                // freshly-created child, so this sees every prior
                // step's cumulative usage (propagated up through
                // `ResourceUsage`'s parent chain) rather than ~0.
                if let Err(e) = ctx.check_budget() {
                    results.insert(
                        step.id.clone(),
                        TaskResult { status: TaskStatus::Failed, output: None, error: Some(e.to_string()), duration_ms: 0 },
                    );
                    budget_exceeded = true;
                    mark_descendants_skipped(&order, &step.id, &mut skipped);
                    continue;
                }

                let permit = semaphore.clone().acquire_owned().await.map_err(|_| Error::Cancelled)?;
                let node = self.resolver.resolve(&step.node_ref).await?;
                let input = step.input_spec.resolve(&upstream_outputs);
                let step_ctx = ctx.child(input.clone());
                let step_id = step.id.clone();
                let node_id = step.node_ref.clone();

                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    let start = Instant::now();
                    let node_type = node.descriptor().variant;
                    let exec_result = if step_ctx.is_cancelled() { Err(Error::Cancelled) } else { node.execute(step_ctx.clone()).await };
                    step_ctx.usage.add_step();
                    let duration_ms = start.elapsed().as_millis() as u64;
                    (step_id, node_id, node_type, input, exec_result, duration_ms, step_ctx)
                }));
            }

            for handle in handles {
                let (step_id, node_id, node_type, input, exec_result, duration_ms, step_ctx) =
                    handle.await.map_err(|e| Error::Backend(format!("step task panicked: {e}")))?;

                match exec_result {
                    Ok(output) => {
                        if let Some(trace) = &step_ctx.trace {
                            trace.record(StepTrace {
                                step_id: step_id.clone(),
                                node_id,
                                node_type: format!("{node_type:?}"),
                                input,
                                output: Some(output.clone()),
                                error: None,
                                start_ms: 0,
                                end_ms: duration_ms,
                                duration_ms,
                                tokens_used: step_ctx.usage.tokens(),
                            });
                        }
                        upstream_outputs.insert(step_id.clone(), output.clone());
                        results.insert(
                            step_id,
                            TaskResult { status: TaskStatus::Completed, output: Some(output), error: None, duration_ms },
                        );
                    }
                    Err(e) => {
                        let is_cancel = matches!(e, Error::Cancelled);
                        if let Some(trace) = &step_ctx.trace {
                            trace.record(StepTrace {
                                step_id: step_id.clone(),
                                node_id,
                                node_type: format!("{node_type:?}"),
                                input,
                                output: None,
                                error: Some(e.to_string()),
                                start_ms: 0,
                                end_ms: duration_ms,
                                duration_ms,
                                tokens_used: step_ctx.usage.tokens(),
                            });
                        }
                        results.insert(
                            step_id.clone(),
                            TaskResult { status: TaskStatus::Failed, output: None, error: Some(e.to_string()), duration_ms },
                        );
                        mark_descendants_skipped(&order, &step_id, &mut skipped);
                        if is_cancel {
                            cancelled = true;
                            break 'outer;
                        }
                    }
                }
            }
        }

        if cancelled {
            return Err(Error::Cancelled);
        }
        Ok(results)
    }
}

/// Partitions a topological order into waves: wave `k` contains every
/// step whose longest dependency chain has length `k`. Steps within a
/// wave have no dependency relation to one another.
fn group_into_waves<'s>(order: &[&'s crate::step::Step]) -> Vec<Vec<&'s crate::step::Step>> {
    let mut depth: HashMap<&str, usize> = HashMap::new();
    for step in order {
        let d = step.depends_on.iter().map(|dep| depth.get(dep.as_str()).copied().unwrap_or(0) + 1).max().unwrap_or(0);
        depth.insert(step.id.as_str(), d);
    }
    let max_depth = depth.values().copied().max().unwrap_or(0);
    let mut waves = vec![Vec::new(); max_depth + 1];
    for step in order {
        waves[depth[step.id.as_str()]].push(*step);
    }
    waves
}

fn mark_descendants_skipped(order: &[&crate::step::Step], failed_id: &str, skipped: &mut std::collections::HashSet<String>) {
    skipped.insert(failed_id.to_string());
    loop {
        let mut added = false;
        for step in order {
            if skipped.contains(&step.id) {
                continue;
            }
            if step.depends_on.iter().any(|d| skipped.contains(d)) {
                skipped.insert(step.id.clone());
                added = true;
            }
        }
        if !added {
            break;
        }
    }
    skipped.remove(failed_id);
}
