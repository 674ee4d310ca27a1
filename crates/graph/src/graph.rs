//! `Graph`: a named, validated collection of steps (§3, §4.10 step 1).

use std::collections::{HashMap, HashSet};

use nerve_domain::error::{Error, Result};

use crate::step::Step;

#[derive(Debug, Clone)]
pub struct Graph {
    pub id: String,
    pub steps: Vec<Step>,
    pub max_workers: usize,
}

impl Graph {
    pub fn new(id: impl Into<String>, steps: Vec<Step>) -> Self {
        Self { id: id.into(), steps, max_workers: 4 }
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.max_workers = n;
        self
    }

    /// Every `depends_on` names an existing step, and the step graph is
    /// acyclic. `node_ref` resolution is deferred to execution time
    /// (it depends on the session in scope), per §4.10 step 1.
    pub fn validate(&self) -> Result<()> {
        let ids: HashSet<&str> = self.steps.iter().map(|s| s.id.as_str()).collect();
        if ids.len() != self.steps.len() {
            return Err(Error::invalid_input(format!("graph {:?} has duplicate step ids", self.id)));
        }
        for step in &self.steps {
            for dep in &step.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(Error::invalid_input(format!(
                        "graph {:?} step {:?} depends on unknown step {:?}",
                        self.id, step.id, dep
                    )));
                }
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Kahn's algorithm; returns steps in a valid execution order, or
    /// an `invalid_input` error naming the cycle if one exists.
    pub fn topological_order(&self) -> Result<Vec<&Step>> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for step in &self.steps {
            in_degree.entry(step.id.as_str()).or_insert(0);
            for dep in &step.depends_on {
                *in_degree.entry(step.id.as_str()).or_insert(0) += 1;
                dependents.entry(dep.as_str()).or_default().push(step.id.as_str());
            }
        }

        let by_id: HashMap<&str, &Step> = self.steps.iter().map(|s| (s.id.as_str(), s)).collect();
        let mut ready: Vec<&str> = in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| *id).collect();
        ready.sort_unstable();

        let mut order = Vec::with_capacity(self.steps.len());
        let mut queue = std::collections::VecDeque::from(ready);
        while let Some(id) = queue.pop_front() {
            order.push(by_id[id]);
            if let Some(deps) = dependents.get(id) {
                let mut newly_ready = Vec::new();
                for &dependent in deps {
                    let entry = in_degree.get_mut(dependent).unwrap();
                    *entry -= 1;
                    if *entry == 0 {
                        newly_ready.push(dependent);
                    }
                }
                newly_ready.sort_unstable();
                for d in newly_ready {
                    queue.push_back(d);
                }
            }
        }

        if order.len() != self.steps.len() {
            return Err(Error::invalid_input(format!("graph {:?} contains a cycle", self.id)));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::InputSpec;
    use serde_json::Value;

    #[test]
    fn detects_cycle() {
        let graph = Graph::new(
            "g",
            vec![
                Step::new("a", "n", InputSpec::Literal(Value::Null)).depends_on(["b"]),
                Step::new("b", "n", InputSpec::Literal(Value::Null)).depends_on(["a"]),
            ],
        );
        assert!(graph.validate().is_err());
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let graph = Graph::new(
            "g",
            vec![
                Step::new("step3", "n", InputSpec::Literal(Value::Null)).depends_on(["step2"]),
                Step::new("step1", "n", InputSpec::Literal(Value::Null)),
                Step::new("step2", "n", InputSpec::Literal(Value::Null)).depends_on(["step1"]),
            ],
        );
        let order: Vec<&str> = graph.topological_order().unwrap().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, vec!["step1", "step2", "step3"]);
    }
}
