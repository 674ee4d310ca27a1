//! Budget / resource usage, with parent propagation.
//!
//! Grounded on the teacher's counter-and-limit style (see
//! `sessions::store` token counters) but generalized into a standalone,
//! composable type: a `Budget` is a set of optional ceilings, a
//! `ResourceUsage` is the mutable counter side that walks up a parent
//! chain on every increment so nested sub-budgets see the same totals
//! as their ancestors.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Budget {
    pub max_tokens: Option<u64>,
    pub max_time_seconds: Option<f64>,
    pub max_steps: Option<u64>,
    pub max_api_calls: Option<u64>,
    pub max_cost_dollars: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
struct Counters {
    tokens: u64,
    steps: u64,
    api_calls: u64,
    cost_cents: u64,
}

/// Which budget counter was exceeded, for `budget_exceeded` error payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetCounter {
    Tokens,
    TimeSeconds,
    Steps,
    ApiCalls,
    CostDollars,
}

/// Accumulates resource counters for one execution scope. Cloning a
/// `ResourceUsage` clones the handle (shared counters), not the data --
/// use `child()` to create a nested scope with its own counters that
/// also forwards increments to the parent.
#[derive(Clone)]
pub struct ResourceUsage {
    inner: Arc<Mutex<Counters>>,
    started: Instant,
    parent: Option<Box<ResourceUsage>>,
}

impl ResourceUsage {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Counters::default())),
            started: Instant::now(),
            parent: None,
        }
    }

    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Counters::default())),
            started: Instant::now(),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn add_tokens(&self, n: u64) {
        self.inner.lock().tokens += n;
        if let Some(p) = &self.parent {
            p.add_tokens(n);
        }
    }

    pub fn add_step(&self) {
        self.inner.lock().steps += 1;
        if let Some(p) = &self.parent {
            p.add_step();
        }
    }

    pub fn add_api_call(&self) {
        self.inner.lock().api_calls += 1;
        if let Some(p) = &self.parent {
            p.add_api_call();
        }
    }

    pub fn add_cost_cents(&self, n: u64) {
        self.inner.lock().cost_cents += n;
        if let Some(p) = &self.parent {
            p.add_cost_cents(n);
        }
    }

    pub fn tokens(&self) -> u64 {
        self.inner.lock().tokens
    }

    pub fn steps(&self) -> u64 {
        self.inner.lock().steps
    }

    pub fn api_calls(&self) -> u64 {
        self.inner.lock().api_calls
    }

    pub fn cost_dollars(&self) -> f64 {
        self.inner.lock().cost_cents as f64 / 100.0
    }

    /// Returns the first counter (if any) that exceeds `budget`.
    pub fn exceeded(&self, budget: &Budget) -> Option<BudgetCounter> {
        let c = *self.inner.lock();
        if let Some(max) = budget.max_tokens {
            if c.tokens > max {
                return Some(BudgetCounter::Tokens);
            }
        }
        if let Some(max) = budget.max_time_seconds {
            if self.elapsed_seconds() > max {
                return Some(BudgetCounter::TimeSeconds);
            }
        }
        if let Some(max) = budget.max_steps {
            if c.steps > max {
                return Some(BudgetCounter::Steps);
            }
        }
        if let Some(max) = budget.max_api_calls {
            if c.api_calls > max {
                return Some(BudgetCounter::ApiCalls);
            }
        }
        if let Some(max) = budget.max_cost_dollars {
            if self.cost_dollars() > max {
                return Some(BudgetCounter::CostDollars);
            }
        }
        None
    }

    /// Checks the budget and converts an overrun into a `budget_exceeded`
    /// error, naming the offending counter.
    pub fn check(&self, budget: &Budget) -> Result<()> {
        if let Some(counter) = self.exceeded(budget) {
            return Err(Error::BudgetExceeded(format!("{counter:?}")));
        }
        Ok(())
    }
}

impl Default for ResourceUsage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propagates_to_parent() {
        let parent = ResourceUsage::new();
        let child = parent.child();
        child.add_tokens(100);
        child.add_tokens(50);
        assert_eq!(child.tokens(), 150);
        assert_eq!(parent.tokens(), 150);
    }

    #[test]
    fn monotonic_and_exceeds_is_monotone() {
        let usage = ResourceUsage::new();
        let budget = Budget {
            max_tokens: Some(100),
            ..Default::default()
        };
        assert!(usage.exceeded(&budget).is_none());
        usage.add_tokens(50);
        assert!(usage.exceeded(&budget).is_none());
        usage.add_tokens(60);
        assert_eq!(usage.exceeded(&budget), Some(BudgetCounter::Tokens));
        // further increments never un-exceed.
        usage.add_tokens(1);
        assert_eq!(usage.exceeded(&budget), Some(BudgetCounter::Tokens));
    }

    #[test]
    fn grandchild_propagates_through_two_levels() {
        let root = ResourceUsage::new();
        let mid = root.child();
        let leaf = mid.child();
        leaf.add_step();
        leaf.add_step();
        assert_eq!(leaf.steps(), 2);
        assert_eq!(mid.steps(), 2);
        assert_eq!(root.steps(), 2);
    }
}
