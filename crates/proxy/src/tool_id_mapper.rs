//! Bijection between upstream tool-call ids (`call_...`) and
//! Anthropic-shaped ids (`toolu_...`) within one conversation (§4.13,
//! §8 "Tool id mapping bijectivity").

use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Default)]
struct Inner {
    upstream_to_anthropic: HashMap<String, String>,
    anthropic_to_upstream: HashMap<String, String>,
    counter: u64,
}

#[derive(Default)]
pub struct ToolIdMapper {
    inner: Mutex<Inner>,
}

impl ToolIdMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints (or returns the existing) Anthropic-shaped id for an
    /// upstream tool-call id.
    pub fn to_anthropic(&self, upstream_id: &str) -> String {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.upstream_to_anthropic.get(upstream_id) {
            return existing.clone();
        }
        inner.counter += 1;
        let anthropic_id = format!("toolu_{:016x}", inner.counter);
        inner.upstream_to_anthropic.insert(upstream_id.to_string(), anthropic_id.clone());
        inner.anthropic_to_upstream.insert(anthropic_id.clone(), upstream_id.to_string());
        anthropic_id
    }

    /// The upstream id a given Anthropic-shaped id was minted from, or
    /// the id unchanged if it was never seen (a tool use that
    /// originated on the Anthropic side of the conversation).
    pub fn to_upstream(&self, anthropic_id: &str) -> String {
        self.inner.lock().anthropic_to_upstream.get(anthropic_id).cloned().unwrap_or_else(|| anthropic_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bijection_round_trips() {
        let mapper = ToolIdMapper::new();
        let anthropic_id = mapper.to_anthropic("call_abc");
        assert!(anthropic_id.starts_with("toolu_"));
        assert_eq!(mapper.to_upstream(&anthropic_id), "call_abc");
    }

    #[test]
    fn same_upstream_id_maps_consistently() {
        let mapper = ToolIdMapper::new();
        let a = mapper.to_anthropic("call_x");
        let b = mapper.to_anthropic("call_x");
        assert_eq!(a, b);
    }

    #[test]
    fn unseen_anthropic_id_passes_through() {
        let mapper = ToolIdMapper::new();
        assert_eq!(mapper.to_upstream("toolu_never_seen"), "toolu_never_seen");
    }
}
