//! Verbatim Anthropic -> Anthropic forwarding, with retry against the
//! circuit breaker and the configured retry-status set (§4.13).

use std::time::Duration;

use serde_json::Value;

use nerve_domain::config::ProxyConfig;
use nerve_domain::error::{Error, Result};

use crate::circuit::CircuitBreaker;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct PassthroughProxy {
    pub base_url: String,
    pub api_key: String,
    pub model_override: Option<String>,
    client: reqwest::Client,
    breaker: CircuitBreaker,
    retry_max_attempts: u32,
    retry_statuses: Vec<u16>,
}

impl PassthroughProxy {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model_override: Option<String>, config: &ProxyConfig) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model_override,
            client: reqwest::Client::new(),
            breaker: CircuitBreaker::new(config.circuit_failure_threshold, Duration::from_secs(config.circuit_recovery_secs)),
            retry_max_attempts: config.retry_max_attempts,
            retry_statuses: config.retry_statuses.clone(),
        }
    }

    /// Forwards a `POST /v1/messages` body unchanged except for an
    /// optional model rewrite, retrying transient upstream failures.
    pub async fn forward(&self, mut body: Value) -> Result<(u16, Value)> {
        if let Some(model) = &self.model_override {
            body["model"] = Value::String(model.clone());
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.breaker.before_call(&self.base_url)?;

            let resp = self
                .client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
                .send()
                .await;

            let resp = match resp {
                Ok(resp) => resp,
                Err(e) => {
                    self.breaker.record_failure();
                    if attempt >= self.retry_max_attempts {
                        return Err(Error::Http(e.to_string()));
                    }
                    continue;
                }
            };

            let status = resp.status().as_u16();
            let value: Value = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;

            if self.retry_statuses.contains(&status) && attempt < self.retry_max_attempts {
                self.breaker.record_failure();
                continue;
            }

            if (500..600).contains(&status) {
                self.breaker.record_failure();
            } else {
                self.breaker.record_success();
            }

            return Ok((status, value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_override_rewrites_body() {
        let config = ProxyConfig::default();
        let proxy = PassthroughProxy::new("http://localhost", "key", Some("claude-3-opus".to_string()), &config);
        assert_eq!(proxy.model_override.as_deref(), Some("claude-3-opus"));
    }
}
