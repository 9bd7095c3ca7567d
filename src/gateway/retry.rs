//! Retrying gateway wrapper.
//!
//! Wraps any gateway with bounded retries and exponential backoff. Only
//! transient errors are retried, and unavailable gateways are called once.

use std::thread;
use std::time::Duration;

use tracing::warn;

use super::traits::{
    CategorySuggestionRequest, KeySuggestionRequest, MappingProposal, MappingProposalRequest,
    SuggestionGateway,
};
use crate::config::GatewayConfig;
use crate::core::Suggestion;
use crate::error::Result;

/// Bounded retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further one.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff
            .checked_mul(2u32.saturating_pow(retry))
            .unwrap_or(Duration::MAX)
    }

    /// Run `op`, retrying transient failures.
    pub fn run<T>(&self, gateway: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut retry = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && retry < self.max_retries => {
                    let delay = self.delay(retry);
                    warn!(
                        "Gateway '{}' failed (attempt {} of {}): {}; retrying in {:?}",
                        gateway,
                        retry + 1,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    thread::sleep(delay);
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A gateway wrapper applying a [`RetryPolicy`] to every call.
pub struct RetryingGateway<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: SuggestionGateway> RetryingGateway<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Get the wrapped gateway.
    pub fn inner(&self) -> &G {
        &self.inner
    }
}

impl<G: SuggestionGateway> SuggestionGateway for RetryingGateway<G> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn suggest_key_mapping(&self, request: &KeySuggestionRequest) -> Result<Suggestion> {
        if !self.inner.is_available() {
            return self.inner.suggest_key_mapping(request);
        }
        self.policy
            .run(self.name(), || self.inner.suggest_key_mapping(request))
    }

    fn suggest_category(&self, request: &CategorySuggestionRequest) -> Result<Option<String>> {
        if !self.inner.is_available() {
            return self.inner.suggest_category(request);
        }
        self.policy
            .run(self.name(), || self.inner.suggest_category(request))
    }

    fn propose_mapping(&self, request: &MappingProposalRequest) -> Result<MappingProposal> {
        if !self.inner.is_available() {
            return self.inner.propose_mapping(request);
        }
        self.policy
            .run(self.name(), || self.inner.propose_mapping(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProdmapError;
    use crate::gateway::traits::tests::FakeGateway;
    use crate::gateway::DisabledGateway;
    use std::collections::BTreeMap;

    fn instant(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Duration::ZERO,
        }
    }

    fn request() -> KeySuggestionRequest {
        KeySuggestionRequest {
            category: "Vertikale".into(),
            output_key: "UWAGI".into(),
            known_rules: BTreeMap::new(),
            constants: BTreeMap::new(),
            sample_values: Vec::new(),
            sample_input_keys: Vec::new(),
        }
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
    }

    #[test]
    fn test_recovers_after_transient_failures() {
        let gateway = RetryingGateway::new(FakeGateway::failing(2), instant(3));
        assert!(gateway.suggest_key_mapping(&request()).is_ok());
        assert_eq!(gateway.inner().calls(), 3);
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let gateway = RetryingGateway::new(FakeGateway::failing(10), instant(3));
        let err = gateway.suggest_key_mapping(&request()).unwrap_err();
        assert!(matches!(err, ProdmapError::GatewayUnavailable { .. }));
        assert_eq!(gateway.inner().calls(), 4);
    }

    #[test]
    fn test_non_transient_errors_not_retried() {
        let mut calls = 0;
        let result: Result<()> = instant(5).run("test", || {
            calls += 1;
            Err(ProdmapError::config("bad program"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_unreadable_reply_not_retried() {
        let mut calls = 0;
        let result: Result<()> = instant(5).run("test", || {
            calls += 1;
            crate::gateway::reply::parse_category_reply("test", "no json here").map(|_| ())
        });
        assert!(matches!(result, Err(ProdmapError::GatewayReply { .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_unavailable_gateway_called_once() {
        let gateway = RetryingGateway::new(DisabledGateway, instant(3));
        assert!(gateway.suggest_key_mapping(&request()).is_err());
    }
}
