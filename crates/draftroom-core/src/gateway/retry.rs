// Bounded retry of transient gateway failures.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{PersistenceGateway, Versioned};
use crate::error::GatewayError;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total tries, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Wraps another gateway and retries calls that fail with a transient error.
///
/// Version conflicts and duplicate keys are returned immediately; they are
/// answers, not outages.
pub struct RetryingGateway<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: PersistenceGateway> RetryingGateway<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        RetryingGateway { inner, policy }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

/// Run `$call` until it succeeds, fails permanently, or the policy gives up.
macro_rules! with_retry {
    ($self:ident, $op:literal, $call:expr) => {{
        let attempts = $self.policy.attempts.max(1);
        let mut retry = 0u32;
        loop {
            match $call {
                Err(e) if e.is_transient() && retry + 1 < attempts => {
                    let delay = $self.policy.delay_for(retry);
                    warn!(
                        "Gateway {} failed (try {}/{}), retrying in {:?}: {}",
                        $op,
                        retry + 1,
                        attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                other => break other,
            }
        }
    }};
}

#[async_trait]
impl<G: PersistenceGateway> PersistenceGateway for RetryingGateway<G> {
    async fn get(&self, key: &str) -> Result<Option<Versioned<Value>>, GatewayError> {
        with_retry!(self, "get", self.inner.get(key).await)
    }

    async fn put(
        &self,
        key: &str,
        value: Value,
        expected_version: Option<u64>,
    ) -> Result<u64, GatewayError> {
        // A transient failure may hide a write that landed. The retry then
        // reports VersionConflict, which callers already handle by reloading.
        with_retry!(
            self,
            "put",
            self.inner.put(key, value.clone(), expected_version).await
        )
    }

    async fn append_unique(
        &self,
        log_key: &str,
        unique_key: &str,
        entry: Value,
    ) -> Result<(), GatewayError> {
        with_retry!(
            self,
            "append",
            self.inner
                .append_unique(log_key, unique_key, entry.clone())
                .await
        )
    }

    async fn read_log(&self, log_key: &str) -> Result<Vec<Value>, GatewayError> {
        with_retry!(self, "read_log", self.inner.read_log(log_key).await)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, GatewayError> {
        with_retry!(self, "list_keys", self.inner.list_keys(prefix).await)
    }
}
