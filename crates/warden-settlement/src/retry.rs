//! Uniform retry policy for contract calls.
//!
//! ```text
//! delay(attempt) = min(initial_delay_ms · multiplier^(attempt-1), max_delay_ms)
//! ```
//!
//! Only errors that report [`SettlementError::is_retryable`] are retried. A
//! final failure is surfaced as [`SettlementError::Exhausted`]; the payment
//! driver treats it as "deferred to the next round".

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_types::UserId;

use crate::client::{QueryInfo, SettlementClient, SpaceTimeOrder, UpkeepingInfo};
use crate::{Result, SettlementError};

/// Retry parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts including the first. Zero is treated as one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt `attempt` (1-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let max = self.max_delay_ms as f64;
        let clamped = if raw.is_nan() || raw < 0.0 {
            0.0
        } else {
            raw.min(max)
        };
        Duration::from_millis(clamped as u64)
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of attempts.
    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    tracing::warn!(what, attempts = attempt, error = %e, "retries exhausted");
                    return Err(SettlementError::Exhausted {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.delay(attempt);
                    tracing::debug!(
                        what,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}

/// A [`SettlementClient`] that retries every call under one policy.
#[derive(Debug)]
pub struct RetryingSettlement<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: SettlementClient> RetryingSettlement<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: SettlementClient> SettlementClient for RetryingSettlement<C> {
    async fn space_time_pay(&self, order: &SpaceTimeOrder) -> Result<()> {
        self.policy
            .run("space_time_pay", || self.inner.space_time_pay(order))
            .await
    }

    async fn upkeeping_info(&self, user: &UserId) -> Result<UpkeepingInfo> {
        self.policy
            .run("upkeeping_info", || self.inner.upkeeping_info(user))
            .await
    }

    async fn query_info(&self, user: &UserId) -> Result<QueryInfo> {
        self.policy
            .run("query_info", || self.inner.query_info(user))
            .await
    }
}
