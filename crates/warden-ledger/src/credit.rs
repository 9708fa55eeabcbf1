//! Provider credit.
//!
//! Each verified round earns `reward`; each failed or unanswered round costs
//! `penalty`. Scores stay within `[min, max]`. Providers below zero are not
//! picked as repair targets until they recover.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use warden_types::ProviderId;

/// Credit bounds and step sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPolicy {
    #[serde(default = "default_max")]
    pub max: i64,
    #[serde(default = "default_min")]
    pub min: i64,
    #[serde(default = "default_reward")]
    pub reward: i64,
    #[serde(default = "default_penalty")]
    pub penalty: i64,
}

fn default_max() -> i64 {
    100
}

fn default_min() -> i64 {
    -100
}

fn default_reward() -> i64 {
    1
}

fn default_penalty() -> i64 {
    10
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            max: default_max(),
            min: default_min(),
            reward: default_reward(),
            penalty: default_penalty(),
        }
    }
}

/// Credit of every provider this keeper has challenged.
#[derive(Debug, Default)]
pub struct CreditBook {
    policy: CreditPolicy,
    scores: RwLock<HashMap<ProviderId, i64>>,
}

impl CreditBook {
    pub fn new(policy: CreditPolicy) -> Self {
        Self {
            policy,
            scores: RwLock::new(HashMap::new()),
        }
    }

    /// Current score; unknown providers start at zero.
    pub fn score(&self, provider: &ProviderId) -> i64 {
        self.scores.read().get(provider).copied().unwrap_or(0)
    }

    pub fn reward(&self, provider: &ProviderId) -> i64 {
        self.adjust(provider, self.policy.reward)
    }

    pub fn penalize(&self, provider: &ProviderId) -> i64 {
        self.adjust(provider, -self.policy.penalty)
    }

    /// Whether the provider may receive repaired blocks.
    pub fn is_eligible(&self, provider: &ProviderId) -> bool {
        self.score(provider) >= 0
    }

    /// Set a score directly, clamped to the policy bounds.
    pub fn set(&self, provider: &ProviderId, score: i64) {
        let clamped = score.clamp(self.policy.min, self.policy.max);
        self.scores.write().insert(provider.clone(), clamped);
    }

    fn adjust(&self, provider: &ProviderId, delta: i64) -> i64 {
        let mut scores = self.scores.write();
        let score = scores.entry(provider.clone()).or_insert(0);
        *score = score
            .saturating_add(delta)
            .clamp(self.policy.min, self.policy.max);
        *score
    }
}
