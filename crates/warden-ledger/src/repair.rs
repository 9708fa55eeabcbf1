//! Escalating repair schedule.
//!
//! Thresholds are multiples of `expire_secs`, measured from a block's last
//! proven availability:
//!
//! ```text
//! repair_count   repair when elapsed >
//!      0               1 × E
//!      1               4 × E
//!      2              16 × E
//!      k ≥ 3   (64·k − 2) × E, while elapsed ≤ 480 × E
//! ```
//!
//! Past the give-up multiple a block with `repair_count ≥ 3` is lost.

use serde::{Deserialize, Serialize};
use warden_types::UnixTime;

/// What to do about a block right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepairDecision {
    /// Not due yet.
    Wait,
    /// Enqueue a repair.
    Due,
    /// Past saving; no more attempts.
    Lost,
}

/// Repair escalation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPolicy {
    /// Base expiry period `E` in seconds.
    #[serde(default = "default_expire_secs")]
    pub expire_secs: i64,
    /// Multiples for the first three attempts.
    #[serde(default = "default_escalation")]
    pub escalation: [i64; 3],
    /// Per-attempt multiple from the fourth attempt on.
    #[serde(default = "default_step")]
    pub step: i64,
    #[serde(default = "default_step_offset")]
    pub step_offset: i64,
    /// Multiple past which a block is lost.
    #[serde(default = "default_give_up")]
    pub give_up: i64,
}

fn default_expire_secs() -> i64 {
    30 * 60
}

fn default_escalation() -> [i64; 3] {
    [1, 4, 16]
}

fn default_step() -> i64 {
    64
}

fn default_step_offset() -> i64 {
    2
}

fn default_give_up() -> i64 {
    480
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            expire_secs: default_expire_secs(),
            escalation: default_escalation(),
            step: default_step(),
            step_offset: default_step_offset(),
            give_up: default_give_up(),
        }
    }
}

impl RepairPolicy {
    /// Multiple of `E` that must elapse before attempt `repair_count + 1`.
    pub fn threshold(&self, repair_count: u32) -> i64 {
        match self.escalation.get(repair_count as usize) {
            Some(multiple) => *multiple,
            None => self.step * i64::from(repair_count) - self.step_offset,
        }
    }

    pub fn decide(&self, repair_count: u32, elapsed: UnixTime) -> RepairDecision {
        let expire = self.expire_secs.max(1);
        if repair_count as usize >= self.escalation.len()
            && elapsed > self.give_up.saturating_mul(expire)
        {
            return RepairDecision::Lost;
        }
        if elapsed > self.threshold(repair_count).saturating_mul(expire) {
            RepairDecision::Due
        } else {
            RepairDecision::Wait
        }
    }
}
