//! # warden-settlement
//!
//! Space-time accounting and the settlement contract boundary.
//!
//! ## Modules
//!
//! - [`spacetime`] — Trapezoidal space-time integral, amount conversion, payment digest
//! - [`client`] — Settlement contract collaborator trait and in-process implementations
//! - [`retry`] — Uniform retry policy and the retrying client wrapper

pub mod client;
pub mod retry;
pub mod spacetime;

pub use client::{
    MemorySettlement, NoopSettlement, QueryInfo, SettlementClient, SpaceTimeOrder, UpkeepingInfo,
};
pub use retry::{RetryPolicy, RetryingSettlement};
pub use spacetime::{payment_amount, payment_digest, plan_payment, space_time, PaymentPlan};

/// Error types for settlement operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    /// The contract could not be reached.
    #[error("settlement unavailable: {0}")]
    Unavailable(String),

    /// The submitted transaction used a stale nonce.
    #[error("nonce too low")]
    NonceTooLow,

    /// The transaction was sent but not mined in time.
    #[error("transaction not mined: {0}")]
    NotMined(String),

    /// The contract refused the call.
    #[error("rejected by contract: {0}")]
    Rejected(String),

    /// No contract state for this user.
    #[error("unknown upkeeping: {0}")]
    UnknownUpkeeping(String),

    /// Every attempt failed.
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl SettlementError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::Unavailable(_)
                | SettlementError::NonceTooLow
                | SettlementError::NotMined(_)
        )
    }
}

/// Convenience result type for settlement operations.
pub type Result<T> = std::result::Result<T, SettlementError>;
