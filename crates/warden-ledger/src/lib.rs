//! # warden-ledger
//!
//! The keeper's bookkeeping for every (user, provider) pair it supervises.
//!
//! ## Modules
//!
//! - [`pair`] — Per-pair ledger: stored blocks, challenge records, payment checkpoint
//! - [`book`] — Concurrent map of pair ledgers and cross-pair block lookups
//! - [`credit`] — Bounded provider credit
//! - [`repair`] — Escalating repair schedule
//! - [`master`] — Master keeper election
//! - [`snapshot`] — Persisted ledger snapshots

pub mod book;
pub mod credit;
pub mod master;
pub mod pair;
pub mod repair;
pub mod snapshot;

pub use book::{Ledger, PairKey};
pub use credit::{CreditBook, CreditPolicy};
pub use master::master_keeper;
pub use pair::{
    ChallengeRecord, LedgerEntry, PairLedger, PaymentCheckpoint, MAX_FAILED_RECORDS, MAX_RECORDS,
};
pub use repair::{RepairDecision, RepairPolicy};
pub use snapshot::{BlockSnapshot, PairSnapshot};

/// Error types for ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// No challenge round matches the given challenge time.
    #[error("no pending challenge at {0}")]
    NoPendingChallenge(i64),

    /// A new round must be later than the previous one.
    #[error("challenge time regression: last {last}, requested {requested}")]
    ChallengeTimeRegression { last: i64, requested: i64 },

    /// The block is not tracked in this ledger.
    #[error("unknown block: {0}")]
    UnknownBlock(String),

    /// A payment checkpoint may only move forward.
    #[error("checkpoint regression: {current} -> {requested}")]
    CheckpointRegression { current: i64, requested: i64 },

    /// Snapshot encoding or decoding failed.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
