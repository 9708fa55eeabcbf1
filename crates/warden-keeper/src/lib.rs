//! # warden-keeper
//!
//! The keeper: challenges providers, verifies their possession proofs, keeps
//! the per-pair ledger, schedules repairs of stale blocks and pays providers
//! for the space-time they proved.
//!
//! ## Modules
//!
//! - [`config`] — TOML configuration with per-field defaults
//! - [`service`] — [`KeeperService`], the state every driver shares
//! - [`challenge`] — Challenge rounds and proof verification
//! - [`repair`] — Repair scheduling and the repair worker pool
//! - [`payment`] — Space-time payments
//! - [`group`] — Group membership, block bookkeeping and the public key cache
//! - [`dispatch`] — Inbound message dispatch table and worker pool
//! - [`connectivity`] — Provider reachability
//! - [`persist`] — Ledger snapshots in the local store
//! - [`drivers`] — Periodic drivers and shutdown
//!
//! ```text
//!            ┌──────────── KeeperService ────────────┐
//!  ticks ──▶ │ challenge · repair · payment · connect │ ──▶ MetaTransport
//!            │        Ledger · CreditBook · keys      │ ──▶ SettlementClient
//!  inbound ▶ │ KeeperEndpoint ─▶ queue ─▶ workers     │
//!            └────────────────────────────────────────┘
//! ```

pub mod challenge;
pub mod config;
pub mod connectivity;
pub mod dispatch;
pub mod drivers;
pub mod group;
pub mod payment;
pub mod persist;
pub mod repair;
pub mod service;

#[cfg(test)]
mod testutil;

pub use challenge::{IssuedChallenge, ProofOutcome};
pub use config::KeeperConfig;
pub use dispatch::{DispatchTable, Inbound, KeeperEndpoint};
pub use drivers::spawn_drivers;
pub use repair::{RepairOutcome, RepairTask};
pub use service::KeeperService;

/// Error types for keeper operations.
#[derive(Debug, thiserror::Error)]
pub enum KeeperError {
    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// A message field that does not parse.
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error(transparent)]
    Types(#[from] warden_types::TypesError),

    #[error(transparent)]
    Pdp(#[from] warden_pdp::PdpError),

    #[error(transparent)]
    Transport(#[from] warden_transport::TransportError),

    #[error(transparent)]
    Ledger(#[from] warden_ledger::LedgerError),

    #[error(transparent)]
    Settlement(#[from] warden_settlement::SettlementError),

    /// JSON encoding of persisted lists.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type for keeper operations.
pub type Result<T> = std::result::Result<T, KeeperError>;
