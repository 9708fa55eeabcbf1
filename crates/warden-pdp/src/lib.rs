//! # warden-pdp
//!
//! Proof-of-Data-Possession over BLS12-381.
//!
//! A data owner tags every stored segment with a linearly homomorphic tag.
//! A keeper later challenges a provider with a reproducible selection of
//! segments; the provider folds the challenged data and tags into a constant
//! size proof `(mu, nu, delta)` which the keeper checks with two pairing
//! equalities, never touching the raw data.
//!
//! ```text
//! owner:    KeySet ──gen_tag──▶ tag per segment ──▶ provider
//! keeper:   gen_challenge(seed) ──ChallengeValue──▶ provider
//! provider: gen_proof(segments, tags) ──ProofValue──▶ keeper
//! keeper:   verify_proof  e(delta, G)  == e(ΣH(i) + mu, BlsPK)
//!                         e(mu, W[c])  == e(U[0], nu)
//! ```
//!
//! ## Modules
//!
//! - [`keyset`] — Owner key material and the public parameters
//! - [`tag`] — Per-segment tag generation
//! - [`challenge`] — Seeded challenge derivation and its wire value
//! - [`proof`] — Provider-side aggregation and keeper-side verification
//! - [`responder`] — Provider handler turning a challenge into a proof value

pub mod challenge;
pub mod keyset;
pub mod proof;
pub mod responder;
pub mod tag;

pub use challenge::{derive_offset, elect_offset, gen_challenge, Challenge, ChallengeValue};
pub use keyset::{AtomMode, KeySet, PublicKey, SecretKey};
pub use proof::{gen_proof, verify_proof, Proof, ProofValue};
pub use responder::{ChallengeResponder, SegmentSource, StoredSegment};
pub use tag::{gen_tag, verify_tag};

/// Error types for PDP operations.
#[derive(Debug, thiserror::Error)]
pub enum PdpError {
    /// A segment does not split into `NUM_OF_ATOMS` equal atoms.
    #[error("invalid segment size: {len} bytes is not {atoms} atoms of {width} bytes")]
    InvalidSegmentSize { len: usize, atoms: usize, width: usize },

    /// An index into the `U`/`W` bases fell outside the key.
    #[error("number out of range: {index} >= {len}")]
    NumOutOfRange { index: usize, len: usize },

    /// The key set does not hold enough exponents to tag a segment.
    #[error("key set incomplete: {available} of {required} entries populated")]
    KeysetIncomplete { available: usize, required: usize },

    /// Segment and tag counts disagree.
    #[error("segment count {segments} does not match tag count {tags}")]
    TagCountMismatch { segments: usize, tags: usize },

    /// A challenge selects nothing.
    #[error("challenge selects no segments")]
    EmptyChallenge,

    /// The challenged offset sent by the keeper is not the one derived from the seed.
    #[error("challenge offset mismatch: derived {derived}, received {received}")]
    ChallengeMismatch { derived: u64, received: u64 },

    /// First pairing check failed: aggregated tags do not match the data commitment.
    #[error("verification step one failed: tag/data mismatch")]
    VerifyStepOne,

    /// Second pairing check failed: `mu` and `nu` disagree on the elected offsets.
    #[error("verification step two failed: offset mismatch")]
    VerifyStepTwo,

    /// Malformed wire value.
    #[error("malformed wire value: {0}")]
    Malformed(String),

    /// Underlying group encoding failure.
    #[error(transparent)]
    Crypto(#[from] warden_crypto::CryptoError),
}

/// Convenience result type for PDP operations.
pub type Result<T> = std::result::Result<T, PdpError>;
