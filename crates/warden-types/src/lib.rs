//! # warden-types
//!
//! Shared domain types used across the Warden workspace: node and block
//! identifiers, protocol-wide size constants and wall-clock helpers.

pub mod ids;

pub use ids::{BlockId, KeeperId, ProviderId, UserId};

/// Number of atoms a segment is split into.
pub const NUM_OF_ATOMS: usize = 128;

/// Width of one atom in bytes.
pub const LENGTH_OF_ATOM: usize = 32;

/// Size of one stored segment in bytes (`NUM_OF_ATOMS * LENGTH_OF_ATOM`).
pub const SEGMENT_SIZE: usize = NUM_OF_ATOMS * LENGTH_OF_ATOM;

/// Bytes per megabyte, the space unit prices are quoted in.
pub const BYTES_PER_MB: u128 = 1024 * 1024;

/// Seconds per day, the time unit prices are quoted in.
pub const SECONDS_PER_DAY: u128 = 86_400;

/// Unix timestamp in seconds.
pub type UnixTime = i64;

/// Current Unix time in seconds.
pub fn unix_now() -> UnixTime {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Error types for identifier parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    /// An identifier was empty.
    #[error("empty identifier")]
    Empty,

    /// A block identifier did not follow `<bucket>_<stripe>_<chunk>`.
    #[error("malformed block id: {0}")]
    MalformedBlockId(String),

    /// An identifier contains the wire delimiter.
    #[error("identifier contains reserved character '/': {0}")]
    ReservedCharacter(String),
}

/// Convenience result type for identifier parsing.
pub type Result<T> = std::result::Result<T, TypesError>;
