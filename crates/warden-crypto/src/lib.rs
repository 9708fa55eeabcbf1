//! # warden-crypto
//!
//! Cryptographic primitives shared by keepers, providers and data owners.
//!
//! The pairing suite is fixed to BLS12-381. No other curve is negotiated.
//!
//! ## Modules
//!
//! - [`algebra`] — G1/G2/GT/Fr aliases, pairing, hash-to-group, compressed encoding
//! - [`base58`] — Base58 text encoding of serialized group elements
//! - [`blake3`] — Domain-separated BLAKE3 hashing

pub mod algebra;
pub mod base58;
pub mod blake3;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// A group element or scalar could not be decoded.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A group element or scalar could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Base58 text was malformed.
    #[error("invalid base58: {0}")]
    Base58(String),

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
