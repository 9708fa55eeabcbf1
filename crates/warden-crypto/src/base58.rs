//! Base58 text encoding for wire values.
//!
//! Proof components and challenge payloads cross the key/value transport as
//! text, so their binary encodings are wrapped in Base58 (Bitcoin alphabet).
//! The alphabet contains no `/`, which keeps encoded values safe to join with
//! the wire delimiter.

use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

use crate::algebra;
use crate::{CryptoError, Result};

/// Encode raw bytes as Base58.
pub fn encode(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decode Base58 text into raw bytes.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    bs58::decode(text)
        .into_vec()
        .map_err(|e| CryptoError::Base58(e.to_string()))
}

/// Encode a group element as Base58 over its compressed encoding.
pub fn encode_element<T: CanonicalSerialize>(value: &T) -> Result<String> {
    Ok(encode(&algebra::to_bytes(value)?))
}

/// Decode a Base58 group element.
pub fn decode_element<T: CanonicalDeserialize + CanonicalSerialize>(text: &str) -> Result<T> {
    algebra::from_bytes(&decode(text)?)
}
