//! CBOR helpers for message payloads.

use serde::{de::DeserializeOwned, Serialize};

use crate::{Result, TransportError};

/// Serialize a value to CBOR bytes.
///
/// # Errors
///
/// Returns [`TransportError::Serialization`] if the value cannot be serialized.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| TransportError::Serialization(format!("CBOR serialization failed: {e}")))?;
    Ok(buf)
}

/// Deserialize a value from CBOR bytes.
///
/// # Errors
///
/// Returns [`TransportError::Deserialization`] if the bytes do not decode into
/// the target type.
pub fn from_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    ciborium::from_reader(data).map_err(|e| {
        TransportError::Deserialization(format!("CBOR deserialization failed: {e}"))
    })
}
