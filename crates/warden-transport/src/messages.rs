//! Payloads carried under wire keys.
//!
//! Challenge and proof values are Base58 text produced by the PDP layer and
//! travel as their UTF-8 bytes; the payloads here cover group bookkeeping
//! and repair.

use serde::{Deserialize, Serialize};
use warden_types::{BlockId, KeeperId, ProviderId};

use crate::key::KEY_DELIMITER;
use crate::{cbor, Result, TransportError};

/// Where a block is stored: the `BlockPos` value, `provider/offset/length`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockPosition {
    pub provider: ProviderId,
    /// Number of segments the block holds.
    pub offset: i64,
    /// Stored length in bytes.
    pub length: u64,
}

impl BlockPosition {
    pub fn encode(&self) -> Vec<u8> {
        format!(
            "{}{d}{}{d}{}",
            self.provider,
            self.offset,
            self.length,
            d = KEY_DELIMITER
        )
        .into_bytes()
    }

    pub fn decode(value: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(value)
            .map_err(|e| TransportError::Deserialization(format!("block position: {e}")))?;
        let parts: Vec<&str> = text.split(KEY_DELIMITER).collect();
        if parts.len() != 3 {
            return Err(TransportError::Deserialization(format!(
                "block position has {} fields",
                parts.len()
            )));
        }
        let provider = ProviderId::new(parts[0])
            .map_err(|e| TransportError::Deserialization(e.to_string()))?;
        let offset = parts[1]
            .parse()
            .map_err(|e| TransportError::Deserialization(format!("block offset: {e}")))?;
        let length = parts[2]
            .parse()
            .map_err(|e| TransportError::Deserialization(format!("block length: {e}")))?;
        Ok(Self {
            provider,
            offset,
            length,
        })
    }
}

/// Keepers and providers serving one user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub keepers: Vec<KeeperId>,
    pub providers: Vec<ProviderId>,
}

impl GroupInfo {
    pub fn encode(&self) -> Result<Vec<u8>> {
        cbor::to_vec(self)
    }

    pub fn decode(value: &[u8]) -> Result<Self> {
        cbor::from_slice(value)
    }
}

/// A surviving chunk of the stripe a lost block belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiblingLocation {
    pub provider: ProviderId,
    pub block: BlockId,
}

/// Instruction to a fresh provider to rebuild a block from its siblings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairOrder {
    pub block: BlockId,
    pub siblings: Vec<SiblingLocation>,
}

impl RepairOrder {
    pub fn encode(&self) -> Result<Vec<u8>> {
        cbor::to_vec(self)
    }

    pub fn decode(value: &[u8]) -> Result<Self> {
        cbor::from_slice(value)
    }
}

/// Reply of a provider that rebuilt a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReceipt {
    /// Segment count of the rebuilt block.
    pub offset: i64,
    pub length: u64,
}

impl RepairReceipt {
    pub fn encode(&self) -> Result<Vec<u8>> {
        cbor::to_vec(self)
    }

    pub fn decode(value: &[u8]) -> Result<Self> {
        cbor::from_slice(value)
    }
}
