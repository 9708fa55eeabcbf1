//! Node and block identifiers.
//!
//! Identifiers are opaque strings on the wire. They are wrapped in distinct
//! types so a provider id can never be passed where a user id is expected.
//! None of them may contain `/`, the wire key delimiter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Result, TypesError};

fn validate(raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(TypesError::Empty);
    }
    if raw.contains('/') {
        return Err(TypesError::ReservedCharacter(raw.to_string()));
    }
    Ok(())
}

macro_rules! node_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a raw identifier.
            pub fn new(raw: impl Into<String>) -> Result<Self> {
                let raw = raw.into();
                validate(&raw)?;
                Ok(Self(raw))
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypesError;

            fn from_str(s: &str) -> Result<Self> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = TypesError;

            fn try_from(s: String) -> Result<Self> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

node_id!(
    /// A data owner. Each user has its own group of keepers and providers.
    UserId
);

node_id!(
    /// A storage provider holding user blocks.
    ProviderId
);

node_id!(
    /// A keeper supervising providers.
    KeeperId
);

/// A stored block: one erasure-coded chunk of a stripe, `<bucket>_<stripe>_<chunk>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockId(String);

impl BlockId {
    /// Parse and validate a block identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        validate(&raw)?;
        let parts: Vec<&str> = raw.split('_').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(TypesError::MalformedBlockId(raw));
        }
        if parts[2].parse::<u32>().is_err() {
            return Err(TypesError::MalformedBlockId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The stripe this chunk belongs to (`<bucket>_<stripe>`).
    pub fn stripe(&self) -> &str {
        match self.0.rfind('_') {
            Some(pos) => &self.0[..pos],
            None => &self.0,
        }
    }

    /// The chunk position within the stripe.
    pub fn chunk(&self) -> u32 {
        self.0
            .rsplit('_')
            .next()
            .and_then(|c| c.parse().ok())
            .unwrap_or_default()
    }

    /// Whether `other` is a different chunk of the same stripe.
    pub fn is_sibling_of(&self, other: &BlockId) -> bool {
        self != other && self.stripe() == other.stripe()
    }

    /// Storage index of one segment of this block: `<block>_<offset>`.
    ///
    /// Tags are bound to this string.
    pub fn segment_index(&self, offset: u32) -> String {
        format!("{}_{}", self.0, offset)
    }

    /// Split a segment index back into its block and segment offset.
    pub fn parse_segment_index(index: &str) -> Result<(BlockId, u32)> {
        let (block, offset) = index
            .rsplit_once('_')
            .ok_or_else(|| TypesError::MalformedBlockId(index.to_string()))?;
        let offset = offset
            .parse::<u32>()
            .map_err(|_| TypesError::MalformedBlockId(index.to_string()))?;
        Ok((BlockId::new(block)?, offset))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BlockId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for BlockId {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<BlockId> for String {
    fn from(id: BlockId) -> String {
        id.0
    }
}
