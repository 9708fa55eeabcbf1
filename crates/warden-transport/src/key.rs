//! Wire keys.
//!
//! ```text
//! mainID / keyType / option1 / option2 / ...
//! ```
//!
//! | Key type         | Main id  | Options                     |
//! |------------------|----------|-----------------------------|
//! | `Challenge`      | user     | provider, keeper, chal_time |
//! | `Proof`          | user     | provider, keeper, chal_time |
//! | `Repair`         | user     | block, target provider      |
//! | `BlockPos`       | user     | block                       |
//! | `BlockDelete`    | user     | block                       |
//! | `GroupInfo`      | user     |                             |
//! | `PublicKey`      | user     |                             |
//! | `KeeperList`     | user     |                             |
//! | `ProviderList`   | user     |                             |
//! | `LedgerSnapshot` | provider | user                        |
//! | `PaymentConfirm` | user     | provider, interval end      |
//! | `UserList`       | keeper   |                             |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Result, TransportError};

/// Separator between key fields.
pub const KEY_DELIMITER: char = '/';

/// Kind of a wire key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    Challenge,
    Proof,
    Repair,
    BlockPos,
    BlockDelete,
    GroupInfo,
    PublicKey,
    KeeperList,
    ProviderList,
    LedgerSnapshot,
    PaymentConfirm,
    UserList,
}

impl KeyType {
    pub const ALL: [KeyType; 12] = [
        KeyType::Challenge,
        KeyType::Proof,
        KeyType::Repair,
        KeyType::BlockPos,
        KeyType::BlockDelete,
        KeyType::GroupInfo,
        KeyType::PublicKey,
        KeyType::KeeperList,
        KeyType::ProviderList,
        KeyType::LedgerSnapshot,
        KeyType::PaymentConfirm,
        KeyType::UserList,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Challenge => "Challenge",
            KeyType::Proof => "Proof",
            KeyType::Repair => "Repair",
            KeyType::BlockPos => "BlockPos",
            KeyType::BlockDelete => "BlockDelete",
            KeyType::GroupInfo => "GroupInfo",
            KeyType::PublicKey => "PublicKey",
            KeyType::KeeperList => "KeeperList",
            KeyType::ProviderList => "ProviderList",
            KeyType::LedgerSnapshot => "LedgerSnapshot",
            KeyType::PaymentConfirm => "PaymentConfirm",
            KeyType::UserList => "UserList",
        }
    }

    /// Number of options a key of this type carries after the type field.
    pub fn option_count(&self) -> usize {
        match self {
            KeyType::Challenge | KeyType::Proof => 3,
            KeyType::Repair | KeyType::PaymentConfirm => 2,
            KeyType::BlockPos | KeyType::BlockDelete | KeyType::LedgerSnapshot => 1,
            KeyType::GroupInfo
            | KeyType::PublicKey
            | KeyType::KeeperList
            | KeyType::ProviderList
            | KeyType::UserList => 0,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        KeyType::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| TransportError::UnknownKeyType(s.to_string()))
    }
}

/// A parsed wire key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MetaKey {
    pub main_id: String,
    pub key_type: KeyType,
    pub options: Vec<String>,
}

impl MetaKey {
    /// Build a key, checking the option count and that no field contains the delimiter.
    pub fn new(
        main_id: impl Into<String>,
        key_type: KeyType,
        options: Vec<String>,
    ) -> Result<Self> {
        let main_id = main_id.into();
        if main_id.is_empty() || main_id.contains(KEY_DELIMITER) {
            return Err(TransportError::MalformedKey(main_id));
        }
        if let Some(bad) = options
            .iter()
            .find(|o| o.is_empty() || o.contains(KEY_DELIMITER))
        {
            return Err(TransportError::MalformedKey(bad.clone()));
        }
        if options.len() != key_type.option_count() {
            return Err(TransportError::OptionCount {
                key_type,
                expected: key_type.option_count(),
                got: options.len(),
            });
        }
        Ok(Self {
            main_id,
            key_type,
            options,
        })
    }

    /// Parse a key received from the wire.
    ///
    /// # Errors
    ///
    /// - [`TransportError::MalformedKey`] for a key without a type field
    /// - [`TransportError::UnknownKeyType`] for an unrecognised type
    /// - [`TransportError::OptionCount`] for the wrong number of options
    pub fn parse(raw: &str) -> Result<Self> {
        let mut fields = raw.split(KEY_DELIMITER);
        let main_id = fields.next().unwrap_or_default();
        let key_type: KeyType = fields
            .next()
            .ok_or_else(|| TransportError::MalformedKey(raw.to_string()))?
            .parse()?;
        let options = fields.map(str::to_string).collect();
        Self::new(main_id, key_type, options)
    }

    /// Option at `pos`. Always present after construction.
    pub fn option(&self, pos: usize) -> &str {
        self.options.get(pos).map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for MetaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.main_id, KEY_DELIMITER, self.key_type)?;
        for option in &self.options {
            write!(f, "{KEY_DELIMITER}{option}")?;
        }
        Ok(())
    }
}

impl FromStr for MetaKey {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
