//! # warden-transport
//!
//! Client side of the key/value routing layer keepers and providers talk
//! through.
//!
//! Routing, connection management and durability belong to the network
//! collaborator; this crate only fixes the shape of the conversation:
//!
//! - **Wire keys** (`mainID/keyType/opt1/...`) via [`key`]
//! - **Message payloads** carried under those keys via [`messages`]
//! - **CBOR helpers** via [`cbor`]
//! - **Collaborator traits** ([`MetaTransport`], [`MetaHandler`]) via [`network`]
//! - **In-process network** for tests and single-host runs via [`memory`]
//!
//! ```text
//! keeper ──send_meta_request(Challenge)──▶ provider
//!        ◀──send_meta_request(Proof)──────
//! keeper ──get_key(user/PublicKey)───────▶ owner
//! keeper ──put_key(.., Scope::Local)─────▶ local store
//! ```

pub mod cbor;
pub mod key;
pub mod memory;
pub mod messages;
pub mod network;

pub use key::{KeyType, MetaKey, KEY_DELIMITER};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use network::{HandlerFuture, MetaHandler, MetaOp, MetaRequest, MetaTransport, Scope};

/// Error types for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// CBOR serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// CBOR deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A wire key that does not follow `mainID/keyType/options...`.
    #[error("malformed key: {0}")]
    MalformedKey(String),

    /// A key type this node does not know.
    #[error("unknown key type: {0}")]
    UnknownKeyType(String),

    /// A key carries the wrong number of options for its type.
    #[error("{key_type} key expects {expected} options, got {got}")]
    OptionCount {
        key_type: KeyType,
        expected: usize,
        got: usize,
    },

    /// The target peer is not reachable.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    /// No value stored under the key.
    #[error("key not found: {0}")]
    NotFound(String),

    /// The remote handler refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Convenience result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
