//! Collaborator interfaces of the routing layer.
//!
//! [`MetaTransport`] is what a node calls; [`MetaHandler`] is what the
//! routing layer calls back when a meta request arrives for the node.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Where a key lives.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The node's own local store.
    Local,
    /// The store of a remote peer.
    Peer(String),
}

/// Operation requested through a meta request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaOp {
    /// Deliver the value under the key.
    Put,
    /// Ask the peer to produce the value for the key.
    Get,
}

/// An inbound meta request as seen by its handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaRequest {
    pub from: String,
    pub op: MetaOp,
    pub key: String,
    pub value: Vec<u8>,
    pub sig: Vec<u8>,
}

/// Boxed future returned by [`MetaHandler::handle_meta`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;

/// Receiver of meta requests addressed to this node.
///
/// The returned bytes are the synchronous response; an empty response means
/// any answer will arrive later as a separate request.
pub trait MetaHandler: Send + Sync {
    fn handle_meta(&self, request: MetaRequest) -> HandlerFuture<'_>;
}

/// Key/value routing primitives.
///
/// Implementors own connections, retries and timeouts. Callers must tolerate
/// a request that never completes.
pub trait MetaTransport: Send + Sync + 'static {
    /// Identifier of the local node.
    fn local_id(&self) -> &str;

    /// Fetch the value stored under `key`.
    fn get_key(&self, key: &str, scope: Scope) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Store `value` under `key`.
    fn put_key(
        &self,
        key: &str,
        value: &[u8],
        sig: &[u8],
        scope: Scope,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Deliver a meta request to `peer` and return its synchronous response.
    fn send_meta_request(
        &self,
        op: MetaOp,
        key: &str,
        value: &[u8],
        sig: &[u8],
        peer: &str,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Try to reach `peer`.
    fn connect(&self, peer: &str) -> impl Future<Output = bool> + Send;
}
