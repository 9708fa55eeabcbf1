//! In-process network.
//!
//! Every joined node gets a local key/value store and an optional request
//! handler. Nodes can be taken offline to exercise unreachable-peer paths.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::network::{MetaHandler, MetaOp, MetaRequest, MetaTransport, Scope};
use crate::{Result, TransportError};

#[derive(Default)]
struct NodeSlot {
    store: HashMap<String, Vec<u8>>,
    handler: Option<Arc<dyn MetaHandler>>,
    online: bool,
}

/// Shared registry of in-process nodes.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    nodes: Arc<RwLock<HashMap<String, NodeSlot>>>,
}

/// One node's view of a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport {
    id: String,
    network: MemoryNetwork,
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("nodes", &self.nodes.read().len())
            .finish()
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport").field("id", &self.id).finish()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a node, bringing it online, and return its transport handle.
    pub fn join(&self, id: impl Into<String>) -> MemoryTransport {
        let id = id.into();
        self.nodes.write().entry(id.clone()).or_default().online = true;
        MemoryTransport {
            id,
            network: self.clone(),
        }
    }

    /// Install the handler receiving meta requests for `id`.
    pub fn register_handler(&self, id: &str, handler: Arc<dyn MetaHandler>) {
        self.nodes.write().entry(id.to_string()).or_default().handler = Some(handler);
    }

    pub fn set_online(&self, id: &str, online: bool) {
        if let Some(slot) = self.nodes.write().get_mut(id) {
            slot.online = online;
        }
    }

    /// Read a node's local store directly.
    pub fn stored(&self, id: &str, key: &str) -> Option<Vec<u8>> {
        self.nodes
            .read()
            .get(id)
            .and_then(|slot| slot.store.get(key).cloned())
    }

    fn is_online(&self, id: &str) -> bool {
        self.nodes.read().get(id).is_some_and(|slot| slot.online)
    }
}

impl MemoryTransport {
    fn target<'a>(&'a self, scope: &'a Scope) -> Result<&'a str> {
        match scope {
            Scope::Local => Ok(&self.id),
            Scope::Peer(peer) if self.network.is_online(peer) => Ok(peer),
            Scope::Peer(peer) => Err(TransportError::PeerUnreachable(peer.clone())),
        }
    }
}

impl MetaTransport for MemoryTransport {
    fn local_id(&self) -> &str {
        &self.id
    }

    async fn get_key(&self, key: &str, scope: Scope) -> Result<Vec<u8>> {
        let target = self.target(&scope)?;
        self.network
            .stored(target, key)
            .ok_or_else(|| TransportError::NotFound(key.to_string()))
    }

    async fn put_key(&self, key: &str, value: &[u8], _sig: &[u8], scope: Scope) -> Result<()> {
        let target = self.target(&scope)?;
        self.network
            .nodes
            .write()
            .entry(target.to_string())
            .or_default()
            .store
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn send_meta_request(
        &self,
        op: MetaOp,
        key: &str,
        value: &[u8],
        sig: &[u8],
        peer: &str,
    ) -> Result<Vec<u8>> {
        let handler = {
            let nodes = self.network.nodes.read();
            match nodes.get(peer) {
                Some(slot) if slot.online => slot.handler.clone(),
                _ => None,
            }
        };
        let handler = handler.ok_or_else(|| TransportError::PeerUnreachable(peer.to_string()))?;

        tracing::trace!(from = %self.id, to = peer, key, "meta request");
        handler
            .handle_meta(MetaRequest {
                from: self.id.clone(),
                op,
                key: key.to_string(),
                value: value.to_vec(),
                sig: sig.to_vec(),
            })
            .await
    }

    async fn connect(&self, peer: &str) -> bool {
        self.network.is_online(peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::HandlerFuture;

    struct Echo;

    impl MetaHandler for Echo {
        fn handle_meta(&self, request: MetaRequest) -> HandlerFuture<'_> {
            Box::pin(async move {
                let mut out = request.from.into_bytes();
                out.push(b':');
                out.extend_from_slice(&request.value);
                Ok(out)
            })
        }
    }

    #[tokio::test]
    async fn test_local_and_peer_store() {
        let net = MemoryNetwork::new();
        let a = net.join("a");
        let b = net.join("b");

        a.put_key("u/PublicKey", b"pk", &[], Scope::Local)
            .await
            .expect("put");
        assert_eq!(
            b.get_key("u/PublicKey", Scope::Peer("a".into()))
                .await
                .expect("get"),
            b"pk".to_vec()
        );
        assert!(matches!(
            b.get_key("u/PublicKey", Scope::Local).await,
            Err(TransportError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_meta_request_reaches_handler() {
        let net = MemoryNetwork::new();
        let a = net.join("a");
        net.join("b");
        net.register_handler("b", Arc::new(Echo));

        let reply = a
            .send_meta_request(MetaOp::Put, "u/Proof/p/k/1", b"hi", &[], "b")
            .await
            .expect("send");
        assert_eq!(reply, b"a:hi".to_vec());
    }

    #[tokio::test]
    async fn test_offline_peer_unreachable() {
        let net = MemoryNetwork::new();
        let a = net.join("a");
        net.join("b");
        net.register_handler("b", Arc::new(Echo));
        net.set_online("b", false);

        assert!(!a.connect("b").await);
        assert!(!a.connect("nobody").await);
        assert!(matches!(
            a.send_meta_request(MetaOp::Get, "k", &[], &[], "b").await,
            Err(TransportError::PeerUnreachable(_))
        ));
        assert!(a
            .get_key("k", Scope::Peer("b".into()))
            .await
            .is_err());
    }
}
