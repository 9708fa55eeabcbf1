//! Inbound message dispatch.
//!
//! ```text
//! MetaHandler::handle_meta ─▶ parse key ─▶ bounded queue ─▶ workers ─▶ DispatchTable
//! ```
//!
//! The endpoint only parses and enqueues; a full queue rejects the request
//! instead of growing. Handlers are plain functions keyed by [`KeyType`], so
//! each can be driven directly in tests. Ordering between proofs for the same
//! pair does not matter: only a proof for the pair's current challenge time
//! is accepted.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warden_settlement::SettlementClient;
use warden_transport::messages::{BlockPosition, GroupInfo};
use warden_transport::{
    HandlerFuture, KeyType, MetaHandler, MetaKey, MetaOp, MetaRequest, MetaTransport,
    TransportError,
};
use warden_types::{unix_now, BlockId, KeeperId, ProviderId, UnixTime, UserId};

use crate::service::KeeperService;
use crate::{KeeperError, Result};

/// A parsed inbound message waiting for a worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inbound {
    pub key: MetaKey,
    /// Node the message came from.
    pub from: String,
    pub value: Vec<u8>,
}

pub type DispatchFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Handler for one message kind.
pub type DispatchFn<T, S> = fn(Arc<KeeperService<T, S>>, Inbound) -> DispatchFuture;

/// Message kind to handler.
pub struct DispatchTable<T, S> {
    handlers: HashMap<KeyType, DispatchFn<T, S>>,
}

impl<T: MetaTransport, S: SettlementClient> Default for DispatchTable<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: MetaTransport, S: SettlementClient> DispatchTable<T, S> {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The messages a keeper accepts.
    pub fn keeper() -> Self {
        let mut table = Self::new();
        table.register(KeyType::Proof, on_proof::<T, S>);
        table.register(KeyType::BlockPos, on_block_pos::<T, S>);
        table.register(KeyType::BlockDelete, on_block_delete::<T, S>);
        table.register(KeyType::GroupInfo, on_group_info::<T, S>);
        table.register(KeyType::PaymentConfirm, on_payment_confirm::<T, S>);
        table
    }

    /// Install `handler` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: KeyType, handler: DispatchFn<T, S>) {
        self.handlers.insert(kind, handler);
    }

    pub fn handles(&self, kind: KeyType) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Run the handler for `inbound`.
    pub async fn dispatch(&self, service: Arc<KeeperService<T, S>>, inbound: Inbound) -> Result<()> {
        let kind = inbound.key.key_type;
        let handler = self
            .handlers
            .get(&kind)
            .ok_or_else(|| KeeperError::Malformed(format!("no handler for {kind}")))?;
        handler(service, inbound).await
    }
}

/// The keeper's [`MetaHandler`]: parses, enqueues and returns at once.
pub struct KeeperEndpoint<T, S> {
    table: Arc<DispatchTable<T, S>>,
    queue: mpsc::Sender<Inbound>,
}

impl<T: MetaTransport, S: SettlementClient> KeeperEndpoint<T, S> {
    /// Start the dispatch workers and return the endpoint feeding them.
    pub fn start(
        service: Arc<KeeperService<T, S>>,
        table: Arc<DispatchTable<T, S>>,
        shutdown: &broadcast::Sender<()>,
    ) -> (Arc<Self>, Vec<JoinHandle<()>>) {
        let dispatch = &service.config().dispatch;
        let (queue, receiver) = mpsc::channel::<Inbound>(dispatch.queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..dispatch.workers.max(1))
            .map(|worker| {
                let service = Arc::clone(&service);
                let table = Arc::clone(&table);
                let receiver = Arc::clone(&receiver);
                let mut shutdown = shutdown.subscribe();
                tokio::spawn(async move {
                    loop {
                        let inbound = tokio::select! {
                            inbound = async { receiver.lock().await.recv().await } => inbound,
                            _ = shutdown.recv() => break,
                        };
                        let Some(inbound) = inbound else { break };
                        let key = inbound.key.to_string();
                        if let Err(e) = table.dispatch(Arc::clone(&service), inbound).await {
                            warn!(worker, key = %key, error = %e, "inbound message failed");
                        }
                    }
                    debug!(worker, "dispatch worker stopped");
                })
            })
            .collect::<Vec<_>>();
        info!(workers = workers.len(), "dispatch started");

        (Arc::new(Self { table, queue }), workers)
    }

    fn accept(&self, request: MetaRequest) -> std::result::Result<(), TransportError> {
        if request.op != MetaOp::Put {
            return Err(TransportError::Rejected(format!("{:?} not served", request.op)));
        }
        let key = MetaKey::parse(&request.key)?;
        if !self.table.handles(key.key_type) {
            return Err(TransportError::Rejected(format!("{} not handled", key.key_type)));
        }
        let inbound = Inbound {
            key,
            from: request.from,
            value: request.value,
        };
        self.queue.try_send(inbound).map_err(|e| match e {
            mpsc::error::TrySendError::Full(inbound) => {
                warn!(key = %inbound.key, "dispatch queue full");
                TransportError::Rejected("busy".into())
            }
            mpsc::error::TrySendError::Closed(_) => TransportError::Rejected("shutting down".into()),
        })
    }
}

impl<T: MetaTransport, S: SettlementClient> MetaHandler for KeeperEndpoint<T, S> {
    fn handle_meta(&self, request: MetaRequest) -> HandlerFuture<'_> {
        let accepted = self.accept(request);
        Box::pin(async move { accepted.map(|()| Vec::new()) })
    }
}

fn user_of(key: &MetaKey) -> Result<UserId> {
    Ok(UserId::new(key.main_id.as_str())?)
}

fn time_option(key: &MetaKey, pos: usize) -> Result<UnixTime> {
    key.option(pos)
        .parse()
        .map_err(|e| KeeperError::Malformed(format!("{key}: {e}")))
}

fn on_proof<T: MetaTransport, S: SettlementClient>(
    service: Arc<KeeperService<T, S>>,
    inbound: Inbound,
) -> DispatchFuture {
    Box::pin(async move {
        let key = &inbound.key;
        let user = user_of(key)?;
        let provider = ProviderId::new(key.option(0))?;
        let keeper = KeeperId::new(key.option(1))?;
        let chal_time = time_option(key, 2)?;
        let outcome = service
            .handle_proof(&user, &provider, &keeper, chal_time, &inbound.value)
            .await?;
        debug!(user = %user, provider = %provider, chal_time, ?outcome, "proof message");
        Ok(())
    })
}

fn on_block_pos<T: MetaTransport, S: SettlementClient>(
    service: Arc<KeeperService<T, S>>,
    inbound: Inbound,
) -> DispatchFuture {
    Box::pin(async move {
        let user = user_of(&inbound.key)?;
        let block = BlockId::new(inbound.key.option(0))?;
        let position = BlockPosition::decode(&inbound.value)?;
        service.apply_block_position(&user, block, position, unix_now());
        Ok(())
    })
}

fn on_block_delete<T: MetaTransport, S: SettlementClient>(
    service: Arc<KeeperService<T, S>>,
    inbound: Inbound,
) -> DispatchFuture {
    Box::pin(async move {
        let user = user_of(&inbound.key)?;
        let block = BlockId::new(inbound.key.option(0))?;
        if service.apply_block_delete(&user, &block).is_none() {
            debug!(user = %user, block = %block, "delete for untracked block");
        }
        Ok(())
    })
}

fn on_group_info<T: MetaTransport, S: SettlementClient>(
    service: Arc<KeeperService<T, S>>,
    inbound: Inbound,
) -> DispatchFuture {
    Box::pin(async move {
        let user = user_of(&inbound.key)?;
        let info = GroupInfo::decode(&inbound.value)?;
        service.apply_group_info(&user, info);
        Ok(())
    })
}

fn on_payment_confirm<T: MetaTransport, S: SettlementClient>(
    service: Arc<KeeperService<T, S>>,
    inbound: Inbound,
) -> DispatchFuture {
    Box::pin(async move {
        let user = user_of(&inbound.key)?;
        let provider = ProviderId::new(inbound.key.option(0))?;
        let end = time_option(&inbound.key, 1)?;
        service.apply_payment_confirm(&user, &provider, end);
        Ok(())
    })
}
