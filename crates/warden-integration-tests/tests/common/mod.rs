//! Shared nodes for the integration tests: a keeper wired to its endpoint,
//! a data owner publishing its key and group, and a provider that answers
//! challenges and repair orders from the segments it holds.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use warden_keeper::{DispatchTable, KeeperConfig, KeeperEndpoint, KeeperService};
use warden_pdp::{gen_tag, AtomMode, ChallengeResponder, KeySet, StoredSegment};
use warden_settlement::{MemorySettlement, RetryPolicy};
use warden_transport::messages::{BlockPosition, GroupInfo, RepairOrder, RepairReceipt};
use warden_transport::{
    HandlerFuture, KeyType, MemoryNetwork, MemoryTransport, MetaHandler, MetaKey, MetaOp,
    MetaRequest, MetaTransport, Scope, TransportError,
};
use warden_types::{BlockId, KeeperId, ProviderId, UserId, SEGMENT_SIZE};

pub type Keeper = KeeperService<MemoryTransport, MemorySettlement>;

/// Segments every test block holds.
pub const SEGMENTS: u32 = 2;

/// Length announced for every test block.
pub const BLOCK_LENGTH: u64 = 1024 * 1024;

pub fn keyset(n: usize, seed: u64) -> KeySet {
    KeySet::generate(n, AtomMode::Plain, &mut StdRng::seed_from_u64(seed)).expect("keyset")
}

pub fn segment(seed: u8) -> Vec<u8> {
    (0..SEGMENT_SIZE).map(|i| (i as u8).wrapping_mul(seed | 1)).collect()
}

/// Every segment of `block`, tagged.
pub fn tagged_block(keyset: &KeySet, block: &BlockId) -> HashMap<String, StoredSegment> {
    (0..SEGMENTS)
        .map(|offset| {
            let index = block.segment_index(offset);
            let data = segment(offset as u8 + block.chunk() as u8 * 7);
            let tag = gen_tag(keyset, &data, &index).expect("tag");
            (index, StoredSegment { data, tag })
        })
        .collect()
}

pub fn user() -> UserId {
    UserId::new("u1").expect("id")
}

pub fn provider(name: &str) -> ProviderId {
    ProviderId::new(name).expect("id")
}

pub fn block(name: &str) -> BlockId {
    BlockId::new(name).expect("id")
}

/// A keeper on `net`, serving inbound messages until `shutdown` fires.
pub fn keeper(
    net: &MemoryNetwork,
    id: &str,
    shutdown: &broadcast::Sender<()>,
) -> (Arc<Keeper>, Vec<JoinHandle<()>>) {
    let mut config = KeeperConfig::default();
    config.keeper.keeper_id = id.into();
    config.retry = RetryPolicy {
        max_attempts: 2,
        initial_delay_ms: 0,
        max_delay_ms: 0,
        backoff_multiplier: 1.0,
    };
    let service = Arc::new(
        KeeperService::new(config, net.join(id), MemorySettlement::new()).expect("keeper"),
    );
    let (endpoint, workers) =
        KeeperEndpoint::start(Arc::clone(&service), Arc::new(DispatchTable::keeper()), shutdown);
    net.register_handler(id, endpoint);
    (service, workers)
}

/// The data owner: publishes its public key and tells keepers where things are.
pub struct Owner {
    pub transport: MemoryTransport,
    pub user: UserId,
}

impl Owner {
    pub async fn join(net: &MemoryNetwork, keyset: &KeySet) -> Self {
        let owner = Self {
            transport: net.join("u1"),
            user: user(),
        };
        let key = MetaKey::new(owner.user.as_str(), KeyType::PublicKey, Vec::new()).expect("key");
        let bytes = keyset.public.to_bytes().expect("public key");
        owner
            .transport
            .put_key(&key.to_string(), &bytes, &[], Scope::Local)
            .await
            .expect("publish");
        owner
    }

    async fn send(&self, keeper: &str, key: MetaKey, value: Vec<u8>) {
        self.transport
            .send_meta_request(MetaOp::Put, &key.to_string(), &value, &[], keeper)
            .await
            .expect("keeper accepted");
    }

    pub async fn announce_group(&self, keeper: &str, keepers: &[&str], providers: &[&str]) {
        let info = GroupInfo {
            keepers: keepers.iter().map(|k| KeeperId::new(*k).expect("id")).collect(),
            providers: providers.iter().map(|p| provider(p)).collect(),
        };
        let key = MetaKey::new(self.user.as_str(), KeyType::GroupInfo, Vec::new()).expect("key");
        self.send(keeper, key, info.encode().expect("group")).await;
    }

    pub async fn announce_block(&self, keeper: &str, block: &BlockId, holder: &str) {
        let position = BlockPosition {
            provider: provider(holder),
            offset: i64::from(SEGMENTS),
            length: BLOCK_LENGTH,
        };
        let key = MetaKey::new(self.user.as_str(), KeyType::BlockPos, vec![block.to_string()])
            .expect("key");
        self.send(keeper, key, position.encode()).await;
    }
}

/// How a provider answers challenges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyMode {
    /// Proof in the synchronous reply.
    Inline,
    /// Empty reply, proof sent back as a separate `Proof` message.
    Deferred,
    /// Never answers.
    Silent,
}

/// A storage provider holding tagged segments.
pub struct Provider {
    pub id: String,
    transport: MemoryTransport,
    keyset: Arc<KeySet>,
    segments: Mutex<HashMap<String, StoredSegment>>,
    mode: Mutex<ReplyMode>,
    repairs: Mutex<Vec<RepairOrder>>,
}

impl Provider {
    pub fn join(net: &MemoryNetwork, id: &str, keyset: Arc<KeySet>, mode: ReplyMode) -> Arc<Self> {
        let provider = Arc::new(Self {
            id: id.to_string(),
            transport: net.join(id),
            keyset,
            segments: Mutex::new(HashMap::new()),
            mode: Mutex::new(mode),
            repairs: Mutex::new(Vec::new()),
        });
        net.register_handler(id, Arc::clone(&provider) as Arc<dyn MetaHandler>);
        provider
    }

    pub fn store(&self, block: &BlockId) {
        self.segments.lock().extend(tagged_block(&self.keyset, block));
    }

    /// Lose every segment of `block`.
    pub fn drop_block(&self, block: &BlockId) {
        self.segments
            .lock()
            .retain(|index, _| !index.starts_with(&format!("{block}_")));
    }

    pub fn set_mode(&self, mode: ReplyMode) {
        *self.mode.lock() = mode;
    }

    pub fn repairs(&self) -> Vec<RepairOrder> {
        self.repairs.lock().clone()
    }

    /// The proof value this provider would send for a challenge.
    pub fn prove(&self, chal_time: i64, value: &str) -> Vec<u8> {
        let held = self.segments.lock().clone();
        ChallengeResponder::new(self.keyset.public.clone(), held)
            .respond_text(chal_time, value)
            .expect("respond")
            .into_bytes()
    }

    fn on_challenge(&self, key: &MetaKey, value: &[u8]) -> Result<Vec<u8>, TransportError> {
        let chal_time: i64 = key
            .option(2)
            .parse()
            .map_err(|e| TransportError::Deserialization(format!("chal_time: {e}")))?;
        let text = std::str::from_utf8(value)
            .map_err(|e| TransportError::Deserialization(e.to_string()))?;
        let mode = *self.mode.lock();
        match mode {
            ReplyMode::Silent => Ok(Vec::new()),
            ReplyMode::Inline => Ok(self.prove(chal_time, text)),
            ReplyMode::Deferred => {
                let proof = self.prove(chal_time, text);
                let proof_key = MetaKey::new(
                    key.main_id.clone(),
                    KeyType::Proof,
                    key.options.clone(),
                )?;
                let keeper = key.option(1).to_string();
                let transport = self.transport.clone();
                tokio::spawn(async move {
                    let _ = transport
                        .send_meta_request(MetaOp::Put, &proof_key.to_string(), &proof, &[], &keeper)
                        .await;
                });
                Ok(Vec::new())
            }
        }
    }

    fn on_repair(&self, value: &[u8]) -> Result<Vec<u8>, TransportError> {
        let order = RepairOrder::decode(value)?;
        self.store(&order.block);
        self.repairs.lock().push(order);
        RepairReceipt {
            offset: i64::from(SEGMENTS),
            length: BLOCK_LENGTH,
        }
        .encode()
    }
}

impl MetaHandler for Provider {
    fn handle_meta(&self, request: MetaRequest) -> HandlerFuture<'_> {
        Box::pin(async move {
            let key = MetaKey::parse(&request.key)?;
            match key.key_type {
                KeyType::Challenge => self.on_challenge(&key, &request.value),
                KeyType::Repair => self.on_repair(&request.value),
                other => Err(TransportError::Rejected(format!("{other} not served"))),
            }
        })
    }
}

/// Poll `done` until it holds or a few seconds have passed.
pub async fn eventually(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    done()
}
