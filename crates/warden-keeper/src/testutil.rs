//! Fixtures shared by the keeper's unit tests.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use rand::rngs::StdRng;
use rand::SeedableRng;
use warden_pdp::{gen_tag, AtomMode, ChallengeResponder, KeySet, StoredSegment};
use warden_settlement::{MemorySettlement, RetryPolicy};
use warden_transport::{KeyType, MemoryNetwork, MemoryTransport, MetaKey, MetaTransport, Scope};
use warden_types::{BlockId, UserId, SEGMENT_SIZE};

use crate::challenge::IssuedChallenge;
use crate::config::KeeperConfig;
use crate::service::KeeperService;

pub type TestService = KeeperService<MemoryTransport, MemorySettlement>;

pub fn config(keeper: &str) -> KeeperConfig {
    let mut config = KeeperConfig::default();
    config.keeper.keeper_id = keeper.into();
    config.retry = RetryPolicy {
        max_attempts: 2,
        initial_delay_ms: 0,
        max_delay_ms: 0,
        backoff_multiplier: 1.0,
    };
    config
}

pub fn service_on(net: &MemoryNetwork, config: KeeperConfig) -> Arc<TestService> {
    let transport = net.join(config.keeper.keeper_id.clone());
    Arc::new(KeeperService::new(config, transport, MemorySettlement::new()).expect("service"))
}

pub fn service(keeper: &str) -> (Arc<TestService>, MemoryNetwork) {
    let net = MemoryNetwork::new();
    (service_on(&net, config(keeper)), net)
}

pub fn keyset() -> &'static KeySet {
    static KEYSET: OnceLock<KeySet> = OnceLock::new();
    KEYSET.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(7);
        KeySet::generate(256, AtomMode::Plain, &mut rng).expect("keyset")
    })
}

pub async fn publish_key(owner: &MemoryTransport, user: &UserId, keyset: &KeySet) {
    let key = MetaKey::new(user.as_str(), KeyType::PublicKey, Vec::new()).expect("key");
    let bytes = keyset.public.to_bytes().expect("encode");
    owner
        .put_key(&key.to_string(), &bytes, &[], Scope::Local)
        .await
        .expect("publish");
}

/// `segments` tagged segments of `block`.
pub fn tagged_block(keyset: &KeySet, block: &BlockId, segments: u32) -> HashMap<String, StoredSegment> {
    (0..segments)
        .map(|offset| {
            let index = block.segment_index(offset);
            let data: Vec<u8> = (0..SEGMENT_SIZE)
                .map(|i| (i as u32 ^ offset.wrapping_mul(31)) as u8)
                .collect();
            let tag = gen_tag(keyset, &data, &index).expect("tag");
            (index, StoredSegment { data, tag })
        })
        .collect()
}

/// The provider's proof value for an issued challenge.
pub fn answer(
    keyset: &KeySet,
    held: HashMap<String, StoredSegment>,
    issued: &IssuedChallenge,
) -> Vec<u8> {
    ChallengeResponder::new(keyset.public.clone(), held)
        .respond_text(issued.chal_time, &issued.value)
        .expect("respond")
        .into_bytes()
}
