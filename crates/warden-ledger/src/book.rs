//! All pair ledgers of one keeper.
//!
//! The map itself sits behind a read-mostly lock; each pair has its own
//! mutex, so work on one pair never waits on another. Pair ledgers are
//! created on first touch, which tolerates block or proof messages arriving
//! before the group information that announces the pair.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use warden_types::{BlockId, ProviderId, UnixTime, UserId};

use crate::pair::PairLedger;
use crate::snapshot::PairSnapshot;
use crate::{LedgerError, Result};

/// Key of a pair ledger.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    pub user: UserId,
    pub provider: ProviderId,
}

impl PairKey {
    pub fn new(user: UserId, provider: ProviderId) -> Self {
        Self { user, provider }
    }
}

/// Shared handle to one pair ledger.
pub type PairHandle = Arc<Mutex<PairLedger>>;

/// Concurrent map of pair ledgers.
#[derive(Debug, Default)]
pub struct Ledger {
    pairs: RwLock<HashMap<PairKey, PairHandle>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pair ledger, created empty if missing.
    pub fn pair(&self, user: &UserId, provider: &ProviderId) -> PairHandle {
        let key = PairKey::new(user.clone(), provider.clone());
        if let Some(handle) = self.pairs.read().get(&key) {
            return handle.clone();
        }
        self.pairs
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(PairLedger::new(user.clone(), provider.clone()))))
            .clone()
    }

    pub fn get(&self, user: &UserId, provider: &ProviderId) -> Option<PairHandle> {
        self.pairs
            .read()
            .get(&PairKey::new(user.clone(), provider.clone()))
            .cloned()
    }

    /// Every pair, ordered by key.
    pub fn pairs(&self) -> Vec<(PairKey, PairHandle)> {
        let mut all: Vec<(PairKey, PairHandle)> = self
            .pairs
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.pairs.read().keys().map(|k| k.user.clone()).collect();
        users.sort();
        users.dedup();
        users
    }

    /// Providers of `user` holding at least one block.
    pub fn providers_of(&self, user: &UserId) -> Vec<ProviderId> {
        self.pairs()
            .into_iter()
            .filter(|(k, h)| &k.user == user && !h.lock().is_empty())
            .map(|(k, _)| k.provider)
            .collect()
    }

    /// The provider currently holding `block` for `user`.
    pub fn locate(&self, user: &UserId, block: &BlockId) -> Option<ProviderId> {
        self.pairs()
            .into_iter()
            .filter(|(k, _)| &k.user == user)
            .find(|(_, h)| h.lock().block(block).is_some())
            .map(|(k, _)| k.provider)
    }

    /// Other chunks of `block`'s stripe and where they are stored.
    pub fn siblings(&self, user: &UserId, block: &BlockId) -> Vec<(ProviderId, BlockId)> {
        let mut out = Vec::new();
        for (key, handle) in self.pairs() {
            if &key.user != user {
                continue;
            }
            let ledger = handle.lock();
            for (other, _) in ledger.blocks() {
                if other.is_sibling_of(block) {
                    out.push((key.provider.clone(), other.clone()));
                }
            }
        }
        out.sort_by(|a, b| a.1.cmp(&b.1));
        out
    }

    /// Move `block` to `to` after a repair confirmed at `now`.
    ///
    /// The entry keeps its identity but restarts its freshness: `avail_time`
    /// becomes `now` and the repair counter is cleared.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownBlock`] if `from` does not hold the block
    pub fn relocate(
        &self,
        user: &UserId,
        block: &BlockId,
        from: &ProviderId,
        to: &ProviderId,
        offset: i64,
        now: UnixTime,
    ) -> Result<()> {
        let unknown = || LedgerError::UnknownBlock(block.to_string());
        let source = self.get(user, from).ok_or_else(unknown)?;
        let mut entry = source.lock().remove_block(block).ok_or_else(unknown)?;
        entry.offset = offset;
        entry.avail_time = entry.avail_time.max(now);
        entry.repair_count = 0;
        entry.last_result = true;
        self.pair(user, to).lock().insert_entry(block.clone(), entry);
        Ok(())
    }

    /// Replace (or add) a pair from a snapshot.
    pub fn restore(&self, snapshot: PairSnapshot) {
        let key = PairKey::new(snapshot.user.clone(), snapshot.provider.clone());
        let ledger = snapshot.into_ledger();
        self.pairs.write().insert(key, Arc::new(Mutex::new(ledger)));
    }

    pub fn snapshots(&self) -> Vec<PairSnapshot> {
        let mut out = Vec::new();
        for (_, handle) in self.pairs() {
            let pair = handle.lock();
            out.push(PairSnapshot::from_ledger(&pair));
        }
        out
    }
}
