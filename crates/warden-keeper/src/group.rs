//! Group membership, block bookkeeping and owner public keys.
//!
//! Keepers learn what to watch from three messages: `GroupInfo` lists the
//! keepers and providers serving a user, `BlockPos` announces where a block
//! was stored and `BlockDelete` retires it. Pair ledgers are created on
//! first mention, whichever message arrives first.

use std::sync::Arc;

use tracing::{debug, info};
use warden_pdp::PublicKey;
use warden_settlement::SettlementClient;
use warden_transport::messages::{BlockPosition, GroupInfo};
use warden_transport::{KeyType, MetaKey, MetaTransport, Scope};
use warden_types::{BlockId, ProviderId, UnixTime, UserId};

use crate::service::KeeperService;
use crate::Result;

impl<T: MetaTransport, S: SettlementClient> KeeperService<T, S> {
    /// Record the membership of `user`'s group.
    pub fn apply_group_info(&self, user: &UserId, info: GroupInfo) {
        for provider in &info.providers {
            self.ledger.pair(user, provider);
        }
        info!(
            user = %user,
            keepers = info.keepers.len(),
            providers = info.providers.len(),
            "group info updated"
        );
        self.groups.write().insert(user.clone(), info);
    }

    /// Track `block` at the announced position.
    ///
    /// A block announced on a new provider is dropped from its old one.
    /// Returns `true` if the block was not tracked on that provider before.
    pub fn apply_block_position(
        &self,
        user: &UserId,
        block: BlockId,
        position: BlockPosition,
        now: UnixTime,
    ) -> bool {
        if let Some(holder) = self.ledger.locate(user, &block) {
            if holder != position.provider {
                if let Some(old) = self.ledger.get(user, &holder) {
                    old.lock().remove_block(&block);
                }
                debug!(user = %user, block = %block, from = %holder, to = %position.provider, "block moved");
            }
        }
        let handle = self.ledger.pair(user, &position.provider);
        let added = handle
            .lock()
            .insert_block(block.clone(), position.offset, position.length, now);
        debug!(
            user = %user,
            provider = %position.provider,
            block = %block,
            length = position.length,
            added,
            "block position"
        );
        added
    }

    /// Stop tracking `block`. Returns the provider that held it.
    pub fn apply_block_delete(&self, user: &UserId, block: &BlockId) -> Option<ProviderId> {
        let holder = self.ledger.locate(user, block)?;
        let handle = self.ledger.get(user, &holder)?;
        handle.lock().remove_block(block)?;
        debug!(user = %user, provider = %holder, block = %block, "block deleted");
        Some(holder)
    }

    /// Apply a confirmation that the pair was paid up to `end`.
    ///
    /// On the keeper that paid this counts a co-signature. On the others it
    /// moves the checkpoint to `end`, dropping the challenge records it
    /// covers. Returns the signatures still outstanding, or `None` if `end`
    /// is already behind the checkpoint.
    pub fn apply_payment_confirm(
        &self,
        user: &UserId,
        provider: &ProviderId,
        end: UnixTime,
    ) -> Option<u32> {
        let handle = self.ledger.get(user, provider)?;
        let outstanding = handle.lock().confirm_payment(end);
        match outstanding {
            Some(left) => debug!(user = %user, provider = %provider, end, left, "payment confirmed"),
            None => debug!(user = %user, provider = %provider, end, "confirmation for a paid interval"),
        }
        outstanding
    }

    /// The owner's public key, fetched from the owner on first use.
    pub async fn public_key(&self, user: &UserId) -> Result<Arc<PublicKey>> {
        let cached = self.keys.read().get(user).cloned();
        if let Some(public_key) = cached {
            return Ok(public_key);
        }

        let key = MetaKey::new(user.as_str(), KeyType::PublicKey, Vec::new())?;
        let bytes = self
            .transport
            .get_key(&key.to_string(), Scope::Peer(user.to_string()))
            .await?;
        let public_key = Arc::new(PublicKey::from_bytes(&bytes)?);
        info!(user = %user, n = public_key.n(), "public key loaded");

        let mut keys = self.keys.write();
        let entry = keys.entry(user.clone()).or_insert(public_key);
        Ok(Arc::clone(entry))
    }
}
