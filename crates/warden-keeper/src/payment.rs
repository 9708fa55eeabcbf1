//! Space-time payments.
//!
//! The master keeper of a user's group pays every provider of that user for
//! the space-time proven since the last checkpoint. The checkpoint only moves
//! once the settlement contract accepted the payment; a payment that fails
//! after all retries is simply attempted again next round.
//!
//! After a payment the master sends `user/PaymentConfirm/provider/end` to the
//! other keepers of the group, which move their own checkpoints to `end` and
//! drop the records it covers.

use tracing::{debug, info, warn};
use warden_settlement::{plan_payment, PaymentPlan, SettlementClient, SpaceTimeOrder};
use warden_transport::{KeyType, MetaKey, MetaOp, MetaTransport};
use warden_types::{ProviderId, UnixTime, UserId};

use crate::service::KeeperService;
use crate::Result;

impl<T: MetaTransport, S: SettlementClient> KeeperService<T, S> {
    /// Pay every pair of every user this keeper is master for.
    ///
    /// Returns the payments accepted this round.
    pub async fn payment_round(&self) -> Vec<PaymentPlan> {
        let mut paid = Vec::new();
        for user in self.known_users() {
            if !self.is_master(&user) {
                continue;
            }
            let price = match self.settlement.upkeeping_info(&user).await {
                Ok(info) => info.price,
                Err(e) => {
                    warn!(user = %user, error = %e, "upkeeping info unavailable, payment deferred");
                    continue;
                }
            };
            let co_signers = self.co_signers(&user).await;
            for provider in self.known_providers(&user) {
                match self.pay_pair(&user, &provider, price, co_signers).await {
                    Ok(Some(plan)) => {
                        self.announce_payment(&user, &provider, plan.end).await;
                        paid.push(plan);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(user = %user, provider = %provider, error = %e, "payment deferred")
                    }
                }
            }
        }
        paid
    }

    /// Co-signatures a payment for `user` waits for: every other keeper the
    /// storage query was placed with, or the configured count when the
    /// contract does not say.
    async fn co_signers(&self, user: &UserId) -> u32 {
        match self.settlement.query_info(user).await {
            Ok(query) if query.keeper_count > 1 => query.keeper_count - 1,
            Ok(_) => self.config.payment.co_signers,
            Err(e) => {
                debug!(user = %user, error = %e, "query info unavailable");
                self.config.payment.co_signers
            }
        }
    }

    /// Pay one pair at `price` per MB-day.
    ///
    /// Returns `None` when nothing is owed yet.
    pub async fn pay_pair(
        &self,
        user: &UserId,
        provider: &ProviderId,
        price: u128,
        co_signers: u32,
    ) -> Result<Option<PaymentPlan>> {
        let Some(handle) = self.ledger.get(user, provider) else {
            return Ok(None);
        };
        let (samples, start) = {
            let pair = handle.lock();
            (pair.payment_samples(), pair.checkpoint().start)
        };
        let Some(plan) = plan_payment(&samples, start, price) else {
            debug!(user = %user, provider = %provider, samples = samples.len(), "nothing to pay");
            return Ok(None);
        };

        let order = SpaceTimeOrder {
            upkeeping: user.clone(),
            provider: provider.clone(),
            signer: self.keeper_id.clone(),
            interval_start: plan.start,
            interval_length: plan.length(),
            amount: plan.amount,
            merkle_root: plan.merkle_root,
            // Co-signatures are gathered by the contracts collaborator.
            shares: Vec::new(),
            signatures: Vec::new(),
        };
        self.settlement.space_time_pay(&order).await?;

        let dropped = handle
            .lock()
            .advance_checkpoint(plan.end, plan.amount, co_signers)?;
        info!(
            user = %user,
            provider = %provider,
            start = plan.start,
            end = plan.end,
            spacetime = %plan.spacetime,
            amount = %plan.amount,
            root = %hex::encode(plan.merkle_root),
            dropped,
            "space-time paid"
        );
        Ok(Some(plan))
    }

    /// Tell the other keepers of `user`'s group that the pair is paid up to `end`.
    async fn announce_payment(&self, user: &UserId, provider: &ProviderId, end: UnixTime) {
        let Some(group) = self.group(user) else {
            return;
        };
        let key = match MetaKey::new(
            user.as_str(),
            KeyType::PaymentConfirm,
            vec![provider.to_string(), end.to_string()],
        ) {
            Ok(key) => key.to_string(),
            Err(e) => {
                warn!(user = %user, provider = %provider, error = %e, "payment confirmation not built");
                return;
            }
        };
        for keeper in group.keepers.iter().filter(|k| **k != self.keeper_id) {
            if let Err(e) = self
                .transport
                .send_meta_request(MetaOp::Put, &key, &[], &[], keeper.as_str())
                .await
            {
                debug!(user = %user, keeper = %keeper, error = %e, "payment confirmation not delivered");
            }
        }
    }
}
