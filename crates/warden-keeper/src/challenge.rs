//! Challenge rounds.
//!
//! ```text
//! tick ─▶ fail unanswered round ─▶ pick stalest blocks ─▶ begin_challenge
//!      ─▶ Challenge to provider ─▶ Proof back ─▶ verify ─▶ confirm / fail
//! ```
//!
//! A provider may answer in the synchronous reply to the challenge or later
//! with a separate `Proof` message; both paths end in
//! [`KeeperService::handle_proof`]. Only a reply for the pair's current
//! challenge time is looked at.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warden_ledger::{ChallengeRecord, LedgerError};
use warden_pdp::{elect_offset, gen_challenge, verify_proof, ProofValue, PublicKey};
use warden_settlement::SettlementClient;
use warden_transport::{KeyType, MetaKey, MetaOp, MetaTransport};
use warden_types::{BlockId, KeeperId, ProviderId, UnixTime, UserId};

use crate::service::KeeperService;
use crate::Result;

/// What became of a proof reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProofOutcome {
    /// The round is proven. Blocks reported faulty were left stale.
    Verified { refreshed: usize, faulty: usize },
    /// The round failed and the provider lost credit.
    Failed { reason: String },
    /// The reply is not for the current round and was discarded.
    Stale,
}

/// A challenge opened in the ledger and ready to be sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedChallenge {
    pub user: UserId,
    pub provider: ProviderId,
    pub chal_time: UnixTime,
    /// Encoded challenge value.
    pub value: String,
}

impl IssuedChallenge {
    /// `user/Challenge/provider/keeper/chal_time`
    pub fn key(&self, keeper: &KeeperId) -> Result<MetaKey> {
        Ok(MetaKey::new(
            self.user.as_str(),
            KeyType::Challenge,
            vec![
                self.provider.to_string(),
                keeper.to_string(),
                self.chal_time.to_string(),
            ],
        )?)
    }
}

impl<T: MetaTransport, S: SettlementClient> KeeperService<T, S> {
    /// Challenge every reachable provider, one task per pair.
    pub fn challenge_round(self: &Arc<Self>, now: UnixTime) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();
        for (key, _) in self.ledger.pairs() {
            if !self.is_online(&key.provider) {
                debug!(user = %key.user, provider = %key.provider, "provider offline, not challenged");
                continue;
            }
            let service = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                let issued = match service.issue_challenge(&key.user, &key.provider, now).await {
                    Ok(Some(issued)) => issued,
                    Ok(None) => return,
                    Err(e) => {
                        warn!(user = %key.user, provider = %key.provider, error = %e, "challenge not issued");
                        return;
                    }
                };
                if let Err(e) = service.deliver_challenge(&issued).await {
                    warn!(
                        user = %issued.user,
                        provider = %issued.provider,
                        chal_time = issued.chal_time,
                        error = %e,
                        "challenge not delivered"
                    );
                }
            }));
        }
        tasks
    }

    /// Open a round for one pair.
    ///
    /// A round still open from the previous tick is failed first. Returns
    /// `None` when the pair holds nothing to challenge.
    pub async fn issue_challenge(
        &self,
        user: &UserId,
        provider: &ProviderId,
        now: UnixTime,
    ) -> Result<Option<IssuedChallenge>> {
        let Some(handle) = self.ledger.get(user, provider) else {
            return Ok(None);
        };

        let unanswered = handle.lock().clean_last_challenge();
        if let Some(chal_time) = unanswered {
            let score = self.credits.penalize(provider);
            warn!(user = %user, provider = %provider, chal_time, score, "previous challenge unanswered");
        }

        let selected = handle
            .lock()
            .select_stalest(self.config.challenge.max_blocks_per_round);
        let chal_length: u64 = selected.iter().map(|(_, entry)| entry.length).sum();
        if selected.is_empty() || chal_length == 0 {
            return Ok(None);
        }

        let public_key = self.public_key(user).await?;

        let mut pair = handle.lock();
        let chal_time = pair.next_chal_time(now);
        let indices: Vec<String> = selected
            .iter()
            .map(|(block, entry)| {
                let offset = elect_offset(chal_time, entry.offset);
                block.segment_index(u32::try_from(offset).unwrap_or_default())
            })
            .collect();
        let chal = gen_challenge(chal_time, public_key.n(), indices)?;
        let value = chal.to_value().encode()?;

        let total_length = pair.total_length();
        let blocks: Vec<BlockId> = selected.into_iter().map(|(block, _)| block).collect();
        let count = blocks.len();
        pair.begin_challenge(ChallengeRecord {
            keeper: self.keeper_id.clone(),
            provider: provider.clone(),
            user: user.clone(),
            chal_time,
            chal_length,
            total_length,
            blocks,
            indices: chal.indices,
            success: None,
            proof: None,
        })?;
        drop(pair);

        info!(
            user = %user,
            provider = %provider,
            chal_time,
            blocks = count,
            chal_length,
            "challenge issued"
        );
        Ok(Some(IssuedChallenge {
            user: user.clone(),
            provider: provider.clone(),
            chal_time,
            value,
        }))
    }

    /// Send a challenge. A proof in the synchronous reply is handled at once.
    pub async fn deliver_challenge(&self, issued: &IssuedChallenge) -> Result<Option<ProofOutcome>> {
        let key = issued.key(&self.keeper_id)?;
        let reply = self
            .transport
            .send_meta_request(
                MetaOp::Put,
                &key.to_string(),
                issued.value.as_bytes(),
                &[],
                issued.provider.as_str(),
            )
            .await?;
        if reply.is_empty() {
            return Ok(None);
        }
        let outcome = self
            .handle_proof(
                &issued.user,
                &issued.provider,
                &self.keeper_id,
                issued.chal_time,
                &reply,
            )
            .await?;
        Ok(Some(outcome))
    }

    /// Check a proof reply against the pair's current round.
    ///
    /// Replies addressed to another keeper or to a superseded round are
    /// [`ProofOutcome::Stale`] and change nothing. A reply that does not
    /// decode or does not verify fails the round.
    pub async fn handle_proof(
        &self,
        user: &UserId,
        provider: &ProviderId,
        keeper: &KeeperId,
        chal_time: UnixTime,
        value: &[u8],
    ) -> Result<ProofOutcome> {
        if keeper != &self.keeper_id {
            debug!(user = %user, provider = %provider, keeper = %keeper, "proof for another keeper");
            return Ok(ProofOutcome::Stale);
        }
        let Some(handle) = self.ledger.get(user, provider) else {
            return Ok(ProofOutcome::Stale);
        };
        let pending = handle.lock().pending(chal_time).cloned();
        let Some(record) = pending else {
            debug!(user = %user, provider = %provider, chal_time, "stale proof discarded");
            return Ok(ProofOutcome::Stale);
        };

        let public_key = self.public_key(user).await?;

        match check_proof(&public_key, &record, value) {
            Ok(faulty) => {
                let text = String::from_utf8_lossy(value).into_owned();
                let confirmed = handle.lock().confirm_challenge(chal_time, &faulty, text);
                let refreshed = match confirmed {
                    Ok(refreshed) => refreshed,
                    Err(LedgerError::NoPendingChallenge(_)) => return Ok(ProofOutcome::Stale),
                    Err(e) => return Err(e.into()),
                };
                let score = self.credits.reward(provider);
                info!(
                    user = %user,
                    provider = %provider,
                    chal_time,
                    refreshed = refreshed.len(),
                    faulty = faulty.len(),
                    score,
                    "proof verified"
                );
                Ok(ProofOutcome::Verified {
                    refreshed: refreshed.len(),
                    faulty: faulty.len(),
                })
            }
            Err(reason) => {
                let failed = handle.lock().fail_challenge(chal_time);
                if failed.is_err() {
                    return Ok(ProofOutcome::Stale);
                }
                let score = self.credits.penalize(provider);
                warn!(user = %user, provider = %provider, chal_time, score, reason = %reason, "proof rejected");
                Ok(ProofOutcome::Failed { reason })
            }
        }
    }
}

/// Decode and verify a proof reply. Returns the blocks reported faulty.
fn check_proof(
    public_key: &PublicKey,
    record: &ChallengeRecord,
    value: &[u8],
) -> std::result::Result<Vec<BlockId>, String> {
    let text = std::str::from_utf8(value).map_err(|e| format!("proof is not text: {e}"))?;
    let decoded = ProofValue::decode(text).map_err(|e| e.to_string())?;

    let mut faulty = Vec::with_capacity(decoded.faults.len());
    for index in &decoded.faults {
        if !record.indices.contains(index) {
            return Err(format!("fault {index} was not challenged"));
        }
        let (block, _) = BlockId::parse_segment_index(index).map_err(|e| e.to_string())?;
        faulty.push(block);
    }

    let chal = gen_challenge(record.chal_time, public_key.n(), record.indices.clone())
        .map_err(|e| e.to_string())?
        .without(&decoded.faults);
    if chal.indices.is_empty() {
        return Err("every challenged segment reported faulty".to_string());
    }
    verify_proof(public_key, &chal, &decoded.proof).map_err(|e| e.to_string())?;
    Ok(faulty)
}
