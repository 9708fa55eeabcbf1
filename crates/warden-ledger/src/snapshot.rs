//! Persisted pair ledgers.
//!
//! A snapshot keeps what cannot be re-derived cheaply after a restart: block
//! freshness, repair counters, the last challenge time, the payment
//! checkpoint and the proven rounds not yet paid for. Failed and open rounds
//! are not kept; a round in flight at shutdown is simply reissued.

use serde::{Deserialize, Serialize};
use warden_types::{BlockId, ProviderId, UnixTime, UserId};

use crate::pair::{ChallengeRecord, LedgerEntry, PairLedger, PaymentCheckpoint};
use crate::{LedgerError, Result};

/// One block of a [`PairSnapshot`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub block: BlockId,
    pub res: bool,
    pub repair: u32,
    pub offset: i64,
    pub length: u64,
    pub avail_time: UnixTime,
}

/// Serialized form of a [`PairLedger`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairSnapshot {
    pub user: UserId,
    pub provider: ProviderId,
    pub length: u64,
    pub last_chal_time: UnixTime,
    pub checkpoint: PaymentCheckpoint,
    pub blocks: Vec<BlockSnapshot>,
    /// Proven rounds at or after the checkpoint, oldest first.
    #[serde(default)]
    pub unpaid: Vec<ChallengeRecord>,
}

impl PairSnapshot {
    pub fn from_ledger(ledger: &PairLedger) -> Self {
        let mut blocks: Vec<BlockSnapshot> = ledger
            .blocks()
            .map(|(block, entry)| BlockSnapshot {
                block: block.clone(),
                res: entry.last_result,
                repair: entry.repair_count,
                offset: entry.offset,
                length: entry.length,
                avail_time: entry.avail_time,
            })
            .collect();
        blocks.sort_by(|a, b| a.block.cmp(&b.block));
        let start = ledger.checkpoint().start;
        let unpaid = ledger
            .records()
            .filter(|r| r.success == Some(true) && r.chal_time >= start)
            .cloned()
            .collect();
        Self {
            user: ledger.user().clone(),
            provider: ledger.provider().clone(),
            length: ledger.total_length(),
            last_chal_time: ledger.last_chal_time(),
            checkpoint: ledger.checkpoint().clone(),
            blocks,
            unpaid,
        }
    }

    pub fn into_ledger(self) -> PairLedger {
        let mut ledger = PairLedger::new(self.user, self.provider.clone());
        for b in self.blocks {
            ledger.insert_entry(
                b.block,
                LedgerEntry {
                    offset: b.offset,
                    length: b.length,
                    avail_time: b.avail_time,
                    repair_count: b.repair,
                    stored_on: self.provider.clone(),
                    last_result: b.res,
                },
            );
        }
        ledger.restore_state(self.last_chal_time, self.checkpoint);
        for record in self.unpaid {
            ledger.restore_record(record);
        }
        ledger
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| LedgerError::Snapshot(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| LedgerError::Snapshot(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_restores_ledger() {
        let mut ledger = PairLedger::new(
            UserId::new("u1").expect("id"),
            ProviderId::new("p1").expect("id"),
        );
        let b0 = BlockId::new("b_0_0").expect("id");
        let b1 = BlockId::new("b_0_1").expect("id");
        ledger.insert_block(b0.clone(), 4, 16_384, 100);
        ledger.insert_block(b1.clone(), 1, 4_096, 200);
        ledger.note_repair_enqueued(&b1).expect("known");
        ledger.restore_state(
            777,
            PaymentCheckpoint {
                start: 500,
                length: 500,
                value: 12_345_678_901_234_567_890,
                status: 1,
            },
        );

        let bytes = PairSnapshot::from_ledger(&ledger).to_json().expect("encode");
        let restored = PairSnapshot::from_json(&bytes).expect("decode").into_ledger();

        assert_eq!(restored.total_length(), 20_480);
        assert_eq!(restored.last_chal_time(), 777);
        assert_eq!(restored.checkpoint().value, 12_345_678_901_234_567_890);
        assert_eq!(restored.block(&b0), ledger.block(&b0));
        assert_eq!(restored.block(&b1).expect("entry").repair_count, 1);
        assert!(!restored.in_challenge());
    }

    #[test]
    fn test_unpaid_rounds_survive_restart() {
        let user = UserId::new("u1").expect("id");
        let provider = ProviderId::new("p1").expect("id");
        let block = BlockId::new("b_0_0").expect("id");
        let mut ledger = PairLedger::new(user.clone(), provider.clone());
        ledger.insert_block(block.clone(), 4, 16_384, 0);
        for (t, proven) in [(100, true), (200, true), (300, false), (400, true), (500, true)] {
            ledger
                .begin_challenge(ChallengeRecord {
                    keeper: warden_types::KeeperId::new("k1").expect("id"),
                    provider: provider.clone(),
                    user: user.clone(),
                    chal_time: t,
                    chal_length: 16_384,
                    total_length: 16_384,
                    blocks: vec![block.clone()],
                    indices: vec![block.segment_index(0)],
                    success: None,
                    proof: None,
                })
                .expect("begin");
            if proven {
                ledger.confirm_challenge(t, &[], "proof".into()).expect("confirm");
            } else {
                ledger.fail_challenge(t).expect("fail");
            }
        }
        ledger.advance_checkpoint(200, 7, 0).expect("advance");
        ledger
            .begin_challenge(ChallengeRecord {
                keeper: warden_types::KeeperId::new("k1").expect("id"),
                provider: provider.clone(),
                user,
                chal_time: 600,
                chal_length: 0,
                total_length: 16_384,
                blocks: vec![block],
                indices: Vec::new(),
                success: None,
                proof: None,
            })
            .expect("begin");

        let bytes = PairSnapshot::from_ledger(&ledger).to_json().expect("encode");
        let restored = PairSnapshot::from_json(&bytes).expect("decode").into_ledger();
        assert_eq!(
            restored.payment_samples(),
            vec![(200, 16_384), (400, 16_384), (500, 16_384)]
        );
        assert!(restored.record(300).is_none());
        assert!(restored.record(600).is_none());
        assert!(!restored.in_challenge());
        assert_eq!(restored.last_chal_time(), 600);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            PairSnapshot::from_json(b"{not json"),
            Err(LedgerError::Snapshot(_))
        ));
    }
}
