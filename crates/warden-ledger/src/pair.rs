//! Ledger of one (user, provider) pair.
//!
//! Challenge state machine:
//!
//! ```text
//!            begin_challenge
//!   Idle ─────────────────────▶ Issued
//!    ▲                            │ confirm_challenge / fail_challenge
//!    │                            │ clean_last_challenge (no reply by next tick)
//!    └────────────────────────────┘
//! ```
//!
//! A reply is only accepted while the pair is `Issued` and its challenge time
//! equals `last_chal_time`, so the latest challenge always wins.
//!
//! Records live until a payment covering them is made or confirmed. Failed
//! rounds are never paid for, so only the newest [`MAX_FAILED_RECORDS`] of
//! them are kept, and no pair keeps more than [`MAX_RECORDS`] in total.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use warden_types::{BlockId, KeeperId, ProviderId, UnixTime, UserId};

use crate::repair::{RepairDecision, RepairPolicy};
use crate::{LedgerError, Result};

/// Failed rounds kept per pair, newest first.
pub const MAX_FAILED_RECORDS: usize = 32;

/// Records kept per pair. With ten-minute rounds this is about four weeks of
/// unpaid history; older rounds are dropped first.
pub const MAX_RECORDS: usize = 4096;

/// Freshness and repair state of one stored block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Number of segments in the block.
    pub offset: i64,
    /// Stored bytes.
    pub length: u64,
    /// Last time the block was proven available. Never moves backwards.
    pub avail_time: UnixTime,
    pub repair_count: u32,
    pub stored_on: ProviderId,
    /// Outcome of the last challenge covering this block.
    pub last_result: bool,
}

/// One issued challenge round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub keeper: KeeperId,
    pub provider: ProviderId,
    pub user: UserId,
    pub chal_time: UnixTime,
    /// Bytes covered by the challenged blocks.
    pub chal_length: u64,
    /// Bytes held by the provider; after a successful round, the bytes it proved.
    pub total_length: u64,
    pub blocks: Vec<BlockId>,
    /// Segment indices sent to the provider, parallel to `blocks`.
    pub indices: Vec<String>,
    /// `None` until the round is resolved.
    pub success: Option<bool>,
    pub proof: Option<String>,
}

/// Where space-time accounting for the pair stands.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCheckpoint {
    /// Start of the next unpaid interval, which is the end of the last paid one.
    pub start: UnixTime,
    /// Length of the last paid interval in seconds.
    pub length: i64,
    /// Amount of the last payment.
    pub value: u128,
    /// Co-signatures still outstanding on the last payment.
    pub status: u32,
}

/// Ledger of one (user, provider) pair.
#[derive(Clone, Debug)]
pub struct PairLedger {
    user: UserId,
    provider: ProviderId,
    blocks: HashMap<BlockId, LedgerEntry>,
    challenges: BTreeMap<UnixTime, ChallengeRecord>,
    in_challenge: bool,
    last_chal_time: UnixTime,
    checkpoint: PaymentCheckpoint,
    total_length: u64,
}

impl PairLedger {
    pub fn new(user: UserId, provider: ProviderId) -> Self {
        Self {
            user,
            provider,
            blocks: HashMap::new(),
            challenges: BTreeMap::new(),
            in_challenge: false,
            last_chal_time: 0,
            checkpoint: PaymentCheckpoint::default(),
            total_length: 0,
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    pub fn block(&self, block: &BlockId) -> Option<&LedgerEntry> {
        self.blocks.get(block)
    }

    pub fn blocks(&self) -> impl Iterator<Item = (&BlockId, &LedgerEntry)> {
        self.blocks.iter()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn in_challenge(&self) -> bool {
        self.in_challenge
    }

    pub fn last_chal_time(&self) -> UnixTime {
        self.last_chal_time
    }

    pub fn checkpoint(&self) -> &PaymentCheckpoint {
        &self.checkpoint
    }

    pub fn record(&self, chal_time: UnixTime) -> Option<&ChallengeRecord> {
        self.challenges.get(&chal_time)
    }

    pub fn records(&self) -> impl Iterator<Item = &ChallengeRecord> {
        self.challenges.values()
    }

    /// Track a block newly stored on this provider.
    ///
    /// A block already tracked keeps its freshness; only its size is updated.
    /// Returns `true` if the block was not tracked before.
    pub fn insert_block(&mut self, block: BlockId, offset: i64, length: u64, now: UnixTime) -> bool {
        match self.blocks.get_mut(&block) {
            Some(entry) => {
                self.total_length = self.total_length - entry.length + length;
                entry.offset = offset;
                entry.length = length;
                false
            }
            None => {
                self.total_length += length;
                self.blocks.insert(
                    block,
                    LedgerEntry {
                        offset,
                        length,
                        avail_time: now,
                        repair_count: 0,
                        stored_on: self.provider.clone(),
                        last_result: true,
                    },
                );
                true
            }
        }
    }

    /// Insert a complete entry, as restored from a snapshot or moved by repair.
    pub fn insert_entry(&mut self, block: BlockId, mut entry: LedgerEntry) {
        entry.stored_on = self.provider.clone();
        if let Some(old) = self.blocks.remove(&block) {
            self.total_length -= old.length;
        }
        self.total_length += entry.length;
        self.blocks.insert(block, entry);
    }

    pub fn remove_block(&mut self, block: &BlockId) -> Option<LedgerEntry> {
        let entry = self.blocks.remove(block)?;
        self.total_length -= entry.length;
        Some(entry)
    }

    /// Up to `max` blocks, least recently proven first.
    pub fn select_stalest(&self, max: usize) -> Vec<(BlockId, LedgerEntry)> {
        let mut all: Vec<(&BlockId, &LedgerEntry)> = self.blocks.iter().collect();
        all.sort_by(|a, b| a.1.avail_time.cmp(&b.1.avail_time).then_with(|| a.0.cmp(b.0)));
        all.into_iter()
            .take(max)
            .map(|(b, e)| (b.clone(), e.clone()))
            .collect()
    }

    /// The challenge time to use for a round issued at `now`.
    ///
    /// Strictly later than every earlier round, even with a stalled clock.
    pub fn next_chal_time(&self, now: UnixTime) -> UnixTime {
        now.max(self.last_chal_time + 1)
    }

    /// Open a new round.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ChallengeTimeRegression`] unless the record is later
    ///   than the last round
    pub fn begin_challenge(&mut self, record: ChallengeRecord) -> Result<()> {
        if record.chal_time <= self.last_chal_time {
            return Err(LedgerError::ChallengeTimeRegression {
                last: self.last_chal_time,
                requested: record.chal_time,
            });
        }
        self.in_challenge = true;
        self.last_chal_time = record.chal_time;
        self.challenges.insert(record.chal_time, record);
        self.prune_records();
        Ok(())
    }

    /// Whether a reply for `chal_time` would still be accepted.
    pub fn is_current(&self, chal_time: UnixTime) -> bool {
        self.in_challenge && self.last_chal_time == chal_time
    }

    /// The open round for `chal_time`, if it is still the current one.
    pub fn pending(&self, chal_time: UnixTime) -> Option<&ChallengeRecord> {
        if self.is_current(chal_time) {
            self.challenges.get(&chal_time)
        } else {
            None
        }
    }

    /// Give up on an unanswered round. Returns its challenge time.
    pub fn clean_last_challenge(&mut self) -> Option<UnixTime> {
        if !self.in_challenge {
            return None;
        }
        self.in_challenge = false;
        let chal_time = self.last_chal_time;
        if let Some(record) = self.challenges.get_mut(&chal_time) {
            record.success = Some(false);
        }
        for block in self.round_blocks(chal_time) {
            if let Some(entry) = self.blocks.get_mut(&block) {
                entry.last_result = false;
            }
        }
        self.prune_records();
        Some(chal_time)
    }

    fn prune_records(&mut self) {
        let failed: Vec<UnixTime> = self
            .challenges
            .iter()
            .filter(|(_, r)| r.success == Some(false))
            .map(|(t, _)| *t)
            .collect();
        let excess = failed.len().saturating_sub(MAX_FAILED_RECORDS);
        for t in &failed[..excess] {
            self.challenges.remove(t);
        }
        while self.challenges.len() > MAX_RECORDS {
            self.challenges.pop_first();
        }
    }

    /// Close the current round as proven.
    ///
    /// Every challenged block outside `faulty` is refreshed to `chal_time` and
    /// its repair counter reset. Returns the refreshed blocks.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NoPendingChallenge`] if `chal_time` is not the current round
    pub fn confirm_challenge(
        &mut self,
        chal_time: UnixTime,
        faulty: &[BlockId],
        proof: String,
    ) -> Result<Vec<BlockId>> {
        if !self.is_current(chal_time) {
            return Err(LedgerError::NoPendingChallenge(chal_time));
        }
        self.in_challenge = false;

        let mut refreshed = Vec::new();
        for block in self.round_blocks(chal_time) {
            let Some(entry) = self.blocks.get_mut(&block) else {
                continue;
            };
            if faulty.contains(&block) {
                entry.last_result = false;
                continue;
            }
            entry.avail_time = entry.avail_time.max(chal_time);
            entry.repair_count = 0;
            entry.last_result = true;
            refreshed.push(block);
        }

        let faulty_length: u64 = faulty
            .iter()
            .filter_map(|b| self.blocks.get(b))
            .map(|e| e.length)
            .sum();
        let confirmed = self.total_length.saturating_sub(faulty_length);
        if let Some(record) = self.challenges.get_mut(&chal_time) {
            record.success = Some(true);
            record.total_length = confirmed;
            record.proof = Some(proof);
        }
        Ok(refreshed)
    }

    /// Close the current round as failed. Block freshness is left alone.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NoPendingChallenge`] if `chal_time` is not the current round
    pub fn fail_challenge(&mut self, chal_time: UnixTime) -> Result<()> {
        if !self.is_current(chal_time) {
            return Err(LedgerError::NoPendingChallenge(chal_time));
        }
        self.clean_last_challenge();
        Ok(())
    }

    fn round_blocks(&self, chal_time: UnixTime) -> Vec<BlockId> {
        self.challenges
            .get(&chal_time)
            .map(|r| r.blocks.clone())
            .unwrap_or_default()
    }

    /// Blocks whose repair is due or which are past saving.
    pub fn repair_candidates(
        &self,
        policy: &RepairPolicy,
        now: UnixTime,
    ) -> Vec<(BlockId, RepairDecision)> {
        let mut out: Vec<(BlockId, RepairDecision)> = self
            .blocks
            .iter()
            .map(|(block, entry)| {
                (
                    block.clone(),
                    policy.decide(entry.repair_count, now - entry.avail_time),
                )
            })
            .filter(|(_, decision)| *decision != RepairDecision::Wait)
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Count a repair request that made it onto the work queue.
    pub fn note_repair_enqueued(&mut self, block: &BlockId) -> Result<u32> {
        let entry = self
            .blocks
            .get_mut(block)
            .ok_or_else(|| LedgerError::UnknownBlock(block.to_string()))?;
        entry.repair_count += 1;
        Ok(entry.repair_count)
    }

    /// `(chal_time, confirmed length)` of every successful round not yet paid for.
    pub fn payment_samples(&self) -> Vec<(UnixTime, u64)> {
        self.challenges
            .range(self.checkpoint.start..)
            .filter(|(_, r)| r.success == Some(true))
            .map(|(t, r)| (*t, r.total_length))
            .collect()
    }

    /// Move the checkpoint to `end` once a payment up to `end` was accepted.
    ///
    /// Records before `end` are dropped; the record at `end` is kept as the
    /// first sample of the next interval. Returns the number of dropped records.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::CheckpointRegression`] unless `end` is past the current start
    pub fn advance_checkpoint(&mut self, end: UnixTime, value: u128, status: u32) -> Result<usize> {
        if end <= self.checkpoint.start {
            return Err(LedgerError::CheckpointRegression {
                current: self.checkpoint.start,
                requested: end,
            });
        }
        self.checkpoint = PaymentCheckpoint {
            start: end,
            length: end - self.checkpoint.start,
            value,
            status,
        };

        let keep = self.challenges.split_off(&end);
        let dropped = self.challenges.len();
        self.challenges = keep;
        Ok(dropped)
    }

    /// Apply a confirmation that the interval ending at `end` was paid.
    ///
    /// For the payment this ledger already recorded, one outstanding
    /// co-signature is cleared. A later `end` means another keeper paid: the
    /// checkpoint moves there and the covered records are dropped. Returns the
    /// signatures still outstanding, or `None` for an interval already behind
    /// the checkpoint.
    pub fn confirm_payment(&mut self, end: UnixTime) -> Option<u32> {
        if end > self.checkpoint.start {
            self.advance_checkpoint(end, 0, 0).ok()?;
            return Some(0);
        }
        if end != self.checkpoint.start || self.checkpoint.length == 0 {
            return None;
        }
        self.checkpoint.status = self.checkpoint.status.saturating_sub(1);
        Some(self.checkpoint.status)
    }

    /// Put back a resolved round, as restored from a snapshot.
    ///
    /// Open rounds and rounds already behind the checkpoint are ignored.
    pub fn restore_record(&mut self, record: ChallengeRecord) -> bool {
        if record.success.is_none() || record.chal_time < self.checkpoint.start {
            return false;
        }
        self.challenges.insert(record.chal_time, record);
        self.prune_records();
        true
    }

    /// Overwrite the pair's scalar state, as restored from a snapshot.
    pub fn restore_state(&mut self, last_chal_time: UnixTime, checkpoint: PaymentCheckpoint) {
        self.last_chal_time = self.last_chal_time.max(last_chal_time);
        self.checkpoint = checkpoint;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (UserId, ProviderId, KeeperId) {
        (
            UserId::new("u1").expect("id"),
            ProviderId::new("p1").expect("id"),
            KeeperId::new("k1").expect("id"),
        )
    }

    fn block(name: &str) -> BlockId {
        BlockId::new(name).expect("block")
    }

    fn ledger_with(blocks: &[(&str, UnixTime)]) -> PairLedger {
        let (user, provider, _) = ids();
        let mut ledger = PairLedger::new(user, provider);
        for (name, t) in blocks {
            ledger.insert_block(block(name), 4, 16_384, *t);
        }
        ledger
    }

    fn record(ledger: &PairLedger, chal_time: UnixTime, blocks: Vec<BlockId>) -> ChallengeRecord {
        let (_, _, keeper) = ids();
        ChallengeRecord {
            keeper,
            provider: ledger.provider().clone(),
            user: ledger.user().clone(),
            chal_time,
            chal_length: 0,
            total_length: ledger.total_length(),
            indices: blocks.iter().map(|b| b.segment_index(0)).collect(),
            blocks,
            success: None,
            proof: None,
        }
    }

    #[test]
    fn test_insert_tracks_length() {
        let mut ledger = ledger_with(&[("b_0_0", 10), ("b_0_1", 10)]);
        assert_eq!(ledger.total_length(), 32_768);
        assert!(!ledger.insert_block(block("b_0_0"), 2, 8_192, 99));
        assert_eq!(ledger.total_length(), 24_576);
        assert_eq!(ledger.block(&block("b_0_0")).expect("entry").avail_time, 10);
        ledger.remove_block(&block("b_0_1"));
        assert_eq!(ledger.total_length(), 8_192);
    }

    #[test]
    fn test_select_stalest_first() {
        let ledger = ledger_with(&[("b_0_0", 30), ("b_0_1", 10), ("b_0_2", 20)]);
        let picked: Vec<BlockId> = ledger.select_stalest(2).into_iter().map(|(b, _)| b).collect();
        assert_eq!(picked, vec![block("b_0_1"), block("b_0_2")]);
    }

    #[test]
    fn test_chal_time_strictly_increases() {
        let mut ledger = ledger_with(&[("b_0_0", 0)]);
        let t = ledger.next_chal_time(100);
        ledger
            .begin_challenge(record(&ledger, t, vec![block("b_0_0")]))
            .expect("begin");
        assert_eq!(ledger.next_chal_time(100), 101);
        assert_eq!(ledger.next_chal_time(50), 101);
        assert!(ledger
            .begin_challenge(record(&ledger, 100, vec![]))
            .is_err());
    }

    #[test]
    fn test_confirm_refreshes_non_faulty() {
        let mut ledger = ledger_with(&[("b_0_0", 0), ("b_0_1", 0)]);
        ledger.note_repair_enqueued(&block("b_0_0")).expect("known");
        let blocks = vec![block("b_0_0"), block("b_0_1")];
        ledger
            .begin_challenge(record(&ledger, 500, blocks))
            .expect("begin");

        let refreshed = ledger
            .confirm_challenge(500, &[block("b_0_1")], "proof".into())
            .expect("confirm");
        assert_eq!(refreshed, vec![block("b_0_0")]);

        let good = ledger.block(&block("b_0_0")).expect("entry");
        assert_eq!(good.avail_time, 500);
        assert_eq!(good.repair_count, 0);
        let bad = ledger.block(&block("b_0_1")).expect("entry");
        assert_eq!(bad.avail_time, 0);
        assert!(!bad.last_result);

        let rec = ledger.record(500).expect("record");
        assert_eq!(rec.success, Some(true));
        assert_eq!(rec.total_length, 16_384);
        assert!(!ledger.in_challenge());
    }

    #[test]
    fn test_stale_reply_rejected() {
        let mut ledger = ledger_with(&[("b_0_0", 0)]);
        ledger
            .begin_challenge(record(&ledger, 100, vec![block("b_0_0")]))
            .expect("begin");
        ledger.clean_last_challenge();
        ledger
            .begin_challenge(record(&ledger, 200, vec![block("b_0_0")]))
            .expect("begin");

        assert!(ledger.pending(100).is_none());
        assert!(matches!(
            ledger.confirm_challenge(100, &[], String::new()),
            Err(LedgerError::NoPendingChallenge(100))
        ));
        assert_eq!(ledger.block(&block("b_0_0")).expect("entry").avail_time, 0);
        assert_eq!(ledger.record(100).expect("record").success, Some(false));
        assert!(ledger.is_current(200));
    }

    #[test]
    fn test_fail_leaves_avail_time() {
        let mut ledger = ledger_with(&[("b_0_0", 7)]);
        ledger
            .begin_challenge(record(&ledger, 100, vec![block("b_0_0")]))
            .expect("begin");
        ledger.fail_challenge(100).expect("fail");
        assert!(!ledger.in_challenge());
        assert_eq!(ledger.block(&block("b_0_0")).expect("entry").avail_time, 7);
        assert!(ledger.fail_challenge(100).is_err());
    }

    #[test]
    fn test_repair_candidates_and_counter() {
        let policy = RepairPolicy::default();
        let mut ledger = ledger_with(&[("b_0_0", 0), ("b_0_1", 10_000)]);
        let now = policy.expire_secs + 1;
        let due = ledger.repair_candidates(&policy, now);
        assert_eq!(due, vec![(block("b_0_0"), RepairDecision::Due)]);

        assert_eq!(ledger.note_repair_enqueued(&block("b_0_0")).expect("known"), 1);
        assert!(ledger.repair_candidates(&policy, now).is_empty());
        assert!(ledger.note_repair_enqueued(&block("x_0_0")).is_err());
    }

    #[test]
    fn test_payment_samples_and_checkpoint() {
        let mut ledger = ledger_with(&[("b_0_0", 0)]);
        for t in [100, 200, 300] {
            ledger
                .begin_challenge(record(&ledger, t, vec![block("b_0_0")]))
                .expect("begin");
            ledger
                .confirm_challenge(t, &[], String::new())
                .expect("confirm");
        }
        assert_eq!(ledger.payment_samples().len(), 3);

        let dropped = ledger.advance_checkpoint(300, 42, 2).expect("advance");
        assert_eq!(dropped, 2);
        assert_eq!(ledger.payment_samples(), vec![(300, 16_384)]);
        assert_eq!(ledger.checkpoint().length, 300);
        assert!(ledger.advance_checkpoint(300, 1, 0).is_err());

        assert_eq!(ledger.confirm_payment(100), None);
        assert_eq!(ledger.confirm_payment(300), Some(1));
        assert_eq!(ledger.confirm_payment(300), Some(0));
        assert_eq!(ledger.confirm_payment(300), Some(0));
    }

    fn run_rounds(ledger: &mut PairLedger, times: impl Iterator<Item = UnixTime>, proven: bool) {
        for t in times {
            let round = record(ledger, t, vec![block("b_0_0")]);
            ledger.begin_challenge(round).expect("begin");
            if proven {
                ledger.confirm_challenge(t, &[], String::new()).expect("confirm");
            } else {
                ledger.fail_challenge(t).expect("fail");
            }
        }
    }

    #[test]
    fn test_confirmation_from_paying_keeper_prunes() {
        let mut ledger = ledger_with(&[("b_0_0", 0)]);
        run_rounds(&mut ledger, 1..=5000, true);
        assert!(ledger.records().count() <= MAX_RECORDS);

        assert_eq!(ledger.confirm_payment(4000), Some(0));
        assert_eq!(ledger.checkpoint().start, 4000);
        assert_eq!(ledger.records().count(), 1001);
        assert_eq!(ledger.payment_samples().first(), Some(&(4000, 16_384)));
        assert_eq!(ledger.confirm_payment(3000), None);
    }

    #[test]
    fn test_failed_rounds_bounded() {
        let mut ledger = ledger_with(&[("b_0_0", 0)]);
        run_rounds(&mut ledger, 1..=5000, false);
        assert_eq!(ledger.records().count(), MAX_FAILED_RECORDS);
        assert!(ledger.record(5000).is_some());
        assert!(ledger.record(1).is_none());

        // Unanswered rounds count as failed too.
        for t in 5001..=5100 {
            ledger.clean_last_challenge();
            ledger
                .begin_challenge(record(&ledger, t, vec![block("b_0_0")]))
                .expect("begin");
        }
        assert_eq!(ledger.records().count(), MAX_FAILED_RECORDS + 1);

        // Proven rounds are never displaced by failures.
        let mut mixed = ledger_with(&[("b_0_0", 0)]);
        run_rounds(&mut mixed, 1..=10, true);
        run_rounds(&mut mixed, 11..=500, false);
        assert_eq!(mixed.payment_samples().len(), 10);
    }
}
