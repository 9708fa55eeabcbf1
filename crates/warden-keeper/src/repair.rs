//! Repair scheduling.
//!
//! Each repair tick walks the pairs of users this keeper is master for and
//! queues every block whose escalation threshold has passed. Workers drain
//! the queue: they check the block is still stale, pick a target provider
//! that holds no chunk of the same stripe, ask it to rebuild the block from
//! the siblings and move the ledger entry over once it confirms.
//!
//! A failed attempt is not retried here; the next threshold will queue the
//! block again.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warden_ledger::RepairDecision;
use warden_settlement::SettlementClient;
use warden_transport::messages::{RepairOrder, RepairReceipt, SiblingLocation};
use warden_transport::{KeyType, MetaKey, MetaOp, MetaTransport};
use warden_types::{unix_now, BlockId, ProviderId, UnixTime, UserId};

use crate::service::KeeperService;
use crate::Result;

/// A block queued for repair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepairTask {
    pub user: UserId,
    /// The provider the block was on when it was queued.
    pub provider: ProviderId,
    pub block: BlockId,
}

/// Result of one repair attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RepairOutcome {
    /// The block now lives on `to`.
    Repaired { to: ProviderId },
    /// The block was proven, moved or deleted since it was queued.
    NotNeeded,
    /// No provider qualifies as a target.
    NoTarget,
}

impl<T: MetaTransport, S: SettlementClient> KeeperService<T, S> {
    /// Queue every block that is due for repair. Returns the number queued.
    pub fn repair_round(&self, now: UnixTime) -> usize {
        let policy = &self.config.repair.policy;
        let mut queued = 0;
        for (key, handle) in self.ledger.pairs() {
            if !self.is_master(&key.user) {
                continue;
            }
            let candidates = handle.lock().repair_candidates(policy, now);
            for (block, decision) in candidates {
                if decision == RepairDecision::Lost {
                    debug!(user = %key.user, provider = %key.provider, block = %block, "block lost");
                    continue;
                }
                let task = RepairTask {
                    user: key.user.clone(),
                    provider: key.provider.clone(),
                    block: block.clone(),
                };
                match self.repair_tx.try_send(task) {
                    Ok(()) => {
                        let count = handle.lock().note_repair_enqueued(&block);
                        debug!(
                            user = %key.user,
                            provider = %key.provider,
                            block = %block,
                            count = ?count.ok(),
                            "repair queued"
                        );
                        queued += 1;
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(queued, "repair queue full, deferring the rest");
                        return queued;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        warn!("repair queue closed");
                        return queued;
                    }
                }
            }
        }
        if queued > 0 {
            info!(queued, "repair round");
        }
        queued
    }

    /// Start the repair workers. They share one queue and stop on shutdown.
    pub fn spawn_repair_workers(
        self: &Arc<Self>,
        shutdown: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        let receiver = self.repair_rx.lock().take();
        let Some(receiver) = receiver else {
            warn!("repair workers already running");
            return Vec::new();
        };
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        (0..self.config.repair.workers.max(1))
            .map(|worker| {
                let service = Arc::clone(self);
                let receiver = Arc::clone(&receiver);
                let mut shutdown = shutdown.subscribe();
                tokio::spawn(async move {
                    loop {
                        let task = tokio::select! {
                            task = async { receiver.lock().await.recv().await } => task,
                            _ = shutdown.recv() => break,
                        };
                        let Some(task) = task else { break };
                        match service.repair_block(&task, unix_now()).await {
                            Ok(outcome) => debug!(worker, block = %task.block, ?outcome, "repair done"),
                            Err(e) => warn!(worker, block = %task.block, error = %e, "repair failed"),
                        }
                    }
                    debug!(worker, "repair worker stopped");
                })
            })
            .collect()
    }

    /// Carry out one queued repair.
    pub async fn repair_block(&self, task: &RepairTask, now: UnixTime) -> Result<RepairOutcome> {
        let entry = match self.ledger.get(&task.user, &task.provider) {
            Some(handle) => {
                let pair = handle.lock();
                pair.block(&task.block).cloned()
            }
            None => None,
        };
        let Some(entry) = entry else {
            return Ok(RepairOutcome::NotNeeded);
        };
        let policy = &self.config.repair.policy;
        if policy.decide(0, now - entry.avail_time) != RepairDecision::Due {
            return Ok(RepairOutcome::NotNeeded);
        }

        let siblings = self.ledger.siblings(&task.user, &task.block);
        let Some(target) = self.pick_repair_target(task, &siblings) else {
            warn!(user = %task.user, block = %task.block, "no repair target");
            return Ok(RepairOutcome::NoTarget);
        };

        let order = RepairOrder {
            block: task.block.clone(),
            siblings: siblings
                .into_iter()
                .map(|(provider, block)| SiblingLocation { provider, block })
                .collect(),
        };
        let key = MetaKey::new(
            task.user.as_str(),
            KeyType::Repair,
            vec![task.block.to_string(), target.to_string()],
        )?;
        let reply = self
            .transport
            .send_meta_request(MetaOp::Put, &key.to_string(), &order.encode()?, &[], target.as_str())
            .await?;
        let receipt = RepairReceipt::decode(&reply)?;

        self.ledger.relocate(
            &task.user,
            &task.block,
            &task.provider,
            &target,
            receipt.offset,
            now,
        )?;
        self.ledger
            .pair(&task.user, &target)
            .lock()
            .insert_block(task.block.clone(), receipt.offset, receipt.length, now);
        info!(
            user = %task.user,
            block = %task.block,
            from = %task.provider,
            to = %target,
            "block repaired"
        );
        Ok(RepairOutcome::Repaired { to: target })
    }

    /// The reachable, credit-eligible provider with the best score that holds
    /// neither the block nor any of its siblings.
    fn pick_repair_target(
        &self,
        task: &RepairTask,
        siblings: &[(ProviderId, BlockId)],
    ) -> Option<ProviderId> {
        let mut candidates: Vec<ProviderId> = self
            .known_providers(&task.user)
            .into_iter()
            .filter(|p| p != &task.provider)
            .filter(|p| !siblings.iter().any(|(holder, _)| holder == p))
            .filter(|p| self.credits.is_eligible(p) && self.is_online(p))
            .collect();
        candidates.sort_by(|a, b| {
            self.credits
                .score(b)
                .cmp(&self.credits.score(a))
                .then_with(|| a.cmp(b))
        });
        candidates.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use warden_transport::messages::{BlockPosition, GroupInfo};
    use warden_transport::{HandlerFuture, MetaHandler, MetaRequest};
    use warden_types::KeeperId;

    const E: i64 = 1800;
    const NOW: UnixTime = 1_700_000_000;

    struct Rebuilder;

    impl MetaHandler for Rebuilder {
        fn handle_meta(&self, request: MetaRequest) -> HandlerFuture<'_> {
            Box::pin(async move {
                let order = RepairOrder::decode(&request.value)?;
                assert_eq!(order.block.stripe(), "s_1");
                RepairReceipt {
                    offset: 3,
                    length: 12_288,
                }
                .encode()
            })
        }
    }

    fn user() -> UserId {
        UserId::new("u1").expect("id")
    }

    fn provider(name: &str) -> ProviderId {
        ProviderId::new(name).expect("id")
    }

    fn block(name: &str) -> BlockId {
        BlockId::new(name).expect("id")
    }

    fn setup(
        keeper: &str,
    ) -> (Arc<testutil::TestService>, warden_transport::MemoryNetwork) {
        let (svc, net) = testutil::service(keeper);
        svc.apply_group_info(
            &user(),
            GroupInfo {
                keepers: vec![KeeperId::new("k1").expect("id")],
                providers: vec![provider("p1"), provider("p2"), provider("p3")],
            },
        );
        for (name, holder) in [("s_1_0", "p1"), ("s_1_1", "p2")] {
            svc.apply_block_position(
                &user(),
                block(name),
                BlockPosition {
                    provider: provider(holder),
                    offset: 2,
                    length: 8192,
                },
                NOW,
            );
        }
        (svc, net)
    }

    #[test]
    fn test_thresholds_queue_once_each() {
        let (svc, _net) = setup("k1");
        assert_eq!(svc.repair_round(NOW + E), 0);
        assert_eq!(svc.repair_round(NOW + E + 60), 2);
        assert_eq!(svc.repair_round(NOW + E + 120), 0);
        assert_eq!(svc.repair_round(NOW + 4 * E + 1), 2);
        assert_eq!(svc.repair_round(NOW + 16 * E + 1), 2);

        let handle = svc.ledger().pair(&user(), &provider("p1"));
        assert_eq!(handle.lock().block(&block("s_1_0")).expect("entry").repair_count, 3);
    }

    #[test]
    fn test_only_master_queues() {
        let (svc, _net) = setup("k2");
        assert_eq!(svc.repair_round(NOW + 10 * E), 0);
    }

    #[test]
    fn test_lost_blocks_not_queued() {
        let (svc, _net) = setup("k1");
        for id in ["s_1_0", "s_1_1"] {
            let holder = svc.ledger().locate(&user(), &block(id)).expect("held");
            let handle = svc.ledger().pair(&user(), &holder);
            let mut pair = handle.lock();
            for _ in 0..3 {
                pair.note_repair_enqueued(&block(id)).expect("known");
            }
        }
        assert_eq!(svc.repair_round(NOW + 481 * E), 0);
    }

    #[tokio::test]
    async fn test_repair_moves_block_off_siblings() {
        let (svc, net) = setup("k1");
        net.join("p3");
        net.register_handler("p3", Arc::new(Rebuilder));

        let task = RepairTask {
            user: user(),
            provider: provider("p1"),
            block: block("s_1_0"),
        };
        let outcome = svc.repair_block(&task, NOW + 2 * E).await.expect("repair");
        assert_eq!(outcome, RepairOutcome::Repaired { to: provider("p3") });

        assert_eq!(svc.ledger().locate(&user(), &block("s_1_0")), Some(provider("p3")));
        let handle = svc.ledger().pair(&user(), &provider("p3"));
        let pair = handle.lock();
        let entry = pair.block(&block("s_1_0")).expect("moved");
        assert_eq!(entry.offset, 3);
        assert_eq!(entry.length, 12_288);
        assert_eq!(entry.avail_time, NOW + 2 * E);
        assert_eq!(entry.repair_count, 0);
    }

    #[tokio::test]
    async fn test_fresh_block_not_repaired() {
        let (svc, _net) = setup("k1");
        let task = RepairTask {
            user: user(),
            provider: provider("p1"),
            block: block("s_1_0"),
        };
        assert_eq!(
            svc.repair_block(&task, NOW + 10).await.expect("repair"),
            RepairOutcome::NotNeeded
        );
    }

    #[tokio::test]
    async fn test_no_eligible_target() {
        let (svc, _net) = setup("k1");
        svc.credits().set(&provider("p3"), -1);
        let task = RepairTask {
            user: user(),
            provider: provider("p1"),
            block: block("s_1_0"),
        };
        assert_eq!(
            svc.repair_block(&task, NOW + 2 * E).await.expect("repair"),
            RepairOutcome::NoTarget
        );
    }

    #[tokio::test]
    async fn test_unreachable_target_leaves_block() {
        let (svc, _net) = setup("k1");
        let task = RepairTask {
            user: user(),
            provider: provider("p1"),
            block: block("s_1_0"),
        };
        assert!(svc.repair_block(&task, NOW + 2 * E).await.is_err());
        assert_eq!(svc.ledger().locate(&user(), &block("s_1_0")), Some(provider("p1")));
    }
}
