//! Settlement contract boundary.
//!
//! Contract deployment, address resolution and transaction signing live in
//! the contracts collaborator. The keeper only submits space-time payments
//! and reads the service parameters of a user's upkeeping contract.

use std::collections::HashMap;
use std::future::Future;

use parking_lot::Mutex;
use warden_types::{KeeperId, ProviderId, UnixTime, UserId};

use crate::{Result, SettlementError};

/// A space-time payment instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpaceTimeOrder {
    /// The user whose upkeeping contract pays.
    pub upkeeping: UserId,
    pub provider: ProviderId,
    /// The keeper submitting the instruction.
    pub signer: KeeperId,
    pub interval_start: UnixTime,
    pub interval_length: i64,
    pub amount: u128,
    pub merkle_root: [u8; 32],
    /// Per-keeper shares of the keeper fee, parallel to `signatures`.
    pub shares: Vec<u64>,
    pub signatures: Vec<Vec<u8>>,
}

/// Service parameters of an upkeeping contract.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpkeepingInfo {
    pub keepers: Vec<KeeperId>,
    pub providers: Vec<ProviderId>,
    /// Price per MB per day.
    pub price: u128,
}

/// The storage query the upkeeping contract was created for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryInfo {
    pub keeper_count: u32,
    pub provider_count: u32,
    pub price: u128,
    pub duration_secs: i64,
}

/// Calls into the settlement contract.
pub trait SettlementClient: Send + Sync + 'static {
    /// Instruct a space-time payment.
    fn space_time_pay(&self, order: &SpaceTimeOrder) -> impl Future<Output = Result<()>> + Send;

    fn upkeeping_info(&self, user: &UserId) -> impl Future<Output = Result<UpkeepingInfo>> + Send;

    fn query_info(&self, user: &UserId) -> impl Future<Output = Result<QueryInfo>> + Send;
}

/// Settlement for runs without a contract: payments are logged and accepted.
#[derive(Debug, Default)]
pub struct NoopSettlement {
    price: u128,
}

impl NoopSettlement {
    pub fn new(price: u128) -> Self {
        Self { price }
    }
}

impl SettlementClient for NoopSettlement {
    async fn space_time_pay(&self, order: &SpaceTimeOrder) -> Result<()> {
        tracing::info!(
            user = %order.upkeeping,
            provider = %order.provider,
            start = order.interval_start,
            length = order.interval_length,
            amount = %order.amount,
            root = %hex::encode(order.merkle_root),
            "space-time payment accepted without settlement"
        );
        Ok(())
    }

    async fn upkeeping_info(&self, _user: &UserId) -> Result<UpkeepingInfo> {
        Ok(UpkeepingInfo {
            price: self.price,
            ..UpkeepingInfo::default()
        })
    }

    async fn query_info(&self, _user: &UserId) -> Result<QueryInfo> {
        Ok(QueryInfo {
            price: self.price,
            ..QueryInfo::default()
        })
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    upkeeping: HashMap<UserId, UpkeepingInfo>,
    orders: Vec<SpaceTimeOrder>,
    failures: Vec<SettlementError>,
    attempts: u32,
}

/// In-process contract that records every accepted order.
///
/// Failures queued with [`MemorySettlement::fail_next`] are returned, in
/// order, by the next payment calls.
#[derive(Debug, Default)]
pub struct MemorySettlement {
    state: Mutex<MemoryState>,
}

impl MemorySettlement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_upkeeping(&self, user: UserId, info: UpkeepingInfo) {
        self.state.lock().upkeeping.insert(user, info);
    }

    pub fn fail_next(&self, error: SettlementError) {
        self.state.lock().failures.push(error);
    }

    pub fn orders(&self) -> Vec<SpaceTimeOrder> {
        self.state.lock().orders.clone()
    }

    /// Payment calls made, accepted or not.
    pub fn attempts(&self) -> u32 {
        self.state.lock().attempts
    }
}

impl SettlementClient for MemorySettlement {
    async fn space_time_pay(&self, order: &SpaceTimeOrder) -> Result<()> {
        let mut state = self.state.lock();
        state.attempts += 1;
        if !state.failures.is_empty() {
            return Err(state.failures.remove(0));
        }
        if !state.upkeeping.contains_key(&order.upkeeping) {
            return Err(SettlementError::UnknownUpkeeping(order.upkeeping.to_string()));
        }
        state.orders.push(order.clone());
        Ok(())
    }

    async fn upkeeping_info(&self, user: &UserId) -> Result<UpkeepingInfo> {
        self.state
            .lock()
            .upkeeping
            .get(user)
            .cloned()
            .ok_or_else(|| SettlementError::UnknownUpkeeping(user.to_string()))
    }

    async fn query_info(&self, user: &UserId) -> Result<QueryInfo> {
        let info = self.upkeeping_info(user).await?;
        Ok(QueryInfo {
            keeper_count: info.keepers.len() as u32,
            provider_count: info.providers.len() as u32,
            price: info.price,
            duration_secs: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(user: &UserId) -> SpaceTimeOrder {
        SpaceTimeOrder {
            upkeeping: user.clone(),
            provider: ProviderId::new("p1").expect("id"),
            signer: KeeperId::new("k1").expect("id"),
            interval_start: 0,
            interval_length: 100,
            amount: 5,
            merkle_root: [0u8; 32],
            shares: vec![1],
            signatures: vec![vec![]],
        }
    }

    #[tokio::test]
    async fn test_memory_records_orders() {
        let user = UserId::new("u1").expect("id");
        let settlement = MemorySettlement::new();
        assert!(settlement.space_time_pay(&order(&user)).await.is_err());

        settlement.set_upkeeping(
            user.clone(),
            UpkeepingInfo {
                price: 3,
                ..UpkeepingInfo::default()
            },
        );
        settlement.fail_next(SettlementError::NonceTooLow);
        assert_eq!(
            settlement.space_time_pay(&order(&user)).await,
            Err(SettlementError::NonceTooLow)
        );
        settlement.space_time_pay(&order(&user)).await.expect("pay");
        assert_eq!(settlement.orders().len(), 1);
        assert_eq!(settlement.attempts(), 3);
        assert_eq!(settlement.query_info(&user).await.expect("query").price, 3);
    }

    #[tokio::test]
    async fn test_noop_accepts() {
        let user = UserId::new("u1").expect("id");
        let settlement = NoopSettlement::new(9);
        settlement.space_time_pay(&order(&user)).await.expect("pay");
        assert_eq!(settlement.upkeeping_info(&user).await.expect("info").price, 9);
    }
}
