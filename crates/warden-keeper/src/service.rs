//! Keeper-wide shared state.
//!
//! One [`KeeperService`] is built at start-up and handed, behind an `Arc`,
//! to every driver, worker and the inbound endpoint. Nothing else holds
//! keeper state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::info;
use warden_ledger::{master_keeper, CreditBook, Ledger};
use warden_pdp::PublicKey;
use warden_settlement::{RetryingSettlement, SettlementClient};
use warden_transport::messages::GroupInfo;
use warden_transport::MetaTransport;
use warden_types::{KeeperId, ProviderId, UserId};

use crate::config::KeeperConfig;
use crate::repair::RepairTask;
use crate::Result;

/// State shared by every keeper task.
pub struct KeeperService<T, S> {
    pub(crate) config: KeeperConfig,
    pub(crate) keeper_id: KeeperId,
    pub(crate) transport: T,
    pub(crate) settlement: RetryingSettlement<S>,
    pub(crate) ledger: Ledger,
    pub(crate) credits: CreditBook,
    pub(crate) groups: RwLock<HashMap<UserId, GroupInfo>>,
    /// Owner public keys, immutable once loaded.
    pub(crate) keys: RwLock<HashMap<UserId, Arc<PublicKey>>>,
    /// Providers the last connectivity probe could not reach.
    pub(crate) offline: RwLock<HashSet<ProviderId>>,
    pub(crate) repair_tx: mpsc::Sender<RepairTask>,
    /// Taken by the repair worker pool when it starts.
    pub(crate) repair_rx: Mutex<Option<mpsc::Receiver<RepairTask>>>,
}

impl<T: MetaTransport, S: SettlementClient> KeeperService<T, S> {
    /// Build the service. Settlement calls go through the configured retry policy.
    pub fn new(config: KeeperConfig, transport: T, settlement: S) -> Result<Self> {
        let keeper_id = config.keeper_id()?;
        let (repair_tx, repair_rx) = mpsc::channel(config.repair.queue_capacity.max(1));
        let settlement = RetryingSettlement::new(settlement, config.retry.clone());
        let credits = CreditBook::new(config.credit.clone());
        info!(keeper = %keeper_id, "keeper service created");
        Ok(Self {
            config,
            keeper_id,
            transport,
            settlement,
            ledger: Ledger::new(),
            credits,
            groups: RwLock::new(HashMap::new()),
            keys: RwLock::new(HashMap::new()),
            offline: RwLock::new(HashSet::new()),
            repair_tx,
            repair_rx: Mutex::new(Some(repair_rx)),
        })
    }

    pub fn keeper_id(&self) -> &KeeperId {
        &self.keeper_id
    }

    pub fn config(&self) -> &KeeperConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn credits(&self) -> &CreditBook {
        &self.credits
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying settlement client, without the retry wrapper.
    pub fn settlement(&self) -> &S {
        self.settlement.inner()
    }

    pub fn group(&self, user: &UserId) -> Option<GroupInfo> {
        self.groups.read().get(user).cloned()
    }

    /// Whether this keeper is the master of `user`'s group.
    ///
    /// A keeper that has not seen the group yet is never master.
    pub fn is_master(&self, user: &UserId) -> bool {
        let keepers = match self.groups.read().get(user) {
            Some(group) => group.keepers.clone(),
            None => return false,
        };
        master_keeper(&keepers).as_ref() == Some(&self.keeper_id)
    }

    /// Every user with a group or a pair ledger, sorted.
    pub fn known_users(&self) -> Vec<UserId> {
        let mut users = self.ledger.users();
        users.extend(self.groups.read().keys().cloned());
        users.sort();
        users.dedup();
        users
    }

    /// Providers serving `user`: group members plus every provider with a pair ledger.
    pub fn known_providers(&self, user: &UserId) -> Vec<ProviderId> {
        let mut providers: Vec<ProviderId> = self
            .ledger
            .pairs()
            .into_iter()
            .filter(|(key, _)| &key.user == user)
            .map(|(key, _)| key.provider)
            .collect();
        if let Some(group) = self.group(user) {
            providers.extend(group.providers);
        }
        providers.sort();
        providers.dedup();
        providers
    }

    /// Providers are online until a probe says otherwise.
    pub fn is_online(&self, provider: &ProviderId) -> bool {
        !self.offline.read().contains(provider)
    }

    pub fn set_online(&self, provider: &ProviderId, online: bool) {
        let changed = if online {
            self.offline.write().remove(provider)
        } else {
            self.offline.write().insert(provider.clone())
        };
        if changed {
            info!(provider = %provider, online, "provider reachability changed");
        }
    }
}
