//! Ledger persistence in the local key/value store.
//!
//! ```text
//! keeper/UserList                 JSON [user]
//! user/KeeperList                 JSON [keeper]
//! user/ProviderList               JSON [provider]
//! provider/LedgerSnapshot/user    JSON PairSnapshot
//! ```
//!
//! Written periodically and once more on shutdown; read back on start-up.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};
use warden_ledger::PairSnapshot;
use warden_settlement::SettlementClient;
use warden_transport::messages::GroupInfo;
use warden_transport::{KeyType, MetaKey, MetaTransport, Scope, TransportError};
use warden_types::{KeeperId, ProviderId, UserId};

use crate::service::KeeperService;
use crate::Result;

impl<T: MetaTransport, S: SettlementClient> KeeperService<T, S> {
    /// Write groups and every pair ledger. Returns the number of pairs written.
    pub async fn persist(&self) -> Result<usize> {
        let users = self.known_users();
        let key = MetaKey::new(self.keeper_id.as_str(), KeyType::UserList, Vec::new())?;
        self.put_json(&key, &users).await?;

        for user in &users {
            let keepers = self.group(user).map(|g| g.keepers).unwrap_or_default();
            let key = MetaKey::new(user.as_str(), KeyType::KeeperList, Vec::new())?;
            self.put_json(&key, &keepers).await?;

            let providers = self.known_providers(user);
            let key = MetaKey::new(user.as_str(), KeyType::ProviderList, Vec::new())?;
            self.put_json(&key, &providers).await?;
        }

        let snapshots = self.ledger.snapshots();
        for snapshot in &snapshots {
            let key = MetaKey::new(
                snapshot.provider.as_str(),
                KeyType::LedgerSnapshot,
                vec![snapshot.user.to_string()],
            )?;
            let bytes = snapshot.to_json()?;
            self.transport
                .put_key(&key.to_string(), &bytes, &[], Scope::Local)
                .await?;
        }
        debug!(users = users.len(), pairs = snapshots.len(), "ledger persisted");
        Ok(snapshots.len())
    }

    /// Restore what [`KeeperService::persist`] wrote. Returns the number of pairs restored.
    pub async fn load(&self) -> Result<usize> {
        let key = MetaKey::new(self.keeper_id.as_str(), KeyType::UserList, Vec::new())?;
        let Some(users) = self.get_json::<Vec<UserId>>(&key).await? else {
            info!("no persisted ledger");
            return Ok(0);
        };

        let mut restored = 0;
        for user in users {
            let key = MetaKey::new(user.as_str(), KeyType::KeeperList, Vec::new())?;
            let keepers: Vec<KeeperId> = self.get_json(&key).await?.unwrap_or_default();
            let key = MetaKey::new(user.as_str(), KeyType::ProviderList, Vec::new())?;
            let providers: Vec<ProviderId> = self.get_json(&key).await?.unwrap_or_default();

            for provider in &providers {
                let key = MetaKey::new(
                    provider.as_str(),
                    KeyType::LedgerSnapshot,
                    vec![user.to_string()],
                )?;
                if let Some(bytes) = self.get_local(&key).await? {
                    self.ledger.restore(PairSnapshot::from_json(&bytes)?);
                    restored += 1;
                }
            }
            if !keepers.is_empty() || !providers.is_empty() {
                self.apply_group_info(&user, GroupInfo { keepers, providers });
            }
        }
        info!(restored, "ledger restored");
        Ok(restored)
    }

    async fn put_json<V: Serialize + Sync>(&self, key: &MetaKey, value: &V) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.transport
            .put_key(&key.to_string(), &bytes, &[], Scope::Local)
            .await?;
        Ok(())
    }

    async fn get_json<V: DeserializeOwned>(&self, key: &MetaKey) -> Result<Option<V>> {
        match self.get_local(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_local(&self, key: &MetaKey) -> Result<Option<Vec<u8>>> {
        match self.transport.get_key(&key.to_string(), Scope::Local).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(TransportError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
