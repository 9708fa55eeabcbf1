//! Provider reachability.
//!
//! Every provider the keeper knows of is probed concurrently; those that do
//! not answer are skipped by the next challenge round.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};
use warden_settlement::SettlementClient;
use warden_transport::MetaTransport;
use warden_types::ProviderId;

use crate::service::KeeperService;

impl<T: MetaTransport, S: SettlementClient> KeeperService<T, S> {
    /// Probe every known provider. Returns how many are reachable.
    pub async fn connectivity_round(self: &Arc<Self>) -> usize {
        let mut providers: Vec<ProviderId> = self
            .known_users()
            .iter()
            .flat_map(|user| self.known_providers(user))
            .collect();
        providers.sort();
        providers.dedup();

        let mut probes = JoinSet::new();
        for provider in providers {
            let service = Arc::clone(self);
            probes.spawn(async move {
                let online = service.transport.connect(provider.as_str()).await;
                (provider, online)
            });
        }

        let mut reachable = 0;
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((provider, online)) => {
                    self.set_online(&provider, online);
                    if online {
                        reachable += 1;
                    }
                }
                Err(e) => warn!(error = %e, "connectivity probe aborted"),
            }
        }
        debug!(reachable, "connectivity round");
        reachable
    }
}
