//! Periodic drivers.
//!
//! Each driver is a task ticking on its own interval until the shutdown
//! broadcast fires. The first tick runs immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use warden_settlement::SettlementClient;
use warden_transport::MetaTransport;
use warden_types::unix_now;

use crate::service::KeeperService;

/// Start every keeper driver and the repair workers.
pub fn spawn_drivers<T: MetaTransport, S: SettlementClient>(
    service: Arc<KeeperService<T, S>>,
    shutdown: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    let config = service.config().clone();
    let mut handles = Vec::new();

    let svc = Arc::clone(&service);
    handles.push(every(
        "challenge",
        config.challenge.interval_secs,
        shutdown.subscribe(),
        move || {
            let svc = Arc::clone(&svc);
            async move {
                // Deliveries may never complete; they are not awaited here.
                let tasks = svc.challenge_round(unix_now());
                debug!(pairs = tasks.len(), "challenge round started");
            }
        },
    ));

    let svc = Arc::clone(&service);
    handles.push(every(
        "repair",
        config.repair.interval_secs,
        shutdown.subscribe(),
        move || {
            let svc = Arc::clone(&svc);
            async move {
                svc.repair_round(unix_now());
            }
        },
    ));
    handles.extend(service.spawn_repair_workers(shutdown));

    let svc = Arc::clone(&service);
    handles.push(every(
        "payment",
        config.payment.interval_secs,
        shutdown.subscribe(),
        move || {
            let svc = Arc::clone(&svc);
            async move {
                let paid = svc.payment_round().await;
                if !paid.is_empty() {
                    info!(payments = paid.len(), "payment round");
                }
            }
        },
    ));

    let svc = Arc::clone(&service);
    handles.push(every(
        "connectivity",
        config.advanced.connectivity_interval_secs,
        shutdown.subscribe(),
        move || {
            let svc = Arc::clone(&svc);
            async move {
                svc.connectivity_round().await;
            }
        },
    ));

    let svc = Arc::clone(&service);
    handles.push(every(
        "persist",
        config.advanced.persist_interval_secs,
        shutdown.subscribe(),
        move || {
            let svc = Arc::clone(&svc);
            async move {
                if let Err(e) = svc.persist().await {
                    warn!(error = %e, "ledger persist failed");
                }
            }
        },
    ));

    info!(tasks = handles.len(), "drivers started");
    handles
}

fn every<F, Fut>(
    name: &'static str,
    period_secs: u64,
    mut shutdown: broadcast::Receiver<()>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(period_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => tick().await,
                _ = shutdown.recv() => break,
            }
        }
        debug!(driver = name, "driver stopped");
    })
}
