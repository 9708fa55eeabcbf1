//! warden-keeper: the keeper daemon.
//!
//! Loads the ledger, serves inbound keeper messages and runs the challenge,
//! repair, payment, connectivity and persistence drivers until Ctrl-C.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, warn};
use warden_keeper::{spawn_drivers, DispatchTable, KeeperConfig, KeeperEndpoint, KeeperService};
use warden_settlement::NoopSettlement;
use warden_transport::MemoryNetwork;

/// Price per MB-day reported by the local settlement stand-in.
const LOCAL_PRICE: u128 = 1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = KeeperConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("warden=info".parse()?)
                .add_directive(format!("warden_keeper={}", config.advanced.log_level).parse()?),
        )
        .init();

    info!("Warden keeper starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // Standalone mode: an in-process network and a settlement client that
    // accepts every payment.
    let network = MemoryNetwork::new();
    let transport = network.join(config.keeper.keeper_id.clone());
    let service = Arc::new(KeeperService::new(
        config,
        transport,
        NoopSettlement::new(LOCAL_PRICE),
    )?);
    info!(keeper = %service.keeper_id(), data_dir = ?data_dir, "keeper service ready");

    match service.load().await {
        Ok(restored) => info!(restored, "ledger loaded"),
        Err(e) => warn!(error = %e, "ledger not loaded, starting empty"),
    }

    let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

    let (endpoint, mut tasks) = KeeperEndpoint::start(
        Arc::clone(&service),
        Arc::new(DispatchTable::keeper()),
        &shutdown_tx,
    );
    network.register_handler(service.keeper_id().as_str(), endpoint);
    tasks.extend(spawn_drivers(Arc::clone(&service), &shutdown_tx));

    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::select! {
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    info!("Keeper shutting down gracefully");
    let _ = shutdown_tx.send(());
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "task ended abnormally");
        }
    }

    if let Err(e) = service.persist().await {
        error!(error = %e, "final ledger persist failed");
    }

    info!("Keeper stopped");
    Ok(())
}
