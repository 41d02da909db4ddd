//! Jitgate access controller runtime.

#![forbid(unsafe_code)]

mod change_watcher;
mod controller_config;
mod controller_services;
mod leader_election;
mod reconcile_workers;
mod work_queue;

use jitgate_core::AppError;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::change_watcher::ChangeWatcher;
use crate::controller_config::{ControllerConfig, init_tracing};
use crate::controller_services::build_controller_runtime;
use crate::leader_election::LeaderElection;
use crate::reconcile_workers::ReconcileWorkers;
use crate::work_queue::WorkQueue;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ControllerConfig::load()?;
    let runtime = build_controller_runtime(&config).await?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(error) => warn!(error = %error, "failed to listen for shutdown signal"),
        }
        signal_tx.send_replace(true);
    });

    let mut tasks = JoinSet::new();
    if let Some(coordinator) = runtime.leader_lease_coordinator.clone() {
        let election = LeaderElection::new(
            coordinator,
            config.controller_id.as_str(),
            config.leader_lease_seconds,
        );
        let Some(lease) = election.acquire(&mut shutdown_rx).await? else {
            info!("shutdown before leadership was acquired");
            return Ok(());
        };
        let leader_tx = shutdown_tx.clone();
        let leader_rx = shutdown_rx.clone();
        tasks.spawn(async move { election.hold(lease, leader_tx, leader_rx).await });
    }

    let queue = WorkQueue::new(config.requeue_base_delay, config.requeue_max_delay);
    let watcher = ChangeWatcher::new(
        runtime.change_feed.clone(),
        runtime.policy_source.clone(),
        runtime.policy_store.clone(),
        queue.clone(),
        config.watch_poll_interval,
        config.watch_batch_size,
        config.policy_resync_interval,
    );
    watcher.sync_policies().await?;

    let workers = ReconcileWorkers::new(
        runtime.request_engine.clone(),
        runtime.grant_engine.clone(),
        queue.clone(),
    );
    workers.spawn(config.worker_concurrency, &mut tasks);
    tasks.spawn(watcher.run(shutdown_rx.clone()));

    info!(
        controller_id = %config.controller_id,
        worker_concurrency = config.worker_concurrency,
        watch_poll_interval_ms = config.watch_poll_interval.as_millis(),
        leader_election = runtime.leader_lease_coordinator.is_some(),
        "jitgate-controller started"
    );

    while !*shutdown_rx.borrow_and_update() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }

    queue.shutdown();
    while let Some(joined) = tasks.join_next().await {
        if let Err(error) = joined {
            warn!(error = %error, "controller task ended abnormally");
        }
    }

    info!("jitgate-controller stopped");
    Ok(())
}
