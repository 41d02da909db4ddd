//! Single-active-controller election over a [`LeaderLeaseCoordinator`].

use std::sync::Arc;
use std::time::Duration;

use jitgate_application::{LeaderLease, LeaderLeaseCoordinator};
use jitgate_core::{AppError, AppResult};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

/// Lease scope shared by every controller replica.
pub const LEADER_SCOPE_KEY: &str = "controller-leader";

/// Acquires and holds the controller leader lease for one replica.
#[derive(Clone)]
pub struct LeaderElection {
    coordinator: Arc<dyn LeaderLeaseCoordinator>,
    holder_id: String,
    lease_seconds: u32,
}

impl LeaderElection {
    pub fn new(
        coordinator: Arc<dyn LeaderLeaseCoordinator>,
        holder_id: impl Into<String>,
        lease_seconds: u32,
    ) -> Self {
        Self {
            coordinator,
            holder_id: holder_id.into(),
            lease_seconds,
        }
    }

    fn lease_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.lease_seconds))
    }

    /// Renewals and acquisition retries happen every third of the lease.
    fn retry_interval(&self) -> Duration {
        self.lease_duration() / 3
    }

    /// Waits until this controller holds the lease. Returns `None` on shutdown.
    pub async fn acquire(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> AppResult<Option<LeaderLease>> {
        loop {
            let attempt = self
                .coordinator
                .try_acquire_lease(LEADER_SCOPE_KEY, self.holder_id.as_str(), self.lease_seconds)
                .await;
            match attempt {
                Ok(Some(lease)) => {
                    info!(holder_id = %self.holder_id, "acquired controller leadership");
                    return Ok(Some(lease));
                }
                Ok(None) => {}
                Err(error @ AppError::Validation(_)) => return Err(error),
                Err(error) => {
                    warn!(
                        holder_id = %self.holder_id,
                        error = %error,
                        "leader lease acquisition failed"
                    );
                }
            }

            if *shutdown.borrow() {
                return Ok(None);
            }

            tokio::select! {
                _ = shutdown.changed() => return Ok(None),
                () = tokio::time::sleep(self.retry_interval()) => {}
            }
        }
    }

    /// Keeps the lease alive until shutdown, then releases it.
    ///
    /// Signals shutdown when ownership is lost or renewals keep failing for a
    /// whole lease period.
    pub async fn hold(
        &self,
        lease: LeaderLease,
        shutdown_tx: watch::Sender<bool>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut last_renewed = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                () = tokio::time::sleep(self.retry_interval()) => {}
            }

            match self.coordinator.renew_lease(&lease, self.lease_seconds).await {
                Ok(true) => last_renewed = Instant::now(),
                Ok(false) => {
                    warn!(holder_id = %self.holder_id, "controller leadership lost");
                    shutdown_tx.send_replace(true);
                    return;
                }
                Err(error) => {
                    warn!(
                        holder_id = %self.holder_id,
                        error = %error,
                        "leader lease renewal failed"
                    );
                    if last_renewed.elapsed() >= self.lease_duration() {
                        warn!(
                            holder_id = %self.holder_id,
                            "leader lease expired before renewal"
                        );
                        shutdown_tx.send_replace(true);
                        return;
                    }
                }
            }
        }

        if let Err(error) = self.coordinator.release_lease(&lease).await {
            warn!(
                holder_id = %self.holder_id,
                error = %error,
                "failed to release leader lease"
            );
        } else {
            info!(holder_id = %self.holder_id, "released controller leadership");
        }
    }
}
