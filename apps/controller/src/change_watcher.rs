//! Polls the change feed and turns observed writes into reconcile work.

use std::sync::Arc;
use std::time::Duration;

use jitgate_application::{ChangeEvent, ClusterChangeFeed, PolicySource, PolicyStore};
use jitgate_core::AppResult;
use jitgate_domain::ObjectKind;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::reconcile_workers::ReconcileTarget;
use crate::work_queue::WorkQueue;

/// What one change event asks the controller to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    /// Reconcile one request or grant.
    Enqueue(ReconcileTarget),
    /// Reload the policy snapshot.
    ResyncPolicies,
    /// Nothing to do.
    Ignore,
}

/// Maps a change to work. Responses wake the request they name.
pub fn route(event: &ChangeEvent) -> WatchAction {
    match event.kind {
        ObjectKind::AccessRequest => {
            WatchAction::Enqueue(ReconcileTarget::Request(event.key.clone()))
        }
        ObjectKind::AccessGrant => WatchAction::Enqueue(ReconcileTarget::Grant(event.key.clone())),
        ObjectKind::AccessResponse => match event.request_ref.as_deref() {
            Some(request_name) if !request_name.is_empty() => WatchAction::Enqueue(
                ReconcileTarget::Request(event.key.scope().key(request_name)),
            ),
            _ => WatchAction::Ignore,
        },
        ObjectKind::AccessPolicy => WatchAction::ResyncPolicies,
        ObjectKind::Role | ObjectKind::RoleBinding => WatchAction::Ignore,
    }
}

/// Lists live objects once, then follows and compacts the change feed.
#[derive(Clone)]
pub struct ChangeWatcher {
    feed: Arc<dyn ClusterChangeFeed>,
    policies: Arc<dyn PolicySource>,
    policy_store: Arc<PolicyStore>,
    queue: WorkQueue<ReconcileTarget>,
    poll_interval: Duration,
    batch_size: usize,
    resync_interval: Duration,
}

impl ChangeWatcher {
    /// Creates a watcher feeding `queue`.
    pub fn new(
        feed: Arc<dyn ClusterChangeFeed>,
        policies: Arc<dyn PolicySource>,
        policy_store: Arc<PolicyStore>,
        queue: WorkQueue<ReconcileTarget>,
        poll_interval: Duration,
        batch_size: usize,
        resync_interval: Duration,
    ) -> Self {
        Self {
            feed,
            policies,
            policy_store,
            queue,
            poll_interval,
            batch_size,
            resync_interval,
        }
    }

    /// Replaces the policy snapshot with the current policy set.
    pub async fn sync_policies(&self) -> AppResult<()> {
        let policies = self.policies.list_policies().await?;
        let count = policies.len();
        let version = self.policy_store.update(policies);
        info!(version, policies = count, "policy snapshot updated");
        Ok(())
    }

    /// Enqueues every live request and grant and returns the cursor to watch from.
    pub async fn list_live(&self) -> AppResult<u64> {
        let requests = self.feed.list_keys(ObjectKind::AccessRequest).await?;
        let grants = self.feed.list_keys(ObjectKind::AccessGrant).await?;
        let listed = requests.keys.len() + grants.keys.len();

        for key in requests.keys {
            self.queue.add(ReconcileTarget::Request(key));
        }
        for key in grants.keys {
            self.queue.add(ReconcileTarget::Grant(key));
        }

        let cursor = requests.cursor.min(grants.cursor);
        info!(objects = listed, cursor, "listed live requests and grants");
        Ok(cursor)
    }

    /// Reads one page from `cursor` and returns the next cursor and whether the page was full.
    ///
    /// Consumed events are compacted away.
    pub async fn poll_once(&self, cursor: u64) -> AppResult<(u64, bool)> {
        let batch = self.feed.changes_since(cursor, self.batch_size).await?;
        let full = batch.events.len() >= self.batch_size;
        let mut resync = false;

        for event in &batch.events {
            match route(event) {
                WatchAction::Enqueue(target) => self.queue.add(target),
                WatchAction::ResyncPolicies => resync = true,
                WatchAction::Ignore => {}
            }
        }

        if resync && let Err(error) = self.sync_policies().await {
            warn!(error = %error, "policy resync after change failed");
        }

        if !batch.events.is_empty() {
            debug!(
                events = batch.events.len(),
                cursor = batch.next_cursor,
                "change feed advanced"
            );
            if let Err(error) = self.feed.compact(batch.next_cursor).await {
                warn!(
                    cursor = batch.next_cursor,
                    error = %error,
                    "failed to compact change feed"
                );
            }
        }

        Ok((batch.next_cursor, full))
    }

    /// Lists live objects, then follows the feed from the listing until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut cursor = loop {
            match self.list_live().await {
                Ok(cursor) => break cursor,
                Err(error) => warn!(error = %error, "failed to list live objects"),
            }

            if *shutdown.borrow() {
                return;
            }
            tokio::select! {
                _ = shutdown.changed() => return,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        };
        let mut resync = tokio::time::interval(self.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        resync.tick().await;

        loop {
            let mut full = false;
            match self.poll_once(cursor).await {
                Ok((next_cursor, page_full)) => {
                    cursor = next_cursor;
                    full = page_full;
                }
                Err(error) => warn!(cursor, error = %error, "failed to poll change feed"),
            }

            if *shutdown.borrow() {
                break;
            }

            if full {
                continue;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = resync.tick() => {
                    if let Err(error) = self.sync_policies().await {
                        warn!(error = %error, "periodic policy resync failed");
                    }
                }
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(cursor, "change watcher stopped");
    }
}
