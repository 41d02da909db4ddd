//! Reconcile workers draining the work queue into the engines.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use chrono::Utc;
use jitgate_application::{GrantEngine, ReconcileOutcome, RequestEngine};
use jitgate_core::AppResult;
use jitgate_domain::ObjectKey;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::work_queue::WorkQueue;

/// Object whose reconcile has been requested.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReconcileTarget {
    /// An access request, reconciled by the request engine.
    Request(ObjectKey),
    /// An access grant, reconciled by the grant engine.
    Grant(ObjectKey),
}

impl Display for ReconcileTarget {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(key) => write!(formatter, "request {key}"),
            Self::Grant(key) => write!(formatter, "grant {key}"),
        }
    }
}

/// Pool of tasks that pull targets off the queue and settle their outcome.
#[derive(Clone)]
pub struct ReconcileWorkers {
    requests: RequestEngine,
    grants: GrantEngine,
    queue: WorkQueue<ReconcileTarget>,
}

impl ReconcileWorkers {
    /// Creates workers draining `queue`.
    pub fn new(
        requests: RequestEngine,
        grants: GrantEngine,
        queue: WorkQueue<ReconcileTarget>,
    ) -> Self {
        Self {
            requests,
            grants,
            queue,
        }
    }

    /// Spawns `concurrency` workers that run until the queue shuts down.
    pub fn spawn(&self, concurrency: usize, tasks: &mut JoinSet<()>) {
        for worker in 0..concurrency {
            let workers = self.clone();
            tasks.spawn(async move { workers.run(worker).await });
        }
    }

    async fn run(&self, worker: usize) {
        while let Some(target) = self.queue.get().await {
            let outcome = self.reconcile(&target).await;
            self.settle(worker, &target, outcome);
            self.queue.done(&target);
        }

        debug!(worker, "reconcile worker stopped");
    }

    async fn reconcile(&self, target: &ReconcileTarget) -> AppResult<ReconcileOutcome> {
        match target {
            ReconcileTarget::Request(key) => self.requests.reconcile(key).await,
            ReconcileTarget::Grant(key) => self.grants.reconcile(key).await,
        }
    }

    fn settle(
        &self,
        worker: usize,
        target: &ReconcileTarget,
        outcome: AppResult<ReconcileOutcome>,
    ) {
        match outcome {
            Ok(ReconcileOutcome::Done) => self.queue.forget(target),
            Ok(ReconcileOutcome::RequeueAt(at)) => {
                self.queue.forget(target);
                let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                debug!(worker, target = %target, requeue_at = %at, "reconcile requeued");
                self.queue.add_after(target.clone(), delay);
            }
            Err(error) => {
                warn!(
                    worker,
                    target = %target,
                    requeues = self.queue.num_requeues(target),
                    error = %error,
                    "reconcile failed"
                );
                self.queue.add_rate_limited(target.clone());
            }
        }
    }
}
