use chrono::{DateTime, Utc};

/// Result of one reconcile invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing further to do until the object changes.
    Done,
    /// Invoke again at the given instant.
    RequeueAt(DateTime<Utc>),
}
