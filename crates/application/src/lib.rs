//! Application services and ports.

#![forbid(unsafe_code)]

mod access_ports;
mod event_publisher;
mod grant_engine;
pub mod policy_resolver;
mod policy_store;
mod request_engine;

#[cfg(test)]
mod fake_cluster;

pub use access_ports::{
    AccessEvent, AccessEventSink, AccessGrantStore, AccessRequestStore, AccessResponseStore,
    ChangeBatch, ChangeEvent, ClusterChangeFeed, LeaderLease, LeaderLeaseCoordinator,
    ObjectListing, PolicySource, RbacStore, ReconcileOutcome,
};
pub use grant_engine::{EXPIRY_REQUEUE_BUFFER_SECONDS, FALLBACK_ACCESS_SPAN_MINUTES, GrantEngine};
pub use policy_store::{PolicyEntry, PolicySnapshot, PolicyStore};
pub use request_engine::{APPROVED_RECHECK_BUFFER_SECONDS, DECISION_WINDOW_MINUTES, RequestEngine};
