mod change_feed;
mod events;
mod grant_store;
mod lease;
mod policy_source;
mod rbac_store;
mod reconcile;
mod request_store;
mod response_store;

pub use change_feed::{ChangeBatch, ChangeEvent, ClusterChangeFeed, ObjectListing};
pub use events::{AccessEvent, AccessEventSink};
pub use grant_store::AccessGrantStore;
pub use lease::{LeaderLease, LeaderLeaseCoordinator};
pub use policy_source::PolicySource;
pub use rbac_store::RbacStore;
pub use reconcile::ReconcileOutcome;
pub use request_store::AccessRequestStore;
pub use response_store::AccessResponseStore;
