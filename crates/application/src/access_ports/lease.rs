use async_trait::async_trait;
use jitgate_core::AppResult;

/// Held leadership lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderLease {
    /// Lease scope.
    pub scope_key: String,
    /// Ownership token checked on renew and release.
    pub token: String,
    /// Holder identity.
    pub holder_id: String,
}

/// Distributed coordination port for controller leadership.
#[async_trait]
pub trait LeaderLeaseCoordinator: Send + Sync {
    /// Attempts to acquire the lease for the given scope.
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<LeaderLease>>;

    /// Releases the lease using token compare-and-delete semantics.
    async fn release_lease(&self, lease: &LeaderLease) -> AppResult<()>;

    /// Renews the lease and returns false when token ownership changed.
    async fn renew_lease(&self, lease: &LeaderLease, lease_seconds: u32) -> AppResult<bool>;
}
