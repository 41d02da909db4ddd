use async_trait::async_trait;
use jitgate_core::AppResult;
use jitgate_domain::{AccessGrant, GrantStatus, ObjectKey};

/// Store port for access grants of both scopes.
///
/// Grant status cannot be set on create; callers create an empty grant and
/// populate the status with a second, version-conditioned patch.
#[async_trait]
pub trait AccessGrantStore: Send + Sync {
    /// Finds one grant by key.
    async fn find_grant(&self, key: &ObjectKey) -> AppResult<Option<AccessGrant>>;

    /// Creates a grant with empty status.
    async fn create_grant(&self, grant: AccessGrant) -> AppResult<AccessGrant>;

    /// Writes metadata conditioned on the grant's resource version.
    async fn update_grant_metadata(&self, grant: &AccessGrant) -> AppResult<AccessGrant>;

    /// Replaces the status conditioned on the base object's resource version.
    async fn patch_grant_status(
        &self,
        base: &AccessGrant,
        status: GrantStatus,
    ) -> AppResult<AccessGrant>;

    /// Deletes a grant, or marks it deleting while finalizers remain.
    async fn delete_grant(&self, key: &ObjectKey) -> AppResult<()>;
}
