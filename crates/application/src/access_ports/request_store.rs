use async_trait::async_trait;
use jitgate_core::AppResult;
use jitgate_domain::{AccessRequest, AccessRequestStatus, ObjectKey};

/// Store port for access requests of both scopes.
#[async_trait]
pub trait AccessRequestStore: Send + Sync {
    /// Finds one request by key.
    async fn find_request(&self, key: &ObjectKey) -> AppResult<Option<AccessRequest>>;

    /// Creates a request; its status is reset to the empty status.
    async fn create_request(&self, request: AccessRequest) -> AppResult<AccessRequest>;

    /// Writes metadata (finalizers, owners) conditioned on the request's resource version.
    async fn update_request_metadata(&self, request: &AccessRequest) -> AppResult<AccessRequest>;

    /// Replaces the status conditioned on the base object's resource version.
    async fn patch_request_status(
        &self,
        base: &AccessRequest,
        status: AccessRequestStatus,
    ) -> AppResult<AccessRequest>;

    /// Deletes a request, or marks it deleting while finalizers remain.
    async fn delete_request(&self, key: &ObjectKey) -> AppResult<()>;
}
