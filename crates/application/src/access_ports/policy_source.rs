use async_trait::async_trait;
use jitgate_core::AppResult;
use jitgate_domain::{AccessPolicy, ObjectKey};

/// Store port feeding the policy snapshot.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Lists every policy object of both scopes.
    async fn list_policies(&self) -> AppResult<Vec<AccessPolicy>>;

    /// Creates or replaces a policy object.
    async fn save_policy(&self, policy: AccessPolicy) -> AppResult<AccessPolicy>;

    /// Deletes a policy object.
    async fn delete_policy(&self, key: &ObjectKey) -> AppResult<()>;
}
