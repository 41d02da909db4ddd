use async_trait::async_trait;
use jitgate_core::AppResult;
use jitgate_domain::{ObjectKey, RbacBinding, RbacRole};

/// Store port for provisioned roles and bindings.
///
/// Cluster-scoped keys address `ClusterRole`/`ClusterRoleBinding` objects.
#[async_trait]
pub trait RbacStore: Send + Sync {
    /// Creates a role.
    async fn create_role(&self, role: RbacRole) -> AppResult<RbacRole>;

    /// Creates a binding.
    async fn create_binding(&self, binding: RbacBinding) -> AppResult<RbacBinding>;

    /// Finds one role.
    async fn find_role(&self, key: &ObjectKey) -> AppResult<Option<RbacRole>>;

    /// Finds one binding.
    async fn find_binding(&self, key: &ObjectKey) -> AppResult<Option<RbacBinding>>;

    /// Deletes a role.
    async fn delete_role(&self, key: &ObjectKey) -> AppResult<()>;

    /// Deletes a binding.
    async fn delete_binding(&self, key: &ObjectKey) -> AppResult<()>;
}
