use jitgate_core::{AppError, AppResult, ignore_not_found};
use jitgate_domain::{
    AccessGrant, CLEANUP_FINALIZER, ClusterObject, adhoc_role_name, role_binding_name,
};
use tracing::info;

use super::GrantEngine;
use crate::access_ports::ReconcileOutcome;

impl GrantEngine {
    /// Deletion path: revoke everything, then release the finalizer.
    pub(super) async fn finalize(&self, mut grant: AccessGrant) -> AppResult<ReconcileOutcome> {
        if !grant.meta.has_finalizer(CLEANUP_FINALIZER) {
            return Ok(ReconcileOutcome::Done);
        }

        self.cleanup(&grant).await?;

        grant.meta.remove_finalizer(CLEANUP_FINALIZER);
        ignore_not_found(self.grants.update_grant_metadata(&grant).await)?;

        info!(key = %grant.key(), "access grant cleanup finished");
        Ok(ReconcileOutcome::Done)
    }

    /// Best-effort removal of everything the grant provisioned plus the
    /// originating request. Every deletion is attempted; failures are joined.
    pub(super) async fn cleanup(&self, grant: &AccessGrant) -> AppResult<()> {
        let status = &grant.status;
        let scope = status.resource_scope();
        let mut errors = Vec::new();

        if status.role_binding_created {
            let key = scope.key(role_binding_name(status.request_id.as_str()));
            if let Err(error) = ignore_not_found(self.rbac.delete_binding(&key).await) {
                errors.push(error);
            }
        }

        if status.adhoc_role_binding_created {
            let key = scope.key(adhoc_role_name(status.request_id.as_str()));
            if let Err(error) = ignore_not_found(self.rbac.delete_binding(&key).await) {
                errors.push(error);
            }
        }

        if status.adhoc_role_created {
            let key = scope.key(adhoc_role_name(status.request_id.as_str()));
            if let Err(error) = ignore_not_found(self.rbac.delete_role(&key).await) {
                errors.push(error);
            }
        }

        if !status.request.is_empty()
            && let Err(error) =
                ignore_not_found(self.requests.delete_request(&status.request_key()).await)
        {
            errors.push(error);
        }

        AppError::join(errors)
    }
}
