use jitgate_core::{AppError, AppResult};
use jitgate_domain::{
    AccessGrant, AccessRequest, AccessRequestStatus, ClusterObject, GrantStatus, ObjectMeta,
};
use tracing::{debug, info};

use super::RequestEngine;

impl RequestEngine {
    /// Creates the grant for an approved request in two phases.
    ///
    /// The grant is created empty and its status patched afterwards. A grant
    /// that already exists counts as created; if an earlier attempt stopped
    /// between the phases, the status is populated now.
    pub(super) async fn create_grant(
        &self,
        request: &AccessRequest,
        status: &AccessRequestStatus,
        approved_by: Vec<String>,
    ) -> AppResult<()> {
        let key = request.key();
        let grant = match self
            .grants
            .create_grant(AccessGrant::empty(ObjectMeta::for_key(&key)))
            .await
        {
            Ok(grant) => grant,
            Err(error) if error.is_already_exists() => {
                self.grants.find_grant(&key).await?.ok_or_else(|| {
                    AppError::Conflict(format!(
                        "access grant '{key}' vanished after create reported it exists"
                    ))
                })?
            }
            Err(error) => return Err(error),
        };

        if grant.status.is_populated() {
            debug!(key = %key, "access grant already populated");
            return Ok(());
        }

        let mut grant_status = GrantStatus {
            request: request.meta.name.clone(),
            request_id: status.request_id.clone(),
            subject: request.spec.subject.clone(),
            approved_by,
            role: request.spec.role.clone(),
            permissions: request.spec.permissions.clone(),
            duration: request.spec.duration.clone(),
            ..GrantStatus::default()
        };
        grant_status.set_resource_scope(&request.scope());

        self.grants.patch_grant_status(&grant, grant_status).await?;

        info!(
            key = %key,
            request_id = %status.request_id,
            subject = %request.spec.subject,
            "access grant created"
        );
        Ok(())
    }
}
