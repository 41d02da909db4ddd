use jitgate_core::{AppError, AppResult, ignore_already_exists};
use jitgate_domain::{
    AccessGrant, ClusterObject, GrantStatus, ObjectKind, ObjectMeta, OwnerReference, RbacBinding,
    RbacRole, RbacSubject, ResourceScope, RoleKind, RoleRef, adhoc_role_name, role_binding_name,
};
use tracing::info;

use super::GrantEngine;

impl GrantEngine {
    /// Creates whatever the status flags say is still missing.
    ///
    /// Each flag is set as soon as its object exists, so a failure later in
    /// the sequence keeps the progress made so far.
    pub(super) async fn provision(
        &self,
        grant: &AccessGrant,
        status: &mut GrantStatus,
    ) -> AppResult<()> {
        let scope = status.resource_scope();
        let subject = RbacSubject::for_identity(status.subject.as_str());
        let owner = OwnerReference {
            kind: ObjectKind::AccessGrant,
            name: grant.meta.name.clone(),
            uid: grant.meta.uid.clone(),
        };

        if let Some(role) = status.role.clone()
            && !status.role_binding_created
        {
            if scope.is_cluster() && role.kind != RoleKind::ClusterRole {
                return Err(AppError::Validation(format!(
                    "cluster-scoped grant '{}' cannot bind {} '{}'",
                    grant.key(),
                    role.kind.as_str(),
                    role.name
                )));
            }

            let binding = RbacBinding {
                meta: owned_meta(&scope, role_binding_name(status.request_id.as_str()), &owner),
                role_ref: role.normalized(),
                subjects: vec![subject.clone()],
            };
            let created = ignore_already_exists(self.rbac.create_binding(binding).await)?;
            status.role_binding_created = true;
            info!(
                key = %grant.key(),
                role = %role.name,
                created,
                "role binding provisioned"
            );
        }

        if status.permissions.is_empty() {
            return Ok(());
        }

        let adhoc_name = adhoc_role_name(status.request_id.as_str());
        if !status.adhoc_role_created {
            let role = RbacRole {
                meta: owned_meta(&scope, adhoc_name.clone(), &owner),
                rules: status.permissions.clone(),
            };
            let created = ignore_already_exists(self.rbac.create_role(role).await)?;
            status.adhoc_role_created = true;
            info!(key = %grant.key(), role = %adhoc_name, created, "ad-hoc role provisioned");
        }

        if !status.adhoc_role_binding_created {
            let binding = RbacBinding {
                meta: owned_meta(&scope, adhoc_name.clone(), &owner),
                role_ref: RoleRef::new(RoleKind::for_scope(&scope), adhoc_name.clone()),
                subjects: vec![subject],
            };
            let created = ignore_already_exists(self.rbac.create_binding(binding).await)?;
            status.adhoc_role_binding_created = true;
            info!(
                key = %grant.key(),
                role = %adhoc_name,
                created,
                "ad-hoc role binding provisioned"
            );
        }

        Ok(())
    }
}

fn owned_meta(scope: &ResourceScope, name: String, owner: &OwnerReference) -> ObjectMeta {
    let mut meta = ObjectMeta::for_key(&scope.key(name));
    meta.owner_references.push(owner.clone());
    meta
}
