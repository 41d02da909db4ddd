//! Grant lifecycle: RBAC provisioning, expiry scheduling and revocation.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use jitgate_core::{AppError, AppResult, ignore_not_found};
use jitgate_domain::{
    AccessAction, AccessGrant, CLEANUP_FINALIZER, ClusterObject, GrantStatus, ObjectKey,
    parse_access_span,
};
use tracing::{debug, info, warn};

use crate::access_ports::{
    AccessEventSink, AccessGrantStore, AccessRequestStore, RbacStore, ReconcileOutcome,
};
use crate::event_publisher::publish;

mod cleanup;
mod provisioning;

/// Access span used when a grant's duration cannot be parsed.
pub const FALLBACK_ACCESS_SPAN_MINUTES: i64 = 10;

/// Seconds waited past expiry before the revoking reconcile.
pub const EXPIRY_REQUEUE_BUFFER_SECONDS: i64 = 1;

/// Reconciles access grants of both scopes.
#[derive(Clone)]
pub struct GrantEngine {
    grants: Arc<dyn AccessGrantStore>,
    requests: Arc<dyn AccessRequestStore>,
    rbac: Arc<dyn RbacStore>,
    event_sink: Arc<dyn AccessEventSink>,
}

impl GrantEngine {
    /// Creates an engine from its ports.
    #[must_use]
    pub fn new(
        grants: Arc<dyn AccessGrantStore>,
        requests: Arc<dyn AccessRequestStore>,
        rbac: Arc<dyn RbacStore>,
        event_sink: Arc<dyn AccessEventSink>,
    ) -> Self {
        Self {
            grants,
            requests,
            rbac,
            event_sink,
        }
    }

    /// Runs one reconcile pass for the grant with the given key.
    pub async fn reconcile(&self, key: &ObjectKey) -> AppResult<ReconcileOutcome> {
        let Some(grant) = self.grants.find_grant(key).await? else {
            debug!(key = %key, "access grant no longer exists");
            return Ok(ReconcileOutcome::Done);
        };

        if grant.meta.is_deleting() {
            return self.finalize(grant).await;
        }

        let grant = self.ensure_finalizer(grant).await?;
        if !grant.status.is_populated() {
            debug!(key = %key, "access grant status not populated yet");
            return Ok(ReconcileOutcome::Done);
        }

        let now = Utc::now();
        if grant
            .status
            .access_expires_at
            .is_some_and(|expires_at| now > expires_at)
        {
            return self.expire(grant).await;
        }

        let mut status = grant.status.clone();
        let provisioned = self.provision(&grant, &mut status).await;

        let expires_at = match status.access_expires_at {
            Some(expires_at) => expires_at,
            None => {
                let expires_at = now
                    .checked_add_signed(access_span(key, &status))
                    .ok_or_else(|| {
                        AppError::Validation(format!(
                            "access span '{}' of grant '{key}' is out of range",
                            status.duration
                        ))
                    })?;
                status.access_expires_at = Some(expires_at);
                expires_at
            }
        };

        let persisted = self.persist_status(&grant, status).await?;
        self.publish_provisioning(&grant, &persisted).await;
        provisioned?;

        Ok(ReconcileOutcome::RequeueAt(
            expires_at + TimeDelta::seconds(EXPIRY_REQUEUE_BUFFER_SECONDS),
        ))
    }

    async fn expire(&self, mut grant: AccessGrant) -> AppResult<ReconcileOutcome> {
        let key = grant.key();
        self.cleanup(&grant).await?;

        if grant.meta.remove_finalizer(CLEANUP_FINALIZER) {
            match ignore_not_found(self.grants.update_grant_metadata(&grant).await)? {
                Some(updated) => grant = updated,
                None => return Ok(ReconcileOutcome::Done),
            }
        }
        ignore_not_found(self.grants.delete_grant(&key).await)?;

        info!(
            key = %key,
            request_id = %grant.status.request_id,
            subject = %grant.status.subject,
            "expired access grant revoked"
        );
        publish(
            self.event_sink.as_ref(),
            AccessAction::GrantExpired,
            &key,
            grant.status.subject.as_str(),
            grant.status.request_id.as_str(),
            Some(format!("granted for '{}'", grant.status.duration)),
        )
        .await;

        Ok(ReconcileOutcome::Done)
    }

    async fn ensure_finalizer(&self, mut grant: AccessGrant) -> AppResult<AccessGrant> {
        if !grant.meta.add_finalizer(CLEANUP_FINALIZER) {
            return Ok(grant);
        }

        self.grants.update_grant_metadata(&grant).await
    }

    async fn persist_status(
        &self,
        base: &AccessGrant,
        status: GrantStatus,
    ) -> AppResult<GrantStatus> {
        if base.status == status {
            return Ok(status);
        }

        let updated = self.grants.patch_grant_status(base, status).await?;
        Ok(updated.status)
    }

    async fn publish_provisioning(&self, grant: &AccessGrant, status: &GrantStatus) {
        let key = grant.key();

        if !grant.status.role_binding_created && status.role_binding_created {
            let role = status
                .role
                .as_ref()
                .map(|role| format!("{} '{}'", role.kind.as_str(), role.name))
                .unwrap_or_default();
            publish(
                self.event_sink.as_ref(),
                AccessAction::RoleGranted,
                &key,
                status.subject.as_str(),
                status.request_id.as_str(),
                Some(format!("{role} for '{}'", status.duration)),
            )
            .await;
        }

        if !grant.status.adhoc_role_binding_created && status.adhoc_role_binding_created {
            publish(
                self.event_sink.as_ref(),
                AccessAction::PermissionsGranted,
                &key,
                status.subject.as_str(),
                status.request_id.as_str(),
                Some(format!(
                    "{} rules for '{}'",
                    status.permissions.len(),
                    status.duration
                )),
            )
            .await;
        }
    }
}

/// Parses the grant's span, substituting the fallback for bad input.
fn access_span(key: &ObjectKey, status: &GrantStatus) -> TimeDelta {
    match parse_access_span(status.duration.as_str()) {
        Ok(span) => span,
        Err(error) => {
            warn!(
                key = %key,
                request_id = %status.request_id,
                duration = %status.duration,
                fallback_minutes = FALLBACK_ACCESS_SPAN_MINUTES,
                error = %error,
                "access grant duration is invalid; using fallback span"
            );
            TimeDelta::minutes(FALLBACK_ACCESS_SPAN_MINUTES)
        }
    }
}

#[cfg(test)]
mod tests;
