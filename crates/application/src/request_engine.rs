//! Request lifecycle: bootstrap, decision deadline, policy gate, approval
//! aggregation and grant creation.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use jitgate_core::{AppError, AppResult};
use jitgate_domain::{
    AccessAction, AccessRequest, AccessRequestStatus, CLEANUP_FINALIZER, ClusterObject, ObjectKey,
    RequestState, parse_access_span,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::access_ports::{
    AccessEventSink, AccessGrantStore, AccessRequestStore, AccessResponseStore, ReconcileOutcome,
};
use crate::event_publisher::publish;
use crate::policy_store::PolicyStore;

mod approvals;
mod cleanup;
mod grant_creation;

use approvals::ResponseTally;

/// Minutes approvers have to decide on a request.
pub const DECISION_WINDOW_MINUTES: i64 = 60;

/// Seconds added to the access span before the post-approval recheck.
pub const APPROVED_RECHECK_BUFFER_SECONDS: i64 = 1;

/// Reconciles access requests of both scopes.
#[derive(Clone)]
pub struct RequestEngine {
    requests: Arc<dyn AccessRequestStore>,
    responses: Arc<dyn AccessResponseStore>,
    grants: Arc<dyn AccessGrantStore>,
    policy_store: Arc<PolicyStore>,
    event_sink: Arc<dyn AccessEventSink>,
}

impl RequestEngine {
    /// Creates an engine from its ports.
    #[must_use]
    pub fn new(
        requests: Arc<dyn AccessRequestStore>,
        responses: Arc<dyn AccessResponseStore>,
        grants: Arc<dyn AccessGrantStore>,
        policy_store: Arc<PolicyStore>,
        event_sink: Arc<dyn AccessEventSink>,
    ) -> Self {
        Self {
            requests,
            responses,
            grants,
            policy_store,
            event_sink,
        }
    }

    /// Runs one reconcile pass for the request with the given key.
    ///
    /// Status is computed in memory and patched at most once, based on the
    /// object read at the start of the pass.
    pub async fn reconcile(&self, key: &ObjectKey) -> AppResult<ReconcileOutcome> {
        let Some(request) = self.requests.find_request(key).await? else {
            debug!(key = %key, "access request no longer exists");
            return Ok(ReconcileOutcome::Done);
        };

        if request.meta.is_deleting() {
            return self.finalize(request).await;
        }

        let now = Utc::now();
        let mut status = request.status.clone();
        if status.request_id.is_empty() {
            status.request_id = Uuid::new_v4().to_string();
            status.state = RequestState::Pending;
        }

        let deadline = *status
            .request_expires_at
            .get_or_insert_with(|| now + TimeDelta::minutes(DECISION_WINDOW_MINUTES));
        if status.state != RequestState::Approved && now > deadline {
            status.state = RequestState::Expired;
        }

        let request = self.ensure_finalizer(request).await?;

        if status.state == RequestState::Expired {
            return self.expire(request, status).await;
        }

        let decided = self.decide(&request, &mut status, now).await;
        let persisted = self.persist_status(&request, status).await?;
        self.publish_transitions(&request, &persisted).await;

        decided
    }

    async fn decide(
        &self,
        request: &AccessRequest,
        status: &mut AccessRequestStatus,
        now: DateTime<Utc>,
    ) -> AppResult<ReconcileOutcome> {
        let Some(entry) = self.policy_store.resolve(request) else {
            return Err(AppError::PolicyNotMatched(format!(
                "no access policy admits request '{}' from '{}'",
                request.key(),
                request.spec.subject
            )));
        };

        if status.approvals_required != entry.policy.required_approvals {
            status.approvals_required = entry.policy.required_approvals;
        }

        let mut tally = None;
        if status.state == RequestState::Pending {
            let current = self.tally_responses(request).await?;
            status.approvals_received = current.approval_count();
            if current.is_denied() {
                status.state = RequestState::Denied;
            } else if current.approval_count() >= status.approvals_required {
                status.state = RequestState::Approved;
            }
            tally = Some(current);
        }

        match status.state {
            RequestState::Pending | RequestState::Denied => Ok(status
                .request_expires_at
                .map_or(ReconcileOutcome::Done, ReconcileOutcome::RequeueAt)),
            RequestState::Approved => {
                if !status.grant_created {
                    let approvers = match tally {
                        Some(tally) => tally.approvers(),
                        None => self.tally_responses(request).await?.approvers(),
                    };
                    self.create_grant(request, status, approvers).await?;
                    status.grant_created = true;
                }

                let span = parse_access_span(request.spec.duration.as_str())?;
                let recheck_at = now
                    .checked_add_signed(span + TimeDelta::seconds(APPROVED_RECHECK_BUFFER_SECONDS))
                    .ok_or_else(|| {
                        AppError::Validation(format!(
                            "access span '{}' of request '{}' is out of range",
                            request.spec.duration,
                            request.key()
                        ))
                    })?;
                Ok(ReconcileOutcome::RequeueAt(recheck_at))
            }
            RequestState::Expired => Ok(ReconcileOutcome::Done),
        }
    }

    async fn tally_responses(&self, request: &AccessRequest) -> AppResult<ResponseTally> {
        let responses = self
            .responses
            .list_responses_for_request(&request.scope(), request.meta.name.as_str())
            .await?;

        Ok(ResponseTally::collect(
            request.spec.subject.as_str(),
            responses.as_slice(),
        ))
    }

    async fn expire(
        &self,
        request: AccessRequest,
        status: AccessRequestStatus,
    ) -> AppResult<ReconcileOutcome> {
        let persisted = self.persist_status(&request, status).await?;
        self.publish_transitions(&request, &persisted).await;

        self.delete_responses(&request).await?;
        jitgate_core::ignore_not_found(self.requests.delete_request(&request.key()).await)?;

        info!(
            key = %request.key(),
            request_id = %persisted.request_id,
            "expired access request deleted"
        );
        Ok(ReconcileOutcome::Done)
    }

    async fn ensure_finalizer(&self, mut request: AccessRequest) -> AppResult<AccessRequest> {
        if !request.meta.add_finalizer(CLEANUP_FINALIZER) {
            return Ok(request);
        }

        self.requests.update_request_metadata(&request).await
    }

    async fn persist_status(
        &self,
        base: &AccessRequest,
        status: AccessRequestStatus,
    ) -> AppResult<AccessRequestStatus> {
        if base.status == status {
            return Ok(status);
        }

        let updated = self.requests.patch_request_status(base, status).await?;
        Ok(updated.status)
    }

    async fn publish_transitions(&self, request: &AccessRequest, status: &AccessRequestStatus) {
        let key = request.key();
        let subject = request.spec.subject.as_str();
        let request_id = status.request_id.as_str();

        if request.status.request_id.is_empty() && !status.request_id.is_empty() {
            info!(key = %key, request_id, subject, "access request registered");
            publish(
                self.event_sink.as_ref(),
                AccessAction::RequestCreated,
                &key,
                subject,
                request_id,
                Some(format!(
                    "duration '{}': {}",
                    request.spec.duration, request.spec.justification
                )),
            )
            .await;
        }

        if request.status.state == status.state {
            return;
        }

        let action = match status.state {
            RequestState::Pending => return,
            RequestState::Approved => AccessAction::RequestApproved,
            RequestState::Denied => AccessAction::RequestDenied,
            RequestState::Expired => AccessAction::RequestExpired,
        };
        info!(
            key = %key,
            request_id,
            state = status.state.as_str(),
            approvals_received = status.approvals_received,
            approvals_required = status.approvals_required,
            "access request state changed"
        );
        publish(
            self.event_sink.as_ref(),
            action,
            &key,
            subject,
            request_id,
            Some(format!(
                "{} of {} approvals",
                status.approvals_received, status.approvals_required
            )),
        )
        .await;
    }
}

#[cfg(test)]
mod tests;
