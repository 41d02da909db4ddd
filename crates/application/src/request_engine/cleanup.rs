use jitgate_core::{AppError, AppResult, ignore_not_found};
use jitgate_domain::{AccessRequest, CLEANUP_FINALIZER, ClusterObject};
use tracing::info;

use super::RequestEngine;
use crate::access_ports::ReconcileOutcome;

impl RequestEngine {
    /// Deletion path: drop responses, then release the finalizer.
    pub(super) async fn finalize(&self, mut request: AccessRequest) -> AppResult<ReconcileOutcome> {
        if !request.meta.has_finalizer(CLEANUP_FINALIZER) {
            return Ok(ReconcileOutcome::Done);
        }

        self.delete_responses(&request).await?;

        request.meta.remove_finalizer(CLEANUP_FINALIZER);
        ignore_not_found(self.requests.update_request_metadata(&request).await)?;

        info!(key = %request.key(), "access request cleanup finished");
        Ok(ReconcileOutcome::Done)
    }

    /// Deletes every response that answers the request, collecting failures.
    pub(super) async fn delete_responses(&self, request: &AccessRequest) -> AppResult<()> {
        let responses = self
            .responses
            .list_responses_for_request(&request.scope(), request.meta.name.as_str())
            .await?;

        let mut errors = Vec::new();
        for response in responses {
            if let Err(error) = ignore_not_found(self.responses.delete_response(&response.key()).await)
            {
                errors.push(error);
            }
        }

        AppError::join(errors)
    }
}
