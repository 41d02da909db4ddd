use async_trait::async_trait;
use jitgate_core::AppResult;
use jitgate_domain::{AccessResponse, ObjectKey, ResourceScope};

/// Store port for approver responses.
#[async_trait]
pub trait AccessResponseStore: Send + Sync {
    /// Creates a response.
    async fn create_response(&self, response: AccessResponse) -> AppResult<AccessResponse>;

    /// Lists responses in the scope whose `request_ref` names the request.
    async fn list_responses_for_request(
        &self,
        scope: &ResourceScope,
        request_name: &str,
    ) -> AppResult<Vec<AccessResponse>>;

    /// Deletes one response.
    async fn delete_response(&self, key: &ObjectKey) -> AppResult<()>;
}
