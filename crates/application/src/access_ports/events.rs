use async_trait::async_trait;
use jitgate_core::AppResult;
use jitgate_domain::{AccessAction, ObjectKey};

/// Access lifecycle event handed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEvent {
    /// Stable action identifier.
    pub action: AccessAction,
    /// Kind-local key of the request or grant.
    pub key: ObjectKey,
    /// Identity the access concerns.
    pub subject: String,
    /// Request id, when assigned.
    pub request_id: String,
    /// Optional detail payload.
    pub detail: Option<String>,
}

/// Fire-and-forget observer of access transitions.
///
/// Engines log sink failures and carry on.
#[async_trait]
pub trait AccessEventSink: Send + Sync {
    /// Records one event.
    async fn record(&self, event: AccessEvent) -> AppResult<()>;
}
