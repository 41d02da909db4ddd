use async_trait::async_trait;
use jitgate_application::{AccessEvent, AccessEventSink};
use jitgate_core::AppResult;
use tracing::info;

/// Event sink writing one structured log line per access event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAccessEventSink;

impl TracingAccessEventSink {
    /// Creates the sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AccessEventSink for TracingAccessEventSink {
    async fn record(&self, event: AccessEvent) -> AppResult<()> {
        info!(
            target: "jitgate::access",
            action = event.action.as_str(),
            key = %event.key,
            subject = %event.subject,
            request_id = %event.request_id,
            detail = event.detail.as_deref().unwrap_or_default(),
            "access event"
        );
        Ok(())
    }
}
