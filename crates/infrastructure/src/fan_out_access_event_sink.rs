use std::sync::Arc;

use async_trait::async_trait;
use jitgate_application::{AccessEvent, AccessEventSink};
use jitgate_core::{AppError, AppResult};

/// Forwards each event to every inner sink.
///
/// All sinks are attempted; their failures are joined.
#[derive(Clone, Default)]
pub struct FanOutAccessEventSink {
    sinks: Vec<Arc<dyn AccessEventSink>>,
}

impl FanOutAccessEventSink {
    /// Creates a sink over the given observers.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn AccessEventSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AccessEventSink for FanOutAccessEventSink {
    async fn record(&self, event: AccessEvent) -> AppResult<()> {
        let mut errors = Vec::new();
        for sink in &self.sinks {
            if let Err(error) = sink.record(event.clone()).await {
                errors.push(error);
            }
        }

        AppError::join(errors)
    }
}
