use jitgate_domain::{AccessAction, ObjectKey};
use tracing::warn;

use crate::access_ports::{AccessEvent, AccessEventSink};

/// Hands one event to the sink; failures are logged and swallowed.
pub(crate) async fn publish(
    sink: &dyn AccessEventSink,
    action: AccessAction,
    key: &ObjectKey,
    subject: &str,
    request_id: &str,
    detail: Option<String>,
) {
    let event = AccessEvent {
        action,
        key: key.clone(),
        subject: subject.to_owned(),
        request_id: request_id.to_owned(),
        detail,
    };

    if let Err(error) = sink.record(event).await {
        warn!(
            action = action.as_str(),
            key = %key,
            error = %error,
            "failed to record access event"
        );
    }
}
