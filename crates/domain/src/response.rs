use serde::{Deserialize, Serialize};

use crate::meta::{ClusterObject, ObjectKind, ObjectMeta};

/// Approver's vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    /// Vote in favour.
    Approved,
    /// Vote against; one denial decides the request.
    Denied,
}

/// Vote payload. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponseSpec {
    /// Name of the answered request in the same scope.
    pub request_ref: String,
    /// Authenticated identity of the approver.
    pub approver: String,
    /// The vote.
    pub response: Decision,
}

/// An approver's response to one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessResponse {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Vote payload.
    pub spec: AccessResponseSpec,
}

impl ClusterObject for AccessResponse {
    const KIND: ObjectKind = ObjectKind::AccessResponse;

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}
