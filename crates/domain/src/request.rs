use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::{ClusterObject, ObjectKind, ObjectMeta, StatusObject};
use crate::rbac::{PolicyRule, RoleRef};

/// Lifecycle state of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RequestState {
    /// Waiting for a decision.
    #[default]
    Pending,
    /// Enough approvals arrived.
    Approved,
    /// An approver denied the request.
    Denied,
    /// No decision landed before the decision deadline.
    Expired,
}

impl RequestState {
    /// Returns a stable display value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Denied => "Denied",
            Self::Expired => "Expired",
        }
    }
}

/// What the subject asks for. Immutable once set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessRequestSpec {
    /// Authenticated identity of the requester.
    pub subject: String,
    /// Groups captured at admission time.
    pub groups: BTreeSet<String>,
    /// Requested existing role.
    pub role: Option<RoleRef>,
    /// Requested ad-hoc rules.
    pub permissions: Vec<PolicyRule>,
    /// Requested access span, e.g. `30m`.
    pub duration: String,
    /// Free-text reason.
    pub justification: String,
}

/// Engine-maintained request status.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessRequestStatus {
    /// Opaque id assigned on first reconcile; never changes afterwards.
    pub request_id: String,
    /// Current lifecycle state.
    pub state: RequestState,
    /// Approvals demanded by the matched policy.
    pub approvals_required: u32,
    /// Distinct approvers that approved.
    pub approvals_received: u32,
    /// Deadline for reaching a decision.
    pub request_expires_at: Option<DateTime<Utc>>,
    /// Whether the grant for this request was created.
    pub grant_created: bool,
}

/// Request for temporary privilege, namespaced or cluster-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Requested access.
    pub spec: AccessRequestSpec,
    /// Engine-maintained status.
    #[serde(default)]
    pub status: AccessRequestStatus,
}

impl AccessRequest {
    /// Creates an unpersisted request with empty status.
    #[must_use]
    pub fn new(meta: ObjectMeta, spec: AccessRequestSpec) -> Self {
        Self {
            meta,
            spec,
            status: AccessRequestStatus::default(),
        }
    }
}

impl ClusterObject for AccessRequest {
    const KIND: ObjectKind = ObjectKind::AccessRequest;

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

impl StatusObject for AccessRequest {
    type Status = AccessRequestStatus;

    fn status(&self) -> &Self::Status {
        &self.status
    }

    fn set_status(&mut self, status: Self::Status) {
        self.status = status;
    }
}
