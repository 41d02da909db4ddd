use serde::{Deserialize, Serialize};

/// Stable access lifecycle actions observed by event sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    /// Emitted when a request gets its id.
    RequestCreated,
    /// Emitted when a request collects enough approvals.
    RequestApproved,
    /// Emitted when a request is denied.
    RequestDenied,
    /// Emitted when a request misses its decision deadline.
    RequestExpired,
    /// Emitted when the requested role is bound.
    RoleGranted,
    /// Emitted when ad-hoc permissions are bound.
    PermissionsGranted,
    /// Emitted when a grant reaches its expiry and is revoked.
    GrantExpired,
}

impl AccessAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestCreated => "access.request.created",
            Self::RequestApproved => "access.request.approved",
            Self::RequestDenied => "access.request.denied",
            Self::RequestExpired => "access.request.expired",
            Self::RoleGranted => "access.grant.role_granted",
            Self::PermissionsGranted => "access.grant.permissions_granted",
            Self::GrantExpired => "access.grant.expired",
        }
    }
}
