use serde::{Deserialize, Serialize};

use crate::meta::{ClusterObject, ObjectKind, ObjectMeta};
use crate::rbac::{PolicyRule, RoleRef};

/// Approvals demanded when a policy does not say otherwise.
pub const DEFAULT_REQUIRED_APPROVALS: u32 = 1;

/// Kind of principal a matcher names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectMatcherKind {
    /// Matches the request subject.
    User,
    /// Matches one of the request's captured groups.
    Group,
}

/// Names one user or group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectMatcher {
    /// Principal kind.
    pub kind: SubjectMatcherKind,
    /// Principal name.
    pub name: String,
}

impl SubjectMatcher {
    /// Matches a user by name.
    #[must_use]
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectMatcherKind::User,
            name: name.into(),
        }
    }

    /// Matches a group by name.
    #[must_use]
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: SubjectMatcherKind::Group,
            name: name.into(),
        }
    }
}

fn default_required_approvals() -> u32 {
    DEFAULT_REQUIRED_APPROVALS
}

/// One rule set inside a policy object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPolicy {
    /// Who may request; empty matches anyone.
    #[serde(default)]
    pub requesters: Vec<SubjectMatcher>,
    /// Roles that may be requested.
    #[serde(default)]
    pub allowed_roles: Vec<RoleRef>,
    /// Rule tuples that bound ad-hoc permission requests.
    #[serde(default)]
    pub allowed_permissions: Vec<PolicyRule>,
    /// Requested spans must be strictly shorter than this.
    pub max_duration: String,
    /// Distinct approvals needed.
    #[serde(default = "default_required_approvals")]
    pub required_approvals: u32,
    /// Who may approve.
    #[serde(default)]
    pub approvers: Vec<SubjectMatcher>,
    /// Higher priority wins.
    #[serde(default)]
    pub priority: i32,
    /// Opaque notification routing key.
    #[serde(default)]
    pub notification_config: Option<String>,
}

impl Default for SubjectPolicy {
    fn default() -> Self {
        Self {
            requesters: Vec::new(),
            allowed_roles: Vec::new(),
            allowed_permissions: Vec::new(),
            max_duration: String::new(),
            required_approvals: DEFAULT_REQUIRED_APPROVALS,
            approvers: Vec::new(),
            priority: 0,
            notification_config: None,
        }
    }
}

/// Policy object, namespaced or cluster-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Rule sets in declaration order.
    pub policies: Vec<SubjectPolicy>,
}

impl ClusterObject for AccessPolicy {
    const KIND: ObjectKind = ObjectKind::AccessPolicy;

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}
