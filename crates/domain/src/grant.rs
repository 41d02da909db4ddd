use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::{ClusterObject, ObjectKey, ObjectKind, ObjectMeta, ResourceScope, StatusObject};
use crate::rbac::{PolicyRule, RoleRef};

const BINDING_NAME_PREFIX: &str = "jit-access-";
const ADHOC_NAME_PREFIX: &str = "jit-access-adhoc-";

/// Name of the binding to the requested role.
#[must_use]
pub fn role_binding_name(request_id: &str) -> String {
    format!("{BINDING_NAME_PREFIX}{request_id}")
}

/// Name of the ad-hoc role and of its binding.
#[must_use]
pub fn adhoc_role_name(request_id: &str) -> String {
    format!("{ADHOC_NAME_PREFIX}{request_id}")
}

/// Scope recorded in a grant's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GrantScope {
    /// Access inside one namespace.
    #[default]
    Namespace,
    /// Cluster-wide access.
    Cluster,
}

/// Provisioning record; populated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GrantStatus {
    /// Name of the originating request.
    pub request: String,
    /// Id of the originating request; empty until populated.
    pub request_id: String,
    /// Identity receiving access.
    pub subject: String,
    /// Distinct approvers.
    pub approved_by: Vec<String>,
    /// Granted role.
    pub role: Option<RoleRef>,
    /// Granted ad-hoc rules.
    pub permissions: Vec<PolicyRule>,
    /// Granted access span.
    pub duration: String,
    /// Instant after which access is revoked.
    pub access_expires_at: Option<DateTime<Utc>>,
    /// Checkpoint: binding to the requested role exists.
    pub role_binding_created: bool,
    /// Checkpoint: ad-hoc role exists.
    pub adhoc_role_created: bool,
    /// Checkpoint: binding to the ad-hoc role exists.
    pub adhoc_role_binding_created: bool,
    /// Grant scope.
    pub scope: GrantScope,
    /// Namespace for namespace scope.
    pub namespace: String,
}

impl GrantStatus {
    /// Returns true once the two-step create has completed.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        !self.request_id.is_empty()
    }

    /// Returns the scope the grant provisions into.
    #[must_use]
    pub fn resource_scope(&self) -> ResourceScope {
        match self.scope {
            GrantScope::Cluster => ResourceScope::Cluster,
            GrantScope::Namespace => ResourceScope::Namespaced(self.namespace.clone()),
        }
    }

    /// Returns the key of the originating request.
    #[must_use]
    pub fn request_key(&self) -> ObjectKey {
        self.resource_scope().key(self.request.as_str())
    }

    /// Records the given scope.
    pub fn set_resource_scope(&mut self, scope: &ResourceScope) {
        match scope {
            ResourceScope::Cluster => {
                self.scope = GrantScope::Cluster;
                self.namespace = String::new();
            }
            ResourceScope::Namespaced(namespace) => {
                self.scope = GrantScope::Namespace;
                self.namespace = namespace.clone();
            }
        }
    }
}

/// Owner of the RBAC artifacts for one approved request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Provisioning record.
    #[serde(default)]
    pub status: GrantStatus,
}

impl AccessGrant {
    /// Creates an unpersisted grant with empty status.
    #[must_use]
    pub fn empty(meta: ObjectMeta) -> Self {
        Self {
            meta,
            status: GrantStatus::default(),
        }
    }
}

impl ClusterObject for AccessGrant {
    const KIND: ObjectKind = ObjectKind::AccessGrant;

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

impl StatusObject for AccessGrant {
    type Status = GrantStatus;

    fn status(&self) -> &Self::Status {
        &self.status
    }

    fn set_status(&mut self, status: Self::Status) {
        self.status = status;
    }
}
