use serde::{Deserialize, Serialize};

use crate::meta::{ClusterObject, ObjectKind, ObjectMeta, ResourceScope};

/// Canonical API group of RBAC role references.
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Wildcard accepted in every policy rule field.
pub const RULE_WILDCARD: &str = "*";

const SERVICE_ACCOUNT_PREFIX: &str = "system:serviceaccount:";

/// Kind of role a reference points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoleKind {
    /// Namespaced role.
    Role,
    /// Cluster-wide role.
    ClusterRole,
}

impl RoleKind {
    /// Returns the RBAC kind name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Role => "Role",
            Self::ClusterRole => "ClusterRole",
        }
    }

    /// Returns the role kind that lives in the given scope.
    #[must_use]
    pub fn for_scope(scope: &ResourceScope) -> Self {
        if scope.is_cluster() {
            Self::ClusterRole
        } else {
            Self::Role
        }
    }
}

/// Pointer to an existing role definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    /// API group; empty means the RBAC group.
    #[serde(default)]
    pub api_group: String,
    /// Role kind.
    pub kind: RoleKind,
    /// Role name.
    pub name: String,
}

impl RoleRef {
    /// Creates a role reference in the RBAC API group.
    #[must_use]
    pub fn new(kind: RoleKind, name: impl Into<String>) -> Self {
        Self {
            api_group: RBAC_API_GROUP.to_owned(),
            kind,
            name: name.into(),
        }
    }

    /// Returns a copy with an empty API group replaced by the RBAC group.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut normalized = self.clone();
        if normalized.api_group.is_empty() {
            normalized.api_group = RBAC_API_GROUP.to_owned();
        }
        normalized
    }

    /// Compares two references after API group normalization.
    #[must_use]
    pub fn is_equivalent_to(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

/// One RBAC rule tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyRule {
    /// API groups the rule applies to.
    pub api_groups: Vec<String>,
    /// Resources the rule applies to.
    pub resources: Vec<String>,
    /// Individual resource names.
    pub resource_names: Vec<String>,
    /// Allowed verbs.
    pub verbs: Vec<String>,
    /// Non-resource URLs.
    #[serde(rename = "nonResourceURLs")]
    pub non_resource_urls: Vec<String>,
}

impl PolicyRule {
    /// Returns the rule fields in a fixed order.
    #[must_use]
    pub fn fields(&self) -> [&[String]; 5] {
        [
            self.api_groups.as_slice(),
            self.resources.as_slice(),
            self.resource_names.as_slice(),
            self.verbs.as_slice(),
            self.non_resource_urls.as_slice(),
        ]
    }

    /// Returns true when no field carries a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|field| field.is_empty())
    }
}

/// Kind of principal a binding grants to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RbacSubjectKind {
    /// Human or external user.
    User,
    /// User group.
    Group,
    /// In-cluster service account.
    ServiceAccount,
}

/// Principal named in a binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbacSubject {
    /// Principal kind.
    pub kind: RbacSubjectKind,
    /// Principal name.
    pub name: String,
    /// Namespace, only for service accounts.
    pub namespace: Option<String>,
}

impl RbacSubject {
    /// Builds the binding subject for an authenticated identity.
    ///
    /// Service account identities (`system:serviceaccount:<ns>:<name>`) bind
    /// the service account itself, anything else binds a user.
    #[must_use]
    pub fn for_identity(identity: &str) -> Self {
        if let Some(rest) = identity.strip_prefix(SERVICE_ACCOUNT_PREFIX)
            && let Some((namespace, name)) = rest.split_once(':')
            && !namespace.is_empty()
            && !name.is_empty()
        {
            return Self {
                kind: RbacSubjectKind::ServiceAccount,
                name: name.to_owned(),
                namespace: Some(namespace.to_owned()),
            };
        }

        Self {
            kind: RbacSubjectKind::User,
            name: identity.to_owned(),
            namespace: None,
        }
    }
}

/// A `Role` or `ClusterRole` carrying rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbacRole {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Granted rules.
    pub rules: Vec<PolicyRule>,
}

impl RbacRole {
    /// Returns the RBAC kind implied by the role's scope.
    #[must_use]
    pub fn kind(&self) -> RoleKind {
        RoleKind::for_scope(&self.meta.scope())
    }
}

impl ClusterObject for RbacRole {
    const KIND: ObjectKind = ObjectKind::Role;

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

/// A `RoleBinding` or `ClusterRoleBinding`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbacBinding {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Bound role.
    pub role_ref: RoleRef,
    /// Principals receiving the role.
    pub subjects: Vec<RbacSubject>,
}

impl RbacBinding {
    /// Returns the binding kind name implied by the binding's scope.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        if self.meta.scope().is_cluster() {
            "ClusterRoleBinding"
        } else {
            "RoleBinding"
        }
    }
}

impl ClusterObject for RbacBinding {
    const KIND: ObjectKind = ObjectKind::RoleBinding;

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}
