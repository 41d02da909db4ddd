use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use jitgate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Finalizer that keeps requests and grants alive until cleanup has run.
pub const CLEANUP_FINALIZER: &str = "jitgate.io/cleanup";

/// Object families persisted by the cluster object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Subject's ask for temporary privilege.
    AccessRequest,
    /// Approver's vote on a request.
    AccessResponse,
    /// Rule set deciding who may request what.
    AccessPolicy,
    /// Provisioning record for an approved request.
    AccessGrant,
    /// `Role` or `ClusterRole`.
    Role,
    /// `RoleBinding` or `ClusterRoleBinding`.
    RoleBinding,
}

impl ObjectKind {
    /// Returns a stable storage value for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessRequest => "access_request",
            Self::AccessResponse => "access_response",
            Self::AccessPolicy => "access_policy",
            Self::AccessGrant => "access_grant",
            Self::Role => "role",
            Self::RoleBinding => "role_binding",
        }
    }

    /// Parses a storage value into an object kind.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "access_request" => Ok(Self::AccessRequest),
            "access_response" => Ok(Self::AccessResponse),
            "access_policy" => Ok(Self::AccessPolicy),
            "access_grant" => Ok(Self::AccessGrant),
            "role" => Ok(Self::Role),
            "role_binding" => Ok(Self::RoleBinding),
            _ => Err(AppError::Validation(format!(
                "unknown object kind value '{value}'"
            ))),
        }
    }
}

/// Whether an object lives in a namespace or at cluster level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "namespace", rename_all = "snake_case")]
pub enum ResourceScope {
    /// Object lives in the given namespace.
    Namespaced(String),
    /// Object is cluster-wide.
    Cluster,
}

impl ResourceScope {
    /// Returns the namespace for namespaced scope.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Namespaced(namespace) => Some(namespace.as_str()),
            Self::Cluster => None,
        }
    }

    /// Returns true for cluster scope.
    #[must_use]
    pub fn is_cluster(&self) -> bool {
        matches!(self, Self::Cluster)
    }

    /// Builds the key of an object with this scope.
    #[must_use]
    pub fn key(&self, name: impl Into<String>) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace().map(ToOwned::to_owned),
            name: name.into(),
        }
    }
}

/// Identity of one object inside its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace, absent for cluster-scoped objects.
    pub namespace: Option<String>,
    /// Object name.
    pub name: String,
}

impl ObjectKey {
    /// Creates a key for a namespaced object.
    #[must_use]
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Creates a key for a cluster-scoped object.
    #[must_use]
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Returns the scope encoded by this key.
    #[must_use]
    pub fn scope(&self) -> ResourceScope {
        match &self.namespace {
            Some(namespace) => ResourceScope::Namespaced(namespace.clone()),
            None => ResourceScope::Cluster,
        }
    }

    /// Rejects keys with empty components.
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation(
                "object name must not be empty".to_owned(),
            ));
        }

        if self
            .namespace
            .as_deref()
            .is_some_and(|namespace| namespace.trim().is_empty())
        {
            return Err(AppError::Validation(format!(
                "namespace of object '{}' must not be empty",
                self.name
            )));
        }

        Ok(())
    }
}

impl Display for ObjectKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(formatter, "{namespace}/{}", self.name),
            None => formatter.write_str(self.name.as_str()),
        }
    }
}

/// Back-reference used for cascading garbage collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    /// Kind of the owning object.
    pub kind: ObjectKind,
    /// Name of the owning object.
    pub name: String,
    /// Unique id of the owning object.
    pub uid: String,
}

/// Store-managed metadata shared by every object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object name.
    pub name: String,
    /// Namespace, absent for cluster-scoped objects.
    pub namespace: Option<String>,
    /// Unique id assigned by the store on create.
    pub uid: String,
    /// Version bumped by the store on every write.
    pub resource_version: u64,
    /// Creation timestamp assigned by the store.
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Set when deletion was requested while finalizers were present.
    pub deletion_timestamp: Option<DateTime<Utc>>,
    /// Pending cleanup markers.
    pub finalizers: Vec<String>,
    /// Owners whose deletion cascades to this object.
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    /// Creates metadata for a not yet persisted object.
    #[must_use]
    pub fn for_key(key: &ObjectKey) -> Self {
        Self {
            name: key.name.clone(),
            namespace: key.namespace.clone(),
            ..Self::default()
        }
    }

    /// Returns the key of the object.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// Returns the scope of the object.
    #[must_use]
    pub fn scope(&self) -> ResourceScope {
        self.key().scope()
    }

    /// Returns true once deletion has been requested.
    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Returns true when the finalizer is attached.
    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|value| value == finalizer)
    }

    /// Attaches the finalizer and reports whether anything changed.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }

        self.finalizers.push(finalizer.to_owned());
        true
    }

    /// Detaches the finalizer and reports whether anything changed.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|value| value != finalizer);
        before != self.finalizers.len()
    }

    /// Returns true when the given owner uid is referenced.
    #[must_use]
    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.owner_references.iter().any(|owner| owner.uid == uid)
    }
}

/// Capability shared by every persisted object.
pub trait ClusterObject: Clone + Send + Sync {
    /// Kind stored alongside the object.
    const KIND: ObjectKind;

    /// Returns the object metadata.
    fn meta(&self) -> &ObjectMeta;

    /// Returns mutable object metadata.
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Returns the object key.
    fn key(&self) -> ObjectKey {
        self.meta().key()
    }

    /// Returns the object scope.
    fn scope(&self) -> ResourceScope {
        self.meta().scope()
    }
}

/// Objects whose status is written separately from creation.
pub trait StatusObject: ClusterObject {
    /// Status payload type.
    type Status: Clone + PartialEq + Send + Sync;

    /// Returns the current status.
    fn status(&self) -> &Self::Status;

    /// Replaces the status.
    fn set_status(&mut self, status: Self::Status);
}
