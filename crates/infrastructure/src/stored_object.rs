use jitgate_domain::{
    AccessGrant, AccessPolicy, AccessRequest, AccessResponse, ClusterObject, RbacBinding, RbacRole,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Object kinds persisted by the cluster store adapters.
pub(crate) trait StoredObject: ClusterObject + Serialize + DeserializeOwned {
    /// Request named by the object, published on the change feed.
    fn request_ref(&self) -> Option<&str> {
        None
    }

    /// Unique ids of the object's owners.
    fn owner_uids(&self) -> Vec<String> {
        self.meta()
            .owner_references
            .iter()
            .map(|owner| owner.uid.clone())
            .collect()
    }
}

impl StoredObject for AccessRequest {}
impl StoredObject for AccessGrant {}
impl StoredObject for AccessPolicy {}
impl StoredObject for RbacRole {}
impl StoredObject for RbacBinding {}

impl StoredObject for AccessResponse {
    fn request_ref(&self) -> Option<&str> {
        Some(self.spec.request_ref.as_str())
    }
}
