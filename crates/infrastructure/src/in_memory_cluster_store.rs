//! In-process cluster store with a change feed and owner garbage collection.

use std::collections::VecDeque;

use async_trait::async_trait;
use jitgate_application::{
    AccessGrantStore, AccessRequestStore, AccessResponseStore, ChangeBatch, ChangeEvent,
    ClusterChangeFeed, ObjectListing, PolicySource, RbacStore,
};
use jitgate_core::AppResult;
use jitgate_domain::{
    AccessGrant, AccessPolicy, AccessRequest, AccessRequestStatus, AccessResponse, ClusterObject,
    GrantStatus, ObjectKey, ObjectKind, RbacBinding, RbacRole, ResourceScope,
};
use tokio::sync::RwLock;

use crate::stored_object::StoredObject;

mod table;

use table::{Table, WriteEffect};

#[derive(Debug, Default)]
struct StoreState {
    version: u64,
    requests: Table<AccessRequest>,
    responses: Table<AccessResponse>,
    grants: Table<AccessGrant>,
    policies: Table<AccessPolicy>,
    roles: Table<RbacRole>,
    bindings: Table<RbacBinding>,
    last_sequence: u64,
    /// Uncompacted events, oldest first.
    changes: VecDeque<ChangeEvent>,
}

impl StoreState {
    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    fn record<T: StoredObject>(&mut self, object: &T) {
        self.last_sequence += 1;
        self.changes.push_back(ChangeEvent {
            sequence: self.last_sequence,
            kind: T::KIND,
            key: object.key(),
            request_ref: object.request_ref().map(ToOwned::to_owned),
        });
    }

    fn settle<T: StoredObject>(&mut self, effect: WriteEffect<T>) -> T {
        match effect {
            WriteEffect::Stored(object) => {
                self.record(&object);
                object
            }
            WriteEffect::Removed(object) => {
                self.record(&object);
                self.collect_garbage(object.meta().uid.as_str());
                object
            }
        }
    }

    /// Cascades removal of an owner to the RBAC objects it owns.
    fn collect_garbage(&mut self, owner_uid: &str) {
        for role in self.roles.remove_owned_by(owner_uid) {
            self.record(&role);
        }
        for binding in self.bindings.remove_owned_by(owner_uid) {
            self.record(&binding);
        }
    }

    fn keys_of(&self, kind: ObjectKind) -> Vec<ObjectKey> {
        match kind {
            ObjectKind::AccessRequest => self.requests.keys(),
            ObjectKind::AccessResponse => self.responses.keys(),
            ObjectKind::AccessPolicy => self.policies.keys(),
            ObjectKind::AccessGrant => self.grants.keys(),
            ObjectKind::Role => self.roles.keys(),
            ObjectKind::RoleBinding => self.bindings.keys(),
        }
    }
}

/// In-memory implementation of every cluster store port.
#[derive(Debug, Default)]
pub struct InMemoryClusterStore {
    state: RwLock<StoreState>,
}

impl InMemoryClusterStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessRequestStore for InMemoryClusterStore {
    async fn find_request(&self, key: &ObjectKey) -> AppResult<Option<AccessRequest>> {
        Ok(self.state.read().await.requests.find(key))
    }

    async fn create_request(&self, mut request: AccessRequest) -> AppResult<AccessRequest> {
        request.status = AccessRequestStatus::default();
        let mut state = self.state.write().await;
        let version = state.next_version();
        let created = state.requests.create(request, version)?;
        state.record(&created);
        Ok(created)
    }

    async fn update_request_metadata(&self, request: &AccessRequest) -> AppResult<AccessRequest> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let effect = state.requests.update_metadata(request, version)?;
        Ok(state.settle(effect))
    }

    async fn patch_request_status(
        &self,
        base: &AccessRequest,
        status: AccessRequestStatus,
    ) -> AppResult<AccessRequest> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let patched = state.requests.patch_status(base, status, version)?;
        state.record(&patched);
        Ok(patched)
    }

    async fn delete_request(&self, key: &ObjectKey) -> AppResult<()> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let effect = state.requests.delete(key, version)?;
        state.settle(effect);
        Ok(())
    }
}

#[async_trait]
impl AccessResponseStore for InMemoryClusterStore {
    async fn create_response(&self, response: AccessResponse) -> AppResult<AccessResponse> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let created = state.responses.create(response, version)?;
        state.record(&created);
        Ok(created)
    }

    async fn list_responses_for_request(
        &self,
        scope: &ResourceScope,
        request_name: &str,
    ) -> AppResult<Vec<AccessResponse>> {
        Ok(self
            .state
            .read()
            .await
            .responses
            .list()
            .into_iter()
            .filter(|response| {
                &response.scope() == scope && response.spec.request_ref == request_name
            })
            .collect())
    }

    async fn delete_response(&self, key: &ObjectKey) -> AppResult<()> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let effect = state.responses.delete(key, version)?;
        state.settle(effect);
        Ok(())
    }
}

#[async_trait]
impl AccessGrantStore for InMemoryClusterStore {
    async fn find_grant(&self, key: &ObjectKey) -> AppResult<Option<AccessGrant>> {
        Ok(self.state.read().await.grants.find(key))
    }

    async fn create_grant(&self, mut grant: AccessGrant) -> AppResult<AccessGrant> {
        grant.status = GrantStatus::default();
        let mut state = self.state.write().await;
        let version = state.next_version();
        let created = state.grants.create(grant, version)?;
        state.record(&created);
        Ok(created)
    }

    async fn update_grant_metadata(&self, grant: &AccessGrant) -> AppResult<AccessGrant> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let effect = state.grants.update_metadata(grant, version)?;
        Ok(state.settle(effect))
    }

    async fn patch_grant_status(
        &self,
        base: &AccessGrant,
        status: GrantStatus,
    ) -> AppResult<AccessGrant> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let patched = state.grants.patch_status(base, status, version)?;
        state.record(&patched);
        Ok(patched)
    }

    async fn delete_grant(&self, key: &ObjectKey) -> AppResult<()> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let effect = state.grants.delete(key, version)?;
        state.settle(effect);
        Ok(())
    }
}

#[async_trait]
impl PolicySource for InMemoryClusterStore {
    async fn list_policies(&self) -> AppResult<Vec<AccessPolicy>> {
        Ok(self.state.read().await.policies.list())
    }

    async fn save_policy(&self, policy: AccessPolicy) -> AppResult<AccessPolicy> {
        policy.key().validate()?;
        let mut state = self.state.write().await;
        let version = state.next_version();
        let saved = state.policies.upsert(policy, version)?;
        state.record(&saved);
        Ok(saved)
    }

    async fn delete_policy(&self, key: &ObjectKey) -> AppResult<()> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let effect = state.policies.delete(key, version)?;
        state.settle(effect);
        Ok(())
    }
}

#[async_trait]
impl RbacStore for InMemoryClusterStore {
    async fn create_role(&self, role: RbacRole) -> AppResult<RbacRole> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let created = state.roles.create(role, version)?;
        state.record(&created);
        Ok(created)
    }

    async fn create_binding(&self, binding: RbacBinding) -> AppResult<RbacBinding> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let created = state.bindings.create(binding, version)?;
        state.record(&created);
        Ok(created)
    }

    async fn find_role(&self, key: &ObjectKey) -> AppResult<Option<RbacRole>> {
        Ok(self.state.read().await.roles.find(key))
    }

    async fn find_binding(&self, key: &ObjectKey) -> AppResult<Option<RbacBinding>> {
        Ok(self.state.read().await.bindings.find(key))
    }

    async fn delete_role(&self, key: &ObjectKey) -> AppResult<()> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let effect = state.roles.delete(key, version)?;
        state.settle(effect);
        Ok(())
    }

    async fn delete_binding(&self, key: &ObjectKey) -> AppResult<()> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let effect = state.bindings.delete(key, version)?;
        state.settle(effect);
        Ok(())
    }
}

#[async_trait]
impl ClusterChangeFeed for InMemoryClusterStore {
    async fn list_keys(&self, kind: ObjectKind) -> AppResult<ObjectListing> {
        let state = self.state.read().await;
        Ok(ObjectListing {
            keys: state.keys_of(kind),
            cursor: state.last_sequence,
        })
    }

    async fn changes_since(&self, cursor: u64, limit: usize) -> AppResult<ChangeBatch> {
        let state = self.state.read().await;
        let start = state.changes.partition_point(|event| event.sequence <= cursor);
        let events: Vec<ChangeEvent> = state
            .changes
            .iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect();
        let next_cursor = events.last().map_or(cursor, |event| event.sequence);

        Ok(ChangeBatch {
            events,
            next_cursor,
        })
    }

    async fn compact(&self, through: u64) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let drained = state.changes.partition_point(|event| event.sequence <= through);
        state.changes.drain(..drained);
        Ok(u64::try_from(drained).unwrap_or(u64::MAX))
    }
}
