use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use jitgate_core::{AppError, AppResult};
use jitgate_domain::{
    AccessAction, AccessGrant, AccessPolicy, AccessRequest, AccessRequestStatus, AccessResponse,
    AccessResponseSpec, ClusterObject, Decision, GrantStatus, ObjectKey, ObjectMeta, RbacBinding,
    RbacRole, ResourceScope, StatusObject,
};

use crate::access_ports::{
    AccessEvent, AccessEventSink, AccessGrantStore, AccessRequestStore, AccessResponseStore,
    PolicySource, RbacStore,
};

struct FakeTable<T> {
    objects: BTreeMap<ObjectKey, T>,
}

impl<T> Default for FakeTable<T> {
    fn default() -> Self {
        Self {
            objects: BTreeMap::new(),
        }
    }
}

impl<T: ClusterObject> FakeTable<T> {
    fn find(&self, key: &ObjectKey) -> Option<T> {
        self.objects.get(key).cloned()
    }

    fn create(&mut self, mut object: T, version: &mut u64) -> AppResult<T> {
        let key = object.key();
        if self.objects.contains_key(&key) {
            return Err(AppError::AlreadyExists(format!(
                "{} '{key}' already exists",
                T::KIND.as_str()
            )));
        }

        *version += 1;
        let meta = object.meta_mut();
        meta.uid = format!("uid-{version}");
        meta.resource_version = *version;
        meta.creation_timestamp = Some(Utc::now());
        meta.deletion_timestamp = None;
        self.objects.insert(key, object.clone());
        Ok(object)
    }

    fn current(&self, object: &T) -> AppResult<&T> {
        let key = object.key();
        let stored = self.objects.get(&key).ok_or_else(|| {
            AppError::NotFound(format!("{} '{key}' does not exist", T::KIND.as_str()))
        })?;
        if stored.meta().resource_version != object.meta().resource_version {
            return Err(AppError::Conflict(format!(
                "{} '{key}' was modified",
                T::KIND.as_str()
            )));
        }
        Ok(stored)
    }

    fn update_metadata(&mut self, object: &T, version: &mut u64) -> AppResult<T> {
        let mut stored = self.current(object)?.clone();
        let key = object.key();
        let deletion_timestamp = stored.meta().deletion_timestamp;

        *version += 1;
        let meta = stored.meta_mut();
        meta.finalizers = object.meta().finalizers.clone();
        meta.owner_references = object.meta().owner_references.clone();
        meta.resource_version = *version;
        meta.deletion_timestamp = deletion_timestamp;

        if stored.meta().is_deleting() && stored.meta().finalizers.is_empty() {
            self.objects.remove(&key);
        } else {
            self.objects.insert(key, stored.clone());
        }
        Ok(stored)
    }

    fn delete(&mut self, key: &ObjectKey, version: &mut u64) -> AppResult<()> {
        let Some(stored) = self.objects.get_mut(key) else {
            return Err(AppError::NotFound(format!(
                "{} '{key}' does not exist",
                T::KIND.as_str()
            )));
        };

        if stored.meta().finalizers.is_empty() {
            self.objects.remove(key);
        } else if !stored.meta().is_deleting() {
            *version += 1;
            let meta = stored.meta_mut();
            meta.deletion_timestamp = Some(Utc::now());
            meta.resource_version = *version;
        }
        Ok(())
    }
}

impl<T: StatusObject> FakeTable<T> {
    fn patch_status(&mut self, base: &T, status: T::Status, version: &mut u64) -> AppResult<T> {
        let mut stored = self.current(base)?.clone();
        *version += 1;
        stored.set_status(status);
        stored.meta_mut().resource_version = *version;
        self.objects.insert(stored.key(), stored.clone());
        Ok(stored)
    }
}

#[derive(Default)]
struct FakeState {
    version: u64,
    requests: FakeTable<AccessRequest>,
    responses: FakeTable<AccessResponse>,
    grants: FakeTable<AccessGrant>,
    policies: FakeTable<AccessPolicy>,
    roles: FakeTable<RbacRole>,
    bindings: FakeTable<RbacBinding>,
    events: Vec<AccessEvent>,
    grant_creates: usize,
    binding_creates: usize,
    failing_deletes: BTreeSet<ObjectKey>,
    failing_binding_creates: bool,
    failing_sink: bool,
}

/// In-process store double implementing every engine port.
#[derive(Default)]
pub(crate) struct FakeCluster {
    state: Mutex<FakeState>,
}

impl FakeCluster {
    pub(crate) async fn request(&self, key: &ObjectKey) -> Option<AccessRequest> {
        self.state.lock().await.requests.find(key)
    }

    pub(crate) async fn grant(&self, key: &ObjectKey) -> Option<AccessGrant> {
        self.state.lock().await.grants.find(key)
    }

    pub(crate) async fn role(&self, key: &ObjectKey) -> Option<RbacRole> {
        self.state.lock().await.roles.find(key)
    }

    pub(crate) async fn binding(&self, key: &ObjectKey) -> Option<RbacBinding> {
        self.state.lock().await.bindings.find(key)
    }

    pub(crate) async fn grant_count(&self) -> usize {
        self.state.lock().await.grants.objects.len()
    }

    pub(crate) async fn response_count(&self) -> usize {
        self.state.lock().await.responses.objects.len()
    }

    pub(crate) async fn grant_creates(&self) -> usize {
        self.state.lock().await.grant_creates
    }

    pub(crate) async fn binding_creates(&self) -> usize {
        self.state.lock().await.binding_creates
    }

    pub(crate) async fn actions(&self) -> Vec<AccessAction> {
        self.state
            .lock()
            .await
            .events
            .iter()
            .map(|event| event.action)
            .collect()
    }

    pub(crate) async fn fail_deletes_of(&self, key: ObjectKey) {
        self.state.lock().await.failing_deletes.insert(key);
    }

    pub(crate) async fn fail_binding_creates(&self, failing: bool) {
        self.state.lock().await.failing_binding_creates = failing;
    }

    pub(crate) async fn fail_event_sink(&self) {
        self.state.lock().await.failing_sink = true;
    }

    /// Overwrites a stored grant, bypassing version checks.
    pub(crate) async fn put_grant(&self, grant: AccessGrant) {
        self.state
            .lock()
            .await
            .grants
            .objects
            .insert(grant.key(), grant);
    }

    /// Overwrites a stored request, bypassing version checks.
    pub(crate) async fn put_request(&self, request: AccessRequest) {
        self.state
            .lock()
            .await
            .requests
            .objects
            .insert(request.key(), request);
    }

    pub(crate) async fn respond(
        &self,
        request: &ObjectKey,
        name: &str,
        approver: &str,
        decision: Decision,
    ) -> AppResult<AccessResponse> {
        self.create_response(AccessResponse {
            meta: ObjectMeta::for_key(&request.scope().key(name)),
            spec: AccessResponseSpec {
                request_ref: request.name.clone(),
                approver: approver.to_owned(),
                response: decision,
            },
        })
        .await
    }

    fn check_delete(state: &FakeState, key: &ObjectKey) -> AppResult<()> {
        if state.failing_deletes.contains(key) {
            return Err(AppError::Internal(format!("injected delete failure for '{key}'")));
        }
        Ok(())
    }
}

#[async_trait]
impl AccessRequestStore for FakeCluster {
    async fn find_request(&self, key: &ObjectKey) -> AppResult<Option<AccessRequest>> {
        Ok(self.state.lock().await.requests.find(key))
    }

    async fn create_request(&self, mut request: AccessRequest) -> AppResult<AccessRequest> {
        request.status = AccessRequestStatus::default();
        let state = &mut *self.state.lock().await;
        state.requests.create(request, &mut state.version)
    }

    async fn update_request_metadata(&self, request: &AccessRequest) -> AppResult<AccessRequest> {
        let state = &mut *self.state.lock().await;
        state.requests.update_metadata(request, &mut state.version)
    }

    async fn patch_request_status(
        &self,
        base: &AccessRequest,
        status: AccessRequestStatus,
    ) -> AppResult<AccessRequest> {
        let state = &mut *self.state.lock().await;
        state.requests.patch_status(base, status, &mut state.version)
    }

    async fn delete_request(&self, key: &ObjectKey) -> AppResult<()> {
        let state = &mut *self.state.lock().await;
        Self::check_delete(state, key)?;
        state.requests.delete(key, &mut state.version)
    }
}

#[async_trait]
impl AccessResponseStore for FakeCluster {
    async fn create_response(&self, response: AccessResponse) -> AppResult<AccessResponse> {
        let state = &mut *self.state.lock().await;
        state.responses.create(response, &mut state.version)
    }

    async fn list_responses_for_request(
        &self,
        scope: &ResourceScope,
        request_name: &str,
    ) -> AppResult<Vec<AccessResponse>> {
        Ok(self
            .state
            .lock()
            .await
            .responses
            .objects
            .values()
            .filter(|response| {
                &response.scope() == scope && response.spec.request_ref == request_name
            })
            .cloned()
            .collect())
    }

    async fn delete_response(&self, key: &ObjectKey) -> AppResult<()> {
        let state = &mut *self.state.lock().await;
        state.responses.delete(key, &mut state.version)
    }
}

#[async_trait]
impl AccessGrantStore for FakeCluster {
    async fn find_grant(&self, key: &ObjectKey) -> AppResult<Option<AccessGrant>> {
        Ok(self.state.lock().await.grants.find(key))
    }

    async fn create_grant(&self, mut grant: AccessGrant) -> AppResult<AccessGrant> {
        grant.status = GrantStatus::default();
        let state = &mut *self.state.lock().await;
        let created = state.grants.create(grant, &mut state.version)?;
        state.grant_creates += 1;
        Ok(created)
    }

    async fn update_grant_metadata(&self, grant: &AccessGrant) -> AppResult<AccessGrant> {
        let state = &mut *self.state.lock().await;
        state.grants.update_metadata(grant, &mut state.version)
    }

    async fn patch_grant_status(
        &self,
        base: &AccessGrant,
        status: GrantStatus,
    ) -> AppResult<AccessGrant> {
        let state = &mut *self.state.lock().await;
        state.grants.patch_status(base, status, &mut state.version)
    }

    async fn delete_grant(&self, key: &ObjectKey) -> AppResult<()> {
        let state = &mut *self.state.lock().await;
        state.grants.delete(key, &mut state.version)
    }
}

#[async_trait]
impl PolicySource for FakeCluster {
    async fn list_policies(&self) -> AppResult<Vec<AccessPolicy>> {
        Ok(self
            .state
            .lock()
            .await
            .policies
            .objects
            .values()
            .cloned()
            .collect())
    }

    async fn save_policy(&self, policy: AccessPolicy) -> AppResult<AccessPolicy> {
        let state = &mut *self.state.lock().await;
        state.policies.objects.remove(&policy.key());
        state.policies.create(policy, &mut state.version)
    }

    async fn delete_policy(&self, key: &ObjectKey) -> AppResult<()> {
        let state = &mut *self.state.lock().await;
        state.policies.delete(key, &mut state.version)
    }
}

#[async_trait]
impl RbacStore for FakeCluster {
    async fn create_role(&self, role: RbacRole) -> AppResult<RbacRole> {
        let state = &mut *self.state.lock().await;
        state.roles.create(role, &mut state.version)
    }

    async fn create_binding(&self, binding: RbacBinding) -> AppResult<RbacBinding> {
        let state = &mut *self.state.lock().await;
        if state.failing_binding_creates {
            return Err(AppError::Internal(format!(
                "injected create failure for '{}'",
                binding.key()
            )));
        }
        let created = state.bindings.create(binding, &mut state.version)?;
        state.binding_creates += 1;
        Ok(created)
    }

    async fn find_role(&self, key: &ObjectKey) -> AppResult<Option<RbacRole>> {
        Ok(self.state.lock().await.roles.find(key))
    }

    async fn find_binding(&self, key: &ObjectKey) -> AppResult<Option<RbacBinding>> {
        Ok(self.state.lock().await.bindings.find(key))
    }

    async fn delete_role(&self, key: &ObjectKey) -> AppResult<()> {
        let state = &mut *self.state.lock().await;
        Self::check_delete(state, key)?;
        state.roles.delete(key, &mut state.version)
    }

    async fn delete_binding(&self, key: &ObjectKey) -> AppResult<()> {
        let state = &mut *self.state.lock().await;
        Self::check_delete(state, key)?;
        state.bindings.delete(key, &mut state.version)
    }
}

#[async_trait]
impl AccessEventSink for FakeCluster {
    async fn record(&self, event: AccessEvent) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.failing_sink {
            return Err(AppError::Internal("event sink unavailable".to_owned()));
        }
        state.events.push(event);
        Ok(())
    }
}
