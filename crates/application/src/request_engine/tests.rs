use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use jitgate_core::AppError;
use jitgate_domain::{
    AccessAction, AccessGrant, AccessPolicy, AccessRequest, AccessRequestSpec, CLEANUP_FINALIZER,
    Decision, GrantScope, ObjectKey, ObjectMeta, RequestState, RoleKind, RoleRef, SubjectMatcher,
    SubjectPolicy,
};

use crate::access_ports::{
    AccessGrantStore, AccessRequestStore, AccessResponseStore, ReconcileOutcome,
};
use crate::fake_cluster::FakeCluster;
use crate::policy_store::PolicyStore;

use super::{APPROVED_RECHECK_BUFFER_SECONDS, DECISION_WINDOW_MINUTES, RequestEngine};

struct Harness {
    cluster: Arc<FakeCluster>,
    policies: Arc<PolicyStore>,
    engine: RequestEngine,
}

impl Harness {
    fn new() -> Self {
        let cluster = Arc::new(FakeCluster::default());
        let policies = Arc::new(PolicyStore::new());
        let engine = RequestEngine::new(
            cluster.clone(),
            cluster.clone(),
            cluster.clone(),
            policies.clone(),
            cluster.clone(),
        );
        Self {
            cluster,
            policies,
            engine,
        }
    }

    fn with_policy(policy: SubjectPolicy) -> Self {
        let harness = Self::new();
        harness.policies.update(vec![AccessPolicy {
            meta: ObjectMeta::for_key(&ObjectKey::namespaced("team-a", "oncall")),
            policies: vec![policy],
        }]);
        harness
    }

    async fn submit(&self, key: &ObjectKey, spec: AccessRequestSpec) {
        let created = self
            .cluster
            .create_request(AccessRequest::new(ObjectMeta::for_key(key), spec))
            .await;
        assert!(created.is_ok());
    }

    async fn reconcile(&self, key: &ObjectKey) -> ReconcileOutcome {
        let outcome = self.engine.reconcile(key).await;
        assert!(outcome.is_ok());
        outcome.unwrap_or_else(|_| unreachable!())
    }

    async fn stored(&self, key: &ObjectKey) -> AccessRequest {
        self.cluster
            .request(key)
            .await
            .unwrap_or_else(|| unreachable!())
    }

    async fn respond(&self, key: &ObjectKey, name: &str, approver: &str, decision: Decision) {
        let response = self.cluster.respond(key, name, approver, decision).await;
        assert!(response.is_ok());
    }
}

fn oncall_policy(required_approvals: u32) -> SubjectPolicy {
    SubjectPolicy {
        requesters: vec![SubjectMatcher::user("alice")],
        allowed_roles: vec![RoleRef::new(RoleKind::Role, "edit")],
        allowed_permissions: Vec::new(),
        max_duration: "2h".to_owned(),
        required_approvals,
        approvers: vec![SubjectMatcher::user("bob")],
        priority: 0,
        notification_config: None,
    }
}

fn alice_spec() -> AccessRequestSpec {
    AccessRequestSpec {
        subject: "alice".to_owned(),
        role: Some(RoleRef::new(RoleKind::Role, "edit")),
        duration: "30m".to_owned(),
        justification: "incident 4711".to_owned(),
        ..AccessRequestSpec::default()
    }
}

fn request_key() -> ObjectKey {
    ObjectKey::namespaced("team-a", "req-1")
}

fn assert_requeued_within(
    outcome: ReconcileOutcome,
    before: DateTime<Utc>,
    after: DateTime<Utc>,
    offset: TimeDelta,
) {
    match outcome {
        ReconcileOutcome::RequeueAt(at) => {
            assert!(at >= before + offset);
            assert!(at <= after + offset);
        }
        ReconcileOutcome::Done => panic!("expected a requeue"),
    }
}

#[tokio::test]
async fn first_reconcile_registers_request() {
    let harness = Harness::with_policy(oncall_policy(1));
    let key = request_key();
    harness.submit(&key, alice_spec()).await;

    let before = Utc::now();
    let outcome = harness.reconcile(&key).await;
    let after = Utc::now();

    let request = harness.stored(&key).await;
    assert!(!request.status.request_id.is_empty());
    assert_eq!(request.status.state, RequestState::Pending);
    assert_eq!(request.status.approvals_required, 1);
    assert_eq!(request.status.approvals_received, 0);
    assert!(request.meta.has_finalizer(CLEANUP_FINALIZER));

    let window = TimeDelta::minutes(DECISION_WINDOW_MINUTES);
    let deadline = request
        .status
        .request_expires_at
        .unwrap_or_else(|| unreachable!());
    assert!(deadline >= before + window && deadline <= after + window);
    assert_eq!(outcome, ReconcileOutcome::RequeueAt(deadline));
    assert_eq!(harness.cluster.actions().await, vec![AccessAction::RequestCreated]);
}

#[tokio::test]
async fn request_id_and_deadline_are_stable_across_reconciles() {
    let harness = Harness::with_policy(oncall_policy(1));
    let key = request_key();
    harness.submit(&key, alice_spec()).await;

    harness.reconcile(&key).await;
    let first = harness.stored(&key).await;
    harness.reconcile(&key).await;
    let second = harness.stored(&key).await;

    assert_eq!(first.status, second.status);
    assert_eq!(first.meta.resource_version, second.meta.resource_version);
    assert_eq!(harness.cluster.actions().await.len(), 1);
}

#[tokio::test]
async fn approval_creates_exactly_one_grant() {
    let harness = Harness::with_policy(oncall_policy(1));
    let key = request_key();
    harness.submit(&key, alice_spec()).await;

    harness.reconcile(&key).await;
    harness.respond(&key, "resp-1", "bob", Decision::Approved).await;

    let before = Utc::now();
    let outcome = harness.reconcile(&key).await;
    let after = Utc::now();

    let request = harness.stored(&key).await;
    assert_eq!(request.status.state, RequestState::Approved);
    assert_eq!(request.status.approvals_received, 1);
    assert!(request.status.grant_created);
    assert_requeued_within(
        outcome,
        before,
        after,
        TimeDelta::minutes(30) + TimeDelta::seconds(APPROVED_RECHECK_BUFFER_SECONDS),
    );

    let grant = harness
        .cluster
        .grant(&key)
        .await
        .unwrap_or_else(|| unreachable!());
    assert_eq!(grant.status.request, "req-1");
    assert_eq!(grant.status.request_id, request.status.request_id);
    assert_eq!(grant.status.subject, "alice");
    assert_eq!(grant.status.approved_by, vec!["bob".to_owned()]);
    assert_eq!(grant.status.duration, "30m");
    assert_eq!(grant.status.scope, GrantScope::Namespace);
    assert_eq!(grant.status.namespace, "team-a");
    assert_eq!(grant.status.access_expires_at, None);

    harness.reconcile(&key).await;
    assert_eq!(harness.cluster.grant_count().await, 1);
    assert_eq!(harness.cluster.grant_creates().await, 1);
    assert_eq!(
        harness.cluster.actions().await,
        vec![AccessAction::RequestCreated, AccessAction::RequestApproved]
    );
}

#[tokio::test]
async fn any_denial_wins_over_approvals() {
    let harness = Harness::with_policy(oncall_policy(2));
    let key = request_key();
    harness.submit(&key, alice_spec()).await;

    harness.reconcile(&key).await;
    harness.respond(&key, "resp-1", "bob", Decision::Approved).await;
    harness.respond(&key, "resp-2", "carol", Decision::Approved).await;
    harness.respond(&key, "resp-3", "dave", Decision::Denied).await;

    let outcome = harness.reconcile(&key).await;
    let request = harness.stored(&key).await;
    assert_eq!(request.status.state, RequestState::Denied);
    assert!(!request.status.grant_created);
    assert_eq!(harness.cluster.grant_count().await, 0);

    let deadline = request
        .status
        .request_expires_at
        .unwrap_or_else(|| unreachable!());
    assert_eq!(outcome, ReconcileOutcome::RequeueAt(deadline));
    assert!(
        harness
            .cluster
            .actions()
            .await
            .contains(&AccessAction::RequestDenied)
    );
}

#[tokio::test]
async fn denied_request_is_not_reopened_by_later_approvals() {
    let harness = Harness::with_policy(oncall_policy(1));
    let key = request_key();
    harness.submit(&key, alice_spec()).await;

    harness.reconcile(&key).await;
    harness.respond(&key, "resp-1", "carol", Decision::Denied).await;
    harness.reconcile(&key).await;
    harness.respond(&key, "resp-2", "bob", Decision::Approved).await;
    harness.reconcile(&key).await;

    assert_eq!(harness.stored(&key).await.status.state, RequestState::Denied);
    assert_eq!(harness.cluster.grant_count().await, 0);
}

#[tokio::test]
async fn self_approval_is_ignored() {
    let harness = Harness::with_policy(oncall_policy(1));
    let key = request_key();
    harness.submit(&key, alice_spec()).await;

    harness.reconcile(&key).await;
    harness.respond(&key, "resp-1", "alice", Decision::Approved).await;
    harness.reconcile(&key).await;

    let request = harness.stored(&key).await;
    assert_eq!(request.status.state, RequestState::Pending);
    assert_eq!(request.status.approvals_received, 0);
    assert_eq!(harness.cluster.grant_count().await, 0);
}

#[tokio::test]
async fn repeated_approvals_from_one_approver_count_once() {
    let harness = Harness::with_policy(oncall_policy(2));
    let key = request_key();
    harness.submit(&key, alice_spec()).await;

    harness.reconcile(&key).await;
    harness.respond(&key, "resp-1", "bob", Decision::Approved).await;
    harness.respond(&key, "resp-2", "bob", Decision::Approved).await;
    harness.reconcile(&key).await;

    let request = harness.stored(&key).await;
    assert_eq!(request.status.state, RequestState::Pending);
    assert_eq!(request.status.approvals_received, 1);
    assert_eq!(request.status.approvals_required, 2);
}

#[tokio::test]
async fn unmatched_request_persists_bootstrap_and_stays_pending() {
    let harness = Harness::new();
    let key = request_key();
    harness.submit(&key, alice_spec()).await;

    let outcome = harness.engine.reconcile(&key).await;
    assert!(matches!(outcome, Err(AppError::PolicyNotMatched(_))));

    let request = harness.stored(&key).await;
    assert!(!request.status.request_id.is_empty());
    assert!(request.status.request_expires_at.is_some());
    assert_eq!(request.status.state, RequestState::Pending);
    assert_eq!(request.status.approvals_required, 0);
}

#[tokio::test]
async fn request_over_max_duration_is_not_matched() {
    let harness = Harness::with_policy(oncall_policy(1));
    let key = request_key();
    harness
        .submit(
            &key,
            AccessRequestSpec {
                duration: "2h".to_owned(),
                ..alice_spec()
            },
        )
        .await;

    let outcome = harness.engine.reconcile(&key).await;
    assert!(matches!(outcome, Err(AppError::PolicyNotMatched(_))));
}

#[tokio::test]
async fn missed_deadline_expires_request_and_its_responses() {
    let harness = Harness::with_policy(oncall_policy(2));
    let key = request_key();
    harness.submit(&key, alice_spec()).await;

    harness.reconcile(&key).await;
    harness.respond(&key, "resp-1", "bob", Decision::Approved).await;

    let mut request = harness.stored(&key).await;
    request.status.request_expires_at = Some(Utc::now() - TimeDelta::seconds(1));
    harness.cluster.put_request(request).await;

    assert_eq!(harness.reconcile(&key).await, ReconcileOutcome::Done);
    assert_eq!(harness.cluster.response_count().await, 0);

    let deleting = harness.stored(&key).await;
    assert_eq!(deleting.status.state, RequestState::Expired);
    assert!(deleting.meta.is_deleting());

    assert_eq!(harness.reconcile(&key).await, ReconcileOutcome::Done);
    assert!(harness.cluster.request(&key).await.is_none());
    assert!(
        harness
            .cluster
            .actions()
            .await
            .contains(&AccessAction::RequestExpired)
    );
}

#[tokio::test]
async fn denied_request_expires_at_deadline() {
    let harness = Harness::with_policy(oncall_policy(1));
    let key = request_key();
    harness.submit(&key, alice_spec()).await;

    harness.reconcile(&key).await;
    harness.respond(&key, "resp-1", "carol", Decision::Denied).await;
    harness.reconcile(&key).await;

    let mut request = harness.stored(&key).await;
    request.status.request_expires_at = Some(Utc::now() - TimeDelta::seconds(1));
    harness.cluster.put_request(request).await;

    assert_eq!(harness.reconcile(&key).await, ReconcileOutcome::Done);
    assert_eq!(harness.stored(&key).await.status.state, RequestState::Expired);
}

#[tokio::test]
async fn approved_request_never_expires() {
    let harness = Harness::with_policy(oncall_policy(1));
    let key = request_key();
    harness.submit(&key, alice_spec()).await;

    harness.reconcile(&key).await;
    harness.respond(&key, "resp-1", "bob", Decision::Approved).await;
    harness.reconcile(&key).await;

    let mut request = harness.stored(&key).await;
    request.status.request_expires_at = Some(Utc::now() - TimeDelta::minutes(5));
    harness.cluster.put_request(request).await;

    let outcome = harness.reconcile(&key).await;
    assert!(matches!(outcome, ReconcileOutcome::RequeueAt(_)));

    let request = harness.stored(&key).await;
    assert_eq!(request.status.state, RequestState::Approved);
    assert!(!request.meta.is_deleting());
}

#[tokio::test]
async fn deleting_request_cleans_responses_and_releases_finalizer() {
    let harness = Harness::with_policy(oncall_policy(2));
    let key = request_key();
    harness.submit(&key, alice_spec()).await;

    harness.reconcile(&key).await;
    harness.respond(&key, "resp-1", "bob", Decision::Approved).await;
    assert!(harness.cluster.delete_request(&key).await.is_ok());
    assert!(harness.stored(&key).await.meta.is_deleting());

    assert_eq!(harness.reconcile(&key).await, ReconcileOutcome::Done);
    assert!(harness.cluster.request(&key).await.is_none());
    assert_eq!(harness.cluster.response_count().await, 0);
}

#[tokio::test]
async fn responses_for_other_requests_are_left_alone() {
    let harness = Harness::with_policy(oncall_policy(2));
    let key = request_key();
    let other = ObjectKey::namespaced("team-a", "req-2");
    harness.submit(&key, alice_spec()).await;

    harness.reconcile(&key).await;
    harness.respond(&other, "resp-other", "bob", Decision::Approved).await;
    assert!(harness.cluster.delete_request(&key).await.is_ok());
    harness.reconcile(&key).await;

    assert_eq!(harness.cluster.response_count().await, 1);
}

#[tokio::test]
async fn existing_empty_grant_is_adopted_and_populated() {
    let harness = Harness::with_policy(oncall_policy(1));
    let key = request_key();
    harness.submit(&key, alice_spec()).await;
    let created = harness
        .cluster
        .create_grant(AccessGrant::empty(ObjectMeta::for_key(&key)))
        .await;
    assert!(created.is_ok());

    harness.reconcile(&key).await;
    harness.respond(&key, "resp-1", "bob", Decision::Approved).await;
    harness.reconcile(&key).await;

    let grant = harness
        .cluster
        .grant(&key)
        .await
        .unwrap_or_else(|| unreachable!());
    assert!(grant.status.is_populated());
    assert_eq!(harness.cluster.grant_creates().await, 1);
    assert!(harness.stored(&key).await.status.grant_created);
}

#[tokio::test]
async fn cluster_request_resolves_against_cluster_policies() {
    let harness = Harness::new();
    harness.policies.update(vec![
        AccessPolicy {
            meta: ObjectMeta::for_key(&ObjectKey::namespaced("team-a", "oncall")),
            policies: vec![oncall_policy(1)],
        },
        AccessPolicy {
            meta: ObjectMeta::for_key(&ObjectKey::cluster("platform")),
            policies: vec![SubjectPolicy {
                allowed_roles: vec![RoleRef::new(RoleKind::ClusterRole, "view")],
                ..oncall_policy(1)
            }],
        },
    ]);
    let key = ObjectKey::cluster("req-cluster");
    harness
        .submit(
            &key,
            AccessRequestSpec {
                role: Some(RoleRef::new(RoleKind::ClusterRole, "view")),
                ..alice_spec()
            },
        )
        .await;

    harness.reconcile(&key).await;
    harness.respond(&key, "resp-1", "bob", Decision::Approved).await;
    harness.reconcile(&key).await;

    let grant = harness
        .cluster
        .grant(&key)
        .await
        .unwrap_or_else(|| unreachable!());
    assert_eq!(grant.status.scope, GrantScope::Cluster);
    assert!(grant.status.namespace.is_empty());
}

#[tokio::test]
async fn event_sink_failures_do_not_fail_reconcile() {
    let harness = Harness::with_policy(oncall_policy(1));
    harness.cluster.fail_event_sink().await;
    let key = request_key();
    harness.submit(&key, alice_spec()).await;

    harness.reconcile(&key).await;
    assert!(harness.cluster.actions().await.is_empty());
}

#[tokio::test]
async fn missing_request_is_done() {
    let harness = Harness::with_policy(oncall_policy(1));
    assert_eq!(
        harness.reconcile(&request_key()).await,
        ReconcileOutcome::Done
    );
    assert!(
        harness
            .cluster
            .list_responses_for_request(&request_key().scope(), "req-1")
            .await
            .is_ok()
    );
}
