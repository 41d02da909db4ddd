use std::sync::Arc;

use chrono::{TimeDelta, Utc};

use jitgate_core::AppError;
use jitgate_domain::{
    AccessAction, AccessGrant, AccessRequest, AccessRequestSpec, CLEANUP_FINALIZER,
    ClusterObject, GrantStatus, ObjectKey, ObjectMeta, PolicyRule, RBAC_API_GROUP, RbacSubject,
    ResourceScope, RoleKind, RoleRef, adhoc_role_name, role_binding_name,
};

use crate::access_ports::{AccessGrantStore, AccessRequestStore, ReconcileOutcome};
use crate::fake_cluster::FakeCluster;

use super::{EXPIRY_REQUEUE_BUFFER_SECONDS, FALLBACK_ACCESS_SPAN_MINUTES, GrantEngine};

struct Harness {
    cluster: Arc<FakeCluster>,
    engine: GrantEngine,
}

impl Harness {
    fn new() -> Self {
        let cluster = Arc::new(FakeCluster::default());
        let engine = GrantEngine::new(
            cluster.clone(),
            cluster.clone(),
            cluster.clone(),
            cluster.clone(),
        );
        Self { cluster, engine }
    }

    async fn seed(&self, key: &ObjectKey, status: GrantStatus) -> AccessGrant {
        let created = self
            .cluster
            .create_grant(AccessGrant::empty(ObjectMeta::for_key(key)))
            .await
            .unwrap_or_else(|_| unreachable!());
        self.cluster
            .patch_grant_status(&created, status)
            .await
            .unwrap_or_else(|_| unreachable!())
    }

    async fn reconcile(&self, key: &ObjectKey) -> ReconcileOutcome {
        let outcome = self.engine.reconcile(key).await;
        assert!(outcome.is_ok());
        outcome.unwrap_or_else(|_| unreachable!())
    }

    async fn stored(&self, key: &ObjectKey) -> AccessGrant {
        self.cluster
            .grant(key)
            .await
            .unwrap_or_else(|| unreachable!())
    }

    async fn expire_now(&self, key: &ObjectKey) {
        let mut grant = self.stored(key).await;
        grant.status.access_expires_at = Some(Utc::now() - TimeDelta::seconds(1));
        self.cluster.put_grant(grant).await;
    }
}

fn team_a() -> ResourceScope {
    ResourceScope::Namespaced("team-a".to_owned())
}

fn grant_key() -> ObjectKey {
    ObjectKey::namespaced("team-a", "req-1")
}

fn pods_rule() -> PolicyRule {
    PolicyRule {
        api_groups: vec![String::new()],
        resources: vec!["pods".to_owned()],
        verbs: vec!["get".to_owned(), "list".to_owned()],
        ..PolicyRule::default()
    }
}

fn status_in(scope: &ResourceScope) -> GrantStatus {
    let mut status = GrantStatus {
        request: "req-1".to_owned(),
        request_id: "abc".to_owned(),
        subject: "alice".to_owned(),
        approved_by: vec!["bob".to_owned()],
        duration: "30m".to_owned(),
        ..GrantStatus::default()
    };
    status.set_resource_scope(scope);
    status
}

fn role_status() -> GrantStatus {
    GrantStatus {
        role: Some(RoleRef {
            api_group: String::new(),
            kind: RoleKind::Role,
            name: "edit".to_owned(),
        }),
        ..status_in(&team_a())
    }
}

fn permissions_status() -> GrantStatus {
    GrantStatus {
        permissions: vec![pods_rule()],
        ..status_in(&team_a())
    }
}

#[tokio::test]
async fn role_grant_binds_requested_role_once() {
    let harness = Harness::new();
    let key = grant_key();
    let seeded = harness.seed(&key, role_status()).await;

    let before = Utc::now();
    let outcome = harness.reconcile(&key).await;
    let after = Utc::now();

    let grant = harness.stored(&key).await;
    assert!(grant.meta.has_finalizer(CLEANUP_FINALIZER));
    assert!(grant.status.role_binding_created);
    assert!(!grant.status.adhoc_role_created);

    let expires_at = grant
        .status
        .access_expires_at
        .unwrap_or_else(|| unreachable!());
    assert!(expires_at >= before + TimeDelta::minutes(30));
    assert!(expires_at <= after + TimeDelta::minutes(30));
    assert_eq!(
        outcome,
        ReconcileOutcome::RequeueAt(
            expires_at + TimeDelta::seconds(EXPIRY_REQUEUE_BUFFER_SECONDS)
        )
    );

    let binding = harness
        .cluster
        .binding(&team_a().key(role_binding_name("abc")))
        .await
        .unwrap_or_else(|| unreachable!());
    assert_eq!(binding.role_ref.api_group, RBAC_API_GROUP);
    assert_eq!(binding.role_ref.name, "edit");
    assert_eq!(binding.subjects, vec![RbacSubject::for_identity("alice")]);
    assert!(binding.meta.is_owned_by(seeded.meta.uid.as_str()));

    for _ in 0..3 {
        harness.reconcile(&key).await;
    }
    assert_eq!(harness.cluster.binding_creates().await, 1);
    assert_eq!(
        harness.stored(&key).await.status.access_expires_at,
        Some(expires_at)
    );
    assert_eq!(harness.cluster.actions().await, vec![AccessAction::RoleGranted]);
}

#[tokio::test]
async fn permission_grant_creates_adhoc_role_and_binding() {
    let harness = Harness::new();
    let key = grant_key();
    harness.seed(&key, permissions_status()).await;

    harness.reconcile(&key).await;

    let adhoc_key = team_a().key(adhoc_role_name("abc"));
    let role = harness
        .cluster
        .role(&adhoc_key)
        .await
        .unwrap_or_else(|| unreachable!());
    assert_eq!(role.rules, vec![pods_rule()]);
    assert_eq!(role.kind(), RoleKind::Role);

    let binding = harness
        .cluster
        .binding(&adhoc_key)
        .await
        .unwrap_or_else(|| unreachable!());
    assert_eq!(binding.role_ref, RoleRef::new(RoleKind::Role, adhoc_role_name("abc")));

    let grant = harness.stored(&key).await;
    assert!(grant.status.adhoc_role_created);
    assert!(grant.status.adhoc_role_binding_created);
    assert!(!grant.status.role_binding_created);
    assert_eq!(
        harness.cluster.actions().await,
        vec![AccessAction::PermissionsGranted]
    );
}

#[tokio::test]
async fn cluster_grant_provisions_cluster_objects() {
    let harness = Harness::new();
    let key = ObjectKey::cluster("req-1");
    harness
        .seed(
            &key,
            GrantStatus {
                role: Some(RoleRef::new(RoleKind::ClusterRole, "view")),
                permissions: vec![pods_rule()],
                ..status_in(&ResourceScope::Cluster)
            },
        )
        .await;

    harness.reconcile(&key).await;

    assert!(
        harness
            .cluster
            .binding(&ObjectKey::cluster(role_binding_name("abc")))
            .await
            .is_some()
    );
    let binding = harness
        .cluster
        .binding(&ObjectKey::cluster(adhoc_role_name("abc")))
        .await
        .unwrap_or_else(|| unreachable!());
    assert_eq!(binding.role_ref.kind, RoleKind::ClusterRole);
    assert_eq!(binding.kind_name(), "ClusterRoleBinding");
}

#[tokio::test]
async fn cluster_grant_rejects_namespaced_role() {
    let harness = Harness::new();
    let key = ObjectKey::cluster("req-1");
    harness
        .seed(
            &key,
            GrantStatus {
                role: Some(RoleRef::new(RoleKind::Role, "edit")),
                ..status_in(&ResourceScope::Cluster)
            },
        )
        .await;

    let outcome = harness.engine.reconcile(&key).await;
    assert!(matches!(outcome, Err(AppError::Validation(_))));
    assert!(!harness.stored(&key).await.status.role_binding_created);
    assert_eq!(harness.cluster.binding_creates().await, 0);
}

#[tokio::test]
async fn invalid_duration_falls_back_to_default_span() {
    let harness = Harness::new();
    let key = grant_key();
    harness
        .seed(
            &key,
            GrantStatus {
                duration: "a while".to_owned(),
                ..role_status()
            },
        )
        .await;

    let before = Utc::now();
    harness.reconcile(&key).await;
    let after = Utc::now();

    let fallback = TimeDelta::minutes(FALLBACK_ACCESS_SPAN_MINUTES);
    let expires_at = harness
        .stored(&key)
        .await
        .status
        .access_expires_at
        .unwrap_or_else(|| unreachable!());
    assert!(expires_at >= before + fallback && expires_at <= after + fallback);
}

#[tokio::test]
async fn unpopulated_grant_only_gets_finalizer() {
    let harness = Harness::new();
    let key = grant_key();
    let created = harness
        .cluster
        .create_grant(AccessGrant::empty(ObjectMeta::for_key(&key)))
        .await;
    assert!(created.is_ok());

    assert_eq!(harness.reconcile(&key).await, ReconcileOutcome::Done);

    let grant = harness.stored(&key).await;
    assert!(grant.meta.has_finalizer(CLEANUP_FINALIZER));
    assert_eq!(grant.status.access_expires_at, None);
    assert_eq!(harness.cluster.binding_creates().await, 0);
}

#[tokio::test]
async fn existing_binding_counts_as_provisioned() {
    let harness = Harness::new();
    let key = grant_key();
    harness.seed(&key, role_status()).await;
    harness.reconcile(&key).await;

    let mut grant = harness.stored(&key).await;
    grant.status.role_binding_created = false;
    harness.cluster.put_grant(grant).await;

    harness.reconcile(&key).await;
    assert!(harness.stored(&key).await.status.role_binding_created);
    assert_eq!(harness.cluster.binding_creates().await, 1);
}

#[tokio::test]
async fn failed_binding_keeps_earlier_progress() {
    let harness = Harness::new();
    let key = grant_key();
    harness.seed(&key, permissions_status()).await;
    harness.cluster.fail_binding_creates(true).await;

    let outcome = harness.engine.reconcile(&key).await;
    assert!(matches!(outcome, Err(AppError::Internal(_))));

    let grant = harness.stored(&key).await;
    assert!(grant.status.adhoc_role_created);
    assert!(!grant.status.adhoc_role_binding_created);
    let expires_at = grant.status.access_expires_at;
    assert!(expires_at.is_some());

    harness.cluster.fail_binding_creates(false).await;
    harness.reconcile(&key).await;

    let grant = harness.stored(&key).await;
    assert!(grant.status.adhoc_role_binding_created);
    assert_eq!(grant.status.access_expires_at, expires_at);
    assert_eq!(
        harness.cluster.actions().await,
        vec![AccessAction::PermissionsGranted]
    );
}

#[tokio::test]
async fn expired_grant_revokes_access_and_deletes_itself() {
    let harness = Harness::new();
    let key = grant_key();
    let request = harness
        .cluster
        .create_request(AccessRequest::new(
            ObjectMeta::for_key(&key),
            AccessRequestSpec {
                subject: "alice".to_owned(),
                duration: "30m".to_owned(),
                ..AccessRequestSpec::default()
            },
        ))
        .await;
    assert!(request.is_ok());
    harness
        .seed(
            &key,
            GrantStatus {
                permissions: vec![pods_rule()],
                ..role_status()
            },
        )
        .await;
    harness.reconcile(&key).await;
    harness.expire_now(&key).await;

    assert_eq!(harness.reconcile(&key).await, ReconcileOutcome::Done);

    let adhoc_key = team_a().key(adhoc_role_name("abc"));
    assert!(harness.cluster.grant(&key).await.is_none());
    assert!(harness.cluster.request(&key).await.is_none());
    assert!(harness.cluster.role(&adhoc_key).await.is_none());
    assert!(harness.cluster.binding(&adhoc_key).await.is_none());
    assert!(
        harness
            .cluster
            .binding(&team_a().key(role_binding_name("abc")))
            .await
            .is_none()
    );
    assert_eq!(
        harness.cluster.actions().await.last(),
        Some(&AccessAction::GrantExpired)
    );
}

#[tokio::test]
async fn failed_revocation_joins_errors_and_keeps_grant() {
    let harness = Harness::new();
    let key = grant_key();
    harness
        .seed(
            &key,
            GrantStatus {
                permissions: vec![pods_rule()],
                ..role_status()
            },
        )
        .await;
    harness.reconcile(&key).await;
    harness.expire_now(&key).await;

    let adhoc_key = team_a().key(adhoc_role_name("abc"));
    harness
        .cluster
        .fail_deletes_of(team_a().key(role_binding_name("abc")))
        .await;
    harness.cluster.fail_deletes_of(adhoc_key.clone()).await;

    let outcome = harness.engine.reconcile(&key).await;
    match outcome {
        Err(AppError::Joined(errors)) => assert_eq!(errors.len(), 3),
        other => panic!("expected joined errors, got {other:?}"),
    }

    let grant = harness.stored(&key).await;
    assert!(grant.meta.has_finalizer(CLEANUP_FINALIZER));
    assert!(!grant.meta.is_deleting());
    assert!(
        !harness
            .cluster
            .actions()
            .await
            .contains(&AccessAction::GrantExpired)
    );
}

#[tokio::test]
async fn deleted_grant_is_cleaned_before_removal() {
    let harness = Harness::new();
    let key = grant_key();
    harness.seed(&key, role_status()).await;
    harness.reconcile(&key).await;

    assert!(harness.cluster.delete_grant(&key).await.is_ok());
    assert!(harness.stored(&key).await.meta.is_deleting());

    assert_eq!(harness.reconcile(&key).await, ReconcileOutcome::Done);
    assert!(harness.cluster.grant(&key).await.is_none());
    assert!(
        harness
            .cluster
            .binding(&team_a().key(role_binding_name("abc")))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn grant_key_matches_request_key() {
    let harness = Harness::new();
    let key = grant_key();
    let grant = harness.seed(&key, role_status()).await;

    assert_eq!(grant.key(), grant.status.request_key());
}
