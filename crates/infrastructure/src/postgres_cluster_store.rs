//! PostgreSQL-backed cluster store.
//!
//! Objects are stored as JSON documents keyed by kind, namespace and name.
//! Every write allocates a resource version from one sequence and appends a
//! row to `cluster_object_changes`, which backs the change feed.

use async_trait::async_trait;
use jitgate_application::{
    AccessGrantStore, AccessRequestStore, AccessResponseStore, ChangeBatch, ChangeEvent,
    ClusterChangeFeed, ObjectListing, PolicySource, RbacStore,
};
use jitgate_core::{AppError, AppResult};
use jitgate_domain::{
    AccessGrant, AccessPolicy, AccessRequest, AccessRequestStatus, AccessResponse, GrantStatus,
    ObjectKey, ObjectKind, RbacBinding, RbacRole, ResourceScope,
};
use sqlx::{FromRow, PgPool};

mod objects;

/// PostgreSQL implementation of every cluster store port.
#[derive(Clone)]
pub struct PostgresClusterStore {
    pool: PgPool,
}

impl PostgresClusterStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ChangeRow {
    sequence: i64,
    kind: String,
    namespace: String,
    name: String,
    request_ref: Option<String>,
}

impl ChangeRow {
    fn into_event(self) -> AppResult<ChangeEvent> {
        let sequence = u64::try_from(self.sequence).map_err(|_| {
            AppError::Internal(format!("change sequence {} is negative", self.sequence))
        })?;
        Ok(ChangeEvent {
            sequence,
            kind: ObjectKind::parse(self.kind.as_str())?,
            key: key_from_columns(self.namespace, self.name),
            request_ref: self.request_ref,
        })
    }
}

/// Cluster-scoped objects are stored with an empty namespace column.
fn key_from_columns(namespace: String, name: String) -> ObjectKey {
    if namespace.is_empty() {
        ObjectKey::cluster(name)
    } else {
        ObjectKey::namespaced(namespace, name)
    }
}

#[async_trait]
impl AccessRequestStore for PostgresClusterStore {
    async fn find_request(&self, key: &ObjectKey) -> AppResult<Option<AccessRequest>> {
        self.find_object(key).await
    }

    async fn create_request(&self, mut request: AccessRequest) -> AppResult<AccessRequest> {
        request.status = AccessRequestStatus::default();
        self.create_object(request).await
    }

    async fn update_request_metadata(&self, request: &AccessRequest) -> AppResult<AccessRequest> {
        self.update_object_metadata(request).await
    }

    async fn patch_request_status(
        &self,
        base: &AccessRequest,
        status: AccessRequestStatus,
    ) -> AppResult<AccessRequest> {
        self.patch_object_status(base, status).await
    }

    async fn delete_request(&self, key: &ObjectKey) -> AppResult<()> {
        self.delete_object::<AccessRequest>(key).await
    }
}

#[async_trait]
impl AccessResponseStore for PostgresClusterStore {
    async fn create_response(&self, response: AccessResponse) -> AppResult<AccessResponse> {
        self.create_object(response).await
    }

    async fn list_responses_for_request(
        &self,
        scope: &ResourceScope,
        request_name: &str,
    ) -> AppResult<Vec<AccessResponse>> {
        self.list_referencing(scope, request_name).await
    }

    async fn delete_response(&self, key: &ObjectKey) -> AppResult<()> {
        self.delete_object::<AccessResponse>(key).await
    }
}

#[async_trait]
impl AccessGrantStore for PostgresClusterStore {
    async fn find_grant(&self, key: &ObjectKey) -> AppResult<Option<AccessGrant>> {
        self.find_object(key).await
    }

    async fn create_grant(&self, mut grant: AccessGrant) -> AppResult<AccessGrant> {
        grant.status = GrantStatus::default();
        self.create_object(grant).await
    }

    async fn update_grant_metadata(&self, grant: &AccessGrant) -> AppResult<AccessGrant> {
        self.update_object_metadata(grant).await
    }

    async fn patch_grant_status(
        &self,
        base: &AccessGrant,
        status: GrantStatus,
    ) -> AppResult<AccessGrant> {
        self.patch_object_status(base, status).await
    }

    async fn delete_grant(&self, key: &ObjectKey) -> AppResult<()> {
        self.delete_object::<AccessGrant>(key).await
    }
}

#[async_trait]
impl PolicySource for PostgresClusterStore {
    async fn list_policies(&self) -> AppResult<Vec<AccessPolicy>> {
        self.list_objects().await
    }

    async fn save_policy(&self, policy: AccessPolicy) -> AppResult<AccessPolicy> {
        self.upsert_object(policy).await
    }

    async fn delete_policy(&self, key: &ObjectKey) -> AppResult<()> {
        self.delete_object::<AccessPolicy>(key).await
    }
}

#[async_trait]
impl RbacStore for PostgresClusterStore {
    async fn create_role(&self, role: RbacRole) -> AppResult<RbacRole> {
        self.create_object(role).await
    }

    async fn create_binding(&self, binding: RbacBinding) -> AppResult<RbacBinding> {
        self.create_object(binding).await
    }

    async fn find_role(&self, key: &ObjectKey) -> AppResult<Option<RbacRole>> {
        self.find_object(key).await
    }

    async fn find_binding(&self, key: &ObjectKey) -> AppResult<Option<RbacBinding>> {
        self.find_object(key).await
    }

    async fn delete_role(&self, key: &ObjectKey) -> AppResult<()> {
        self.delete_object::<RbacRole>(key).await
    }

    async fn delete_binding(&self, key: &ObjectKey) -> AppResult<()> {
        self.delete_object::<RbacBinding>(key).await
    }
}

#[async_trait]
impl ClusterChangeFeed for PostgresClusterStore {
    async fn list_keys(&self, kind: ObjectKind) -> AppResult<ObjectListing> {
        // The head is read before the keys so no later write can fall between them.
        let head = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(sequence), 0) FROM cluster_object_changes",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to read change head: {error}")))?;
        let cursor = u64::try_from(head)
            .map_err(|_| AppError::Internal(format!("change sequence {head} is negative")))?;

        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT namespace, name
            FROM cluster_objects
            WHERE kind = $1
            ORDER BY namespace, name
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list {} keys: {error}", kind.as_str()))
        })?;

        let keys = rows
            .into_iter()
            .map(|(namespace, name)| key_from_columns(namespace, name))
            .collect();

        Ok(ObjectListing { keys, cursor })
    }

    async fn changes_since(&self, cursor: u64, limit: usize) -> AppResult<ChangeBatch> {
        let cursor_column = i64::try_from(cursor)
            .map_err(|_| AppError::Validation(format!("change cursor {cursor} is out of range")))?;
        let limit_column = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query_as::<_, ChangeRow>(
            r#"
            SELECT sequence, kind, namespace, name, request_ref
            FROM cluster_object_changes
            WHERE sequence > $1
            ORDER BY sequence
            LIMIT $2
            "#,
        )
        .bind(cursor_column)
        .bind(limit_column)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to read object changes: {error}")))?;

        let events = rows
            .into_iter()
            .map(ChangeRow::into_event)
            .collect::<AppResult<Vec<_>>>()?;
        let next_cursor = events.last().map_or(cursor, |event| event.sequence);

        Ok(ChangeBatch {
            events,
            next_cursor,
        })
    }

    async fn compact(&self, through: u64) -> AppResult<u64> {
        let through_column = i64::try_from(through).map_err(|_| {
            AppError::Validation(format!("change cursor {through} is out of range"))
        })?;

        let result = sqlx::query("DELETE FROM cluster_object_changes WHERE sequence <= $1")
            .bind(through_column)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to compact object changes: {error}"))
            })?;

        Ok(result.rows_affected())
    }
}
