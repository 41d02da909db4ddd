use chrono::Utc;
use jitgate_core::{AppError, AppResult};
use jitgate_domain::{ObjectKey, ResourceScope, StatusObject};
use serde_json::Value;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::PostgresClusterStore;
use crate::stored_object::StoredObject;

type PgTransaction<'a> = Transaction<'a, Postgres>;

/// Column value standing in for the absent namespace of cluster objects.
pub(super) fn namespace_column(namespace: Option<&str>) -> &str {
    namespace.unwrap_or_default()
}

fn encode<T: StoredObject>(object: &T) -> AppResult<Value> {
    serde_json::to_value(object).map_err(|error| {
        AppError::Internal(format!(
            "failed to encode {} '{}': {error}",
            T::KIND.as_str(),
            object.key()
        ))
    })
}

fn decode<T: StoredObject>(document: Value) -> AppResult<T> {
    serde_json::from_value(document).map_err(|error| {
        AppError::Internal(format!(
            "failed to decode {} document: {error}",
            T::KIND.as_str()
        ))
    })
}

fn not_found<T: StoredObject>(key: &ObjectKey) -> AppError {
    AppError::NotFound(format!("{} '{key}' does not exist", T::KIND.as_str()))
}

fn version_column(version: u64) -> AppResult<i64> {
    i64::try_from(version).map_err(|_| {
        AppError::Internal(format!("resource version {version} exceeds supported range"))
    })
}

fn ensure_version<T: StoredObject>(stored: &T, expected: &T) -> AppResult<()> {
    let found = stored.meta().resource_version;
    let wanted = expected.meta().resource_version;
    if found != wanted {
        return Err(AppError::Conflict(format!(
            "{} '{}' was modified: expected version {wanted}, found {found}",
            T::KIND.as_str(),
            stored.key()
        )));
    }

    Ok(())
}

async fn begin(store: &PostgresClusterStore) -> AppResult<PgTransaction<'static>> {
    store
        .pool
        .begin()
        .await
        .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))
}

async fn commit(transaction: PgTransaction<'_>) -> AppResult<()> {
    transaction
        .commit()
        .await
        .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))
}

async fn next_version(transaction: &mut PgTransaction<'_>) -> AppResult<u64> {
    let version = sqlx::query_scalar::<_, i64>("SELECT nextval('cluster_object_versions')")
        .fetch_one(&mut **transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to allocate resource version: {error}"))
        })?;

    u64::try_from(version).map_err(|_| {
        AppError::Internal(format!("resource version {version} is negative"))
    })
}

async fn record_change(
    transaction: &mut PgTransaction<'_>,
    kind: &str,
    namespace: &str,
    name: &str,
    request_ref: Option<&str>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO cluster_object_changes (kind, namespace, name, request_ref)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(kind)
    .bind(namespace)
    .bind(name)
    .bind(request_ref)
    .execute(&mut **transaction)
    .await
    .map_err(|error| AppError::Internal(format!("failed to record object change: {error}")))?;

    Ok(())
}

async fn lock_object<T: StoredObject>(
    transaction: &mut PgTransaction<'_>,
    key: &ObjectKey,
) -> AppResult<Option<T>> {
    let document = sqlx::query_scalar::<_, Value>(
        r#"
        SELECT document
        FROM cluster_objects
        WHERE kind = $1 AND namespace = $2 AND name = $3
        FOR UPDATE
        "#,
    )
    .bind(T::KIND.as_str())
    .bind(namespace_column(key.namespace.as_deref()))
    .bind(key.name.as_str())
    .fetch_optional(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to lock {} '{key}': {error}",
            T::KIND.as_str()
        ))
    })?;

    document.map(decode::<T>).transpose()
}

const INSERT_OBJECT: &str = r#"
    INSERT INTO cluster_objects (
        kind,
        namespace,
        name,
        uid,
        resource_version,
        owner_uids,
        request_ref,
        document
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

/// Writes the row and records the change.
///
/// A fresh insert reports an existing key as [`AppError::AlreadyExists`];
/// otherwise the stored row is overwritten.
async fn write_row<T: StoredObject>(
    transaction: &mut PgTransaction<'_>,
    object: &T,
    fresh: bool,
) -> AppResult<()> {
    let key = object.key();
    let namespace = namespace_column(key.namespace.as_deref());
    let conflict_clause = if fresh {
        "ON CONFLICT (kind, namespace, name) DO NOTHING"
    } else {
        r#"
        ON CONFLICT (kind, namespace, name) DO UPDATE
        SET resource_version = EXCLUDED.resource_version,
            owner_uids = EXCLUDED.owner_uids,
            request_ref = EXCLUDED.request_ref,
            document = EXCLUDED.document,
            updated_at = now()
        "#
    };
    let statement = format!("{INSERT_OBJECT} {conflict_clause}");

    let written = sqlx::query(statement.as_str())
        .bind(T::KIND.as_str())
        .bind(namespace)
        .bind(key.name.as_str())
        .bind(object.meta().uid.as_str())
        .bind(version_column(object.meta().resource_version)?)
        .bind(object.owner_uids())
        .bind(object.request_ref())
        .bind(encode(object)?)
        .execute(&mut **transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to store {} '{key}': {error}",
                T::KIND.as_str()
            ))
        })?;

    if written.rows_affected() == 0 {
        return Err(AppError::AlreadyExists(format!(
            "{} '{key}' already exists",
            T::KIND.as_str()
        )));
    }

    record_change(
        transaction,
        T::KIND.as_str(),
        namespace,
        key.name.as_str(),
        object.request_ref(),
    )
    .await
}

/// Deletes the row, records the change and cascades to owned objects.
async fn remove_row<T: StoredObject>(
    transaction: &mut PgTransaction<'_>,
    object: &T,
) -> AppResult<()> {
    let key = object.key();
    let namespace = namespace_column(key.namespace.as_deref());
    sqlx::query("DELETE FROM cluster_objects WHERE kind = $1 AND namespace = $2 AND name = $3")
        .bind(T::KIND.as_str())
        .bind(namespace)
        .bind(key.name.as_str())
        .execute(&mut **transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to delete {} '{key}': {error}",
                T::KIND.as_str()
            ))
        })?;

    record_change(
        transaction,
        T::KIND.as_str(),
        namespace,
        key.name.as_str(),
        object.request_ref(),
    )
    .await?;

    let collected = sqlx::query_as::<_, (String, String, String, Option<String>)>(
        r#"
        DELETE FROM cluster_objects
        WHERE $1 = ANY(owner_uids)
        RETURNING kind, namespace, name, request_ref
        "#,
    )
    .bind(object.meta().uid.as_str())
    .fetch_all(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to collect objects owned by {} '{key}': {error}",
            T::KIND.as_str()
        ))
    })?;

    for (kind, namespace, name, request_ref) in collected {
        record_change(
            transaction,
            kind.as_str(),
            namespace.as_str(),
            name.as_str(),
            request_ref.as_deref(),
        )
        .await?;
    }

    Ok(())
}

impl PostgresClusterStore {
    pub(super) async fn find_object<T: StoredObject>(&self, key: &ObjectKey) -> AppResult<Option<T>> {
        let document = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT document
            FROM cluster_objects
            WHERE kind = $1 AND namespace = $2 AND name = $3
            "#,
        )
        .bind(T::KIND.as_str())
        .bind(namespace_column(key.namespace.as_deref()))
        .bind(key.name.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find {} '{key}': {error}",
                T::KIND.as_str()
            ))
        })?;

        document.map(decode::<T>).transpose()
    }

    pub(super) async fn list_objects<T: StoredObject>(&self) -> AppResult<Vec<T>> {
        let documents = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT document
            FROM cluster_objects
            WHERE kind = $1
            ORDER BY namespace, name
            "#,
        )
        .bind(T::KIND.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list {}: {error}", T::KIND.as_str()))
        })?;

        documents.into_iter().map(decode::<T>).collect()
    }

    pub(super) async fn list_referencing<T: StoredObject>(
        &self,
        scope: &ResourceScope,
        request_name: &str,
    ) -> AppResult<Vec<T>> {
        let documents = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT document
            FROM cluster_objects
            WHERE kind = $1 AND namespace = $2 AND request_ref = $3
            ORDER BY name
            "#,
        )
        .bind(T::KIND.as_str())
        .bind(namespace_column(scope.namespace()))
        .bind(request_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list {} for request '{request_name}': {error}",
                T::KIND.as_str()
            ))
        })?;

        documents.into_iter().map(decode::<T>).collect()
    }

    pub(super) async fn create_object<T: StoredObject>(&self, mut object: T) -> AppResult<T> {
        let key = object.key();
        key.validate()?;

        let mut transaction = begin(self).await?;
        let version = next_version(&mut transaction).await?;
        let meta = object.meta_mut();
        meta.uid = Uuid::new_v4().to_string();
        meta.resource_version = version;
        meta.creation_timestamp = Some(Utc::now());
        meta.deletion_timestamp = None;

        write_row(&mut transaction, &object, true).await?;
        commit(transaction).await?;
        Ok(object)
    }

    /// Creates the object or replaces its content, keeping identity fields.
    pub(super) async fn upsert_object<T: StoredObject>(&self, mut object: T) -> AppResult<T> {
        let key = object.key();
        key.validate()?;

        let mut transaction = begin(self).await?;
        let stored = lock_object::<T>(&mut transaction, &key).await?;
        let version = next_version(&mut transaction).await?;

        let meta = object.meta_mut();
        match stored {
            Some(stored) => {
                let stored_meta = stored.meta();
                meta.uid = stored_meta.uid.clone();
                meta.creation_timestamp = stored_meta.creation_timestamp;
                meta.deletion_timestamp = stored_meta.deletion_timestamp;
            }
            None => {
                meta.uid = Uuid::new_v4().to_string();
                meta.creation_timestamp = Some(Utc::now());
                meta.deletion_timestamp = None;
            }
        }
        meta.resource_version = version;

        write_row(&mut transaction, &object, false).await?;
        commit(transaction).await?;
        Ok(object)
    }

    pub(super) async fn update_object_metadata<T: StoredObject>(&self, object: &T) -> AppResult<T> {
        let key = object.key();
        let mut transaction = begin(self).await?;
        let mut stored = lock_object::<T>(&mut transaction, &key)
            .await?
            .ok_or_else(|| not_found::<T>(&key))?;
        ensure_version(&stored, object)?;

        let version = next_version(&mut transaction).await?;
        let meta = stored.meta_mut();
        meta.finalizers = object.meta().finalizers.clone();
        meta.owner_references = object.meta().owner_references.clone();
        meta.resource_version = version;

        if stored.meta().is_deleting() && stored.meta().finalizers.is_empty() {
            remove_row(&mut transaction, &stored).await?;
        } else {
            write_row(&mut transaction, &stored, false).await?;
        }

        commit(transaction).await?;
        Ok(stored)
    }

    pub(super) async fn patch_object_status<T: StoredObject + StatusObject>(
        &self,
        base: &T,
        status: T::Status,
    ) -> AppResult<T> {
        let key = base.key();
        let mut transaction = begin(self).await?;
        let mut stored = lock_object::<T>(&mut transaction, &key)
            .await?
            .ok_or_else(|| not_found::<T>(&key))?;
        ensure_version(&stored, base)?;

        let version = next_version(&mut transaction).await?;
        stored.set_status(status);
        stored.meta_mut().resource_version = version;

        write_row(&mut transaction, &stored, false).await?;
        commit(transaction).await?;
        Ok(stored)
    }

    /// Removes the object, or only marks it while finalizers remain.
    pub(super) async fn delete_object<T: StoredObject>(&self, key: &ObjectKey) -> AppResult<()> {
        let mut transaction = begin(self).await?;
        let mut stored = lock_object::<T>(&mut transaction, key)
            .await?
            .ok_or_else(|| not_found::<T>(key))?;

        if stored.meta().finalizers.is_empty() {
            remove_row(&mut transaction, &stored).await?;
        } else if !stored.meta().is_deleting() {
            let version = next_version(&mut transaction).await?;
            let meta = stored.meta_mut();
            meta.deletion_timestamp = Some(Utc::now());
            meta.resource_version = version;
            write_row(&mut transaction, &stored, false).await?;
        }

        commit(transaction).await
    }
}
