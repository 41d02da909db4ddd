use async_trait::async_trait;
use sqlx::PgPool;

use jitgate_application::{AccessEvent, AccessEventSink};
use jitgate_core::{AppError, AppResult};

/// PostgreSQL-backed append-only access audit trail.
#[derive(Clone)]
pub struct PostgresAccessAuditRepository {
    pool: PgPool,
}

impl PostgresAccessAuditRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessEventSink for PostgresAccessAuditRepository {
    async fn record(&self, event: AccessEvent) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO access_audit_entries (
                action,
                namespace,
                name,
                subject,
                request_id,
                detail
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.action.as_str())
        .bind(event.key.namespace)
        .bind(event.key.name)
        .bind(event.subject)
        .bind(event.request_id)
        .bind(event.detail)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to append access audit entry: {error}"))
        })?;

        Ok(())
    }
}
