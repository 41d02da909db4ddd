//! Redis-backed leadership lease for controller replicas.

use async_trait::async_trait;
use jitgate_application::{LeaderLease, LeaderLeaseCoordinator};
use jitgate_core::{AppError, AppResult};
use redis::Script;

const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

const RENEW_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('EXPIRE', KEYS[1], ARGV[2])
else
  return 0
end
"#;

/// Redis implementation of controller leader election.
///
/// The leader key is written with its expiry in one `SET NX EX` round trip, so a
/// crashed acquirer can never leave a key without a TTL. Renew and release
/// compare the stored token first.
#[derive(Clone)]
pub struct RedisLeaderLeaseCoordinator {
    client: redis::Client,
    key_prefix: String,
}

impl RedisLeaderLeaseCoordinator {
    /// Creates one coordinator adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, scope_key: &str) -> String {
        format!("{}:{scope_key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

/// Builds `SET <key> <token> NX EX <lease_seconds>`.
fn acquire_command(key: &str, token: &str, lease_seconds: u32) -> redis::Cmd {
    let mut command = redis::cmd("SET");
    command.arg(key).arg(token).arg("NX").arg("EX").arg(lease_seconds);
    command
}

fn validate_lease_seconds(lease_seconds: u32) -> AppResult<()> {
    if lease_seconds == 0 {
        return Err(AppError::Validation(
            "leader lease_seconds must be greater than zero".to_owned(),
        ));
    }

    Ok(())
}

#[async_trait]
impl LeaderLeaseCoordinator for RedisLeaderLeaseCoordinator {
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<LeaderLease>> {
        if scope_key.trim().is_empty() {
            return Err(AppError::Validation(
                "leader lease scope_key must not be empty".to_owned(),
            ));
        }

        if holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "leader lease holder_id must not be empty".to_owned(),
            ));
        }

        validate_lease_seconds(lease_seconds)?;

        let key = self.key_for(scope_key);
        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());

        let mut connection = self.connection().await?;
        // Redis answers `OK` when the key was written and nil when another holder has it.
        let reply: Option<String> = acquire_command(key.as_str(), token.as_str(), lease_seconds)
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to acquire leader lease: {error}"))
            })?;

        if reply.is_none() {
            return Ok(None);
        }

        Ok(Some(LeaderLease {
            scope_key: scope_key.to_owned(),
            token,
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release_lease(&self, lease: &LeaderLease) -> AppResult<()> {
        let key = self.key_for(lease.scope_key.as_str());
        let script = Script::new(RELEASE_LEASE_SCRIPT);

        let mut connection = self.connection().await?;
        script
            .key(key)
            .arg(lease.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to release leader lease: {error}"))
            })?;

        Ok(())
    }

    async fn renew_lease(&self, lease: &LeaderLease, lease_seconds: u32) -> AppResult<bool> {
        validate_lease_seconds(lease_seconds)?;

        let key = self.key_for(lease.scope_key.as_str());
        let script = Script::new(RENEW_LEASE_SCRIPT);

        let mut connection = self.connection().await?;
        let renewed = script
            .key(key)
            .arg(lease.token.as_str())
            .arg(i64::from(lease_seconds))
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to renew leader lease: {error}"))
            })?;

        Ok(renewed > 0)
    }
}

#[cfg(test)]
mod tests {
    use jitgate_application::LeaderLeaseCoordinator;
    use jitgate_core::AppError;

    use super::{RedisLeaderLeaseCoordinator, acquire_command};

    fn coordinator() -> RedisLeaderLeaseCoordinator {
        let client = redis::Client::open("redis://127.0.0.1:6379");
        assert!(client.is_ok());
        RedisLeaderLeaseCoordinator::new(client.unwrap_or_else(|_| unreachable!()), "jitgate:test")
    }

    #[tokio::test]
    async fn acquire_rejects_invalid_arguments_before_connecting() {
        let coordinator = coordinator();

        let empty_scope = coordinator.try_acquire_lease(" ", "controller-1", 15).await;
        assert!(matches!(empty_scope, Err(AppError::Validation(_))));

        let empty_holder = coordinator.try_acquire_lease("leader", "", 15).await;
        assert!(matches!(empty_holder, Err(AppError::Validation(_))));

        let zero_lease = coordinator
            .try_acquire_lease("leader", "controller-1", 0)
            .await;
        assert!(matches!(zero_lease, Err(AppError::Validation(_))));
    }

    #[test]
    fn acquire_sets_value_and_expiry_in_one_command() {
        let packed = acquire_command("jitgate:leader:controller-leader", "controller-1:t", 15)
            .get_packed_command();
        let packed = String::from_utf8_lossy(&packed);

        let words: Vec<&str> = packed
            .split("\r\n")
            .filter(|word| !word.is_empty() && !word.starts_with(['*', '$']))
            .collect();
        assert_eq!(
            words,
            vec![
                "SET",
                "jitgate:leader:controller-leader",
                "controller-1:t",
                "NX",
                "EX",
                "15",
            ]
        );
    }

    #[tokio::test]
    async fn lease_is_exclusive_until_released() {
        let Ok(redis_url) = std::env::var("REDIS_URL") else {
            return;
        };
        let client = redis::Client::open(redis_url.as_str());
        assert!(client.is_ok());
        let coordinator = RedisLeaderLeaseCoordinator::new(
            client.unwrap_or_else(|_| unreachable!()),
            format!("jitgate:test:{}", uuid::Uuid::new_v4()),
        );

        let first = coordinator
            .try_acquire_lease("leader", "controller-1", 15)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(first.is_some());
        let second = coordinator
            .try_acquire_lease("leader", "controller-2", 15)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(second.is_none());

        let mut connection = coordinator
            .connection()
            .await
            .unwrap_or_else(|_| unreachable!());
        let ttl = redis::cmd("TTL")
            .arg(coordinator.key_for("leader"))
            .query_async::<i64>(&mut connection)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(ttl > 0 && ttl <= 15, "leader key ttl was {ttl}");

        let lease = first.unwrap_or_else(|| unreachable!());
        assert!(matches!(coordinator.renew_lease(&lease, 15).await, Ok(true)));
        assert!(coordinator.release_lease(&lease).await.is_ok());
        assert!(matches!(coordinator.renew_lease(&lease, 15).await, Ok(false)));
    }
}
