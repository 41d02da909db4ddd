use std::sync::Arc;

use jitgate_application::{
    AccessEventSink, AccessGrantStore, AccessRequestStore, AccessResponseStore, ClusterChangeFeed,
    GrantEngine, LeaderLeaseCoordinator, PolicySource, PolicyStore, RbacStore, RequestEngine,
};
use jitgate_core::AppResult;
use jitgate_infrastructure::{
    FanOutAccessEventSink, InMemoryClusterStore, PostgresAccessAuditRepository,
    PostgresClusterStore, RedisLeaderLeaseCoordinator, TracingAccessEventSink,
};
use tracing::info;

use super::{build_redis_client, connect_and_migrate};
use crate::controller_config::{ControllerConfig, StoreBackend};

/// Wired engines and the ports the runtime loops need.
#[derive(Clone)]
pub struct ControllerRuntime {
    pub request_engine: RequestEngine,
    pub grant_engine: GrantEngine,
    pub policy_store: Arc<PolicyStore>,
    pub policy_source: Arc<dyn PolicySource>,
    pub change_feed: Arc<dyn ClusterChangeFeed>,
    pub leader_lease_coordinator: Option<Arc<dyn LeaderLeaseCoordinator>>,
}

pub async fn build_controller_runtime(config: &ControllerConfig) -> AppResult<ControllerRuntime> {
    let tracing_sink: Arc<dyn AccessEventSink> = Arc::new(TracingAccessEventSink::new());

    let leader_lease_coordinator = config
        .redis_url
        .as_deref()
        .map(|redis_url| {
            build_redis_client(redis_url).map(|client| {
                Arc::new(RedisLeaderLeaseCoordinator::new(client, "jitgate:leader"))
                    as Arc<dyn LeaderLeaseCoordinator>
            })
        })
        .transpose()?;

    let runtime = match &config.store_backend {
        StoreBackend::Postgres {
            database_url,
            max_connections,
        } => {
            let pool = connect_and_migrate(database_url.as_str(), *max_connections).await?;
            let event_sink: Arc<dyn AccessEventSink> = if config.audit_persist {
                Arc::new(FanOutAccessEventSink::new(vec![
                    tracing_sink,
                    Arc::new(PostgresAccessAuditRepository::new(pool.clone())),
                ]))
            } else {
                tracing_sink
            };
            info!(audit_persist = config.audit_persist, "using postgres object store");
            wire(Arc::new(PostgresClusterStore::new(pool)), event_sink)
        }
        StoreBackend::Memory => {
            info!("using in-memory object store");
            wire(Arc::new(InMemoryClusterStore::new()), tracing_sink)
        }
    };

    Ok(ControllerRuntime {
        leader_lease_coordinator,
        ..runtime
    })
}

fn wire<S>(store: Arc<S>, event_sink: Arc<dyn AccessEventSink>) -> ControllerRuntime
where
    S: AccessRequestStore
        + AccessResponseStore
        + AccessGrantStore
        + PolicySource
        + RbacStore
        + ClusterChangeFeed
        + 'static,
{
    let policy_store = Arc::new(PolicyStore::new());
    let request_engine = RequestEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        policy_store.clone(),
        event_sink.clone(),
    );
    let grant_engine = GrantEngine::new(store.clone(), store.clone(), store.clone(), event_sink);

    ControllerRuntime {
        request_engine,
        grant_engine,
        policy_store,
        policy_source: store.clone(),
        change_feed: store,
        leader_lease_coordinator: None,
    }
}
