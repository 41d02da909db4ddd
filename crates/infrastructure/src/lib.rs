//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod fan_out_access_event_sink;
mod in_memory_cluster_store;
mod postgres_access_audit_repository;
mod postgres_cluster_store;
mod redis_leader_lease_coordinator;
mod stored_object;
mod tracing_access_event_sink;

pub use fan_out_access_event_sink::FanOutAccessEventSink;
pub use in_memory_cluster_store::InMemoryClusterStore;
pub use postgres_access_audit_repository::PostgresAccessAuditRepository;
pub use postgres_cluster_store::PostgresClusterStore;
pub use redis_leader_lease_coordinator::RedisLeaderLeaseCoordinator;
pub use tracing_access_event_sink::TracingAccessEventSink;
