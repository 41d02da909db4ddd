mod database;
mod redis;
mod runtime_builder;

pub use database::connect_and_migrate;
pub use redis::build_redis_client;
pub use runtime_builder::{ControllerRuntime, build_controller_runtime};
