use std::env;
use std::time::Duration;

use jitgate_core::{AppError, AppResult};
use tracing_subscriber::EnvFilter;

/// Object store selected by `JITGATE_STORE_BACKEND`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Durable store shared by every replica.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
    /// Process-local store; state is lost on exit.
    Memory,
}

/// Controller settings read from the environment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub store_backend: StoreBackend,
    pub controller_id: String,
    pub worker_concurrency: usize,
    pub watch_poll_interval: Duration,
    pub watch_batch_size: usize,
    pub policy_resync_interval: Duration,
    pub requeue_base_delay: Duration,
    pub requeue_max_delay: Duration,
    pub redis_url: Option<String>,
    pub leader_lease_seconds: u32,
    pub audit_persist: bool,
}

impl ControllerConfig {
    /// Loads and validates settings, falling back to defaults for unset variables.
    pub fn load() -> AppResult<Self> {
        let store_backend = match env::var("JITGATE_STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_owned())
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres {
                database_url: required_env("DATABASE_URL")?,
                max_connections: positive(
                    "DATABASE_MAX_CONNECTIONS",
                    parse_env_u32("DATABASE_MAX_CONNECTIONS", 5)?,
                )?,
            },
            "memory" => StoreBackend::Memory,
            other => {
                return Err(AppError::Validation(format!(
                    "JITGATE_STORE_BACKEND must be either 'postgres' or 'memory', got '{other}'"
                )));
            }
        };

        let controller_id = env::var("JITGATE_CONTROLLER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("controller-{}", std::process::id()));
        let worker_concurrency = positive(
            "JITGATE_WORKER_CONCURRENCY",
            parse_env_usize("JITGATE_WORKER_CONCURRENCY", 4)?,
        )?;
        let watch_poll_interval_ms = positive(
            "JITGATE_WATCH_POLL_INTERVAL_MS",
            parse_env_u64("JITGATE_WATCH_POLL_INTERVAL_MS", 1000)?,
        )?;
        let watch_batch_size = positive(
            "JITGATE_WATCH_BATCH_SIZE",
            parse_env_usize("JITGATE_WATCH_BATCH_SIZE", 200)?,
        )?;
        let policy_resync_seconds = positive(
            "JITGATE_POLICY_RESYNC_SECONDS",
            parse_env_u64("JITGATE_POLICY_RESYNC_SECONDS", 300)?,
        )?;
        let requeue_base_delay_ms = positive(
            "JITGATE_REQUEUE_BASE_DELAY_MS",
            parse_env_u64("JITGATE_REQUEUE_BASE_DELAY_MS", 500)?,
        )?;
        let requeue_max_delay_seconds = positive(
            "JITGATE_REQUEUE_MAX_DELAY_SECONDS",
            parse_env_u64("JITGATE_REQUEUE_MAX_DELAY_SECONDS", 300)?,
        )?;
        let redis_url = env::var("REDIS_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let leader_lease_seconds = positive(
            "JITGATE_LEADER_LEASE_SECONDS",
            parse_env_u32("JITGATE_LEADER_LEASE_SECONDS", 15)?,
        )?;
        let audit_persist = parse_env_bool("JITGATE_AUDIT_PERSIST", true)?;

        let requeue_base_delay = Duration::from_millis(requeue_base_delay_ms);
        let requeue_max_delay = Duration::from_secs(requeue_max_delay_seconds);
        if requeue_base_delay > requeue_max_delay {
            return Err(AppError::Validation(
                "JITGATE_REQUEUE_BASE_DELAY_MS must not exceed JITGATE_REQUEUE_MAX_DELAY_SECONDS"
                    .to_owned(),
            ));
        }

        Ok(Self {
            store_backend,
            controller_id,
            worker_concurrency,
            watch_poll_interval: Duration::from_millis(watch_poll_interval_ms),
            watch_batch_size,
            policy_resync_interval: Duration::from_secs(policy_resync_seconds),
            requeue_base_delay,
            requeue_max_delay,
            redis_url,
            leader_lease_seconds,
            audit_persist,
        })
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn positive<T: Default + PartialEq>(name: &str, value: T) -> AppResult<T> {
    if value == T::default() {
        return Err(AppError::Validation(format!(
            "{name} must be greater than zero"
        )));
    }

    Ok(value)
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> AppResult<bool> {
    match env::var(name) {
        Ok(value) => parse_bool(name, value.as_str()),
        Err(_) => Ok(default),
    }
}

fn parse_bool(name: &str, value: &str) -> AppResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(AppError::Validation(format!(
            "invalid {name} value '{value}': expected true or false"
        ))),
    }
}
