//! Configuration management for the Latchkey server
//!
//! This module handles loading and accessing application configuration.
//! Sources are layered: config file, then `latchkey.*` environment variables,
//! then command line overrides.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use config::{Config, Environment};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use latchkey_consistency::{BackoffPolicy, LockExecuteOptions};
use latchkey_persistence::PersistenceMode;

use super::constants::*;
use crate::startup::LoggingConfig;

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(name = "latchkey-server", version, about = "Guarded identity find-or-create load simulation")]
pub struct Cli {
    /// Configuration file (default: conf/application.yml)
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,
    /// Coordination store backend: memory or redis
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<String>,
    /// Persistence mode: memory or sql
    #[arg(short = 'p', long = "persistence")]
    pub persistence: Option<String>,
    #[arg(long = "db-url", env = "DATABASE_URL")]
    pub database_url: Option<String>,
    #[arg(long = "redis-url", env = "REDIS_URL")]
    pub redis_url: Option<String>,
    /// Number of concurrent logins to fire
    #[arg(short = 'n', long = "logins")]
    pub logins: Option<usize>,
    /// Number of distinct external ids the logins are spread over
    #[arg(short = 'i', long = "identities")]
    pub identities: Option<usize>,
    #[arg(long = "max-wait-ms")]
    pub max_wait_ms: Option<u64>,
    #[arg(long = "hold-ms")]
    pub hold_ms: Option<u64>,
    /// Run the load without the identity lock
    #[arg(long = "unguarded")]
    pub unguarded: bool,
}

/// Coordination store backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinationBackend {
    Memory,
    Redis,
}

impl std::fmt::Display for CoordinationBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinationBackend::Memory => write!(f, "memory"),
            CoordinationBackend::Redis => write!(f, "redis"),
        }
    }
}

impl std::str::FromStr for CoordinationBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(CoordinationBackend::Memory),
            "redis" => Ok(CoordinationBackend::Redis),
            _ => Err(format!("Invalid coordination backend: {}", s)),
        }
    }
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load configuration, applying overrides from `args`
    pub fn load(args: &Cli) -> anyhow::Result<Self> {
        let file = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_FILE);

        let mut config_builder = Config::builder()
            .add_source(config::File::with_name(file).required(args.config.is_some()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(".")
                    .keep_prefix(true)
                    .try_parsing(true),
            );

        if let Some(v) = &args.backend {
            config_builder = config_builder.set_override(COORDINATION_BACKEND, v.as_str())?;
        }
        if let Some(v) = &args.persistence {
            config_builder = config_builder.set_override(PERSISTENCE_MODE, v.as_str())?;
        }
        if let Some(v) = &args.database_url {
            config_builder = config_builder.set_override(DB_URL, v.as_str())?;
        }
        if let Some(v) = &args.redis_url {
            config_builder = config_builder.set_override(COORDINATION_REDIS_URL, v.as_str())?;
        }
        if let Some(v) = args.logins {
            config_builder = config_builder
                .set_override(SIMULATION_LOGINS, i64::try_from(v).context("--logins is too large")?)?;
        }
        if let Some(v) = args.identities {
            config_builder = config_builder
                .set_override(SIMULATION_IDENTITIES, i64::try_from(v).context("--identities is too large")?)?;
        }
        if let Some(v) = args.max_wait_ms {
            config_builder = config_builder
                .set_override(LOCK_MAX_WAIT_MS, i64::try_from(v).context("--max-wait-ms is too large")?)?;
        }
        if let Some(v) = args.hold_ms {
            config_builder = config_builder
                .set_override(LOCK_HOLD_MS, i64::try_from(v).context("--hold-ms is too large")?)?;
        }

        let app_config = config_builder
            .build()
            .with_context(|| format!("Failed to build configuration - check {}", file))?;

        Ok(Configuration { config: app_config })
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    /// Read a non-negative integer, falling back to `default` when the key is unset
    fn get_non_negative(&self, key: &str, default: u64) -> anyhow::Result<u64> {
        match self.config.get_int(key) {
            Ok(value) => u64::try_from(value)
                .map_err(|_| anyhow::anyhow!("{} must not be negative, got {}", key, value)),
            Err(config::ConfigError::NotFound(_)) => Ok(default),
            Err(e) => Err(e).with_context(|| format!("invalid value for {}", key)),
        }
    }

    pub fn lock_max_wait_ms(&self) -> anyhow::Result<u64> {
        self.get_non_negative(LOCK_MAX_WAIT_MS, 3000)
    }

    pub fn lock_hold_ms(&self) -> anyhow::Result<u64> {
        self.get_non_negative(LOCK_HOLD_MS, 5000)
    }

    pub fn backoff_policy(&self) -> anyhow::Result<BackoffPolicy> {
        let defaults = BackoffPolicy::default();
        Ok(BackoffPolicy {
            initial_delay_ms: self
                .get_non_negative(LOCK_BACKOFF_INITIAL_DELAY_MS, defaults.initial_delay_ms)?,
            max_delay_ms: self.get_non_negative(LOCK_BACKOFF_MAX_DELAY_MS, defaults.max_delay_ms)?,
            multiplier: self
                .config
                .get_float(LOCK_BACKOFF_MULTIPLIER)
                .unwrap_or(defaults.multiplier),
            jitter: self
                .config
                .get_float(LOCK_BACKOFF_JITTER)
                .unwrap_or(defaults.jitter),
        })
    }

    pub fn lock_execute_options(&self) -> anyhow::Result<LockExecuteOptions> {
        Ok(LockExecuteOptions {
            max_wait_ms: self.lock_max_wait_ms()?,
            hold_ms: self.lock_hold_ms()?,
            backoff: self.backoff_policy()?,
        })
    }

    // ========================================================================
    // Coordination Store Configuration
    // ========================================================================

    pub fn coordination_backend(&self) -> anyhow::Result<CoordinationBackend> {
        let backend = self
            .config
            .get_string(COORDINATION_BACKEND)
            .unwrap_or("memory".to_string());
        backend.parse().map_err(anyhow::Error::msg)
    }

    pub fn redis_url(&self) -> String {
        self.config
            .get_string(COORDINATION_REDIS_URL)
            .unwrap_or(DEFAULT_REDIS_URL.to_string())
    }

    pub fn sweep_interval(&self) -> anyhow::Result<Duration> {
        let ms = self.get_non_negative(COORDINATION_SWEEP_INTERVAL_MS, DEFAULT_SWEEP_INTERVAL_MS)?;
        Ok(Duration::from_millis(ms.max(1)))
    }

    // ========================================================================
    // Persistence Configuration
    // ========================================================================

    pub fn persistence_mode(&self) -> anyhow::Result<PersistenceMode> {
        let mode = self
            .config
            .get_string(PERSISTENCE_MODE)
            .unwrap_or(PersistenceMode::Memory.to_string());
        mode.parse().map_err(anyhow::Error::msg)
    }

    /// Whether the in-memory table rejects duplicate external ids
    pub fn memory_unique_external_id(&self) -> bool {
        self.config
            .get_bool(PERSISTENCE_MEMORY_UNIQUE)
            .unwrap_or(false)
    }

    /// Simulated round trip of the in-memory table
    pub fn memory_latency(&self) -> anyhow::Result<Duration> {
        Ok(Duration::from_millis(
            self.get_non_negative(PERSISTENCE_MEMORY_LATENCY_MS, 20)?,
        ))
    }

    pub async fn database_connection(&self) -> anyhow::Result<DatabaseConnection> {
        let max_connections = u32::try_from(self.get_non_negative(DB_POOL_MAX_CONNECTIONS, 10)?)
            .context("db.pool.maxConnections is too large")?;
        let connect_timeout = self.get_non_negative(DB_POOL_CONNECT_TIMEOUT, 30)?;

        let url = self
            .config
            .get_string(DB_URL)
            .context("db.url is required for sql persistence")?;

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(max_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .sqlx_logging(false);

        let db = Database::connect(opt).await?;
        Ok(db)
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string(LOGS_PATH).ok(),
            self.config.get_bool(LOGS_CONSOLE).unwrap_or(true),
            self.config.get_bool(LOGS_FILE).unwrap_or(false),
            self.config
                .get_string(LOGS_LEVEL)
                .unwrap_or("info".to_string()),
        )
    }

    // ========================================================================
    // Simulation Configuration
    // ========================================================================

    pub fn simulation_logins(&self) -> anyhow::Result<usize> {
        let logins = self.get_non_negative(SIMULATION_LOGINS, DEFAULT_SIMULATION_LOGINS as u64)?;
        usize::try_from(logins).context("latchkey.simulation.logins is too large")
    }

    pub fn simulation_identities(&self) -> anyhow::Result<usize> {
        let identities =
            self.get_non_negative(SIMULATION_IDENTITIES, DEFAULT_SIMULATION_IDENTITIES as u64)?;
        usize::try_from(identities).context("latchkey.simulation.identities is too large")
    }
}
