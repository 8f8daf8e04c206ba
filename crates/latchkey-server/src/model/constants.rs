// Configuration keys and defaults

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const ENV_PREFIX: &str = "latchkey";

// Lock
pub const LOCK_MAX_WAIT_MS: &str = "latchkey.lock.maxWaitMs";
pub const LOCK_HOLD_MS: &str = "latchkey.lock.holdMs";
pub const LOCK_BACKOFF_INITIAL_DELAY_MS: &str = "latchkey.lock.backoff.initialDelayMs";
pub const LOCK_BACKOFF_MAX_DELAY_MS: &str = "latchkey.lock.backoff.maxDelayMs";
pub const LOCK_BACKOFF_MULTIPLIER: &str = "latchkey.lock.backoff.multiplier";
pub const LOCK_BACKOFF_JITTER: &str = "latchkey.lock.backoff.jitter";

// Coordination store
pub const COORDINATION_BACKEND: &str = "latchkey.coordination.backend";
pub const COORDINATION_REDIS_URL: &str = "latchkey.coordination.redisUrl";
pub const COORDINATION_SWEEP_INTERVAL_MS: &str = "latchkey.coordination.sweepIntervalMs";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1000;

// Persistence
pub const PERSISTENCE_MODE: &str = "latchkey.persistence.mode";
pub const PERSISTENCE_MEMORY_UNIQUE: &str = "latchkey.persistence.memory.uniqueExternalId";
pub const PERSISTENCE_MEMORY_LATENCY_MS: &str = "latchkey.persistence.memory.latencyMs";
pub const DB_URL: &str = "db.url";
pub const DB_POOL_MAX_CONNECTIONS: &str = "db.pool.maxConnections";
pub const DB_POOL_CONNECT_TIMEOUT: &str = "db.pool.connectTimeout";

// Logging
pub const LOGS_PATH: &str = "latchkey.logs.path";
pub const LOGS_LEVEL: &str = "latchkey.logs.level";
pub const LOGS_CONSOLE: &str = "latchkey.logs.console";
pub const LOGS_FILE: &str = "latchkey.logs.file";

// Simulation
pub const SIMULATION_LOGINS: &str = "latchkey.simulation.logins";
pub const SIMULATION_IDENTITIES: &str = "latchkey.simulation.identities";
pub const DEFAULT_SIMULATION_LOGINS: usize = 100;
pub const DEFAULT_SIMULATION_IDENTITIES: usize = 10;
pub const SIMULATION_EXTERNAL_ID_PREFIX: &str = "openId:";
