//! Domain model types for persistence operations
//!
//! These types are backend-agnostic and used by all persistence implementations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistence backend mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistenceMode {
    /// Process-local maps, lost on restart
    #[default]
    Memory,
    /// External database (MySQL/PostgreSQL/SQLite via SeaORM)
    Sql,
}

impl std::fmt::Display for PersistenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceMode::Memory => write!(f, "memory"),
            PersistenceMode::Sql => write!(f, "sql"),
        }
    }
}

impl std::str::FromStr for PersistenceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(PersistenceMode::Memory),
            "sql" => Ok(PersistenceMode::Sql),
            _ => Err(format!("Invalid persistence mode: {}", s)),
        }
    }
}

/// Identity record keyed by an external login identifier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    /// Generated primary identifier, immutable after creation
    pub id: i64,
    /// External login identifier, unique across records
    pub external_id: String,
    pub created_at: DateTime<Utc>,
}
