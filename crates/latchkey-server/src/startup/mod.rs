//! Application startup utilities module.

mod context;
mod logging;

pub use context::{AppContext, coordination_store, persistence_service};
pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
