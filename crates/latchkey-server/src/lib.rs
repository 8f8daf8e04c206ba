// Main library module for the Latchkey server
// Wires configuration, logging and services around the identity simulation

pub mod metrics; // Metrics descriptions and recorder
pub mod model; // Configuration and constants
pub mod simulation; // Concurrent login load
pub mod startup; // Logging and service wiring

pub use model::config::{Cli, Configuration};
