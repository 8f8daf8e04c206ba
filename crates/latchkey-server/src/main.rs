//! Main entry point for the Latchkey server.
//!
//! Loads configuration, wires the coordination store and persistence backend,
//! then runs the concurrent login simulation.

use clap::Parser;
use tracing::{debug, info};

use latchkey_server::{
    Cli, Configuration,
    simulation::{self, SimulationPlan},
    startup::{self, AppContext},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let configuration = Configuration::load(&args)?;

    let logging_config = configuration.logging_config();
    let _logging_guard = startup::init_logging(&logging_config)?;

    let metrics_handle = latchkey_server::metrics::install_recorder()?;

    let context = AppContext::from_configuration(&configuration).await?;

    let plan = SimulationPlan {
        logins: configuration.simulation_logins()?,
        identities: configuration.simulation_identities()?,
        unguarded: args.unguarded,
    };
    let report = simulation::run_simulation(&context, &plan).await?;

    info!("Login success total: {}", report.succeeded);
    info!("Login failure total: {}", report.failed);
    info!(
        "Identity records: {} ({} duplicates)",
        report.records,
        report.duplicates()
    );

    let stats = context.lock.stats();
    info!(
        acquisitions = stats.total_acquisitions,
        busy = stats.busy_acquisitions,
        releases = stats.total_releases,
        timed_out = stats.timed_out_executions,
        store_errors = stats.store_errors,
        "Lock statistics"
    );
    debug!("Metrics snapshot:\n{}", metrics_handle.render());

    Ok(())
}
