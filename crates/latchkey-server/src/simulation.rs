//! Concurrent login simulation
//!
//! Fires a batch of concurrent logins over a small pool of external ids and
//! reports how many succeeded and how many identity records were created.
//! Running the same load through the unguarded path shows the duplicates the
//! identity lock prevents.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use latchkey_common::LatchkeyError;

use crate::model::constants::SIMULATION_EXTERNAL_ID_PREFIX;
use crate::startup::AppContext;

/// Load shape of one simulation run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulationPlan {
    pub logins: usize,
    pub identities: usize,
    pub unguarded: bool,
}

/// Totals of one simulation run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub logins: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Distinct external ids that logged in successfully
    pub identities_seen: usize,
    /// Identity records in the store after the run
    pub records: u64,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl SimulationReport {
    /// Records beyond one per identity seen, assuming the store started empty
    pub fn duplicates(&self) -> u64 {
        self.records.saturating_sub(self.identities_seen as u64)
    }
}

pub fn external_id(n: usize) -> String {
    format!("{}{}", SIMULATION_EXTERNAL_ID_PREFIX, n)
}

pub async fn run_simulation(
    context: &AppContext,
    plan: &SimulationPlan,
) -> anyhow::Result<SimulationReport> {
    if plan.identities == 0 {
        return Err(LatchkeyError::IllegalArgument(
            "simulation needs at least one identity".to_string(),
        )
        .into());
    }

    info!(
        logins = plan.logins,
        identities = plan.identities,
        unguarded = plan.unguarded,
        "Starting login simulation"
    );

    let started = Instant::now();
    let mut tasks = JoinSet::new();

    for _ in 0..plan.logins {
        let identity = Arc::clone(&context.identity);
        let external_id = external_id(rand::random_range(0..plan.identities));
        let unguarded = plan.unguarded;

        tasks.spawn(async move {
            let result = if unguarded {
                identity.login_unguarded(&external_id).await
            } else {
                identity.login(&external_id).await
            };
            (external_id, result)
        });
    }

    let mut report = SimulationReport {
        logins: plan.logins,
        ..Default::default()
    };
    let mut seen: HashSet<String> = HashSet::new();

    while let Some(joined) = tasks.join_next().await {
        let (external_id, result) = joined?;
        if result.is_success() {
            report.succeeded += 1;
            seen.insert(external_id);
        } else {
            report.failed += 1;
            warn!(external_id = %external_id, code = result.code, message = %result.message, "Login failed");
        }
    }

    report.identities_seen = seen.len();
    report.records = context.persistence.identity_count().await?;
    report.elapsed = started.elapsed();

    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        records = report.records,
        duplicates = report.duplicates(),
        elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        "Login simulation finished"
    );

    Ok(report)
}
