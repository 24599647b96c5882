//! `j2n run`: the interval scheduler.

use std::path::Path;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::sync::print_report;
use super::{HttpOrchestrator, build_engine, load_with_projects, runtime};
use crate::error::{Error, Result};
use crate::sync::{SyncOrchestrator, TriggerKind};

/// Run scheduled cycles until Ctrl-C.
///
/// A cycle that overruns the interval makes the scheduler skip the missed
/// ticks rather than fire them back to back. Ctrl-C is honored between
/// cycles, so an in-flight cycle always completes.
pub fn execute(interval: Option<u64>, config: Option<&Path>, db: Option<&Path>, json: bool) -> Result<()> {
    let settings = load_with_projects(config)?;
    let secs = interval.unwrap_or(settings.check_interval_secs);
    if secs == 0 {
        return Err(Error::InvalidArgument(
            "--interval must be at least 1 second".to_string(),
        ));
    }

    let orchestrator = SyncOrchestrator::new(build_engine(&settings, db)?, settings.projects.clone());
    runtime()?.block_on(schedule(&orchestrator, Duration::from_secs(secs), json))
}

async fn schedule(orchestrator: &HttpOrchestrator, period: Duration, json: bool) -> Result<()> {
    info!(
        projects = orchestrator.projects().len(),
        interval_secs = period.as_secs(),
        "Scheduler started"
    );

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut cycles: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            signal = &mut shutdown => {
                signal?;
                break;
            }
        }

        let report = orchestrator.run_cycle(TriggerKind::Scheduled).await;
        cycles += 1;
        if report.has_failures() {
            warn!(
                cycle_id = %report.cycle_id,
                failed_projects = report.failed_projects().len(),
                issue_errors = report.issue_error_count(),
                "Cycle finished with failures"
            );
        }
        print_report(&report, json)?;
    }

    info!(cycles, "Scheduler stopped");
    Ok(())
}
