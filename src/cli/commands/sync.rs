//! Sync command implementations.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use colored::Colorize;

use super::{build_engine, load_with_projects, runtime, select_projects};
use crate::error::Result;
use crate::sync::{CURRENT_USER, CycleReport, ProjectOutcome, SyncOrchestrator, TriggerKind};

/// Execute `j2n sync`: one manual cycle.
///
/// # Errors
///
/// Returns `Error::PartialFailure` if any project or issue failed, after
/// printing the report.
pub fn execute(projects: &[String], config: Option<&Path>, db: Option<&Path>, json: bool) -> Result<()> {
    let settings = load_with_projects(config)?;
    let selected = select_projects(&settings, projects)?;
    let orchestrator = SyncOrchestrator::new(build_engine(&settings, db)?, settings.projects.clone());

    let report = runtime()?.block_on(orchestrator.run_projects(TriggerKind::Manual, &selected));
    print_report(&report, json)?;
    report.failure().map_or(Ok(()), Err)
}

/// Execute `j2n sync-user`.
///
/// The assignee comes from `--assignee`, then the project's `assignee`,
/// then `jira.assignee`, then `currentUser()`.
pub fn execute_user(
    projects: &[String],
    assignee: Option<&str>,
    config: Option<&Path>,
    db: Option<&Path>,
    json: bool,
) -> Result<()> {
    let settings = load_with_projects(config)?;
    let selected = select_projects(&settings, projects)?;
    let engine = build_engine(&settings, db)?;

    let started_at = Utc::now();
    let outcomes = runtime()?.block_on(async {
        let mut outcomes = BTreeMap::new();
        for project in &selected {
            let who = assignee
                .or(project.assignee.as_deref())
                .or(settings.jira.assignee.as_deref())
                .unwrap_or(CURRENT_USER);
            let result = engine.sync_user_issues(project, who).await;
            outcomes.insert(project.key.clone(), ProjectOutcome::from_result(result));
        }
        outcomes
    });

    let report = CycleReport {
        cycle_id: uuid::Uuid::new_v4().to_string(),
        trigger: TriggerKind::Manual,
        started_at,
        finished_at: Utc::now(),
        projects: outcomes,
    };
    print_report(&report, json)?;
    report.failure().map_or(Ok(()), Err)
}

/// Print a cycle report as JSON or a short per-project summary.
pub(crate) fn print_report(report: &CycleReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }

    let short_id = report.cycle_id.get(..8).unwrap_or(&report.cycle_id);
    println!(
        "{} {} ({}, {} ms)",
        "Cycle".bold(),
        short_id.dimmed(),
        report.trigger,
        report.duration_ms()
    );

    let width = report.projects.keys().map(String::len).max().unwrap_or(0);
    for (key, outcome) in &report.projects {
        match outcome {
            ProjectOutcome::Synced(result) => {
                let mark = if result.has_errors() {
                    "!".yellow()
                } else {
                    "✓".green()
                };
                println!(
                    "  {mark} {key:<width$}  {} created, {} updated, {} skipped",
                    result.created_count, result.updated_count, result.skipped_count
                );
                for error in &result.errors {
                    println!(
                        "      {} {} ({}): {}",
                        "✗".red(),
                        error.issue_key,
                        error.error_kind,
                        error.message
                    );
                }
                for warning in &result.warnings {
                    println!("      {} {}: {}", "⚠".yellow(), warning.issue_key, warning.message.dimmed());
                }
            }
            ProjectOutcome::Failed { kind, message } => {
                println!("  {} {key:<width$}  {} {message}", "✗".red(), format!("{kind}:").red());
            }
            ProjectOutcome::Busy => {
                println!("  {} {key:<width$}  {}", "…".dimmed(), "already syncing, skipped".dimmed());
            }
        }
    }
    Ok(())
}
