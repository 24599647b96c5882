//! Runs sync cycles across every configured project.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span, warn};

use crate::error::ErrorKind;
use crate::jira::JiraApi;
use crate::model::ProjectConfig;
use crate::notion::NotionApi;
use crate::storage::CheckpointStore;

use super::engine::SyncEngine;
use super::types::{CycleReport, ProjectOutcome, TriggerKind};

/// Fans a cycle out to one task per project and collects the outcomes.
///
/// Projects are independent: a failure in one is recorded in the report
/// and never stops the others.
pub struct SyncOrchestrator<J, N, S> {
    engine: SyncEngine<J, N, S>,
    projects: Arc<Vec<ProjectConfig>>,
}

impl<J, N, S> SyncOrchestrator<J, N, S>
where
    J: JiraApi + 'static,
    N: NotionApi + 'static,
    S: CheckpointStore + 'static,
{
    pub fn new(engine: SyncEngine<J, N, S>, projects: Vec<ProjectConfig>) -> Self {
        Self {
            engine,
            projects: Arc::new(projects),
        }
    }

    #[must_use]
    pub fn projects(&self) -> &[ProjectConfig] {
        &self.projects
    }

    /// Sync every configured project once.
    pub async fn run_cycle(&self, trigger: TriggerKind) -> CycleReport {
        self.run_projects(trigger, &self.projects).await
    }

    /// Sync the given projects once.
    pub async fn run_projects(&self, trigger: TriggerKind, projects: &[ProjectConfig]) -> CycleReport {
        let cycle_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let span = info_span!("cycle", cycle_id = %cycle_id, trigger = %trigger);

        let mut report = CycleReport {
            cycle_id,
            trigger,
            started_at,
            finished_at: started_at,
            projects: BTreeMap::new(),
        };

        // A task that never reports back (panic) stays recorded as failed.
        for project in projects {
            report.projects.insert(
                project.key.clone(),
                ProjectOutcome::Failed {
                    kind: ErrorKind::TransientApi,
                    message: "sync task aborted".to_string(),
                },
            );
        }

        let mut tasks = JoinSet::new();
        for project in projects.iter().cloned() {
            let engine = self.engine.clone();
            let project_span = info_span!(parent: &span, "project", project = %project.key);
            tasks.spawn(
                async move {
                    let outcome = ProjectOutcome::from_result(engine.sync_project(&project).await);
                    log_outcome(&outcome);
                    (project.key, outcome)
                }
                .instrument(project_span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, outcome)) => {
                    report.projects.insert(key, outcome);
                }
                Err(e) => {
                    span.in_scope(|| error!(error = %e, "Project sync task failed"));
                }
            }
        }

        report.finished_at = Utc::now();
        span.in_scope(|| {
            let totals = report.totals();
            info!(
                projects = report.projects.len(),
                failed = report.failed_projects().len(),
                created = totals.created_count,
                updated = totals.updated_count,
                issue_errors = totals.errors.len(),
                duration_ms = report.duration_ms(),
                "Cycle finished"
            );
        });
        report
    }
}

fn log_outcome(outcome: &ProjectOutcome) {
    match outcome {
        ProjectOutcome::Synced(_) => {}
        ProjectOutcome::Failed { kind, message } => {
            warn!(kind = %kind, error = %message, "Project sync failed");
        }
        ProjectOutcome::Busy => {
            info!("Sync already running; trigger skipped");
        }
    }
}
