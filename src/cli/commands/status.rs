//! Status command implementation.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use super::{load_with_projects, open_store, runtime};
use crate::config::{resolve_config_path, resolve_db_path};
use crate::error::{Error, Result};
use crate::jira::{HttpJiraClient, JiraApi};
use crate::model::Checkpoint;
use crate::notion::{HttpNotionClient, NotionApi};
use crate::storage::CheckpointStore;

/// Output for status command.
#[derive(Serialize)]
struct StatusOutput {
    config_path: Option<String>,
    db_path: Option<String>,
    jira: Check,
    projects: Vec<ProjectStatus>,
}

#[derive(Serialize)]
struct ProjectStatus {
    key: String,
    database_id: Option<String>,
    notion: Check,
    checkpoint: Option<Checkpoint>,
    pending_retries: usize,
}

#[derive(Serialize)]
struct Check {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Check {
    fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self { ok: true, error: None },
            Err(e) => Self {
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }

    fn render(&self) -> String {
        match &self.error {
            None => "ok".green().to_string(),
            Some(e) => format!("{} {}", "failed:".red(), e),
        }
    }
}

/// Execute status command.
///
/// Checks Jira credentials, each project's Notion database, and reports
/// the stored checkpoint.
///
/// # Errors
///
/// Returns `Error::Config` if any connectivity check failed, after printing
/// the full status.
pub fn execute(config: Option<&Path>, db: Option<&Path>, json: bool) -> Result<()> {
    let settings = load_with_projects(config)?;
    let store = open_store(db)?;
    let jira = HttpJiraClient::new(&settings.jira)?;
    let notion = HttpNotionClient::new(&settings.notion)?;
    let default_db = settings.notion.default_database_id.as_deref();

    let (jira_check, notion_checks) = runtime()?.block_on(async {
        let jira_check = Check::from_result(jira.check_connection().await);
        let mut notion_checks = Vec::new();
        for project in &settings.projects {
            let check = match project.database_id(default_db) {
                Some(id) => Check::from_result(notion.check_connection(id).await),
                None => Check::from_result(Err(Error::Config(
                    "no Notion database configured".to_string(),
                ))),
            };
            notion_checks.push(check);
        }
        (jira_check, notion_checks)
    });

    let mut projects = Vec::new();
    for (project, notion) in settings.projects.iter().zip(notion_checks) {
        projects.push(ProjectStatus {
            key: project.key.clone(),
            database_id: project.database_id(default_db).map(str::to_string),
            notion,
            checkpoint: store.get(&project.key)?,
            pending_retries: store.pending_retries(&project.key)?.len(),
        });
    }

    let failed = usize::from(!jira_check.ok) + projects.iter().filter(|p| !p.notion.ok).count();
    let output = StatusOutput {
        config_path: resolve_config_path(config).map(|p| p.display().to_string()),
        db_path: resolve_db_path(db).map(|p| p.display().to_string()),
        jira: jira_check,
        projects,
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        print_human(&output, &settings.jira.base_url);
    }

    if failed > 0 {
        return Err(Error::Config(format!("{failed} connectivity check(s) failed")));
    }
    Ok(())
}

fn print_human(output: &StatusOutput, jira_url: &str) {
    println!("{}", "jira2notion status".bold());
    println!(
        "  Config:   {}",
        output.config_path.as_deref().unwrap_or("(environment only)")
    );
    println!("  Database: {}", output.db_path.as_deref().unwrap_or("-"));
    println!("  Jira:     {} {}", jira_url, output.jira.render());
    println!();

    for project in &output.projects {
        println!("{}", project.key.cyan().bold());
        println!(
            "  Notion:     {} {}",
            project.database_id.as_deref().unwrap_or("-"),
            project.notion.render()
        );
        match &project.checkpoint {
            Some(cp) => println!(
                "  Checkpoint: {} at {}",
                cp.last_issue_id,
                cp.last_seen_timestamp.to_rfc3339()
            ),
            None => println!("  Checkpoint: {}", "none (lookback window applies)".dimmed()),
        }
        if project.pending_retries > 0 {
            println!(
                "  Retries:    {}",
                format!("{} pending", project.pending_retries).yellow()
            );
        }
    }
}
