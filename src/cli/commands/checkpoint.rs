//! Checkpoint command implementations.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use super::open_store;
use crate::cli::CheckpointCommands;
use crate::error::{Error, Result};
use crate::model::{Checkpoint, RetryEntry};
use crate::storage::{CheckpointStore, SqliteCheckpointStore};
use crate::validate::normalize_project_key;

/// Output for checkpoint list.
#[derive(Serialize)]
struct CheckpointListOutput {
    checkpoints: Vec<CheckpointInfo>,
    count: usize,
}

#[derive(Serialize)]
struct CheckpointInfo {
    #[serde(flatten)]
    checkpoint: Checkpoint,
    retries: Vec<RetryEntry>,
}

#[derive(Serialize)]
struct ResetOutput {
    project: String,
    removed: bool,
}

/// Execute checkpoint commands.
pub fn execute(command: &CheckpointCommands, db: Option<&Path>, json: bool) -> Result<()> {
    let store = open_store(db)?;
    match command {
        CheckpointCommands::List => list(&store, json),
        CheckpointCommands::Reset { project } => reset(&store, project, json),
    }
}

fn list(store: &SqliteCheckpointStore, json: bool) -> Result<()> {
    let mut checkpoints = Vec::new();
    for checkpoint in store.list()? {
        let retries = store.pending_retries(&checkpoint.project_key)?;
        checkpoints.push(CheckpointInfo {
            checkpoint,
            retries,
        });
    }

    if json {
        let output = CheckpointListOutput {
            count: checkpoints.len(),
            checkpoints,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if checkpoints.is_empty() {
        println!("No checkpoints yet.");
        return Ok(());
    }

    for info in &checkpoints {
        let cp = &info.checkpoint;
        println!(
            "{}  {}  {}  {}",
            cp.project_key.bold(),
            cp.last_issue_id,
            cp.last_seen_timestamp.to_rfc3339(),
            format!("(saved {})", cp.updated_at.format("%Y-%m-%d %H:%M")).dimmed()
        );
        for retry in &info.retries {
            println!(
                "  {} {} after {} attempt(s): {}",
                "retry".yellow(),
                retry.issue_key,
                retry.attempts,
                retry.last_error.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

fn reset(store: &SqliteCheckpointStore, project: &str, json: bool) -> Result<()> {
    let key = normalize_project_key(project).map_err(|(input, hint)| {
        Error::InvalidArgument(match hint {
            Some(hint) => format!("Invalid project key '{input}' ({hint})"),
            None => format!("Invalid project key '{input}'"),
        })
    })?;
    let removed = store.reset(&key)?;

    if json {
        let output = ResetOutput {
            project: key,
            removed,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if removed {
        println!("Reset checkpoint for {}", key.bold());
    } else {
        println!("No checkpoint stored for {key}");
    }
    Ok(())
}
