//! Runs command handler

use anyhow::Result;
use colored::*;
use std::path::Path;

use super::RunsCommands;
use crate::cli::AppContext;
use crate::config::repository::runs::{self, NewRun, RunStatus, ValidationRun};
use crate::config::repository::versions;

pub async fn handle_runs_command(context: &AppContext, command: RunsCommands) -> Result<()> {
    let pool = context.db.pool();

    match command {
        RunsCommands::Add {
            path,
            case_code,
            document_type,
            stage,
            version,
        } => {
            if case_code.trim().is_empty() {
                anyhow::bail!("Case code cannot be empty");
            }
            if !Path::new(&path).exists() {
                log::warn!("{} does not exist yet", path);
            }

            let version_id = match &version {
                Some(name) => Some(
                    versions::find_version_by_name(pool, name)
                        .await?
                        .ok_or_else(|| anyhow::anyhow!("Model version '{}' not found", name))?,
                ),
                None => None,
            };

            let id = runs::add_run(
                pool,
                &NewRun {
                    path: &path,
                    case_code: case_code.trim(),
                    document_type: &document_type,
                    stage: &stage,
                    version_id,
                },
            )
            .await?;
            println!("Registered run {} for {}", id.to_string().cyan(), path.bright_white());
        }
        RunsCommands::List { status } => {
            let status = match status.as_deref() {
                Some(name) => Some(
                    RunStatus::parse(name)
                        .ok_or_else(|| anyhow::anyhow!("Unknown status '{}'", name))?,
                ),
                None => None,
            };

            let runs = runs::list_runs(pool, status).await?;
            if runs.is_empty() {
                println!("No runs");
                return Ok(());
            }
            for run in &runs {
                println!("{}", format_run(run));
            }
        }
        RunsCommands::Pending => {
            println!("{}", runs::pending_count(pool).await?);
        }
        RunsCommands::Requeue { id } => {
            runs::requeue(pool, id).await?;
            println!("Run {} is pending again", id.to_string().cyan());
        }
    }

    Ok(())
}

fn format_run(run: &ValidationRun) -> String {
    let status = match run.status {
        RunStatus::Pending => run.status.as_str().yellow(),
        RunStatus::InProgress => run.status.as_str().blue(),
        RunStatus::Finished => run.status.as_str().green(),
        RunStatus::Error => run.status.as_str().red(),
    };
    format!(
        "{:>5}  {:<11}  {:<14}  {}  ({} / {})",
        run.id, status, run.case_code, run.path, run.document_type, run.stage
    )
}
