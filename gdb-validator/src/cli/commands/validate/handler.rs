//! Validate command handler

use anyhow::Result;
use colored::*;

use super::ValidateCommands;
use crate::api::BoundaryClient;
use crate::cli::AppContext;
use crate::services::validation::{ValidationOutcome, Validator};

pub async fn handle_validate_command(context: &AppContext, args: ValidateCommands) -> Result<()> {
    let boundary = BoundaryClient::new(&context.config.boundary)?;
    let validator = Validator::new(&context.db, &context.config, &boundary);

    if args.all_pending {
        let summary = validator.validate_all_pending().await?;

        for outcome in &summary.completed {
            print_outcome(outcome);
        }
        for (run_id, error) in &summary.failed {
            println!("{} run {}: {}", "ERROR".red().bold(), run_id, error);
        }

        if summary.completed.is_empty() && summary.failed.is_empty() {
            println!("No pending runs");
            return Ok(());
        }
        if !summary.failed.is_empty() {
            anyhow::bail!(
                "{} of {} run(s) failed",
                summary.failed.len(),
                summary.completed.len() + summary.failed.len()
            );
        }
        return Ok(());
    }

    // clap guarantees a path when --all-pending is absent
    let Some(path) = args.path else {
        anyhow::bail!("Either provide a path or use --all-pending");
    };

    let outcome = validator.validate_path(&path).await?;
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &ValidationOutcome) {
    let stats = &outcome.stats;
    let verdict = if stats.failed == 0 {
        "PASSED".bright_green().bold()
    } else {
        "FAILED CHECKS".yellow().bold()
    };
    println!(
        "Run {} finished {}: {} checks, {} passed, {} failed",
        outcome.run_id.to_string().cyan(),
        verdict,
        stats.total,
        stats.passed.to_string().green(),
        stats.failed.to_string().red()
    );
}
