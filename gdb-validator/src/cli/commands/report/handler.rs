//! Report command handler

use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;
use std::fs;

use super::{ReportCommands, ReportFormat};
use crate::cli::AppContext;
use crate::config::repository::messages;
use crate::config::repository::runs::{self, ValidationRun};
use crate::services::comparison::{MessageStats, ValidationMessage};

/// Everything exported for one run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run: ValidationRun,
    pub stats: MessageStats,
    pub messages: Vec<ReportRow>,
}

#[derive(Debug, Serialize)]
pub struct ReportRow {
    pub validator: &'static str,
    pub passed: bool,
    pub message: String,
}

impl From<ValidationMessage> for ReportRow {
    fn from(message: ValidationMessage) -> Self {
        Self {
            validator: message.category.lookup_name(),
            passed: message.passed,
            message: message.message,
        }
    }
}

pub async fn handle_report_command(context: &AppContext, args: ReportCommands) -> Result<()> {
    let pool = context.db.pool();

    let run = runs::get_run(pool, args.run_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Run {} not found", args.run_id))?;

    let mut messages = messages::list_messages(pool, run.id).await?;
    let stats = MessageStats::from_messages(&messages);
    if args.failed_only {
        messages.retain(|m| !m.passed);
    }

    let report = RunReport {
        run,
        stats,
        messages: messages.into_iter().map(ReportRow::from).collect(),
    };

    // Files never carry terminal colors
    if args.output.is_some() {
        colored::control::set_override(false);
    }
    let formatted = format_report(&report, args.format)?;

    match args.output {
        Some(path) => {
            fs::write(&path, &formatted)
                .with_context(|| format!("Failed to write report to: {}", path.display()))?;
            println!("Report saved to: {}", path.display().to_string().bright_green());
        }
        None => print!("{}", formatted),
    }

    Ok(())
}

pub fn format_report(report: &RunReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Json => {
            let mut json = serde_json::to_string_pretty(report).context("Failed to format JSON output")?;
            json.push('\n');
            Ok(json)
        }
        ReportFormat::Csv => format_csv(&report.messages),
        ReportFormat::Table => Ok(format_table(report)),
    }
}

fn format_csv(rows: &[ReportRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["validator", "passed", "message"])
        .context("Failed to write CSV header")?;
    for row in rows {
        writer
            .write_record([row.validator, if row.passed { "1" } else { "0" }, row.message.as_str()])
            .context("Failed to write CSV row")?;
    }
    let bytes = writer.into_inner().context("Failed to flush CSV output")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

fn format_table(report: &RunReport) -> String {
    let run = &report.run;
    let mut out = String::new();

    out.push_str(&format!(
        "Run {} [{}] case {}\n",
        run.id.to_string().cyan(),
        run.status,
        run.case_code.bright_white()
    ));
    out.push_str(&format!("Path: {}\n", run.path));
    out.push_str(&format!(
        "Checks: {} total, {} passed, {} failed\n\n",
        report.stats.total,
        report.stats.passed.to_string().green(),
        report.stats.failed.to_string().red()
    ));

    let mut current: Option<&str> = None;
    for row in &report.messages {
        if current != Some(row.validator) {
            out.push_str(&format!("{}\n", row.validator.bold()));
            current = Some(row.validator);
        }
        let flag = if row.passed { "PASS".green() } else { "FAIL".red() };
        out.push_str(&format!("  [{}] {}\n", flag, row.message));
    }

    out
}
