pub mod handler;

use clap::{Args, ValueEnum};
use std::path::PathBuf;

pub use handler::handle_report_command;

#[derive(Args, Debug)]
pub struct ReportCommands {
    /// Run id
    pub run_id: i64,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Table)]
    pub format: ReportFormat,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only failed checks
    #[arg(long)]
    pub failed_only: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    Table,
    Json,
    Csv,
}
