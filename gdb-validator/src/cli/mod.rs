//! Command-line interface

pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, Database};
use commands::model::ModelCommands;
use commands::report::ReportCommands;
use commands::runs::RunsCommands;
use commands::validate::ValidateCommands;

#[derive(Parser)]
#[command(name = "gdb-validator")]
#[command(about = "Validate geodatabase deliverables against a reference data model")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL, overriding configuration and environment
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate registered deliverables
    Validate(ValidateCommands),

    /// Register and inspect validation runs
    #[command(subcommand)]
    Runs(RunsCommands),

    /// Print or export the results of a run
    Report(ReportCommands),

    /// Import and list reference model versions
    #[command(subcommand)]
    Model(ModelCommands),
}

/// Resources shared by every command
pub struct AppContext {
    pub config: Config,
    pub db: Database,
}

impl AppContext {
    pub async fn open(cli: &Cli) -> Result<Self> {
        let mut config = Config::load(cli.config.as_deref())?;
        if let Some(url) = &cli.database {
            config.database.url = Some(url.clone());
        }

        let db = Database::connect(&config.database_url()).await?;
        Ok(Self { config, db })
    }

    pub async fn close(self) {
        self.db.close().await;
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let context = AppContext::open(&cli).await?;

    let result = match cli.command {
        Commands::Validate(args) => commands::validate::handle_validate_command(&context, args).await,
        Commands::Runs(args) => commands::runs::handle_runs_command(&context, args).await,
        Commands::Report(args) => commands::report::handle_report_command(&context, args).await,
        Commands::Model(args) => commands::model::handle_model_command(&context, args).await,
    };

    context.close().await;
    result
}
