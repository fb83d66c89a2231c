//! Geodatabase deliverable validator

mod api;
mod cli;
mod config;
mod geometry;
mod model;
mod services;
mod workspace;

use clap::Parser;
use colored::*;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    if let Err(e) = cli::run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
