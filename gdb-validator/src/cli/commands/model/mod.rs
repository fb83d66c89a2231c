pub mod handler;

use clap::Subcommand;
use std::path::PathBuf;

pub use handler::handle_model_command;

#[derive(Subcommand, Debug)]
pub enum ModelCommands {
    /// Import a model version from a TOML file
    Import {
        /// Model file
        file: PathBuf,
    },

    /// List imported model versions
    List,
}
