pub mod handler;

use clap::Subcommand;

pub use handler::handle_runs_command;

#[derive(Subcommand, Debug)]
pub enum RunsCommands {
    /// Register a deliverable for validation
    Add {
        /// Archive, directory or .gpkg to validate
        path: String,

        /// Case (expedient) code of the mining title
        #[arg(long)]
        case_code: String,

        /// Document type selecting the required feature classes
        #[arg(long)]
        document_type: String,

        /// Project stage selecting the required feature classes
        #[arg(long)]
        stage: String,

        /// Model version name (defaults to the latest import)
        #[arg(long)]
        version: Option<String>,
    },

    /// List runs
    List {
        /// Only runs in this status (pending, in_progress, finished, error)
        #[arg(long)]
        status: Option<String>,
    },

    /// Number of runs waiting for validation
    Pending,

    /// Reset a run to pending so it is validated again
    Requeue {
        /// Run id
        id: i64,
    },
}
