pub mod handler;

use clap::Args;

pub use handler::handle_validate_command;

#[derive(Args, Debug)]
pub struct ValidateCommands {
    /// Path the run was registered with (archive, directory or .gpkg)
    #[arg(required_unless_present = "all_pending", conflicts_with = "all_pending")]
    pub path: Option<String>,

    /// Validate every pending run in registration order
    #[arg(long)]
    pub all_pending: bool,
}
