//! Model command handler

use anyhow::Result;
use colored::*;

use super::ModelCommands;
use crate::cli::AppContext;
use crate::config::repository::versions;
use crate::model::ModelFile;

pub async fn handle_model_command(context: &AppContext, command: ModelCommands) -> Result<()> {
    let pool = context.db.pool();

    match command {
        ModelCommands::Import { file } => {
            let model = ModelFile::from_path(&file)?;
            let id = versions::import_model(pool, &model).await?;
            println!(
                "Imported model version {} (id {}): {} datasets, {} feature classes, {} tables",
                model.name.bright_green().bold(),
                id,
                model.datasets.len(),
                model.feature_classes.len(),
                model.tables.len()
            );
        }
        ModelCommands::List => {
            let list = versions::list_versions(pool).await?;
            if list.is_empty() {
                println!("No model versions imported");
                return Ok(());
            }
            for version in list {
                println!(
                    "{:>4}  {}  {} datasets, {} feature classes, {} attributes, {} tables, {} required  ({})",
                    version.id,
                    version.name.bold(),
                    version.dataset_count,
                    version.feature_class_count,
                    version.attribute_count,
                    version.table_count,
                    version.required_count,
                    version.created_at.dimmed()
                );
            }
        }
    }

    Ok(())
}
