//! Validator category lookup

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::services::comparison::Category;

/// Resolve the `validators` row id of a category by its lookup name
#[cfg(test)]
pub async fn validator_id(pool: &SqlitePool, category: Category) -> Result<i64> {
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM validators WHERE description = ?")
        .bind(category.lookup_name())
        .fetch_optional(pool)
        .await
        .context("Failed to look up validator")?;

    id.with_context(|| format!("Validator '{}' is not registered", category.lookup_name()))
}

/// All registered categories keyed by row id
pub async fn validator_categories(pool: &SqlitePool) -> Result<HashMap<i64, Category>> {
    let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, description FROM validators")
        .fetch_all(pool)
        .await
        .context("Failed to list validators")?;

    let mut categories = HashMap::new();
    for (id, description) in rows {
        match Category::from_lookup_name(&description) {
            Some(category) => {
                categories.insert(id, category);
            }
            None => log::warn!("Ignoring unknown validator '{}' (id {})", description, id),
        }
    }
    Ok(categories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Database;

    #[tokio::test]
    async fn test_every_category_is_registered() {
        let db = Database::in_memory().await.unwrap();

        let categories = validator_categories(db.pool()).await.unwrap();
        assert_eq!(categories.len(), Category::ALL.len());

        for category in Category::ALL {
            let id = validator_id(db.pool(), category).await.unwrap();
            assert_eq!(categories[&id], category);
        }
    }
}
