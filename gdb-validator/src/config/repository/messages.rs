//! Result messages of validation runs

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use super::validators::validator_categories;
use crate::services::comparison::{Category, ValidationMessage};

/// Remove every result row of a run
pub async fn delete_messages(pool: &SqlitePool, run_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM run_messages WHERE run_id = ?")
        .bind(run_id)
        .execute(pool)
        .await
        .context("Failed to delete run messages")?;

    Ok(result.rows_affected())
}

/// Replace the result rows of a run with `messages`, atomically
pub async fn replace_messages(
    pool: &SqlitePool,
    run_id: i64,
    messages: &[ValidationMessage],
) -> Result<()> {
    let ids: HashMap<Category, i64> = validator_categories(pool)
        .await?
        .into_iter()
        .map(|(id, category)| (category, id))
        .collect();

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM run_messages WHERE run_id = ?")
        .bind(run_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete run messages")?;

    for message in messages {
        let validator_id = ids.get(&message.category).with_context(|| {
            format!("Validator '{}' is not registered", message.category.lookup_name())
        })?;

        sqlx::query(
            "INSERT INTO run_messages (run_id, validator_id, message, passed) VALUES (?, ?, ?, ?)",
        )
        .bind(run_id)
        .bind(validator_id)
        .bind(&message.message)
        .bind(message.passed)
        .execute(&mut *tx)
        .await
        .context("Failed to insert run message")?;
    }

    tx.commit().await.context("Failed to commit transaction")?;

    log::debug!("Stored {} messages for run {}", messages.len(), run_id);
    Ok(())
}

/// Result rows of a run in insertion order
pub async fn list_messages(pool: &SqlitePool, run_id: i64) -> Result<Vec<ValidationMessage>> {
    let rows = sqlx::query(
        "SELECT v.description, m.message, m.passed
         FROM run_messages m
         INNER JOIN validators v ON v.id = m.validator_id
         WHERE m.run_id = ?
         ORDER BY m.id",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("Failed to list run messages")?;

    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        let description: String = row.try_get("description")?;
        let category = Category::from_lookup_name(&description)
            .with_context(|| format!("Unknown validator '{}'", description))?;
        messages.push(ValidationMessage {
            category,
            message: row.try_get("message")?,
            passed: row.try_get("passed")?,
        });
    }

    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Database;
    use crate::config::repository::runs::{NewRun, add_run};

    async fn setup() -> (Database, i64) {
        let db = Database::in_memory().await.unwrap();
        let run_id = add_run(
            db.pool(),
            &NewRun {
                path: "/data/a",
                case_code: "X",
                document_type: "FBM",
                stage: "Exploración",
                version_id: None,
            },
        )
        .await
        .unwrap();
        (db, run_id)
    }

    #[tokio::test]
    async fn test_replace_overwrites_previous_rows() {
        let (db, run_id) = setup().await;
        let pool = db.pool();

        let first = vec![
            ValidationMessage::fail(Category::Datasets, "Dataset missing from candidate, expected: A"),
            ValidationMessage::pass(Category::Datasets, "Dataset correct: B"),
            ValidationMessage::pass(Category::Tables, "Table correct: T"),
        ];
        replace_messages(pool, run_id, &first).await.unwrap();
        assert_eq!(list_messages(pool, run_id).await.unwrap(), first);

        let second = vec![ValidationMessage::pass(Category::SpatialMatching, "match")];
        replace_messages(pool, run_id, &second).await.unwrap();
        assert_eq!(list_messages(pool, run_id).await.unwrap(), second);

        assert_eq!(delete_messages(pool, run_id).await.unwrap(), 1);
        assert!(list_messages(pool, run_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_messages_are_scoped_to_run() {
        let (db, run_id) = setup().await;
        let pool = db.pool();

        replace_messages(pool, run_id, &[ValidationMessage::pass(Category::Tables, "ok")])
            .await
            .unwrap();
        assert!(list_messages(pool, run_id + 1).await.unwrap().is_empty());
        assert_eq!(delete_messages(pool, run_id + 1).await.unwrap(), 0);
    }
}
