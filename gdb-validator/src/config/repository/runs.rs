//! Validation run tracking

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

/// Lifecycle of a validation run, mirroring the `process_status` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    InProgress,
    Finished,
    Error,
}

impl RunStatus {
    pub fn id(&self) -> i64 {
        match self {
            Self::Pending => 1,
            Self::InProgress => 2,
            Self::Finished => 3,
            Self::Error => 4,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::Pending),
            2 => Some(Self::InProgress),
            3 => Some(Self::Finished),
            4 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" | "inprogress" => Some(Self::InProgress),
            "finished" => Some(Self::Finished),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One uploaded geodatabase awaiting or having gone through validation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationRun {
    pub id: i64,
    pub path: String,
    pub status: RunStatus,
    pub case_code: String,
    pub document_type: String,
    pub stage: String,
    /// Model version to validate against; latest version when unset
    pub version_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Values for registering a run
#[derive(Debug, Clone)]
pub struct NewRun<'a> {
    pub path: &'a str,
    pub case_code: &'a str,
    pub document_type: &'a str,
    pub stage: &'a str,
    pub version_id: Option<i64>,
}

/// Why no single pending run could be resolved for a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunLookupError {
    /// No run is registered for the path
    NotFound { path: String },
    /// Several pending runs share the path; all were marked `error`
    Duplicate { path: String, ids: Vec<i64> },
    /// Runs left `in_progress` by an interrupted validation; marked `error`
    Stale { path: String, ids: Vec<i64> },
    /// The latest run for the path is not waiting for validation
    NotPending { path: String, id: i64, status: RunStatus },
}

impl std::fmt::Display for RunLookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { path } => write!(f, "No validation run registered for '{}'", path),
            Self::Duplicate { path, ids } => write!(
                f,
                "Found {} pending runs for '{}' (ids {}); all marked as error",
                ids.len(),
                path,
                join_ids(ids)
            ),
            Self::Stale { path, ids } => write!(
                f,
                "Runs for '{}' were left in progress (ids {}); marked as error",
                path,
                join_ids(ids)
            ),
            Self::NotPending { path, id, status } => write!(
                f,
                "Run {} for '{}' is {}, not pending (requeue it to validate again)",
                id, path, status
            ),
        }
    }
}

impl std::error::Error for RunLookupError {}

fn join_ids(ids: &[i64]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

const RUN_COLUMNS: &str = "id, path, status_id, case_code, document_type, stage, version_id, created_at, updated_at";

fn run_from_row(row: &SqliteRow) -> Result<ValidationRun> {
    let status_id: i64 = row.try_get("status_id")?;
    Ok(ValidationRun {
        id: row.try_get("id")?,
        path: row.try_get("path")?,
        status: RunStatus::from_id(status_id)
            .with_context(|| format!("Unknown process status id {}", status_id))?,
        case_code: row.try_get("case_code")?,
        document_type: row.try_get("document_type")?,
        stage: row.try_get("stage")?,
        version_id: row.try_get("version_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Register a pending run, returning its id
pub async fn add_run(pool: &SqlitePool, run: &NewRun<'_>) -> Result<i64> {
    let timestamp = now();
    let result = sqlx::query(
        "INSERT INTO validation_runs
            (path, status_id, case_code, document_type, stage, version_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(run.path)
    .bind(RunStatus::Pending.id())
    .bind(run.case_code)
    .bind(run.document_type)
    .bind(run.stage)
    .bind(run.version_id)
    .bind(&timestamp)
    .bind(&timestamp)
    .execute(pool)
    .await
    .context("Failed to add validation run")?;

    Ok(result.last_insert_rowid())
}

pub async fn get_run(pool: &SqlitePool, id: i64) -> Result<Option<ValidationRun>> {
    let row = sqlx::query(&format!("SELECT {} FROM validation_runs WHERE id = ?", RUN_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get validation run")?;

    row.as_ref().map(run_from_row).transpose()
}

/// List runs, optionally restricted to one status, in id order
pub async fn list_runs(pool: &SqlitePool, status: Option<RunStatus>) -> Result<Vec<ValidationRun>> {
    let rows = match status {
        Some(status) => {
            sqlx::query(&format!(
                "SELECT {} FROM validation_runs WHERE status_id = ? ORDER BY id",
                RUN_COLUMNS
            ))
            .bind(status.id())
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query(&format!("SELECT {} FROM validation_runs ORDER BY id", RUN_COLUMNS))
                .fetch_all(pool)
                .await
        }
    }
    .context("Failed to list validation runs")?;

    rows.iter().map(run_from_row).collect()
}

/// Number of runs waiting for validation
pub async fn pending_count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM validation_runs WHERE status_id = ?")
        .bind(RunStatus::Pending.id())
        .fetch_one(pool)
        .await
        .context("Failed to count pending runs")?;

    Ok(count)
}

/// Resolve the single pending run registered for `path`
///
/// Fails with a [`RunLookupError`] when none or several match. Duplicate
/// pending runs and runs stuck `in_progress` for the path are marked `error`
/// before failing; finished and errored runs are left untouched.
pub async fn find_pending_run(pool: &SqlitePool, path: &str) -> Result<ValidationRun> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM validation_runs WHERE path = ? ORDER BY id",
        RUN_COLUMNS
    ))
    .bind(path)
    .fetch_all(pool)
    .await
    .context("Failed to look up validation run")?;

    let runs = rows.iter().map(run_from_row).collect::<Result<Vec<_>>>()?;

    let Some(latest) = runs.last() else {
        return Err(RunLookupError::NotFound { path: path.to_string() }.into());
    };

    let pending: Vec<&ValidationRun> =
        runs.iter().filter(|r| r.status == RunStatus::Pending).collect();
    let stale: Vec<i64> = runs
        .iter()
        .filter(|r| r.status == RunStatus::InProgress)
        .map(|r| r.id)
        .collect();

    if !stale.is_empty() {
        log::warn!("Marking stale in-progress runs {} for '{}' as error", join_ids(&stale), path);
        for id in &stale {
            update_status(pool, *id, RunStatus::Error).await?;
        }
    }

    match pending.as_slice() {
        [run] => Ok((*run).clone()),
        [] if !stale.is_empty() => Err(RunLookupError::Stale {
            path: path.to_string(),
            ids: stale,
        }
        .into()),
        [] => Err(RunLookupError::NotPending {
            path: path.to_string(),
            id: latest.id,
            status: latest.status,
        }
        .into()),
        _ => {
            let ids: Vec<i64> = pending.iter().map(|r| r.id).collect();
            log::error!("Duplicate pending runs {} for '{}'", join_ids(&ids), path);
            for id in &ids {
                update_status(pool, *id, RunStatus::Error).await?;
            }
            Err(RunLookupError::Duplicate {
                path: path.to_string(),
                ids,
            }
            .into())
        }
    }
}

pub async fn update_status(pool: &SqlitePool, id: i64, status: RunStatus) -> Result<()> {
    let result = sqlx::query("UPDATE validation_runs SET status_id = ?, updated_at = ? WHERE id = ?")
        .bind(status.id())
        .bind(now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update run status")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("Validation run {} not found", id);
    }
    log::debug!("Run {} is now {}", id, status);
    Ok(())
}

/// Point a run at a new workspace location (e.g. after archive extraction)
pub async fn update_path(pool: &SqlitePool, id: i64, path: &str) -> Result<()> {
    sqlx::query("UPDATE validation_runs SET path = ?, updated_at = ? WHERE id = ?")
        .bind(path)
        .bind(now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update run path")?;

    Ok(())
}

/// Reset a run to `pending` so it is validated again
pub async fn requeue(pool: &SqlitePool, id: i64) -> Result<()> {
    update_status(pool, id, RunStatus::Pending)
        .await
        .with_context(|| format!("Failed to requeue run {}", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Database;

    fn new_run(path: &str) -> NewRun<'_> {
        NewRun {
            path,
            case_code: "IDO-08061",
            document_type: "Formato Básico Minero - FBM",
            stage: "Exploración",
            version_id: None,
        }
    }

    fn lookup_error(err: anyhow::Error) -> RunLookupError {
        err.downcast_ref::<RunLookupError>().cloned().unwrap()
    }

    #[test]
    fn test_status_round_trip() {
        for status in [RunStatus::Pending, RunStatus::InProgress, RunStatus::Finished, RunStatus::Error] {
            assert_eq!(RunStatus::from_id(status.id()), Some(status));
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("In-Progress"), Some(RunStatus::InProgress));
        assert_eq!(RunStatus::from_id(9), None);
    }

    #[tokio::test]
    async fn test_add_and_find_pending() {
        let db = Database::in_memory().await.unwrap();
        let pool = db.pool();

        let id = add_run(pool, &new_run("/data/a.zip")).await.unwrap();
        assert_eq!(pending_count(pool).await.unwrap(), 1);

        let run = find_pending_run(pool, "/data/a.zip").await.unwrap();
        assert_eq!(run.id, id);
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.case_code, "IDO-08061");
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let db = Database::in_memory().await.unwrap();
        let err = find_pending_run(db.pool(), "/nowhere").await.unwrap_err();
        assert!(matches!(lookup_error(err), RunLookupError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_duplicates_are_marked_error() {
        let db = Database::in_memory().await.unwrap();
        let pool = db.pool();
        let a = add_run(pool, &new_run("/data/dup")).await.unwrap();
        let b = add_run(pool, &new_run("/data/dup")).await.unwrap();

        let err = find_pending_run(pool, "/data/dup").await.unwrap_err();
        assert_eq!(
            lookup_error(err),
            RunLookupError::Duplicate {
                path: "/data/dup".to_string(),
                ids: vec![a, b]
            }
        );
        for id in [a, b] {
            assert_eq!(get_run(pool, id).await.unwrap().unwrap().status, RunStatus::Error);
        }
    }

    #[tokio::test]
    async fn test_stale_in_progress_is_marked_error() {
        let db = Database::in_memory().await.unwrap();
        let pool = db.pool();
        let stale = add_run(pool, &new_run("/data/x")).await.unwrap();
        update_status(pool, stale, RunStatus::InProgress).await.unwrap();

        let err = find_pending_run(pool, "/data/x").await.unwrap_err();
        assert!(matches!(lookup_error(err), RunLookupError::Stale { .. }));
        assert_eq!(get_run(pool, stale).await.unwrap().unwrap().status, RunStatus::Error);

        // A fresh registration for the same path is picked up
        let fresh = add_run(pool, &new_run("/data/x")).await.unwrap();
        assert_eq!(find_pending_run(pool, "/data/x").await.unwrap().id, fresh);
    }

    #[tokio::test]
    async fn test_finished_run_is_left_alone() {
        let db = Database::in_memory().await.unwrap();
        let pool = db.pool();
        let id = add_run(pool, &new_run("/data/done")).await.unwrap();
        update_status(pool, id, RunStatus::Finished).await.unwrap();

        let err = find_pending_run(pool, "/data/done").await.unwrap_err();
        assert!(matches!(
            lookup_error(err),
            RunLookupError::NotPending { status: RunStatus::Finished, .. }
        ));
        assert_eq!(get_run(pool, id).await.unwrap().unwrap().status, RunStatus::Finished);

        requeue(pool, id).await.unwrap();
        assert_eq!(find_pending_run(pool, "/data/done").await.unwrap().id, id);
    }

    #[tokio::test]
    async fn test_list_and_update_path() {
        let db = Database::in_memory().await.unwrap();
        let pool = db.pool();
        let a = add_run(pool, &new_run("/data/a.zip")).await.unwrap();
        let b = add_run(pool, &new_run("/data/b.zip")).await.unwrap();
        update_status(pool, b, RunStatus::Finished).await.unwrap();
        update_path(pool, a, "/data/a").await.unwrap();

        let all = list_runs(pool, None).await.unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(all[0].path, "/data/a");

        let finished = list_runs(pool, Some(RunStatus::Finished)).await.unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].id, b);

        assert!(update_status(pool, 999, RunStatus::Error).await.is_err());
    }
}
