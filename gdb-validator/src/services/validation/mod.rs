// Validation pipeline
//
// Resolves a run, prepares and opens its workspace, runs every check against
// the run's model version and stores the resulting messages. The data-access
// context and the boundary service are passed in by the caller.

pub mod attributes;
pub mod spatial;
pub mod structure;

pub use attributes::{AttributeRules, check_attributes};
pub use spatial::check_spatial;
pub use structure::check_structure;

use anyhow::{Context, Result};
use std::path::Path;

use crate::api::BoundaryService;
use crate::config::repository::runs::{self, RunStatus, ValidationRun};
use crate::config::repository::{messages, versions};
use crate::config::{Config, Database};
use crate::model::VersionModel;
use crate::services::comparison::{MessageStats, ValidationMessage};
use crate::workspace::{GeoPackage, Workspace, prepare_workspace};

/// Result of one completed run
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub run_id: i64,
    pub stats: MessageStats,
}

/// Result of validating every pending run
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub completed: Vec<ValidationOutcome>,
    /// Run id and error chain of runs that ended in `error`
    pub failed: Vec<(i64, String)>,
}

pub struct Validator<'a> {
    db: &'a Database,
    config: &'a Config,
    boundary: &'a dyn BoundaryService,
}

impl<'a> Validator<'a> {
    pub fn new(db: &'a Database, config: &'a Config, boundary: &'a dyn BoundaryService) -> Self {
        Self { db, config, boundary }
    }

    /// Validate the pending run registered for `path`
    pub async fn validate_path(&self, path: &str) -> Result<ValidationOutcome> {
        let run = runs::find_pending_run(self.db.pool(), path).await?;
        self.validate_run(&run).await
    }

    /// Validate every pending run in id order; failed runs do not stop the
    /// batch
    pub async fn validate_all_pending(&self) -> Result<BatchSummary> {
        let pending = runs::list_runs(self.db.pool(), Some(RunStatus::Pending)).await?;
        log::info!("{} run(s) pending validation", pending.len());

        let mut summary = BatchSummary::default();
        for run in &pending {
            match self.validate_run(run).await {
                Ok(outcome) => summary.completed.push(outcome),
                Err(e) => summary.failed.push((run.id, format!("{:#}", e))),
            }
        }
        Ok(summary)
    }

    /// Run the pipeline for one run, tracking its status
    ///
    /// On failure the run is marked `error` and the error is returned.
    pub async fn validate_run(&self, run: &ValidationRun) -> Result<ValidationOutcome> {
        let pool = self.db.pool();
        log::info!("Validating run {} ({})", run.id, run.path);
        runs::update_status(pool, run.id, RunStatus::InProgress).await?;

        match self.execute(run).await {
            Ok(messages) => {
                runs::update_status(pool, run.id, RunStatus::Finished).await?;
                let stats = MessageStats::from_messages(&messages);
                log::info!(
                    "Run {} finished: {} checks, {} passed, {} failed",
                    run.id,
                    stats.total,
                    stats.passed,
                    stats.failed
                );
                Ok(ValidationOutcome { run_id: run.id, stats })
            }
            Err(e) => {
                log::error!("Run {} failed: {:#}", run.id, e);
                if let Err(status_err) = runs::update_status(pool, run.id, RunStatus::Error).await {
                    log::error!("Failed to mark run {} as error: {:#}", run.id, status_err);
                }
                Err(e.context(format!("Validation of run {} failed", run.id)))
            }
        }
    }

    async fn execute(&self, run: &ValidationRun) -> Result<Vec<ValidationMessage>> {
        let pool = self.db.pool();

        let removed = messages::delete_messages(pool, run.id).await?;
        if removed > 0 {
            log::debug!("Removed {} previous messages of run {}", removed, run.id);
        }

        let model = versions::load_version_model(pool, run.version_id).await?;
        log::info!("Using model version '{}'", model.version_name);

        let prepared = prepare_workspace(
            Path::new(&run.path),
            self.config.workspace.extract_dir.as_deref(),
        )?;
        if let Some(extracted) = &prepared.extracted_to {
            runs::update_path(pool, run.id, &extracted.display().to_string()).await?;
        }

        let geopackage = GeoPackage::open(&prepared.geopackage).await?;
        let checked = run_checks(&geopackage, self.boundary, self.config, &model, run).await;
        geopackage.close().await;
        let messages = checked?;

        messages::replace_messages(pool, run.id, &messages)
            .await
            .context("Failed to store validation messages")?;
        Ok(messages)
    }
}

/// Every check of a run against an opened workspace, in category order
pub async fn run_checks(
    workspace: &dyn Workspace,
    boundary: &dyn BoundaryService,
    config: &Config,
    model: &VersionModel,
    run: &ValidationRun,
) -> Result<Vec<ValidationMessage>> {
    let inventory = workspace.inventory().await?;

    let mut messages = vec![
        check_spatial(workspace, &inventory, boundary, &config.boundary, &run.case_code).await,
    ];

    messages.extend(check_structure(model, &inventory, &run.document_type, &run.stage));

    let rules = AttributeRules {
        case_code_field: config.attributes.case_code_field.as_deref(),
        case_code: &run.case_code,
        null_sentinels: &config.attributes.null_sentinels,
    };
    messages.extend(check_attributes(workspace, model, &inventory, &rules).await);

    Ok(messages)
}


#[cfg(test)]
mod tests {
    use super::testing::FakeBoundary;
    use super::*;
    use crate::config::repository::runs::{NewRun, RunLookupError, add_run, get_run, requeue};
    use crate::geometry::wkb::encode_geopackage;
    use crate::geometry::{MultiPolygon, Polygon, square};
    use crate::model::ModelFile;
    use crate::model::file::SAMPLE_MODEL;
    use crate::workspace::archive::write_zip;
    use crate::workspace::geopackage::fixtures::GeoPackageBuilder;
    use std::path::PathBuf;

    fn boundary_polygon() -> MultiPolygon {
        MultiPolygon::from(Polygon::new(square(-74.0, 4.0, 0.01), vec![]))
    }

    /// A deliverable that satisfies the sample model
    async fn deliverable(dir: &Path) -> PathBuf {
        let path = dir.join("IDO-08061_20220307.gpkg");
        let builder = GeoPackageBuilder::create(&path).await;
        builder
            .feature_class(
                "POLIGONO_TITULO",
                "MULTIPOLYGON",
                4686,
                &[("EXPEDIENTE", "TEXT(20)"), ("ESTADO", "TEXT")],
            )
            .await
            .table("PROPIETARIOS", &[("NOMBRE", "TEXT(100)")])
            .await
            .dataset("TOPOGRAFIA", &["POLIGONO_TITULO"])
            .await
            .feature(
                "POLIGONO_TITULO",
                Some(encode_geopackage(&boundary_polygon(), 4686)),
                &[("EXPEDIENTE", Some("IDO-08061")), ("ESTADO", Some("A"))],
            )
            .await;
        builder.finish().await;
        path
    }

    async fn setup() -> (Database, Config) {
        let db = Database::in_memory().await.unwrap();
        let model = ModelFile::parse(SAMPLE_MODEL).unwrap();
        versions::import_model(db.pool(), &model).await.unwrap();
        (db, Config::default())
    }

    async fn register(db: &Database, path: &str) -> i64 {
        add_run(
            db.pool(),
            &NewRun {
                path,
                case_code: "IDO-08061",
                document_type: "Formato Básico Minero - FBM",
                stage: "Exploración",
                version_id: None,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_conforming_deliverable() {
        let dir = tempfile::tempdir().unwrap();
        let path = deliverable(dir.path()).await;
        let (db, config) = setup().await;
        let path = path.display().to_string();
        let run_id = register(&db, &path).await;
        let boundary = FakeBoundary::returning(vec![boundary_polygon()]);

        let outcome = Validator::new(&db, &config, &boundary).validate_path(&path).await.unwrap();

        let stored = messages::list_messages(db.pool(), run_id).await.unwrap();
        let failures: Vec<&ValidationMessage> = stored.iter().filter(|m| !m.passed).collect();
        assert!(failures.is_empty(), "{:#?}", failures);
        assert_eq!(outcome.run_id, run_id);
        assert_eq!(outcome.stats.total, stored.len());
        assert_eq!(stored[0].category, crate::services::comparison::Category::SpatialMatching);
        assert_eq!(boundary.requests(), vec![("IDO-08061".to_string(), Some(4686))]);

        let run = get_run(db.pool(), run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Finished);
    }

    #[tokio::test]
    async fn test_revalidation_replaces_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = deliverable(dir.path()).await.display().to_string();
        let (db, config) = setup().await;
        let run_id = register(&db, &path).await;
        let boundary = FakeBoundary::returning(vec![boundary_polygon()]);
        let validator = Validator::new(&db, &config, &boundary);

        let first = validator.validate_path(&path).await.unwrap();
        requeue(db.pool(), run_id).await.unwrap();
        let second = validator.validate_path(&path).await.unwrap();

        let stored = messages::list_messages(db.pool(), run_id).await.unwrap();
        assert_eq!(first.stats, second.stats);
        assert_eq!(stored.len(), second.stats.total);
    }

    #[tokio::test]
    async fn test_boundary_failure_still_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = deliverable(dir.path()).await.display().to_string();
        let (db, config) = setup().await;
        let run_id = register(&db, &path).await;
        let boundary = FakeBoundary::failing("boundary service returned HTTP 500");

        let outcome = Validator::new(&db, &config, &boundary).validate_path(&path).await.unwrap();
        assert_eq!(outcome.stats.failed, 1);

        let stored = messages::list_messages(db.pool(), run_id).await.unwrap();
        let spatial: Vec<_> = stored
            .iter()
            .filter(|m| m.category == crate::services::comparison::Category::SpatialMatching)
            .collect();
        assert_eq!(spatial.len(), 1);
        assert!(!spatial[0].passed);
        assert_eq!(get_run(db.pool(), run_id).await.unwrap().unwrap().status, RunStatus::Finished);
    }

    #[tokio::test]
    async fn test_zip_deliverable_updates_path() {
        let dir = tempfile::tempdir().unwrap();
        let gpkg = deliverable(dir.path()).await;
        let archive = dir.path().join("IDO-08061_20220307.gpkg.zip");
        let bytes = std::fs::read(&gpkg).unwrap();
        write_zip(&archive, &[("IDO-08061.gpkg", bytes.as_slice())]);
        std::fs::remove_file(&gpkg).unwrap();

        let (db, mut config) = setup().await;
        config.workspace.extract_dir = Some(dir.path().join("extracted"));
        let archive_path = archive.display().to_string();
        let run_id = register(&db, &archive_path).await;
        let boundary = FakeBoundary::returning(vec![boundary_polygon()]);

        Validator::new(&db, &config, &boundary).validate_path(&archive_path).await.unwrap();

        let run = get_run(db.pool(), run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Finished);
        assert_eq!(
            PathBuf::from(run.path),
            dir.path().join("extracted").join("IDO-08061_20220307")
        );
    }

    #[tokio::test]
    async fn test_missing_workspace_marks_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.gpkg").display().to_string();
        let (db, config) = setup().await;
        let run_id = register(&db, &path).await;
        let boundary = FakeBoundary::returning(vec![]);

        let result = Validator::new(&db, &config, &boundary).validate_path(&path).await;
        assert!(result.is_err());
        assert_eq!(get_run(db.pool(), run_id).await.unwrap().unwrap().status, RunStatus::Error);
    }

    #[tokio::test]
    async fn test_unknown_path_is_lookup_error() {
        let (db, config) = setup().await;
        let boundary = FakeBoundary::returning(vec![]);

        let err = Validator::new(&db, &config, &boundary)
            .validate_path("/no/such/run")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RunLookupError>(),
            Some(RunLookupError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_batch_continues_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let good = deliverable(dir.path()).await.display().to_string();
        let bad = dir.path().join("missing").display().to_string();
        let (db, config) = setup().await;
        let bad_id = register(&db, &bad).await;
        let good_id = register(&db, &good).await;
        let boundary = FakeBoundary::returning(vec![boundary_polygon()]);

        let summary = Validator::new(&db, &config, &boundary).validate_all_pending().await.unwrap();

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, bad_id);
        assert_eq!(summary.completed.len(), 1);
        assert_eq!(summary.completed[0].run_id, good_id);
        assert_eq!(runs::pending_count(db.pool()).await.unwrap(), 0);
    }
}
