//! Reference data model versions

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::model::{
    AttributeSpec, DatasetSpec, FeatureClassSpec, FieldType, GeometryType, ModelFile, RequiredRule,
    TableSpec, VersionModel,
};
use crate::services::comparison::normalize_key;

/// Summary of an imported version (for listing)
#[derive(Debug, Clone, Serialize)]
pub struct VersionSummary {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub dataset_count: i64,
    pub feature_class_count: i64,
    pub table_count: i64,
    pub attribute_count: i64,
    pub required_count: i64,
}

pub async fn list_versions(pool: &SqlitePool) -> Result<Vec<VersionSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT
            v.id,
            v.name,
            v.created_at,
            (SELECT COUNT(*) FROM model_datasets d WHERE d.version_id = v.id) AS dataset_count,
            (SELECT COUNT(*) FROM model_feature_classes fc WHERE fc.version_id = v.id) AS feature_class_count,
            (SELECT COUNT(*) FROM model_tables t WHERE t.version_id = v.id) AS table_count,
            (SELECT COUNT(*) FROM model_attributes a
                INNER JOIN model_feature_classes fc ON fc.id = a.feature_class_id
                WHERE fc.version_id = v.id) AS attribute_count,
            (SELECT COUNT(*) FROM model_required r WHERE r.version_id = v.id) AS required_count
        FROM model_versions v
        ORDER BY v.id
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to list model versions")?;

    let mut versions = Vec::new();
    for row in rows {
        versions.push(VersionSummary {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
            dataset_count: row.try_get("dataset_count")?,
            feature_class_count: row.try_get("feature_class_count")?,
            table_count: row.try_get("table_count")?,
            attribute_count: row.try_get("attribute_count")?,
            required_count: row.try_get("required_count")?,
        });
    }

    Ok(versions)
}

pub async fn find_version_by_name(pool: &SqlitePool, name: &str) -> Result<Option<i64>> {
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM model_versions WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to look up model version")?;

    Ok(id)
}

/// Store a model file as a new version, returning its id
pub async fn import_model(pool: &SqlitePool, model: &ModelFile) -> Result<i64> {
    model.check()?;

    if find_version_by_name(pool, &model.name).await?.is_some() {
        anyhow::bail!("Model version '{}' is already imported", model.name);
    }

    let mut tx = pool.begin().await.context("Failed to start transaction")?;

    let version_id = sqlx::query("INSERT INTO model_versions (name, created_at) VALUES (?, ?)")
        .bind(&model.name)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .context("Failed to insert model version")?
        .last_insert_rowid();

    let mut srs_ids: HashMap<i64, i64> = HashMap::new();
    for srs in &model.srs {
        let id = sqlx::query("INSERT INTO srs (version_id, code, name) VALUES (?, ?, ?)")
            .bind(version_id)
            .bind(srs.code)
            .bind(&srs.name)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert SRS {}", srs.code))?
            .last_insert_rowid();
        srs_ids.insert(srs.code, id);
    }

    let mut dataset_ids: HashMap<String, i64> = HashMap::new();
    for dataset in &model.datasets {
        let srs_id = srs_ids
            .get(&dataset.srs)
            .with_context(|| format!("Dataset '{}' uses undeclared SRS {}", dataset.name, dataset.srs))?;
        let id = sqlx::query("INSERT INTO model_datasets (version_id, name, srs_id) VALUES (?, ?, ?)")
            .bind(version_id)
            .bind(&dataset.name)
            .bind(srs_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert dataset '{}'", dataset.name))?
            .last_insert_rowid();
        dataset_ids.insert(normalize_key(&dataset.name), id);
    }

    for fc in &model.feature_classes {
        let dataset_id = fc
            .dataset
            .as_ref()
            .and_then(|name| dataset_ids.get(&normalize_key(name)).copied());
        let geometry_type = GeometryType::parse(&fc.geometry_type)
            .with_context(|| format!("Unknown geometry type '{}'", fc.geometry_type))?;

        let fc_id = sqlx::query(
            "INSERT INTO model_feature_classes (version_id, dataset_id, name, geometry_type)
             VALUES (?, ?, ?, ?)",
        )
        .bind(version_id)
        .bind(dataset_id)
        .bind(&fc.name)
        .bind(geometry_type.as_str())
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert feature class '{}'", fc.name))?
        .last_insert_rowid();

        for attribute in &fc.attributes {
            sqlx::query(
                "INSERT INTO model_attributes
                    (feature_class_id, name, alias, field_type, length, domain, mandatory)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(fc_id)
            .bind(&attribute.name)
            .bind(&attribute.alias)
            .bind(FieldType::parse(&attribute.field_type).as_str())
            .bind(attribute.length)
            .bind(&attribute.domain)
            .bind(attribute.mandatory)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert attribute '{}.{}'", fc.name, attribute.name))?;
        }
    }

    for table in &model.tables {
        sqlx::query("INSERT INTO model_tables (version_id, name) VALUES (?, ?)")
            .bind(version_id)
            .bind(table)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert table '{}'", table))?;
    }

    for domain in &model.domains {
        for value in &domain.values {
            sqlx::query(
                "INSERT INTO model_domain_values (version_id, domain, code, description)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(version_id)
            .bind(&domain.name)
            .bind(&value.code)
            .bind(&value.description)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert domain value '{}.{}'", domain.name, value.code))?;
        }
    }

    for rule in &model.required {
        for feature_class in &rule.feature_classes {
            sqlx::query(
                "INSERT INTO model_required (version_id, document_type, stage, feature_class)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(version_id)
            .bind(&rule.document_type)
            .bind(&rule.stage)
            .bind(feature_class)
            .execute(&mut *tx)
            .await
            .context("Failed to insert required rule")?;
        }
    }

    tx.commit().await.context("Failed to commit transaction")?;

    log::info!(
        "Imported model version '{}' (id {}): {} datasets, {} feature classes, {} tables",
        model.name,
        version_id,
        model.datasets.len(),
        model.feature_classes.len(),
        model.tables.len()
    );
    Ok(version_id)
}

/// Load a version model, or the most recently imported one when
/// `version_id` is `None`
pub async fn load_version_model(pool: &SqlitePool, version_id: Option<i64>) -> Result<VersionModel> {
    let version_row = match version_id {
        Some(id) => sqlx::query("SELECT id, name FROM model_versions WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await,
        None => sqlx::query("SELECT id, name FROM model_versions ORDER BY id DESC LIMIT 1")
            .fetch_optional(pool)
            .await,
    }
    .context("Failed to get model version")?;

    let Some(version_row) = version_row else {
        match version_id {
            Some(id) => anyhow::bail!("Model version {} not found", id),
            None => anyhow::bail!("No model version imported; run `gdb-validator model import` first"),
        }
    };

    let version_id: i64 = version_row.try_get("id")?;
    let version_name: String = version_row.try_get("name")?;

    let dataset_rows = sqlx::query(
        "SELECT d.name, s.code, s.name AS srs_name
         FROM model_datasets d
         INNER JOIN srs s ON s.id = d.srs_id
         WHERE d.version_id = ?
         ORDER BY d.name",
    )
    .bind(version_id)
    .fetch_all(pool)
    .await
    .context("Failed to get model datasets")?;

    let mut datasets = Vec::new();
    for row in dataset_rows {
        datasets.push(DatasetSpec {
            name: row.try_get("name")?,
            srs_code: row.try_get("code")?,
            srs_name: row.try_get("srs_name")?,
        });
    }

    let attribute_rows = sqlx::query(
        "SELECT a.feature_class_id, a.name, a.alias, a.field_type, a.length, a.domain, a.mandatory
         FROM model_attributes a
         INNER JOIN model_feature_classes fc ON fc.id = a.feature_class_id
         WHERE fc.version_id = ?
         ORDER BY a.id",
    )
    .bind(version_id)
    .fetch_all(pool)
    .await
    .context("Failed to get model attributes")?;

    let mut attributes: HashMap<i64, Vec<AttributeSpec>> = HashMap::new();
    for row in attribute_rows {
        let field_type: String = row.try_get("field_type")?;
        attributes
            .entry(row.try_get("feature_class_id")?)
            .or_default()
            .push(AttributeSpec {
                name: row.try_get("name")?,
                alias: row.try_get("alias")?,
                field_type: FieldType::parse(&field_type),
                length: row.try_get("length")?,
                domain: row.try_get("domain")?,
                mandatory: row.try_get("mandatory")?,
            });
    }

    let fc_rows = sqlx::query(
        "SELECT fc.id, fc.name, d.name AS dataset, fc.geometry_type
         FROM model_feature_classes fc
         LEFT JOIN model_datasets d ON d.id = fc.dataset_id
         WHERE fc.version_id = ?
         ORDER BY fc.name",
    )
    .bind(version_id)
    .fetch_all(pool)
    .await
    .context("Failed to get model feature classes")?;

    let mut feature_classes = Vec::new();
    for row in fc_rows {
        let id: i64 = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let geometry_type: String = row.try_get("geometry_type")?;
        feature_classes.push(FeatureClassSpec {
            geometry_type: GeometryType::parse(&geometry_type).with_context(|| {
                format!("Feature class '{}' has unknown geometry type '{}'", name, geometry_type)
            })?,
            dataset: row.try_get("dataset")?,
            attributes: attributes.remove(&id).unwrap_or_default(),
            name,
        });
    }

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM model_tables WHERE version_id = ? ORDER BY name")
            .bind(version_id)
            .fetch_all(pool)
            .await
            .context("Failed to get model tables")?;

    let required_rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT document_type, stage, feature_class FROM model_required
         WHERE version_id = ?
         ORDER BY document_type, stage, feature_class",
    )
    .bind(version_id)
    .fetch_all(pool)
    .await
    .context("Failed to get required rules")?;

    let domain_rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT domain, code FROM model_domain_values WHERE version_id = ? ORDER BY domain, code",
    )
    .bind(version_id)
    .fetch_all(pool)
    .await
    .context("Failed to get domain values")?;

    let mut domains: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (domain, code) in domain_rows {
        domains.entry(domain).or_default().insert(code);
    }

    log::debug!(
        "Loaded model version '{}': {} datasets, {} feature classes, {} tables, {} required rules",
        version_name,
        datasets.len(),
        feature_classes.len(),
        tables.len(),
        required_rows.len()
    );

    Ok(VersionModel {
        version_id,
        version_name,
        datasets,
        feature_classes,
        tables: tables.into_iter().map(|name| TableSpec { name }).collect(),
        required: required_rows
            .into_iter()
            .map(|(document_type, stage, feature_class)| RequiredRule {
                document_type,
                stage,
                feature_class,
            })
            .collect(),
        domains,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Database;
    use crate::model::file::SAMPLE_MODEL;

    #[tokio::test]
    async fn test_import_and_load() {
        let db = Database::in_memory().await.unwrap();
        let pool = db.pool();
        let file = ModelFile::parse(SAMPLE_MODEL).unwrap();

        let id = import_model(pool, &file).await.unwrap();
        assert_eq!(find_version_by_name(pool, "SIGM_MINERIA_2022").await.unwrap(), Some(id));

        let model = load_version_model(pool, None).await.unwrap();
        assert_eq!(model.version_id, id);
        assert_eq!(model.expected_reference_systems()["TOPOGRAFIA"], 4686);
        assert_eq!(model.datasets[0].srs_name, "MAGNA-SIRGAS");

        let fc = model.feature_class("poligono_titulo").unwrap();
        assert_eq!(fc.geometry_type, GeometryType::Polygon);
        assert_eq!(fc.dataset.as_deref(), Some("TOPOGRAFIA"));
        assert_eq!(fc.attributes.len(), 2);
        assert_eq!(fc.attributes[0].name, "EXPEDIENTE");
        assert_eq!(fc.attributes[0].length, Some(20));
        assert!(fc.attributes[0].mandatory);
        assert_eq!(fc.attributes[1].domain.as_deref(), Some("Dom_Estado"));

        assert_eq!(model.tables, vec![TableSpec { name: "PROPIETARIOS".to_string() }]);
        assert_eq!(
            model.required_feature_classes("Formato Básico Minero - FBM", "Exploración"),
            vec!["POLIGONO_TITULO"]
        );
        let codes: Vec<&str> = model.domain("DOM_ESTADO").unwrap().iter().map(String::as_str).collect();
        assert_eq!(codes, vec!["A", "I"]);
    }

    #[tokio::test]
    async fn test_duplicate_import_is_rejected() {
        let db = Database::in_memory().await.unwrap();
        let file = ModelFile::parse(SAMPLE_MODEL).unwrap();

        import_model(db.pool(), &file).await.unwrap();
        let err = import_model(db.pool(), &file).await.unwrap_err();
        assert!(err.to_string().contains("already imported"));

        let versions = list_versions(db.pool()).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].feature_class_count, 1);
        assert_eq!(versions[0].attribute_count, 2);
        assert_eq!(versions[0].required_count, 1);
    }

    #[tokio::test]
    async fn test_latest_version_is_default() {
        let db = Database::in_memory().await.unwrap();
        let mut file = ModelFile::parse(SAMPLE_MODEL).unwrap();
        let first = import_model(db.pool(), &file).await.unwrap();
        file.name = "SIGM_MINERIA_2023".to_string();
        file.tables.push("TITULARES".to_string());
        let second = import_model(db.pool(), &file).await.unwrap();

        assert_eq!(load_version_model(db.pool(), None).await.unwrap().version_id, second);
        let old = load_version_model(db.pool(), Some(first)).await.unwrap();
        assert_eq!(old.tables.len(), 1);
        assert!(load_version_model(db.pool(), Some(99)).await.is_err());
    }

    #[tokio::test]
    async fn test_no_version_imported() {
        let db = Database::in_memory().await.unwrap();
        let err = load_version_model(db.pool(), None).await.unwrap_err();
        assert!(err.to_string().contains("No model version"));
    }
}
