//! GeoPackage workspace
//!
//! Reads the OGC catalog tables (`gpkg_contents`, `gpkg_geometry_columns`,
//! `gpkg_spatial_ref_sys`) and feature data. Feature datasets are not part
//! of the GeoPackage standard; membership is read from the optional
//! `gpkgext_feature_datasets (table_name, dataset_name)` table.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use super::{
    CandidateDataset, CandidateFeatureClass, CandidateInventory, ColumnInfo, ValueCount, Workspace,
};
use crate::geometry::MultiPolygon;
use crate::geometry::wkb::{self, GeometrySummary};
use crate::services::comparison::normalize_key;

const DATASETS_TABLE: &str = "gpkgext_feature_datasets";

/// Quote an identifier read from the candidate so it can be spliced into SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// An opened GeoPackage file
#[derive(Debug, Clone)]
pub struct GeoPackage {
    pool: SqlitePool,
    path: PathBuf,
}

impl GeoPackage {
    /// Open a GeoPackage read-only and check it carries the catalog tables
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            anyhow::bail!("GeoPackage not found: {}", path.display());
        }

        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open GeoPackage: {}", path.display()))?;

        let gpkg = Self {
            pool,
            path: path.to_path_buf(),
        };

        if !gpkg.has_table("gpkg_contents").await? {
            gpkg.pool.close().await;
            anyhow::bail!(
                "{} is not a GeoPackage (gpkg_contents is missing)",
                path.display()
            );
        }

        log::debug!("Opened GeoPackage {}", path.display());
        Ok(gpkg)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn has_table(&self, name: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to inspect GeoPackage schema")?;
        Ok(row.is_some())
    }

    /// Feature class name -> dataset name
    async fn dataset_membership(&self) -> Result<HashMap<String, String>> {
        if !self.has_table(DATASETS_TABLE).await? {
            return Ok(HashMap::new());
        }

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT table_name, dataset_name FROM gpkgext_feature_datasets ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to read feature dataset membership")?;

        Ok(rows
            .into_iter()
            .map(|(table, dataset)| (normalize_key(&table), dataset))
            .collect())
    }

    async fn feature_classes(&self) -> Result<Vec<CandidateFeatureClass>> {
        let membership = self.dataset_membership().await?;

        let rows = sqlx::query(
            r#"
            SELECT
                c.table_name,
                g.column_name,
                g.geometry_type_name,
                s.organization_coordsys_id,
                COALESCE(g.srs_id, c.srs_id) AS srs_id
            FROM gpkg_contents c
            LEFT JOIN gpkg_geometry_columns g ON g.table_name = c.table_name
            LEFT JOIN gpkg_spatial_ref_sys s ON s.srs_id = COALESCE(g.srs_id, c.srs_id)
            WHERE c.data_type = 'features'
            ORDER BY c.table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list feature classes")?;

        let mut feature_classes = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("table_name")?;
            let organization_code: Option<i64> = row.try_get("organization_coordsys_id")?;
            let srs_id: Option<i64> = row.try_get("srs_id")?;

            feature_classes.push(CandidateFeatureClass {
                dataset: membership.get(&normalize_key(&name)).cloned(),
                geometry_column: row
                    .try_get::<Option<String>, _>("column_name")?
                    .unwrap_or_else(|| "geom".to_string()),
                geometry_type_name: row
                    .try_get::<Option<String>, _>("geometry_type_name")?
                    .unwrap_or_else(|| "GEOMETRY".to_string()),
                srs_code: organization_code.or(srs_id).filter(|code| *code > 0),
                name,
            });
        }

        Ok(feature_classes)
    }
}

/// Group feature classes into datasets, collecting the SRS codes of members
fn datasets_from_members(feature_classes: &[CandidateFeatureClass]) -> Vec<CandidateDataset> {
    let mut datasets: BTreeMap<String, CandidateDataset> = BTreeMap::new();
    for fc in feature_classes {
        let Some(dataset) = &fc.dataset else {
            continue;
        };
        let entry = datasets
            .entry(normalize_key(dataset))
            .or_insert_with(|| CandidateDataset {
                name: dataset.clone(),
                srs_codes: BTreeSet::new(),
            });
        if let Some(code) = fc.srs_code {
            entry.srs_codes.insert(code);
        }
    }
    datasets.into_values().collect()
}

#[async_trait]
impl Workspace for GeoPackage {
    async fn inventory(&self) -> Result<CandidateInventory> {
        let feature_classes = self.feature_classes().await?;
        let datasets = datasets_from_members(&feature_classes);

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT table_name FROM gpkg_contents WHERE data_type = 'attributes' ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tables")?;

        log::info!(
            "Candidate {}: {} datasets, {} feature classes, {} tables",
            self.path.display(),
            datasets.len(),
            feature_classes.len(),
            tables.len()
        );

        Ok(CandidateInventory {
            datasets,
            feature_classes,
            tables: tables.into_iter().map(|(t,)| t).collect(),
        })
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows: Vec<(String, String, i64, i64)> =
            sqlx::query_as(r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?) ORDER BY cid"#)
                .bind(table)
                .fetch_all(&self.pool)
                .await
                .with_context(|| format!("Failed to read columns of {}", table))?;

        if rows.is_empty() {
            anyhow::bail!("Table {} does not exist in the GeoPackage", table);
        }

        Ok(rows
            .into_iter()
            .map(|(name, declared, not_null, pk)| {
                let mut column = ColumnInfo::new(name, declared);
                column.not_null = not_null != 0;
                column.primary_key = pk != 0;
                column
            })
            .collect())
    }

    async fn value_counts(&self, table: &str, column: &str) -> Result<Vec<ValueCount>> {
        let sql = format!(
            "SELECT CAST({col} AS TEXT) AS value, COUNT(*) AS n FROM {table} GROUP BY 1 ORDER BY 1",
            col = quote_ident(column),
            table = quote_ident(table),
        );
        let rows: Vec<(Option<String>, i64)> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to read values of {}.{}", table, column))?;

        Ok(rows
            .into_iter()
            .map(|(value, count)| ValueCount { value, count })
            .collect())
    }

    async fn geometry_summaries(
        &self,
        feature_class: &CandidateFeatureClass,
    ) -> Result<Vec<GeometrySummary>> {
        let mut summaries = Vec::new();
        for blob in self.geometry_blobs(feature_class).await? {
            let summary = wkb::summarize(&blob)
                .with_context(|| format!("Invalid geometry in {}", feature_class.name))?;
            summaries.extend(summary);
        }
        Ok(summaries)
    }

    async fn polygons(&self, feature_class: &CandidateFeatureClass) -> Result<Vec<MultiPolygon>> {
        let mut polygons = Vec::new();
        for blob in self.geometry_blobs(feature_class).await? {
            let polygon = wkb::read_polygons(&blob)
                .with_context(|| format!("Invalid polygon in {}", feature_class.name))?;
            polygons.extend(polygon);
        }
        Ok(polygons)
    }
}

impl GeoPackage {
    async fn geometry_blobs(&self, feature_class: &CandidateFeatureClass) -> Result<Vec<Vec<u8>>> {
        let sql = format!(
            "SELECT {col} FROM {table} WHERE {col} IS NOT NULL",
            col = quote_ident(&feature_class.geometry_column),
            table = quote_ident(&feature_class.name),
        );
        let rows: Vec<(Vec<u8>,)> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to read geometries of {}", feature_class.name))?;
        Ok(rows.into_iter().map(|(blob,)| blob).collect())
    }
}
