//! Candidate geodatabase access
//!
//! A workspace is the opened candidate deliverable. The validators only see
//! the `Workspace` trait; `GeoPackage` is the on-disk implementation.

pub mod archive;
pub mod geopackage;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

use crate::geometry::MultiPolygon;
use crate::geometry::wkb::GeometrySummary;
use crate::model::FieldType;
use crate::services::comparison::normalize_key;

pub use archive::prepare_workspace;
pub use geopackage::GeoPackage;

/// Everything the structural validators need from a candidate
#[derive(Debug, Clone, Default)]
pub struct CandidateInventory {
    pub datasets: Vec<CandidateDataset>,
    pub feature_classes: Vec<CandidateFeatureClass>,
    pub tables: Vec<String>,
}

impl CandidateInventory {
    /// Dataset name -> distinct SRS codes of its members
    pub fn reference_systems(&self) -> BTreeMap<String, BTreeSet<i64>> {
        self.datasets
            .iter()
            .map(|d| (d.name.clone(), d.srs_codes.clone()))
            .collect()
    }

    pub fn feature_class(&self, name: &str) -> Option<&CandidateFeatureClass> {
        let key = normalize_key(name);
        self.feature_classes.iter().find(|fc| normalize_key(&fc.name) == key)
    }

    pub fn feature_class_names(&self) -> Vec<&str> {
        self.feature_classes.iter().map(|fc| fc.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDataset {
    pub name: String,
    pub srs_codes: BTreeSet<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFeatureClass {
    pub name: String,
    pub dataset: Option<String>,
    pub geometry_column: String,
    /// Declared geometry type name, e.g. `MULTIPOLYGON`
    pub geometry_type_name: String,
    pub srs_code: Option<i64>,
}

/// One column of a candidate table or feature class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub field_type: FieldType,
    pub length: Option<i64>,
    pub not_null: bool,
    pub primary_key: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        let declared_type = declared_type.into();
        let (field_type, length) = FieldType::from_geopackage(&declared_type);
        Self {
            name: name.into(),
            declared_type,
            field_type,
            length,
            not_null: false,
            primary_key: false,
        }
    }
}

/// Distinct value of a column (as text) and how many records hold it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueCount {
    pub value: Option<String>,
    pub count: i64,
}

#[async_trait]
pub trait Workspace: Send + Sync {
    /// Datasets, feature classes and tables of the candidate
    async fn inventory(&self) -> Result<CandidateInventory>;

    /// Columns of a feature class or table
    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Distinct values of a column with their record counts
    async fn value_counts(&self, table: &str, column: &str) -> Result<Vec<ValueCount>>;

    /// Kind and part count of every non-empty geometry of a feature class
    async fn geometry_summaries(&self, feature_class: &CandidateFeatureClass)
    -> Result<Vec<GeometrySummary>>;

    /// Polygons of every non-empty geometry of a polygon feature class
    async fn polygons(&self, feature_class: &CandidateFeatureClass) -> Result<Vec<MultiPolygon>>;
}
