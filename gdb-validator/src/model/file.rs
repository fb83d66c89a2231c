//! TOML description of a version model, used to seed the reference tables

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use super::{FieldType, GeometryType};
use crate::services::comparison::normalize_key;

/// Top-level model file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    /// Version name, unique across imports
    pub name: String,
    #[serde(default)]
    pub srs: Vec<SrsEntry>,
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
    #[serde(default)]
    pub feature_classes: Vec<FeatureClassEntry>,
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub domains: Vec<DomainEntry>,
    #[serde(default)]
    pub required: Vec<RequiredEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrsEntry {
    pub code: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub name: String,
    /// SRS code, must be declared under `[[srs]]`
    pub srs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureClassEntry {
    pub name: String,
    #[serde(default)]
    pub dataset: Option<String>,
    pub geometry_type: String,
    #[serde(default)]
    pub attributes: Vec<AttributeEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeEntry {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    pub field_type: String,
    #[serde(default)]
    pub length: Option<i64>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub mandatory: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEntry {
    pub name: String,
    pub values: Vec<DomainValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainValue {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Feature classes required for one (document type, stage) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredEntry {
    pub document_type: String,
    pub stage: String,
    pub feature_classes: Vec<String>,
}

impl ModelFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid model file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let model: ModelFile = toml::from_str(content).context("Failed to parse model TOML")?;
        model.check()?;
        Ok(model)
    }

    /// Check cross references between sections
    pub fn check(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("model name cannot be empty");
        }

        let srs_codes: BTreeSet<i64> = self.srs.iter().map(|s| s.code).collect();
        for dataset in &self.datasets {
            if !srs_codes.contains(&dataset.srs) {
                anyhow::bail!(
                    "dataset '{}' uses SRS {} which is not declared under [[srs]]",
                    dataset.name,
                    dataset.srs
                );
            }
        }

        let dataset_names: BTreeSet<String> =
            self.datasets.iter().map(|d| normalize_key(&d.name)).collect();
        let domain_names: BTreeSet<String> =
            self.domains.iter().map(|d| normalize_key(&d.name)).collect();

        let mut seen = BTreeSet::new();
        for fc in &self.feature_classes {
            if !seen.insert(normalize_key(&fc.name)) {
                anyhow::bail!("feature class '{}' is declared twice", fc.name);
            }
            if GeometryType::parse(&fc.geometry_type).is_none() {
                anyhow::bail!(
                    "feature class '{}' has unknown geometry type '{}'",
                    fc.name,
                    fc.geometry_type
                );
            }
            if let Some(dataset) = &fc.dataset {
                if !dataset_names.contains(&normalize_key(dataset)) {
                    anyhow::bail!(
                        "feature class '{}' references unknown dataset '{}'",
                        fc.name,
                        dataset
                    );
                }
            }
            for attribute in &fc.attributes {
                if let FieldType::Other(other) = FieldType::parse(&attribute.field_type) {
                    anyhow::bail!(
                        "attribute '{}.{}' has unknown field type '{}'",
                        fc.name,
                        attribute.name,
                        other
                    );
                }
                if let Some(domain) = &attribute.domain {
                    if !domain_names.contains(&normalize_key(domain)) {
                        anyhow::bail!(
                            "attribute '{}.{}' references unknown domain '{}'",
                            fc.name,
                            attribute.name,
                            domain
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) const SAMPLE_MODEL: &str = r#"
name = "SIGM_MINERIA_2022"
tables = ["PROPIETARIOS"]

[[srs]]
code = 4686
name = "MAGNA-SIRGAS"

[[datasets]]
name = "TOPOGRAFIA"
srs = 4686

[[feature_classes]]
name = "POLIGONO_TITULO"
dataset = "TOPOGRAFIA"
geometry_type = "Polygon"

[[feature_classes.attributes]]
name = "EXPEDIENTE"
field_type = "String"
length = 20
mandatory = true

[[feature_classes.attributes]]
name = "ESTADO"
field_type = "String"
domain = "Dom_Estado"

[[domains]]
name = "Dom_Estado"
values = [{ code = "A", description = "Activo" }, { code = "I" }]

[[required]]
document_type = "Formato Básico Minero - FBM"
stage = "Exploración"
feature_classes = ["POLIGONO_TITULO"]
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample_model() {
        let model = ModelFile::parse(SAMPLE_MODEL).unwrap();
        assert_eq!(model.name, "SIGM_MINERIA_2022");
        assert_eq!(model.feature_classes.len(), 1);
        assert_eq!(model.feature_classes[0].attributes.len(), 2);
        assert_eq!(model.domains[0].values.len(), 2);
        assert_eq!(model.required[0].feature_classes, vec!["POLIGONO_TITULO"]);
    }

    #[test]
    fn test_undeclared_srs_is_rejected() {
        let content = SAMPLE_MODEL.replace("srs = 4686", "srs = 3116");
        let err = ModelFile::parse(&content).unwrap_err();
        assert!(format!("{:#}", err).contains("3116"));
    }

    #[test]
    fn test_unknown_geometry_type_is_rejected() {
        let content = SAMPLE_MODEL.replace("geometry_type = \"Polygon\"", "geometry_type = \"Raster\"");
        assert!(ModelFile::parse(&content).is_err());
    }

    #[test]
    fn test_unknown_domain_is_rejected() {
        let content = SAMPLE_MODEL.replace("domain = \"Dom_Estado\"", "domain = \"Dom_Otro\"");
        let err = ModelFile::parse(&content).unwrap_err();
        assert!(format!("{:#}", err).contains("Dom_Otro"));
    }
}
