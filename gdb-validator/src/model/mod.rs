//! Reference data model ("version") a deliverable is validated against

pub mod file;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub use file::ModelFile;

use crate::services::comparison::normalize_key;

/// Expected shape of a valid deliverable for one model version
#[derive(Debug, Clone, Default)]
pub struct VersionModel {
    pub version_id: i64,
    pub version_name: String,
    pub datasets: Vec<DatasetSpec>,
    pub feature_classes: Vec<FeatureClassSpec>,
    pub tables: Vec<TableSpec>,
    pub required: Vec<RequiredRule>,
    /// Domain name -> allowed codes
    pub domains: BTreeMap<String, BTreeSet<String>>,
}

impl VersionModel {
    /// Dataset name -> expected SRS code
    pub fn expected_reference_systems(&self) -> BTreeMap<String, i64> {
        self.datasets
            .iter()
            .map(|d| (d.name.clone(), d.srs_code))
            .collect()
    }

    /// Feature classes required for a document type and stage
    pub fn required_feature_classes(&self, document_type: &str, stage: &str) -> Vec<&str> {
        self.required
            .iter()
            .filter(|r| {
                r.document_type.trim().eq_ignore_ascii_case(document_type.trim())
                    && r.stage.trim().eq_ignore_ascii_case(stage.trim())
            })
            .map(|r| r.feature_class.as_str())
            .collect()
    }

    pub fn feature_class(&self, name: &str) -> Option<&FeatureClassSpec> {
        let key = normalize_key(name);
        self.feature_classes.iter().find(|fc| normalize_key(&fc.name) == key)
    }

    pub fn domain(&self, name: &str) -> Option<&BTreeSet<String>> {
        let key = normalize_key(name);
        self.domains
            .iter()
            .find(|(domain, _)| normalize_key(domain) == key)
            .map(|(_, codes)| codes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub name: String,
    pub srs_code: i64,
    pub srs_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureClassSpec {
    pub name: String,
    pub dataset: Option<String>,
    pub geometry_type: GeometryType,
    pub attributes: Vec<AttributeSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredRule {
    pub document_type: String,
    pub stage: String,
    pub feature_class: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    pub alias: Option<String>,
    pub field_type: FieldType,
    pub length: Option<i64>,
    pub domain: Option<String>,
    pub mandatory: bool,
}

/// Shape type of a feature class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    Multipoint,
    Polyline,
    Polygon,
}

impl GeometryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::Multipoint => "Multipoint",
            Self::Polyline => "Polyline",
            Self::Polygon => "Polygon",
        }
    }

    /// Parse a model geometry type name
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "point" => Some(Self::Point),
            "multipoint" => Some(Self::Multipoint),
            "polyline" | "line" | "linestring" => Some(Self::Polyline),
            "polygon" => Some(Self::Polygon),
            _ => None,
        }
    }

    /// Map a GeoPackage `geometry_type_name` onto a shape type
    ///
    /// Multi-part line and polygon layers share the shape type of their
    /// single-part counterparts; the part count is a topology concern.
    pub fn from_geopackage(type_name: &str) -> Option<Self> {
        match type_name.trim().to_ascii_uppercase().as_str() {
            "POINT" => Some(Self::Point),
            "MULTIPOINT" => Some(Self::Multipoint),
            "LINESTRING" | "MULTILINESTRING" | "CURVE" | "MULTICURVE" => Some(Self::Polyline),
            "POLYGON" | "MULTIPOLYGON" | "SURFACE" | "MULTISURFACE" | "CURVEPOLYGON" => {
                Some(Self::Polygon)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for GeometryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attribute data types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Integer,
    SmallInteger,
    Double,
    Float,
    Date,
    Guid,
    Blob,
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "String",
            Self::Integer => "Integer",
            Self::SmallInteger => "SmallInteger",
            Self::Double => "Double",
            Self::Float => "Float",
            Self::Date => "Date",
            Self::Guid => "Guid",
            Self::Blob => "Blob",
            Self::Other(s) => s,
        }
    }

    /// Parse a model field type name
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "string" | "text" => Self::String,
            "integer" | "long" => Self::Integer,
            "smallinteger" | "short" => Self::SmallInteger,
            "double" => Self::Double,
            "float" | "single" => Self::Float,
            "date" => Self::Date,
            "guid" | "globalid" => Self::Guid,
            "blob" => Self::Blob,
            _ => Self::Other(value.trim().to_string()),
        }
    }

    /// Map a GeoPackage column declaration (`TEXT(50)`, `INTEGER`, ...) onto
    /// a field type and optional declared length
    pub fn from_geopackage(declared: &str) -> (Self, Option<i64>) {
        let declared = declared.trim().to_ascii_uppercase();
        let (base, length) = match declared.split_once('(') {
            Some((base, rest)) => (
                base.trim().to_string(),
                rest.trim_end_matches(')').trim().parse::<i64>().ok(),
            ),
            None => (declared.clone(), None),
        };

        let field_type = match base.as_str() {
            "TEXT" => Self::String,
            "INT" | "INTEGER" | "MEDIUMINT" => Self::Integer,
            "SMALLINT" | "TINYINT" => Self::SmallInteger,
            "DOUBLE" | "REAL" => Self::Double,
            "FLOAT" => Self::Float,
            "DATE" | "DATETIME" => Self::Date,
            "BLOB" => Self::Blob,
            _ => Self::Other(base.clone()),
        };

        (field_type, length)
    }

    /// Whether an observed column type satisfies this expected type
    pub fn accepts(&self, observed: &FieldType) -> bool {
        match (self, observed) {
            // GeoPackage has no GUID type; identifiers are stored as text
            (Self::Guid, Self::String) => true,
            (expected, observed) => expected == observed,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
