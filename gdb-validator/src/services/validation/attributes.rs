//! Per-feature-class conformance: geometry type, topology, field set,
//! field types, mandatory values, domains and the case code field

use anyhow::Result;
use std::collections::{BTreeSet, HashMap};

use crate::model::{AttributeSpec, FeatureClassSpec, FieldType, GeometryType, VersionModel};
use crate::services::comparison::{Category, ValidationMessage, compare_keys, normalize_key};
use crate::workspace::{CandidateFeatureClass, CandidateInventory, ColumnInfo, ValueCount, Workspace};

const CATEGORY: Category = Category::Attributes;

/// Record-level settings of the attribute checks
#[derive(Debug, Clone)]
pub struct AttributeRules<'a> {
    /// Field that must equal the run's case code on every record
    pub case_code_field: Option<&'a str>,
    pub case_code: &'a str,
    /// Values counted as empty in mandatory fields, besides NULL and ''
    pub null_sentinels: &'a [String],
}

impl AttributeRules<'_> {
    fn is_empty_value(&self, value: Option<&str>) -> bool {
        match value.map(str::trim) {
            None | Some("") => true,
            Some(v) => self.null_sentinels.iter().any(|s| s.trim().eq_ignore_ascii_case(v)),
        }
    }
}

/// Check every feature class present in both the model and the candidate
///
/// A feature class that cannot be read yields one fail message and the
/// remaining feature classes are still checked.
pub async fn check_attributes(
    workspace: &dyn Workspace,
    model: &VersionModel,
    inventory: &CandidateInventory,
    rules: &AttributeRules<'_>,
) -> Vec<ValidationMessage> {
    let mut specs: Vec<&FeatureClassSpec> = model.feature_classes.iter().collect();
    specs.sort_by_key(|fc| normalize_key(&fc.name));

    let mut messages = Vec::new();
    for spec in specs {
        let Some(candidate) = inventory.feature_class(&spec.name) else {
            continue;
        };

        match check_feature_class(workspace, model, spec, candidate, rules).await {
            Ok(fc_messages) => {
                log::debug!("Feature class {}: {} attribute messages", spec.name, fc_messages.len());
                messages.extend(fc_messages);
            }
            Err(e) => {
                log::error!("Failed to validate feature class {}: {:#}", spec.name, e);
                messages.push(ValidationMessage::fail(
                    CATEGORY,
                    format!("Failed to validate feature class {}: {:#}", spec.name, e),
                ));
            }
        }
    }
    messages
}

async fn check_feature_class(
    workspace: &dyn Workspace,
    model: &VersionModel,
    spec: &FeatureClassSpec,
    candidate: &CandidateFeatureClass,
    rules: &AttributeRules<'_>,
) -> Result<Vec<ValidationMessage>> {
    let mut messages = vec![check_geometry_type(spec, candidate)];

    let summaries = workspace.geometry_summaries(candidate).await?;
    let multipart = summaries.iter().filter(|s| s.is_multipart()).count();
    messages.push(if multipart == 0 {
        ValidationMessage::pass(CATEGORY, format!("Topology correct for {}: Simple", spec.name))
    } else {
        ValidationMessage::fail(
            CATEGORY,
            format!(
                "Topology error for {}: {} multipart feature(s), expected Simple",
                spec.name, multipart
            ),
        )
    });

    // Geometry and primary key columns are not attributes
    let columns: Vec<ColumnInfo> = workspace
        .columns(&candidate.name)
        .await?
        .into_iter()
        .filter(|c| !c.primary_key && normalize_key(&c.name) != normalize_key(&candidate.geometry_column))
        .collect();

    messages.extend(
        compare_keys(
            spec.attributes.iter().map(|a| format!("{}.{}", spec.name, a.name)),
            columns.iter().map(|c| format!("{}.{}", spec.name, c.name)),
        )
        .into_messages(CATEGORY),
    );

    let by_name: HashMap<String, &ColumnInfo> =
        columns.iter().map(|c| (normalize_key(&c.name), c)).collect();

    for attribute in &spec.attributes {
        let Some(column) = by_name.get(&normalize_key(&attribute.name)) else {
            continue;
        };
        let field = format!("{}.{}", spec.name, attribute.name);
        messages.extend(check_declaration(&field, attribute, column));

        let domain = match &attribute.domain {
            Some(name) => {
                let codes = model.domain(name);
                if codes.is_none() {
                    log::warn!("Field {} references unknown domain {}", field, name);
                }
                codes.map(|codes| (name.as_str(), codes))
            }
            None => None,
        };
        if !attribute.mandatory && domain.is_none() {
            continue;
        }

        let values = workspace.value_counts(&candidate.name, &column.name).await?;

        if attribute.mandatory {
            let empty: i64 = values
                .iter()
                .filter(|v| rules.is_empty_value(v.value.as_deref()))
                .map(|v| v.count)
                .sum();
            if empty > 0 {
                messages.push(ValidationMessage::fail(
                    CATEGORY,
                    format!("Mandatory field {} has {} empty value(s)", field, empty),
                ));
            }
        }

        if let Some((domain_name, codes)) = domain {
            let outside = count_outside_domain(&values, codes);
            if outside > 0 {
                messages.push(ValidationMessage::fail(
                    CATEGORY,
                    format!("Field {} has {} value(s) outside domain {}", field, outside, domain_name),
                ));
            }
        }
    }

    if let Some(case_field) = rules.case_code_field {
        if let Some(column) = by_name.get(&normalize_key(case_field)) {
            let values = workspace.value_counts(&candidate.name, &column.name).await?;
            messages.push(check_case_code(&spec.name, &column.name, &values, rules.case_code));
        }
    }

    Ok(messages)
}

fn check_geometry_type(spec: &FeatureClassSpec, candidate: &CandidateFeatureClass) -> ValidationMessage {
    match GeometryType::from_geopackage(&candidate.geometry_type_name) {
        Some(found) if found == spec.geometry_type => ValidationMessage::pass(
            CATEGORY,
            format!("Geometry type correct for {}: {}", spec.name, found),
        ),
        _ => ValidationMessage::fail(
            CATEGORY,
            format!(
                "Geometry type mismatch for {}: expected {}, found {}",
                spec.name, spec.geometry_type, candidate.geometry_type_name
            ),
        ),
    }
}

/// Declared type and text length of a matching field
fn check_declaration(field: &str, attribute: &AttributeSpec, column: &ColumnInfo) -> Vec<ValidationMessage> {
    let mut messages = Vec::new();

    if !attribute.field_type.accepts(&column.field_type) {
        messages.push(ValidationMessage::fail(
            CATEGORY,
            format!(
                "Field type mismatch for {}: expected {}, found {}",
                field, attribute.field_type, column.declared_type
            ),
        ));
        return messages;
    }

    if attribute.field_type == FieldType::String {
        if let Some(expected) = attribute.length {
            if column.length != Some(expected) {
                let found = column
                    .length
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "unbounded".to_string());
                messages.push(ValidationMessage::fail(
                    CATEGORY,
                    format!("Field length mismatch for {}: expected {}, found {}", field, expected, found),
                ));
            }
        }
    }

    messages
}

/// Records whose non-empty value is not a code of the domain
fn count_outside_domain(values: &[ValueCount], codes: &BTreeSet<String>) -> i64 {
    values
        .iter()
        .filter(|v| match v.value.as_deref().map(str::trim) {
            None | Some("") => false,
            Some(value) => !codes.iter().any(|code| code.trim() == value),
        })
        .map(|v| v.count)
        .sum()
}

fn check_case_code(feature_class: &str, column: &str, values: &[ValueCount], case_code: &str) -> ValidationMessage {
    let expected = case_code.trim();
    let mismatched: i64 = values
        .iter()
        .filter(|v| v.value.as_deref().map(str::trim) != Some(expected))
        .map(|v| v.count)
        .sum();

    if mismatched == 0 {
        ValidationMessage::pass(
            CATEGORY,
            format!("Field {}.{} matches case code {}", feature_class, column, expected),
        )
    } else {
        ValidationMessage::fail(
            CATEGORY,
            format!(
                "Field {}.{} does not match case code {} on {} record(s)",
                feature_class, column, expected, mismatched
            ),
        )
    }
}
