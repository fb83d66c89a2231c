//! Catalog-level checks: reference systems, datasets, feature classes,
//! tables and required feature classes

use crate::model::VersionModel;
use crate::services::comparison::{
    Category, ValidationMessage, compare_by, compare_category, compare_reference_systems,
};
use crate::workspace::CandidateInventory;

/// Run every catalog-level comparison, in category order
pub fn check_structure(
    model: &VersionModel,
    inventory: &CandidateInventory,
    document_type: &str,
    stage: &str,
) -> Vec<ValidationMessage> {
    let mut messages = Vec::new();

    messages.extend(compare_reference_systems(
        &model.expected_reference_systems(),
        &inventory.reference_systems(),
    ));

    messages.extend(
        compare_by(&model.datasets, &inventory.datasets, |d| d.name.as_str(), |d| d.name.as_str())
            .into_messages(Category::Datasets),
    );

    messages.extend(
        compare_by(
            &model.feature_classes,
            &inventory.feature_classes,
            |fc| fc.name.as_str(),
            |fc| fc.name.as_str(),
        )
        .into_messages(Category::FeatureClasses),
    );

    messages.extend(compare_category(
        Category::Tables,
        model.tables.iter().map(|t| t.name.as_str()),
        &inventory.tables,
    ));

    messages.extend(check_required(model, inventory, document_type, stage));

    messages
}

/// Feature classes the (document type, stage) pair requires
pub fn check_required(
    model: &VersionModel,
    inventory: &CandidateInventory,
    document_type: &str,
    stage: &str,
) -> Vec<ValidationMessage> {
    let required = model.required_feature_classes(document_type, stage);
    if required.is_empty() {
        log::warn!(
            "No required feature classes defined for document type '{}' at stage '{}'",
            document_type,
            stage
        );
    }

    compare_category(Category::Required, required, inventory.feature_class_names())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DatasetSpec, FeatureClassSpec, GeometryType, RequiredRule, TableSpec};
    use crate::workspace::{CandidateDataset, CandidateFeatureClass};
    use std::collections::BTreeSet;

    fn model() -> VersionModel {
        let fc = |name: &str| FeatureClassSpec {
            name: name.to_string(),
            dataset: Some("TOPOGRAFIA".to_string()),
            geometry_type: GeometryType::Polygon,
            attributes: vec![],
        };
        let required = |name: &str| RequiredRule {
            document_type: "PTO".to_string(),
            stage: "Explotación".to_string(),
            feature_class: name.to_string(),
        };
        VersionModel {
            version_id: 1,
            version_name: "v".to_string(),
            datasets: vec![DatasetSpec {
                name: "TOPOGRAFIA".to_string(),
                srs_code: 4686,
                srs_name: "MAGNA-SIRGAS".to_string(),
            }],
            feature_classes: vec![fc("A"), fc("B"), fc("C")],
            tables: vec![TableSpec { name: "PROPIETARIOS".to_string() }],
            required: vec![required("A"), required("C")],
            domains: Default::default(),
        }
    }

    fn inventory() -> CandidateInventory {
        let fc = |name: &str| CandidateFeatureClass {
            name: name.to_string(),
            dataset: Some("TOPOGRAFIA".to_string()),
            geometry_column: "geom".to_string(),
            geometry_type_name: "MULTIPOLYGON".to_string(),
            srs_code: Some(3116),
        };
        CandidateInventory {
            datasets: vec![CandidateDataset {
                name: "TOPOGRAFIA".to_string(),
                srs_codes: BTreeSet::from([3116]),
            }],
            feature_classes: vec![fc("B"), fc("C"), fc("D")],
            tables: vec!["propietarios".to_string(), "TEMP".to_string()],
        }
    }

    fn texts(messages: &[ValidationMessage], category: Category) -> Vec<(&str, bool)> {
        messages
            .iter()
            .filter(|m| m.category == category)
            .map(|m| (m.message.as_str(), m.passed))
            .collect()
    }

    #[test]
    fn test_structure_messages() {
        let messages = check_structure(&model(), &inventory(), "PTO", "Explotación");

        assert_eq!(
            texts(&messages, Category::ReferenceSystem),
            vec![("Reference system mismatch for dataset TOPOGRAFIA: expected 4686, found 3116", false)]
        );
        assert_eq!(
            texts(&messages, Category::Datasets),
            vec![("Dataset correct: TOPOGRAFIA", true)]
        );
        assert_eq!(
            texts(&messages, Category::FeatureClasses),
            vec![
                ("Feature class missing from candidate, expected: A", false),
                ("Feature class present in candidate but not expected: D", false),
                ("Feature class correct: B", true),
                ("Feature class correct: C", true),
            ]
        );
        assert_eq!(
            texts(&messages, Category::Tables),
            vec![
                ("Table present in candidate but not expected: TEMP", false),
                ("Table correct: PROPIETARIOS", true),
            ]
        );
        assert_eq!(
            texts(&messages, Category::Required),
            vec![
                ("Required feature class missing from candidate, expected: A", false),
                ("Required feature class correct: C", true),
            ]
        );

        // Categories come out grouped in a fixed order
        let order: Vec<Category> = messages.iter().map(|m| m.category).collect();
        let mut sorted = order.clone();
        sorted.sort_by_key(|c| Category::ALL.iter().position(|x| x == c));
        assert_eq!(order, sorted);
    }

    #[test]
    fn test_unknown_stage_requires_nothing() {
        let messages = check_required(&model(), &inventory(), "PTO", "Cierre");
        assert!(messages.is_empty());
    }
}
