//! Set comparison between a reference model and a candidate geodatabase
//!
//! This module provides functions to:
//! - Partition two key sets into missing, extra and correct entries
//! - Compare an attached value (SRS code) for keys present on both sides
//! - Normalize entity names so comparisons ignore case and padding

use std::collections::{BTreeMap, BTreeSet};

use super::models::{Category, SetComparison, ValidationMessage};

/// Normalize a geodatabase entity name for comparison
pub fn normalize_key(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Compare two sets of names
///
/// # Arguments
/// * `reference` - Names the version model expects
/// * `candidate` - Names observed in the uploaded geodatabase
///
/// # Returns
/// A `SetComparison` whose three partitions are disjoint and together cover
/// every distinct (normalized) name of both inputs
pub fn compare_keys<R, C>(reference: R, candidate: C) -> SetComparison
where
    R: IntoIterator,
    R::Item: AsRef<str>,
    C: IntoIterator,
    C::Item: AsRef<str>,
{
    // Build lookup maps keyed by normalized name; first spelling wins
    let mut reference_map: BTreeMap<String, String> = BTreeMap::new();
    for name in reference {
        let name = name.as_ref();
        reference_map
            .entry(normalize_key(name))
            .or_insert_with(|| name.trim().to_string());
    }

    let mut candidate_map: BTreeMap<String, String> = BTreeMap::new();
    for name in candidate {
        let name = name.as_ref();
        candidate_map
            .entry(normalize_key(name))
            .or_insert_with(|| name.trim().to_string());
    }

    let mut comparison = SetComparison::default();

    for (key, display) in &reference_map {
        if candidate_map.contains_key(key) {
            comparison.correct.push(display.clone());
        } else {
            comparison.missing.push(display.clone());
        }
    }

    for (key, display) in &candidate_map {
        if !reference_map.contains_key(key) {
            comparison.extra.push(display.clone());
        }
    }

    comparison
}

/// Compare two slices of arbitrary entities by an extracted key
pub fn compare_by<R, C, FR, FC>(
    reference: &[R],
    candidate: &[C],
    reference_key: FR,
    candidate_key: FC,
) -> SetComparison
where
    FR: Fn(&R) -> &str,
    FC: Fn(&C) -> &str,
{
    compare_keys(
        reference.iter().map(reference_key),
        candidate.iter().map(candidate_key),
    )
}

/// Compare a category's names and produce its result messages
pub fn compare_category<R, C>(category: Category, reference: R, candidate: C) -> Vec<ValidationMessage>
where
    R: IntoIterator,
    R::Item: AsRef<str>,
    C: IntoIterator,
    C::Item: AsRef<str>,
{
    compare_keys(reference, candidate).into_messages(category)
}

/// Compare reference-system codes of datasets
///
/// # Arguments
/// * `expected` - Dataset name to expected SRS code
/// * `observed` - Dataset name to the distinct SRS codes found in the candidate
///
/// Datasets only present on one side produce missing/extra messages, exactly
/// like the plain set comparison. Datasets present on both sides pass only
/// when the candidate carries exactly the expected code.
pub fn compare_reference_systems(
    expected: &BTreeMap<String, i64>,
    observed: &BTreeMap<String, BTreeSet<i64>>,
) -> Vec<ValidationMessage> {
    let category = Category::ReferenceSystem;

    let observed_by_key: BTreeMap<String, &BTreeSet<i64>> = observed
        .iter()
        .map(|(name, codes)| (normalize_key(name), codes))
        .collect();

    let comparison = compare_keys(expected.keys(), observed.keys());

    let mut messages = Vec::with_capacity(comparison.len());

    for name in &comparison.missing {
        messages.push(ValidationMessage::fail(category, category.missing_message(name)));
    }

    for name in &comparison.extra {
        messages.push(ValidationMessage::fail(category, category.extra_message(name)));
    }

    for name in &comparison.correct {
        let expected_code = expected
            .iter()
            .find(|(k, _)| normalize_key(k) == normalize_key(name))
            .map(|(_, code)| *code);
        let observed_codes = observed_by_key.get(&normalize_key(name));

        let (Some(expected_code), Some(observed_codes)) = (expected_code, observed_codes) else {
            continue;
        };

        if observed_codes.len() == 1 && observed_codes.contains(&expected_code) {
            messages.push(ValidationMessage::pass(
                category,
                format!("Reference system correct for dataset {}: {}", name, expected_code),
            ));
        } else {
            let found = if observed_codes.is_empty() {
                "none".to_string()
            } else {
                observed_codes
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            messages.push(ValidationMessage::fail(
                category,
                format!(
                    "Reference system mismatch for dataset {}: expected {}, found {}",
                    name, expected_code, found
                ),
            ));
        }
    }

    messages
}
