// Comparison service for diffing a version model against a candidate
//
// Every category (datasets, feature classes, tables, required objects,
// attributes) goes through the same set comparison; only the key extraction
// and the message wording differ.

pub mod core;
pub mod models;

pub use self::core::{
    compare_by, compare_category, compare_keys, compare_reference_systems, normalize_key,
};
pub use models::{Category, MessageStats, SetComparison, ValidationMessage};
