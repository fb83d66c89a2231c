use serde::{Deserialize, Serialize};

/// Validator category. Each variant maps to one row of the `validators`
/// lookup table and carries the wording used in its result messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    SpatialMatching,
    ReferenceSystem,
    Datasets,
    FeatureClasses,
    Tables,
    Required,
    Attributes,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::SpatialMatching,
        Category::ReferenceSystem,
        Category::Datasets,
        Category::FeatureClasses,
        Category::Tables,
        Category::Required,
        Category::Attributes,
    ];

    /// Description stored in the `validators` lookup table
    pub fn lookup_name(&self) -> &'static str {
        match self {
            Self::SpatialMatching => "SPATIAL MATCHING",
            Self::ReferenceSystem => "REFERENCE SYSTEM",
            Self::Datasets => "DATASETS",
            Self::FeatureClasses => "FEATURE CLASSES",
            Self::Tables => "TABLES",
            Self::Required => "REQUIRED",
            Self::Attributes => "ATTRIBUTES",
        }
    }

    pub fn from_lookup_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.lookup_name().eq_ignore_ascii_case(name.trim()))
    }

    /// Noun used in messages ("Dataset missing from candidate ...")
    pub fn entity_label(&self) -> &'static str {
        match self {
            Self::SpatialMatching => "Boundary polygon",
            Self::ReferenceSystem => "Dataset",
            Self::Datasets => "Dataset",
            Self::FeatureClasses => "Feature class",
            Self::Tables => "Table",
            Self::Required => "Required feature class",
            Self::Attributes => "Attribute",
        }
    }

    /// Whether keys found only in the candidate are reported.
    ///
    /// Required-object rules only say what must be present; anything else in
    /// the candidate is judged by the feature class category.
    pub fn reports_extra(&self) -> bool {
        !matches!(self, Self::Required)
    }

    pub fn missing_message(&self, key: &str) -> String {
        format!("{} missing from candidate, expected: {}", self.entity_label(), key)
    }

    pub fn extra_message(&self, key: &str) -> String {
        format!(
            "{} present in candidate but not expected: {}",
            self.entity_label(),
            key
        )
    }

    pub fn correct_message(&self, key: &str) -> String {
        format!("{} correct: {}", self.entity_label(), key)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.lookup_name())
    }
}

/// One comparison outcome, persisted as a row of `run_messages`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub category: Category,
    pub message: String,
    pub passed: bool,
}

impl ValidationMessage {
    pub fn pass(category: Category, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            passed: true,
        }
    }

    pub fn fail(category: Category, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            passed: false,
        }
    }
}

/// The three disjoint partitions of `reference ∪ candidate`
///
/// Entries hold display names: the reference spelling for `missing` and
/// `correct`, the candidate spelling for `extra`. Each list is sorted by
/// normalized key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetComparison {
    pub missing: Vec<String>,
    pub extra: Vec<String>,
    pub correct: Vec<String>,
}

impl SetComparison {
    #[cfg(test)]
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }

    /// Total number of distinct keys across both inputs
    pub fn len(&self) -> usize {
        self.missing.len() + self.extra.len() + self.correct.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Turn the partitions into result messages: missing, extra, correct
    pub fn into_messages(self, category: Category) -> Vec<ValidationMessage> {
        let mut messages = Vec::with_capacity(self.len());

        for key in &self.missing {
            messages.push(ValidationMessage::fail(category, category.missing_message(key)));
        }

        if category.reports_extra() {
            for key in &self.extra {
                messages.push(ValidationMessage::fail(category, category.extra_message(key)));
            }
        }

        for key in &self.correct {
            messages.push(ValidationMessage::pass(category, category.correct_message(key)));
        }

        messages
    }
}

/// Summary counts over a list of messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MessageStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl MessageStats {
    pub fn from_messages(messages: &[ValidationMessage]) -> Self {
        let passed = messages.iter().filter(|m| m.passed).count();
        Self {
            total: messages.len(),
            passed,
            failed: messages.len() - passed,
        }
    }
}
