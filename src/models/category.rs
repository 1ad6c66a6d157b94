//! Problem category classification records.

use serde::{Deserialize, Serialize};

/// Main mathematical concept of a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathCategory {
    Arithmetic,
    Algebra,
    Counting,
    Geometry,
    NumberTheory,
    Probability,
    Other,
}

impl MathCategory {
    pub const ALL: [MathCategory; 7] = [
        MathCategory::Arithmetic,
        MathCategory::Algebra,
        MathCategory::Counting,
        MathCategory::Geometry,
        MathCategory::NumberTheory,
        MathCategory::Probability,
        MathCategory::Other,
    ];

    /// Label as it appears in the classifier prompt.
    pub fn label(self) -> &'static str {
        match self {
            MathCategory::Arithmetic => "arithmetic",
            MathCategory::Algebra => "algebra",
            MathCategory::Counting => "counting",
            MathCategory::Geometry => "geometry",
            MathCategory::NumberTheory => "number theory",
            MathCategory::Probability => "probability",
            MathCategory::Other => "other",
        }
    }

    /// Category named in `label`. When several are mentioned the earliest
    /// one wins.
    pub fn from_label(label: &str) -> Option<Self> {
        let lower = label.to_lowercase().replace('_', " ");
        Self::ALL
            .iter()
            .filter_map(|c| lower.find(c.label()).map(|pos| (pos, *c)))
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, c)| c)
    }

    /// Read the `Category:` line of a classifier response.
    pub fn from_response(text: &str) -> Option<Self> {
        text.lines().find_map(|line| {
            let line = line.trim().trim_start_matches(['*', '#', '-', ' ']);
            let rest = line
                .get(..9)
                .filter(|head| head.eq_ignore_ascii_case("category:"))
                .map(|_| &line[9..])?;
            Self::from_label(rest)
        })
    }
}

impl std::fmt::Display for MathCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifier output for one problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub problem_id: String,

    #[serde(default)]
    pub competition_id: String,

    /// Parsed category, absent when the response names none
    #[serde(default)]
    pub category: Option<MathCategory>,

    /// Raw classifier response
    pub response: String,

    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl CategoryRecord {
    pub fn new(
        problem_id: impl Into<String>,
        competition_id: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        let response = response.into();
        Self {
            problem_id: problem_id.into(),
            competition_id: competition_id.into(),
            category: MathCategory::from_response(&response),
            response,
            metadata: serde_json::Map::new(),
        }
    }
}

/// Statistics for a classification run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationStats {
    /// Problems in the corpus
    pub total_problems: usize,

    /// Problems classified this run
    pub classified: usize,

    /// Problems already classified on entry
    pub skipped: usize,

    /// Responses with no recognizable category
    pub unparsed: usize,

    /// Total runtime in seconds
    pub runtime_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_response() {
        let response = "Concept: [modular arithmetic]\nCategory: [Number Theory]\nSimple Explanation: [...]";
        assert_eq!(
            MathCategory::from_response(response),
            Some(MathCategory::NumberTheory)
        );
        assert_eq!(
            MathCategory::from_response("**Category:** Geometry"),
            Some(MathCategory::Geometry)
        );
        assert_eq!(
            MathCategory::from_response("category: algebra and geometry"),
            Some(MathCategory::Algebra)
        );
    }

    #[test]
    fn test_response_without_category_line() {
        assert_eq!(MathCategory::from_response("This is about geometry."), None);
        assert_eq!(MathCategory::from_response("Category: [calculus]"), None);
        assert_eq!(MathCategory::from_response(""), None);
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_value(MathCategory::NumberTheory).unwrap();
        assert_eq!(json, "number_theory");
        assert_eq!(MathCategory::NumberTheory.to_string(), "number theory");
    }
}
