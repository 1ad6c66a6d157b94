//! Problem, sample and result types for cpseval.
//!
//! These types represent the core data flow: corpus problems feed
//! generation, generated samples accumulate judge verdicts stage by stage,
//! and scored results are derived from both.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved key holding the aggregated verdict inside a stage mapping.
pub const FINAL_DECISION_KEY: &str = "final_decision";

/// Competition a problem was drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CompetitionType {
    Amc8,
    Amc10,
    Amc12,
    Ahsme,
    Aime,
    Usajmo,
    Usamo,
    Imo,
    /// Anything not in the difficulty table, kept verbatim
    Other(String),
}

impl CompetitionType {
    /// Known competitions, easiest first.
    pub const KNOWN: [CompetitionType; 8] = [
        CompetitionType::Amc8,
        CompetitionType::Amc10,
        CompetitionType::Amc12,
        CompetitionType::Ahsme,
        CompetitionType::Aime,
        CompetitionType::Usajmo,
        CompetitionType::Usamo,
        CompetitionType::Imo,
    ];

    /// Canonical corpus label.
    pub fn as_str(&self) -> &str {
        match self {
            CompetitionType::Amc8 => "AMC_8",
            CompetitionType::Amc10 => "AMC_10",
            CompetitionType::Amc12 => "AMC_12",
            CompetitionType::Ahsme => "AHSME",
            CompetitionType::Aime => "AIME",
            CompetitionType::Usajmo => "USAJMO",
            CompetitionType::Usamo => "USAMO",
            CompetitionType::Imo => "IMO",
            CompetitionType::Other(label) => label,
        }
    }

    /// Parse a label such as "AIME" or a competition id such as
    /// "2004_AMC_8_Problems". Unrecognized labels become `Other`.
    pub fn parse(label: &str) -> Self {
        let upper = label.trim().to_uppercase();
        if let Some(known) = Self::KNOWN.iter().find(|c| c.as_str() == upper) {
            return known.clone();
        }

        // Competition ids embed the label between underscores; match whole
        // segments so "AMC_10" never matches "AMC_1".
        let padded = format!("_{}_", upper.replace([' ', '-'], "_"));
        Self::KNOWN
            .iter()
            .find(|c| padded.contains(&format!("_{}_", c.as_str())))
            .cloned()
            .unwrap_or_else(|| CompetitionType::Other(label.trim().to_string()))
    }
}

impl From<String> for CompetitionType {
    fn from(label: String) -> Self {
        Self::parse(&label)
    }
}

impl From<CompetitionType> for String {
    fn from(c: CompetitionType) -> Self {
        c.as_str().to_string()
    }
}

impl std::fmt::Display for CompetitionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Competition problem with its reference solutions.
///
/// Immutable once loaded. `reference_solutions` order is significant: the
/// first `k` entries are the context a sample was generated with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub problem_id: String,
    pub competition: CompetitionType,
    #[serde(default)]
    pub competition_id: String,
    pub text: String,
    pub reference_solutions: Vec<String>,
}

impl Problem {
    /// Total number of reference solutions (n).
    pub fn n(&self) -> usize {
        self.reference_solutions.len()
    }
}

/// Binary judge verdict.
///
/// Deserialization is lenient: any stored text containing "YES" reads as
/// `Yes`, everything else as `No`, mirroring how raw judge output is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum Decision {
    Yes,
    No,
}

impl Decision {
    /// Extract a verdict from raw judge text.
    ///
    /// Only the literal token "YES" counts; there is no unparseable state.
    pub fn from_judge_text(text: &str) -> Self {
        if text.contains("YES") {
            Decision::Yes
        } else {
            Decision::No
        }
    }

    pub fn is_yes(self) -> bool {
        self == Decision::Yes
    }
}

impl From<String> for Decision {
    fn from(text: String) -> Self {
        Self::from_judge_text(&text)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Yes => write!(f, "YES"),
            Decision::No => write!(f, "NO"),
        }
    }
}

/// Evaluation stage, run in this order with a barrier between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Correctness,
    CoarseNovelty,
    FineNovelty,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Correctness, Stage::CoarseNovelty, Stage::FineNovelty];

    /// Field name in the persisted sample.
    pub fn field(self) -> &'static str {
        match self {
            Stage::Correctness => "correctness",
            Stage::CoarseNovelty => "coarse_grained_novelty",
            Stage::FineNovelty => "fine_grained_novelty",
        }
    }

    /// Stage whose final decision gates this one.
    pub fn previous(self) -> Option<Stage> {
        match self {
            Stage::Correctness => None,
            Stage::CoarseNovelty => Some(Stage::Correctness),
            Stage::FineNovelty => Some(Stage::CoarseNovelty),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field())
    }
}

/// Per-stage verdicts: evaluator name → verdict, plus `final_decision`.
///
/// Serialized as one flat JSON object, e.g.
/// `{"final_decision": "YES", "gpt-4o": "YES", "gemini-1.5-pro": "NO"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageVerdicts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_decision: Option<Decision>,

    #[serde(flatten)]
    pub evaluators: BTreeMap<String, Decision>,
}

impl StageVerdicts {
    pub fn get(&self, evaluator: &str) -> Option<Decision> {
        self.evaluators.get(evaluator).copied()
    }

    pub fn has_verdict(&self, evaluator: &str) -> bool {
        self.evaluators.contains_key(evaluator)
    }

    pub fn record(&mut self, evaluator: &str, decision: Decision) {
        self.evaluators.insert(evaluator.to_string(), decision);
    }

    /// Whether the aggregated verdict is YES.
    pub fn passed(&self) -> bool {
        self.final_decision.is_some_and(Decision::is_yes)
    }
}

/// One generated candidate solution for one problem at one context depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Source problem
    pub problem_id: String,

    /// Reference solutions given as context during generation
    pub k: usize,

    /// Reference solutions available for the problem
    pub n: usize,

    /// Candidate solution text
    pub response: String,

    #[serde(default)]
    pub correctness: StageVerdicts,

    #[serde(default)]
    pub coarse_grained_novelty: StageVerdicts,

    #[serde(default)]
    pub fine_grained_novelty: StageVerdicts,

    /// Upstream generation metadata, passed through untouched
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Sample {
    /// Create a sample with empty evaluation fields.
    pub fn new(problem_id: impl Into<String>, k: usize, n: usize, response: impl Into<String>) -> Self {
        Self {
            problem_id: problem_id.into(),
            k,
            n,
            response: response.into(),
            correctness: StageVerdicts::default(),
            coarse_grained_novelty: StageVerdicts::default(),
            fine_grained_novelty: StageVerdicts::default(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Stable key for this sample.
    pub fn id(&self) -> String {
        sample_id(&self.problem_id, self.k)
    }

    pub fn stage(&self, stage: Stage) -> &StageVerdicts {
        match stage {
            Stage::Correctness => &self.correctness,
            Stage::CoarseNovelty => &self.coarse_grained_novelty,
            Stage::FineNovelty => &self.fine_grained_novelty,
        }
    }

    pub fn stage_mut(&mut self, stage: Stage) -> &mut StageVerdicts {
        match stage {
            Stage::Correctness => &mut self.correctness,
            Stage::CoarseNovelty => &mut self.coarse_grained_novelty,
            Stage::FineNovelty => &mut self.fine_grained_novelty,
        }
    }

    /// Whether every reference solution was already given as context.
    pub fn saw_all_references(&self) -> bool {
        self.k >= self.n
    }
}

/// Key for a (problem, k) pair.
pub fn sample_id(problem_id: &str, k: usize) -> String {
    format!("{problem_id}_{k}")
}

/// Scores derived from a sample and its problem. Never persisted by the
/// orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub correctness: bool,
    pub novelty_score: f64,
    pub process_score: f64,
    pub difficulty_d: f64,
    pub alpha: f64,
    pub cps: f64,
}

/// Scored result tagged with its sample, as written by `cpseval score`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSample {
    pub problem_id: String,
    pub k: usize,
    #[serde(flatten)]
    pub result: ScoredResult,
}

/// Summary of an evaluation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationSummary {
    /// Samples in the working set
    pub total_samples: usize,

    /// Samples whose correctness final decision is YES
    pub correct: usize,

    /// Samples whose coarse novelty final decision is YES
    pub novel: usize,

    /// Samples whose fine novelty final decision is YES
    pub fine_novel: usize,

    /// Judge calls made during this run
    pub judge_calls: usize,

    /// Verdicts forced to NO by gating
    pub forced_verdicts: usize,

    /// (stage, evaluator, sample) steps already recorded on entry
    pub skipped_steps: usize,

    pub correct_ratio: f64,
    pub novel_ratio: f64,
    pub fine_novel_ratio: f64,
    pub novel_given_correct: f64,
    pub fine_novel_given_novel: f64,

    /// Total runtime in seconds
    pub runtime_secs: f64,
}

impl EvaluationSummary {
    /// Calculate derived ratios. A zero denominator yields 0.
    pub fn finalize(&mut self) {
        self.correct_ratio = ratio(self.correct, self.total_samples);
        self.novel_ratio = ratio(self.novel, self.total_samples);
        self.fine_novel_ratio = ratio(self.fine_novel, self.total_samples);
        self.novel_given_correct = ratio(self.novel, self.correct);
        self.fine_novel_given_novel = ratio(self.fine_novel, self.novel);
    }
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Statistics for a generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Problems in the corpus
    pub total_problems: usize,

    /// Samples generated during this run
    pub generated: usize,

    /// (problem, k) pairs already present on entry
    pub skipped: usize,

    /// Total runtime in seconds
    pub runtime_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_verdicts_flat_json_shape() {
        let mut verdicts = StageVerdicts::default();
        verdicts.record("gpt-4o", Decision::Yes);
        verdicts.record("gemini-1.5-pro", Decision::No);
        verdicts.final_decision = Some(Decision::Yes);

        let json = serde_json::to_value(&verdicts).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "final_decision": "YES",
                "gemini-1.5-pro": "NO",
                "gpt-4o": "YES"
            })
        );

        let back: StageVerdicts = serde_json::from_value(json).unwrap();
        assert_eq!(back, verdicts);
    }

    #[test]
    fn test_decision_reads_raw_judge_text() {
        let verdicts: StageVerdicts = serde_json::from_value(serde_json::json!({
            "claude": "After careful review: YES",
            "gpt-4o": "N/A",
            "gemini": "yes"
        }))
        .unwrap();

        assert_eq!(verdicts.get("claude"), Some(Decision::Yes));
        assert_eq!(verdicts.get("gpt-4o"), Some(Decision::No));
        // Lowercase is not the token
        assert_eq!(verdicts.get("gemini"), Some(Decision::No));
        assert_eq!(verdicts.final_decision, None);
    }

    #[test]
    fn test_sample_preserves_generation_metadata() {
        let json = serde_json::json!({
            "problem_id": "AIME_2001_3",
            "k": 1,
            "n": 3,
            "response": "Let x = 2.",
            "model": "gpt-4o",
            "prompt": "Solve..."
        });

        let sample: Sample = serde_json::from_value(json).unwrap();
        assert_eq!(sample.id(), "AIME_2001_3_1");
        assert!(sample.correctness.evaluators.is_empty());
        assert_eq!(sample.metadata["model"], "gpt-4o");

        let out = serde_json::to_value(&sample).unwrap();
        assert_eq!(out["prompt"], "Solve...");
        assert_eq!(out["correctness"], serde_json::json!({}));
    }

    #[test]
    fn test_competition_type_parsing() {
        assert_eq!(CompetitionType::parse("AIME"), CompetitionType::Aime);
        assert_eq!(CompetitionType::parse("amc_10"), CompetitionType::Amc10);
        assert_eq!(
            CompetitionType::parse("2004_AMC_8_Problems"),
            CompetitionType::Amc8
        );
        assert_eq!(
            CompetitionType::parse("1985_USAMO_Problems"),
            CompetitionType::Usamo
        );
        assert_eq!(
            CompetitionType::parse("Putnam"),
            CompetitionType::Other("Putnam".to_string())
        );
    }

    #[test]
    fn test_summary_ratios_with_zero_denominators() {
        let mut summary = EvaluationSummary {
            total_samples: 4,
            correct: 0,
            ..Default::default()
        };
        summary.finalize();
        assert_eq!(summary.correct_ratio, 0.0);
        assert_eq!(summary.novel_given_correct, 0.0);
        assert_eq!(summary.fine_novel_given_novel, 0.0);

        let mut summary = EvaluationSummary {
            total_samples: 4,
            correct: 2,
            novel: 1,
            fine_novel: 1,
            ..Default::default()
        };
        summary.finalize();
        assert_eq!(summary.correct_ratio, 0.5);
        assert_eq!(summary.novel_given_correct, 0.5);
        assert_eq!(summary.fine_novel_given_novel, 1.0);
    }
}
