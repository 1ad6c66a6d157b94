//! Creative Process Score (CPS).
//!
//! `cps = alpha(d) * novelty + (1 - alpha(d)) * process`, where `d` is the
//! problem's difficulty and `alpha` interpolates linearly between
//! `alpha_min` and `alpha_max`: harder problems weight novelty more.

mod process;
mod rewrite;

pub use process::{is_step_redundant, is_step_valid, split_steps, step_ratios};
pub use rewrite::{is_rewrite, word_overlap};

use crate::models::{CompetitionType, Problem, Sample, ScoredResult, ScoredSample, ScoringConfig};
use std::collections::HashMap;
use tracing::warn;

/// Difficulty used for competitions outside the table.
pub const DEFAULT_DIFFICULTY: f64 = 0.5;

/// Context depth used when a requested k is not configured.
pub const FALLBACK_K: usize = 1;

/// Fixed difficulty table.
pub fn difficulty_of(competition: &CompetitionType) -> Option<f64> {
    match competition {
        CompetitionType::Amc8 => Some(0.00),
        CompetitionType::Amc10 => Some(0.20),
        CompetitionType::Amc12 => Some(0.30),
        CompetitionType::Ahsme => Some(0.45),
        CompetitionType::Aime => Some(0.60),
        CompetitionType::Usajmo => Some(0.80),
        CompetitionType::Usamo => Some(0.90),
        CompetitionType::Imo => Some(1.00),
        CompetitionType::Other(_) => None,
    }
}

/// Round to 3 decimal places.
pub fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Stateless scoring over a fixed configuration.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Difficulty `d` in [0, 1]; unknown competitions fall back to 0.5.
    pub fn difficulty(&self, competition: &CompetitionType) -> f64 {
        difficulty_of(competition).unwrap_or_else(|| {
            warn!(
                competition = %competition,
                default = DEFAULT_DIFFICULTY,
                "Unknown competition type, using default difficulty"
            );
            DEFAULT_DIFFICULTY
        })
    }

    /// Dynamic weight for difficulty `d`, rounded to 3 decimals.
    pub fn alpha(&self, d: f64) -> f64 {
        let ScoringConfig {
            alpha_min,
            alpha_max,
            ..
        } = self.config;
        round3(alpha_min + (alpha_max - alpha_min) * d)
    }

    /// `gamma` if `candidate` is a rewrite of none of the first `k`
    /// references, else 0. Blank references are ignored.
    pub fn novelty_score(&self, candidate: &str, references: &[String], k: usize) -> f64 {
        let k = if self.config.k_values.contains(&k) {
            k
        } else {
            warn!(
                k = k,
                valid = ?self.config.k_values,
                "k outside configured values, falling back to k = {FALLBACK_K}"
            );
            FALLBACK_K
        };

        let distinct = references
            .iter()
            .take(k)
            .filter(|r| !r.trim().is_empty())
            .all(|r| !is_rewrite(candidate, r));

        if distinct { self.config.gamma } else { 0.0 }
    }

    /// Blend of step validity and non-redundancy, rounded to 3 decimals.
    /// A solution without steps scores 0.
    pub fn process_score(&self, solution: &str) -> f64 {
        let steps = split_steps(solution);
        match step_ratios(&steps, self.config.min_step_chars) {
            Some((validity, redundancy)) => {
                let beta = self.config.beta;
                round3(beta * validity + (1.0 - beta) * (1.0 - redundancy))
            }
            None => 0.0,
        }
    }

    /// Blend novelty and process with weight `alpha`, rounded to 3 decimals.
    pub fn cps(&self, alpha: f64, novelty_score: f64, process_score: f64) -> f64 {
        round3(alpha * novelty_score + (1.0 - alpha) * process_score)
    }

    /// Score a candidate solution.
    ///
    /// An incorrect solution short-circuits to zero novelty, process and
    /// CPS; difficulty and alpha are still reported.
    pub fn score_solution(
        &self,
        problem: &Problem,
        response: &str,
        k: usize,
        correct: bool,
    ) -> ScoredResult {
        let difficulty_d = self.difficulty(&problem.competition);
        let alpha = self.alpha(difficulty_d);

        if !correct {
            return ScoredResult {
                correctness: false,
                novelty_score: 0.0,
                process_score: 0.0,
                difficulty_d,
                alpha,
                cps: 0.0,
            };
        }

        let novelty_score = self.novelty_score(response, &problem.reference_solutions, k);
        let process_score = self.process_score(response);

        ScoredResult {
            correctness: true,
            novelty_score,
            process_score,
            difficulty_d,
            alpha,
            cps: self.cps(alpha, novelty_score, process_score),
        }
    }

    /// Score an evaluated sample; correctness is its aggregated verdict.
    pub fn score(&self, problem: &Problem, sample: &Sample) -> ScoredResult {
        self.score_solution(problem, &sample.response, sample.k, sample.correctness.passed())
    }

    /// Score every sample whose problem is known, in sample order.
    pub fn score_all(&self, problems: &[Problem], samples: &[Sample]) -> Vec<ScoredSample> {
        let by_id: HashMap<&str, &Problem> = problems
            .iter()
            .map(|p| (p.problem_id.as_str(), p))
            .collect();

        samples
            .iter()
            .filter_map(|sample| {
                let Some(problem) = by_id.get(sample.problem_id.as_str()) else {
                    warn!(sample = %sample.id(), "No problem for sample, not scored");
                    return None;
                };
                Some(ScoredSample {
                    problem_id: sample.problem_id.clone(),
                    k: sample.k,
                    result: self.score(problem, sample),
                })
            })
            .collect()
    }
}

/// Mean CPS over scored samples, 0 when empty.
pub fn mean_cps(scored: &[ScoredSample]) -> f64 {
    if scored.is_empty() {
        return 0.0;
    }
    scored.iter().map(|s| s.result.cps).sum::<f64>() / scored.len() as f64
}
