//! Judge ensemble and verdict aggregation.

use crate::client::LanguageModel;
use crate::models::{Decision, Result, Stage, StageVerdicts};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// How a stage combines per-evaluator verdicts into its final decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationRule {
    /// Every evaluator must say YES
    Unanimous,
    /// Strictly more YES than NO; ties resolve to NO
    Majority,
}

impl AggregationRule {
    /// Correctness demands agreement; novelty stages vote.
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Correctness => AggregationRule::Unanimous,
            Stage::CoarseNovelty | Stage::FineNovelty => AggregationRule::Majority,
        }
    }

    pub fn apply(self, verdicts: &[Decision]) -> Decision {
        let yes = verdicts.iter().filter(|d| d.is_yes()).count();
        let no = verdicts.len() - yes;
        let passed = match self {
            AggregationRule::Unanimous => !verdicts.is_empty() && no == 0,
            AggregationRule::Majority => yes > no,
        };
        if passed { Decision::Yes } else { Decision::No }
    }
}

/// Final decision for one stage over `evaluators`, or `None` while any of
/// them has not recorded a verdict.
pub fn aggregate(stage: Stage, verdicts: &StageVerdicts, evaluators: &[String]) -> Option<Decision> {
    let recorded = evaluators
        .iter()
        .map(|name| verdicts.get(name))
        .collect::<Option<Vec<_>>>()?;
    Some(AggregationRule::for_stage(stage).apply(&recorded))
}

/// Ordered ensemble of judge models.
pub struct JudgePool {
    evaluators: Vec<Arc<dyn LanguageModel>>,
    calls: AtomicUsize,
}

impl JudgePool {
    pub fn new(evaluators: Vec<Arc<dyn LanguageModel>>) -> Self {
        Self {
            evaluators,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn evaluators(&self) -> &[Arc<dyn LanguageModel>] {
        &self.evaluators
    }

    /// Evaluator names, in ensemble order.
    pub fn names(&self) -> Vec<String> {
        self.evaluators.iter().map(|e| e.name().to_string()).collect()
    }

    /// Ask one evaluator and read its answer as a verdict.
    pub async fn judge(&self, evaluator: &dyn LanguageModel, prompt: &str) -> Result<Decision> {
        let raw = evaluator.generate(prompt).await?;
        self.calls.fetch_add(1, Ordering::Relaxed);

        let decision = Decision::from_judge_text(&raw);
        debug!(evaluator = evaluator.name(), decision = %decision, "Judge verdict");
        Ok(decision)
    }

    /// Judge calls completed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}
