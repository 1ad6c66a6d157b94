//! Three-stage judge pipeline.
//!
//! Pipeline flow:
//! Samples → correctness → coarse novelty → fine novelty → summary
//!
//! Each stage runs to completion over every sample before the next one
//! starts. Within a stage, evaluators run one at a time and each walks the
//! samples in order. Verdicts already present are never re-requested, so a
//! killed run restarts from its last checkpoint without duplicate calls.

use crate::checkpoint::DatasetStore;
use crate::client::LanguageModel;
use crate::models::{Decision, EvaluationConfig, EvaluationSummary, Problem, Result, Sample, Stage};
use crate::pool::{JudgePool, aggregate, judge_prompt};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

/// What happened at one (stage, evaluator, sample) step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    /// Verdict already recorded
    Skipped,
    /// Problem missing from the corpus; nothing recorded
    Unresolved,
    /// Gated to NO without a judge call
    Forced,
    /// Judge was called
    Judged,
}

/// Evaluation orchestrator over an in-memory working set.
pub struct EvaluationPipeline<S: DatasetStore> {
    judges: JudgePool,
    problems: HashMap<String, Problem>,
    store: S,
    save_interval: usize,
    progress: bool,
}

impl<S: DatasetStore> EvaluationPipeline<S> {
    pub fn new(judges: JudgePool, problems: Vec<Problem>, store: S, config: &EvaluationConfig) -> Self {
        let problems = problems
            .into_iter()
            .map(|p| (p.problem_id.clone(), p))
            .collect();

        Self {
            judges,
            problems,
            store,
            save_interval: config.save_interval.max(1),
            progress: config.progress,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn judges(&self) -> &JudgePool {
        &self.judges
    }

    /// Run every stage over `samples`, checkpointing to the store.
    ///
    /// A judge failure aborts the run; whatever was checkpointed stays on
    /// disk for the next attempt.
    pub async fn run(&self, samples: &mut [Sample]) -> Result<EvaluationSummary> {
        let start = Instant::now();
        let calls_before = self.judges.calls();
        let evaluators = self.judges.names();
        let mut summary = EvaluationSummary {
            total_samples: samples.len(),
            ..Default::default()
        };

        let unresolved: HashSet<&str> = samples
            .iter()
            .map(|s| s.problem_id.as_str())
            .filter(|id| !self.problems.contains_key(*id))
            .collect();
        for problem_id in &unresolved {
            warn!(problem_id = %problem_id, "Sample references unknown problem, it will not be judged");
        }

        info!(
            samples = samples.len(),
            evaluators = ?evaluators,
            save_interval = self.save_interval,
            "Starting evaluation"
        );

        for stage in Stage::ALL {
            for evaluator in self.judges.evaluators() {
                self.run_pass(stage, evaluator.as_ref(), samples, &mut summary)
                    .await?;
            }

            for sample in samples.iter_mut() {
                let verdicts = sample.stage_mut(stage);
                verdicts.final_decision = aggregate(stage, verdicts, &evaluators);
            }
            self.store.save_samples(samples)?;

            let passed = count_passed(samples, stage);
            info!(stage = %stage, passed = passed, total = samples.len(), "Stage complete");
        }

        summary.correct = count_passed(samples, Stage::Correctness);
        summary.novel = count_passed(samples, Stage::CoarseNovelty);
        summary.fine_novel = count_passed(samples, Stage::FineNovelty);
        summary.judge_calls = self.judges.calls() - calls_before;
        summary.runtime_secs = start.elapsed().as_secs_f64();
        summary.finalize();

        info!(
            correct = format!("{:.1}%", summary.correct_ratio * 100.0),
            novel = format!("{:.1}%", summary.novel_ratio * 100.0),
            fine_novel = format!("{:.1}%", summary.fine_novel_ratio * 100.0),
            novel_given_correct = format!("{:.3}", summary.novel_given_correct),
            fine_novel_given_novel = format!("{:.3}", summary.fine_novel_given_novel),
            judge_calls = summary.judge_calls,
            "Evaluation complete"
        );

        Ok(summary)
    }

    /// One evaluator over every sample for one stage.
    async fn run_pass(
        &self,
        stage: Stage,
        evaluator: &dyn LanguageModel,
        samples: &mut [Sample],
        summary: &mut EvaluationSummary,
    ) -> Result<()> {
        let name = evaluator.name().to_string();
        let pb = self.progress_bar(samples.len(), stage, &name);
        let mut recorded = 0usize;

        for i in 0..samples.len() {
            let outcome = self.step(stage, evaluator, &name, &mut samples[i]).await?;
            pb.inc(1);

            match outcome {
                StepOutcome::Skipped => summary.skipped_steps += 1,
                StepOutcome::Unresolved => {}
                StepOutcome::Forced | StepOutcome::Judged => {
                    if outcome == StepOutcome::Forced {
                        summary.forced_verdicts += 1;
                    }
                    recorded += 1;
                    if recorded % self.save_interval == 0 {
                        self.store.save_samples(samples)?;
                    }
                }
            }
        }

        pb.finish_and_clear();
        self.store.save_samples(samples)?;
        debug!(stage = %stage, evaluator = %name, recorded = recorded, "Pass complete");
        Ok(())
    }

    async fn step(
        &self,
        stage: Stage,
        evaluator: &dyn LanguageModel,
        name: &str,
        sample: &mut Sample,
    ) -> Result<StepOutcome> {
        if sample.stage(stage).has_verdict(name) {
            return Ok(StepOutcome::Skipped);
        }

        let gated = match stage.previous() {
            Some(previous) => !sample.stage(previous).passed(),
            None => false,
        } || (stage == Stage::FineNovelty && sample.saw_all_references());

        if gated {
            sample.stage_mut(stage).record(name, Decision::No);
            return Ok(StepOutcome::Forced);
        }

        let Some(problem) = self.problems.get(&sample.problem_id) else {
            return Ok(StepOutcome::Unresolved);
        };

        let Some(prompt) = judge_prompt(stage, problem, sample.k, &sample.response) else {
            sample.stage_mut(stage).record(name, Decision::No);
            return Ok(StepOutcome::Forced);
        };

        let decision = self.judges.judge(evaluator, &prompt).await?;
        debug!(
            stage = %stage,
            evaluator = %name,
            sample = %sample.id(),
            decision = %decision,
            "Verdict recorded"
        );
        sample.stage_mut(stage).record(name, decision);
        Ok(StepOutcome::Judged)
    }

    fn progress_bar(&self, len: usize, stage: Stage, evaluator: &str) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {prefix} {bar:40.cyan/blue} {pos}/{len} {msg}")
            .map(|s| s.progress_chars("##-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_prefix(format!("{stage}/{evaluator}"));
        pb
    }
}

fn count_passed(samples: &[Sample], stage: Stage) -> usize {
    samples.iter().filter(|s| s.stage(stage).passed()).count()
}
