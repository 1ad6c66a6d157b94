//! Candidate solution generation.
//!
//! Pipeline flow:
//! Problems × k in 1..=n → model under evaluation → Samples → store
//!
//! Strategy: one sample per (problem, k), prompted with the first k
//! references and asked for something distinct from them. Pairs already
//! present are skipped so interrupted runs resume.

use crate::checkpoint::DatasetStore;
use crate::client::LanguageModel;
use crate::models::{GenerationStats, Problem, Result, Sample, sample_id};
use crate::pool::generation_prompt;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Generation pipeline for one model under evaluation.
pub struct GenerationPipeline<S: DatasetStore> {
    model: Arc<dyn LanguageModel>,
    store: S,
    save_interval: usize,
    progress: bool,
}

impl<S: DatasetStore> GenerationPipeline<S> {
    pub fn new(model: Arc<dyn LanguageModel>, store: S, save_interval: usize, progress: bool) -> Self {
        Self {
            model,
            store,
            save_interval: save_interval.max(1),
            progress,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Generate every missing (problem, k) sample into `samples`.
    pub async fn run(&self, problems: &[Problem], samples: &mut Vec<Sample>) -> Result<GenerationStats> {
        let start = Instant::now();
        let mut existing: HashSet<String> = samples.iter().map(Sample::id).collect();
        let mut stats = GenerationStats {
            total_problems: problems.len(),
            ..Default::default()
        };

        let total_pairs: usize = problems.iter().map(Problem::n).sum();
        info!(
            model = self.model.name(),
            problems = problems.len(),
            pairs = total_pairs,
            already_done = existing.len(),
            "Starting generation"
        );

        let pb = if self.progress {
            let pb = ProgressBar::new(total_pairs as u64);
            let style = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
                .map(|s| s.progress_chars("##-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            pb
        } else {
            ProgressBar::hidden()
        };

        for problem in problems {
            if problem.n() == 0 {
                warn!(problem_id = %problem.problem_id, "Problem has no reference solutions, skipping");
                continue;
            }

            for k in 1..=problem.n() {
                pb.inc(1);
                let id = sample_id(&problem.problem_id, k);
                if existing.contains(&id) {
                    stats.skipped += 1;
                    continue;
                }

                let prompt = generation_prompt(problem, k);
                let response = self.model.generate(&prompt).await?;
                debug!(sample = %id, chars = response.len(), "Sample generated");

                let mut sample = Sample::new(&problem.problem_id, k, problem.n(), response);
                sample
                    .metadata
                    .insert("model".into(), Value::String(self.model.name().to_string()));
                sample.metadata.insert(
                    "competition".into(),
                    Value::String(problem.competition.to_string()),
                );
                sample.metadata.insert(
                    "competition_id".into(),
                    Value::String(problem.competition_id.clone()),
                );
                sample
                    .metadata
                    .insert("generated_at".into(), Value::String(Utc::now().to_rfc3339()));

                samples.push(sample);
                existing.insert(id);
                stats.generated += 1;

                if stats.generated % self.save_interval == 0 {
                    self.store.save_samples(samples)?;
                    pb.set_message(format!("generated: {}", stats.generated));
                }
            }
        }

        self.store.save_samples(samples)?;
        pb.finish_with_message(format!(
            "Done! {} generated, {} skipped",
            stats.generated, stats.skipped
        ));

        stats.runtime_secs = start.elapsed().as_secs_f64();
        info!(
            generated = stats.generated,
            skipped = stats.skipped,
            runtime_secs = format!("{:.1}", stats.runtime_secs),
            "Generation complete"
        );

        Ok(stats)
    }
}
