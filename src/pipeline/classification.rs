//! Problem category classification.
//!
//! Pipeline flow:
//! Problems → classifier model → CategoryRecords → store
//!
//! One record per problem, keyed by problem id, so interrupted runs resume.

use crate::checkpoint::CategoryStore;
use crate::client::LanguageModel;
use crate::models::{CategoryRecord, ClassificationStats, Problem, Result};
use crate::pool::classification_prompt;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Classification pipeline for one classifier model.
pub struct ClassificationPipeline<S: CategoryStore> {
    model: Arc<dyn LanguageModel>,
    store: S,
    save_interval: usize,
    progress: bool,
}

impl<S: CategoryStore> ClassificationPipeline<S> {
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

    /// Classify every problem without a record in `records`.
    pub async fn run(
        &self,
        problems: &[Problem],
        records: &mut Vec<CategoryRecord>,
    ) -> Result<ClassificationStats> {
        let start = Instant::now();
        let mut done: HashSet<String> = records.iter().map(|r| r.problem_id.clone()).collect();
        let mut stats = ClassificationStats {
            total_problems: problems.len(),
            ..Default::default()
        };

        info!(
            model = self.model.name(),
            problems = problems.len(),
            already_done = done.len(),
            "Starting classification"
        );

        let pb = if self.progress {
            let pb = ProgressBar::new(problems.len() as u64);
            let style = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.green/blue} {pos}/{len} ({percent}%) {msg}")
                .map(|s| s.progress_chars("##-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            pb
        } else {
            ProgressBar::hidden()
        };

        for problem in problems {
            pb.inc(1);
            if done.contains(&problem.problem_id) {
                stats.skipped += 1;
                continue;
            }

            let response = self.model.generate(&classification_prompt(problem)).await?;
            let mut record =
                CategoryRecord::new(&problem.problem_id, &problem.competition_id, response);
            match record.category {
                Some(category) => {
                    debug!(problem_id = %problem.problem_id, category = %category, "Problem classified")
                }
                None => {
                    warn!(problem_id = %problem.problem_id, "Classifier response names no category");
                    stats.unparsed += 1;
                }
            }
            record
                .metadata
                .insert("model".into(), Value::String(self.model.name().to_string()));
            record
                .metadata
                .insert("classified_at".into(), Value::String(Utc::now().to_rfc3339()));

            done.insert(record.problem_id.clone());
            records.push(record);
            stats.classified += 1;

            if stats.classified % self.save_interval == 0 {
                self.store.save_categories(records)?;
                pb.set_message(format!("classified: {}", stats.classified));
            }
        }

        self.store.save_categories(records)?;
        pb.finish_with_message(format!(
            "Done! {} classified, {} skipped",
            stats.classified, stats.skipped
        ));

        stats.runtime_secs = start.elapsed().as_secs_f64();
        info!(
            classified = stats.classified,
            skipped = stats.skipped,
            unparsed = stats.unparsed,
            runtime_secs = format!("{:.1}", stats.runtime_secs),
            "Classification complete"
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::JsonFileStore;
    use crate::models::{CompetitionType, MathCategory};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers from a script, remembering every prompt.
    struct Scripted {
        answers: Mutex<Vec<&'static str>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: &[&'static str]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().rev().copied().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for Scripted {
        fn name(&self) -> &str {
            "classifier"
        }

        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.answers.lock().unwrap().pop().unwrap_or_default().to_string())
        }
    }

    fn problem(id: &str, text: &str) -> Problem {
        Problem {
            problem_id: id.to_string(),
            competition: CompetitionType::Amc8,
            competition_id: "2004_AMC_8_Problems".to_string(),
            text: text.to_string(),
            reference_solutions: vec![format!("solution of {id}")],
        }
    }

    #[tokio::test]
    async fn test_classifies_each_problem_once_and_resumes() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("categories_classifier.json"));
        let model = Arc::new(Scripted::new(&[
            "Concept: [triangles]\nCategory: [Geometry]\nSimple Explanation: [angles]",
            "I am not sure.",
        ]));
        let pipeline = ClassificationPipeline::new(model.clone(), store, 1, false);
        let problems = vec![
            problem("p1", "Area of a triangle?"),
            problem("p2", "How many paths?"),
            problem("p3", "Find the remainder."),
        ];

        // p3 was classified by an earlier run
        let mut records = vec![CategoryRecord::new(
            "p3",
            "2004_AMC_8_Problems",
            "Category: number theory",
        )];
        let stats = pipeline.run(&problems, &mut records).await.unwrap();

        assert_eq!(stats.classified, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.unparsed, 1);
        assert_eq!(model.calls(), 2);
        assert!(model.prompts.lock().unwrap()[0].contains("solution of p1"));

        let ids: Vec<&str> = records.iter().map(|r| r.problem_id.as_str()).collect();
        assert_eq!(ids, ["p3", "p1", "p2"]);
        assert_eq!(records[1].category, Some(MathCategory::Geometry));
        assert_eq!(records[2].category, None);
        assert_eq!(records[1].metadata["model"], "classifier");

        assert_eq!(pipeline.store().load_categories().unwrap(), records);

        let stats = pipeline.run(&problems, &mut records).await.unwrap();
        assert_eq!(stats.classified, 0);
        assert_eq!(stats.skipped, 3);
        assert_eq!(model.calls(), 2);
    }
}
