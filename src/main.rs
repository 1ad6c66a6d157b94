//! cpseval CLI - generate, evaluate and score LLM math solutions, and
//! classify the problems they answer.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cpseval::checkpoint::{CategoryStore, JsonFileStore, load_or_seed, load_problems};
use cpseval::models::{Config, EXAMPLE_CONFIG, EvaluationSummary};
use cpseval::scoring::mean_cps;
use cpseval::{
    ClassificationPipeline, EvaluationPipeline, GenerationPipeline, JudgePool, ModelRegistry,
    ScoringEngine,
};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "cpseval")]
#[command(version)]
#[command(about = "Creative process evaluation of LLM-generated competition math solutions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate candidate solutions for every (problem, k) pair
    Generate {
        /// Configured model to generate with
        #[arg(short, long)]
        model: String,
    },

    /// Run the three-stage judge pipeline over a model's samples
    Evaluate {
        /// Configured model whose samples are evaluated
        #[arg(long = "model_to_evaluate")]
        model_to_evaluate: String,
    },

    /// Compute CPS for a model's evaluated samples
    Score {
        /// Configured model whose evaluation is scored
        #[arg(long = "model_to_evaluate")]
        model_to_evaluate: String,
    },

    /// Assign a math category to every problem in the corpus
    Classify {
        /// Configured model to classify with
        #[arg(short, long)]
        model: String,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
}

fn print_summary(model: &str, summary: &EvaluationSummary, output: &Path) {
    println!("\n=== Evaluation Complete: {model} ===");
    println!("Samples:              {}", summary.total_samples);
    println!("Correct:              {} ({:.1}%)", summary.correct, summary.correct_ratio * 100.0);
    println!("Novel:                {} ({:.1}%)", summary.novel, summary.novel_ratio * 100.0);
    println!(
        "Fine novel:           {} ({:.1}%)",
        summary.fine_novel,
        summary.fine_novel_ratio * 100.0
    );
    println!("Novel | correct:      {:.3}", summary.novel_given_correct);
    println!("Fine novel | novel:   {:.3}", summary.fine_novel_given_novel);
    println!("Judge calls:          {}", summary.judge_calls);
    println!("Forced verdicts:      {}", summary.forced_verdicts);
    println!("Resumed steps:        {}", summary.skipped_steps);
    println!("Runtime:              {:.1}s", summary.runtime_secs);
    println!("Output:               {output:?}");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            println!("{EXAMPLE_CONFIG}");
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            let registry = ModelRegistry::new(&config);
            registry
                .evaluators()
                .context("Failed to resolve evaluator models")?;

            info!("Configuration is valid");
            info!("  Endpoints: {}", config.endpoints.len());
            info!("  Models: {}", config.models.len());
            info!("  Evaluators: {}", config.evaluation.evaluators.join(", "));
            info!("  Save interval: {}", config.evaluation.save_interval);
        }

        Commands::Generate { model } => {
            let config = load_config(&cli.config)?;
            let registry = ModelRegistry::new(&config);
            let generator = registry
                .resolve(&model)
                .with_context(|| format!("Failed to resolve model '{model}'"))?;

            let problems = load_problems(&config.data.problems);
            if problems.is_empty() {
                anyhow::bail!("No problems loaded from {:?}", config.data.problems);
            }

            let output = config.data.inference_path(&model);
            let store = JsonFileStore::new(&output);
            let mut samples = store
                .read_samples()
                .context("Refusing to regenerate over an unreadable inference file")?;

            let pipeline = GenerationPipeline::new(
                generator,
                store,
                config.evaluation.save_interval,
                config.evaluation.progress,
            );
            let stats = pipeline.run(&problems, &mut samples).await?;
            registry.log_rate_limiter_stats();

            println!("\n=== Generation Complete: {model} ===");
            println!("Problems:    {}", stats.total_problems);
            println!("Generated:   {}", stats.generated);
            println!("Skipped:     {}", stats.skipped);
            println!("Runtime:     {:.1}s", stats.runtime_secs);
            println!("Output:      {output:?}");
        }

        Commands::Evaluate { model_to_evaluate } => {
            let config = load_config(&cli.config)?;
            let registry = ModelRegistry::new(&config);
            let judges = JudgePool::new(
                registry
                    .evaluators()
                    .context("Failed to resolve evaluator models")?,
            );

            let problems = load_problems(&config.data.problems);
            if problems.is_empty() {
                warn!(path = ?config.data.problems, "Corpus is empty, every sample will be unresolved");
            }

            let output = config.data.evaluation_path(&model_to_evaluate);
            let store = JsonFileStore::new(&output);
            let seed = JsonFileStore::new(config.data.inference_path(&model_to_evaluate));
            let mut samples = load_or_seed(&store, &seed)
                .context("Failed to load samples to evaluate")?;
            if samples.is_empty() {
                anyhow::bail!("No samples to evaluate for '{model_to_evaluate}'");
            }

            let pipeline = EvaluationPipeline::new(judges, problems, store, &config.evaluation);
            let summary = pipeline.run(&mut samples).await?;
            registry.log_rate_limiter_stats();
            print_summary(&model_to_evaluate, &summary, &output);
        }

        Commands::Classify { model } => {
            let config = load_config(&cli.config)?;
            let registry = ModelRegistry::new(&config);
            let classifier = registry
                .resolve(&model)
                .with_context(|| format!("Failed to resolve model '{model}'"))?;

            let problems = load_problems(&config.data.problems);
            if problems.is_empty() {
                anyhow::bail!("No problems loaded from {:?}", config.data.problems);
            }

            let output = config.data.categories_path(&model);
            let store = JsonFileStore::new(&output);
            let mut records = store
                .load_categories()
                .context("Refusing to reclassify over an unreadable category file")?;

            let pipeline = ClassificationPipeline::new(
                classifier,
                store,
                config.evaluation.save_interval,
                config.evaluation.progress,
            );
            let stats = pipeline.run(&problems, &mut records).await?;
            registry.log_rate_limiter_stats();

            println!("\n=== Classification Complete: {model} ===");
            println!("Problems:    {}", stats.total_problems);
            println!("Classified:  {}", stats.classified);
            println!("Skipped:     {}", stats.skipped);
            println!("Unparsed:    {}", stats.unparsed);
            println!("Runtime:     {:.1}s", stats.runtime_secs);
            println!("Output:      {output:?}");
        }

        Commands::Score { model_to_evaluate } => {
            let config = load_config(&cli.config)?;
            let problems = load_problems(&config.data.problems);
            let samples = JsonFileStore::new(config.data.evaluation_path(&model_to_evaluate))
                .read_samples()
                .context("Failed to read evaluation file")?;
            if samples.is_empty() {
                anyhow::bail!("No evaluated samples for '{model_to_evaluate}'");
            }

            let engine = ScoringEngine::new(config.scoring.clone());
            let scored = engine.score_all(&problems, &samples);

            let output = config.data.scores_path(&model_to_evaluate);
            if let Some(dir) = output.parent() {
                fs::create_dir_all(dir).context("Failed to create output directory")?;
            }
            let file = fs::File::create(&output)
                .with_context(|| format!("Failed to create {output:?}"))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &scored).context("Failed to write scores")?;
            writer.flush().context("Failed to write scores")?;

            let mean = mean_cps(&scored);
            info!(scored = scored.len(), mean_cps = format!("{mean:.3}"), "Scoring complete");

            println!("\n=== Scoring Complete: {model_to_evaluate} ===");
            println!("Scored:      {}", scored.len());
            println!("Mean CPS:    {mean:.3}");
            println!("Output:      {output:?}");
        }
    }

    Ok(())
}
