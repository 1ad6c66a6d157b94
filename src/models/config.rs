//! Configuration models for cpseval.
//!
//! Everything tunable lives here and is loaded once at startup, then passed
//! by reference into the registry, scoring engine and pipelines.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::sample::FINAL_DECISION_KEY;

/// Top-level configuration for cpseval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend endpoints keyed by name
    #[serde(default)]
    pub endpoints: HashMap<String, EndpointConfig>,

    /// Models keyed by the name used on the command line and in `evaluators`
    #[serde(default)]
    pub models: BTreeMap<String, ModelSpec>,

    /// Judge ensemble settings
    pub evaluation: EvaluationConfig,

    /// CPS scoring parameters
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Input corpus and output locations
    pub data: DataConfig,
}

/// Wire protocol spoken by an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI-compatible chat completions (OpenAI, DeepSeek, vLLM, Ollama, TGI)
    #[default]
    OpenAi,
    /// Anthropic messages API
    Anthropic,
    /// Google generative language API (bare prompt string)
    Gemini,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "openai"),
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::Gemini => write!(f, "gemini"),
        }
    }
}

/// Configuration for one backend endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Wire protocol
    #[serde(default)]
    pub provider: Provider,

    /// Base URL for the API (e.g., "http://localhost:8000/v1" for vLLM)
    pub base_url: String,

    /// API key (optional, can be omitted for local endpoints)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Custom headers, values may contain ${ENV_VAR}
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Retry ceiling for resource-exhaustion responses
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed sleep between resource-exhaustion retries
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: f64,

    /// Minimum spacing between requests to the same model
    #[serde(default)]
    pub min_interval_ms: u64,
}

fn default_timeout() -> u64 {
    180
}

fn default_max_retries() -> u32 {
    10
}

fn default_retry_backoff() -> f64 {
    5.0
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            base_url: String::new(),
            api_key: None,
            api_key_env: None,
            headers: HashMap::new(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff(),
            min_interval_ms: 0,
        }
    }
}

/// Specification for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Endpoint name, references [endpoints.<name>]
    pub endpoint: String,

    /// Provider-side model id (e.g., "gpt-4o-2024-05-13")
    pub id: String,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f64,

    /// Optional system message
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_max_tokens() -> u32 {
    1024
}

/// Judge ensemble configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Ordered evaluator model names; each becomes a key in the verdict maps
    pub evaluators: Vec<String>,

    /// Persist the working set after this many new verdicts
    #[serde(default = "default_save_interval")]
    pub save_interval: usize,

    /// Show a progress bar per (stage, evaluator) pass
    #[serde(default = "default_true")]
    pub progress: bool,
}

fn default_save_interval() -> usize {
    20
}

fn default_true() -> bool {
    true
}

/// Scoring engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Full-credit novelty weight
    #[serde(default = "default_gamma")]
    pub gamma: f64,

    /// Validity vs. redundancy blend in the process score
    #[serde(default = "default_beta")]
    pub beta: f64,

    /// Accepted context depths for novelty scoring
    #[serde(default = "default_k_values")]
    pub k_values: Vec<usize>,

    /// Difficulty weight at d = 0
    #[serde(default = "default_alpha_min")]
    pub alpha_min: f64,

    /// Difficulty weight at d = 1
    #[serde(default = "default_alpha_max")]
    pub alpha_max: f64,

    /// Steps shorter than this (in characters) count as redundant
    #[serde(default = "default_min_step_chars")]
    pub min_step_chars: usize,
}

fn default_gamma() -> f64 {
    1.0
}

fn default_beta() -> f64 {
    0.6
}

fn default_k_values() -> Vec<usize> {
    vec![1, 2, 3, 4]
}

fn default_alpha_min() -> f64 {
    0.3
}

fn default_alpha_max() -> f64 {
    0.8
}

fn default_min_step_chars() -> usize {
    10
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            gamma: default_gamma(),
            beta: default_beta(),
            k_values: default_k_values(),
            alpha_min: default_alpha_min(),
            alpha_max: default_alpha_max(),
            min_step_chars: default_min_step_chars(),
        }
    }
}

/// Corpus and output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Problem corpus (JSON object keyed by problem id, or array of records)
    pub problems: PathBuf,

    /// Directory for inference, evaluation, score and category files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl DataConfig {
    /// Generated samples for `model`.
    pub fn inference_path(&self, model: &str) -> PathBuf {
        self.output_dir
            .join(format!("inference_{}.json", file_safe(model)))
    }

    /// Evaluation working set for `model`.
    pub fn evaluation_path(&self, model: &str) -> PathBuf {
        self.output_dir
            .join(format!("evaluation_{}.json", file_safe(model)))
    }

    /// Problem categories assigned by `model`.
    pub fn categories_path(&self, model: &str) -> PathBuf {
        self.output_dir
            .join(format!("categories_{}.json", file_safe(model)))
    }

    /// Scored results for `model`.
    pub fn scores_path(&self, model: &str) -> PathBuf {
        self.output_dir.join(format!("scores_{}.json", file_safe(model)))
    }
}

fn file_safe(name: &str) -> String {
    name.replace(['/', '\\', ':'], "_")
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-references and parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let evaluators = &self.evaluation.evaluators;
        if evaluators.is_empty() {
            return Err(ConfigError::Invalid(
                "evaluation.evaluators must name at least one model".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for name in evaluators {
            if name == FINAL_DECISION_KEY {
                return Err(ConfigError::Invalid(format!(
                    "'{FINAL_DECISION_KEY}' is reserved and cannot be an evaluator name"
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "evaluator '{name}' is listed more than once"
                )));
            }
            if !self.models.contains_key(name) {
                return Err(ConfigError::UnknownModel(name.clone()));
            }
        }

        if evaluators.len() % 2 == 0 {
            warn!(
                evaluators = evaluators.len(),
                "Even-sized evaluator ensemble: novelty ties resolve to NO"
            );
        }

        for (name, model) in &self.models {
            if !self.endpoints.contains_key(&model.endpoint) {
                return Err(ConfigError::EndpointNotFound(format!(
                    "{} (referenced by model '{name}')",
                    model.endpoint
                )));
            }
        }

        if self.evaluation.save_interval == 0 {
            return Err(ConfigError::Invalid(
                "evaluation.save_interval must be at least 1".to_string(),
            ));
        }

        let s = &self.scoring;
        if !(0.0..=1.0).contains(&s.alpha_min)
            || !(0.0..=1.0).contains(&s.alpha_max)
            || s.alpha_min > s.alpha_max
        {
            return Err(ConfigError::Invalid(format!(
                "scoring alpha bounds must satisfy 0 <= alpha_min <= alpha_max <= 1 (got {} / {})",
                s.alpha_min, s.alpha_max
            )));
        }
        if !(0.0..=1.0).contains(&s.beta) {
            return Err(ConfigError::Invalid(format!(
                "scoring.beta must be within [0, 1] (got {})",
                s.beta
            )));
        }
        if s.gamma < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "scoring.gamma must be non-negative (got {})",
                s.gamma
            )));
        }
        if s.k_values.is_empty() {
            return Err(ConfigError::Invalid(
                "scoring.k_values must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Look up a model by name.
    pub fn model(&self, name: &str) -> Result<&ModelSpec, ConfigError> {
        self.models
            .get(name)
            .ok_or_else(|| ConfigError::UnknownModel(name.to_string()))
    }

    /// Resolve the API key for an endpoint.
    ///
    /// `Ok(None)` is valid for local endpoints without auth.
    pub fn resolve_endpoint_api_key(
        &self,
        endpoint_name: &str,
    ) -> Result<Option<String>, ConfigError> {
        let endpoint = self
            .endpoints
            .get(endpoint_name)
            .ok_or_else(|| ConfigError::EndpointNotFound(endpoint_name.to_string()))?;

        if let Some(key) = &endpoint.api_key {
            return Ok(Some(expand_env_vars(key)));
        }

        if let Some(env_var) = &endpoint.api_key_env {
            return std::env::var(env_var)
                .map(Some)
                .map_err(|_| ConfigError::MissingApiKey {
                    endpoint: endpoint_name.to_string(),
                    env_var: env_var.clone(),
                });
        }

        Ok(None)
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax. Unset variables are left in place.
pub fn expand_env_vars(s: &str) -> String {
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };

    let mut result = s.to_string();
    for cap in re.captures_iter(s) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }
    result
}

/// Expand environment variables in all headers.
pub fn expand_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.clone(), expand_env_vars(v)))
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error(
        "Missing API key for endpoint '{endpoint}': set {env_var} env var or api_key in config"
    )]
    MissingApiKey { endpoint: String, env_var: String },

    #[error("Endpoint not found: '{0}'")]
    EndpointNotFound(String),

    #[error("Unknown model: '{0}' (not configured under [models.*])")]
    UnknownModel(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Example configuration printed by `cpseval example`.
pub const EXAMPLE_CONFIG: &str = r#"# cpseval configuration file

[endpoints.openai]
provider = "openai"
base_url = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"

[endpoints.anthropic]
provider = "anthropic"
base_url = "https://api.anthropic.com/v1"
api_key_env = "ANTHROPIC_API_KEY"

[endpoints.gemini]
provider = "gemini"
base_url = "https://generativelanguage.googleapis.com/v1beta"
api_key_env = "GEMINI_API_KEY"
max_retries = 10
retry_backoff_secs = 5.0
min_interval_ms = 1000

# Locally served weights via an OpenAI-compatible server (vLLM, Ollama, TGI)
[endpoints.local]
provider = "openai"
base_url = "http://localhost:8000/v1"

[models."gpt-4o"]
endpoint = "openai"
id = "gpt-4o-2024-05-13"
system_prompt = "You are a helpful assistant."

[models."claude-3-5-sonnet"]
endpoint = "anthropic"
id = "claude-3-5-sonnet-20240620"

[models."gemini-1.5-pro"]
endpoint = "gemini"
id = "gemini-1.5-pro-latest"

[models."Llama-3-70B"]
endpoint = "local"
id = "meta-llama/Meta-Llama-3-70B-Instruct"

[evaluation]
evaluators = ["gpt-4o", "claude-3-5-sonnet", "gemini-1.5-pro"]
save_interval = 20

[scoring]
gamma = 1.0
beta = 0.6
k_values = [1, 2, 3, 4]
alpha_min = 0.3
alpha_max = 0.8
min_step_chars = 10

[data]
problems = "data/subset.json"
output_dir = "output"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> Config {
        toml::from_str(EXAMPLE_CONFIG).unwrap()
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = example();
        config.validate().unwrap();

        assert_eq!(config.evaluation.evaluators.len(), 3);
        assert_eq!(config.evaluation.save_interval, 20);
        assert_eq!(config.endpoints["gemini"].provider, Provider::Gemini);
        assert_eq!(config.endpoints["gemini"].min_interval_ms, 1000);
        assert_eq!(config.endpoints["openai"].max_retries, 10);
        assert_eq!(config.models["gpt-4o"].max_tokens, 1024);
        assert_eq!(config.scoring.k_values, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_reserved_evaluator_name_rejected() {
        let mut config = example();
        config.evaluation.evaluators.push(FINAL_DECISION_KEY.to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_evaluator_rejected() {
        let mut config = example();
        config.evaluation.evaluators[0] = "gpt-5".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownModel(name)) if name == "gpt-5"
        ));
    }

    #[test]
    fn test_duplicate_evaluator_rejected() {
        let mut config = example();
        config.evaluation.evaluators[2] = "gpt-4o".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_alpha_bounds_checked() {
        let mut config = example();
        config.scoring.alpha_min = 0.9;
        config.scoring.alpha_max = 0.2;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_save_interval_rejected() {
        let mut config = example();
        config.evaluation.save_interval = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_output_paths_are_file_safe() {
        let config = example();
        let path = config.data.evaluation_path("meta-llama/Llama-3");
        assert_eq!(
            path,
            PathBuf::from("output").join("evaluation_meta-llama_Llama-3.json")
        );
        assert_eq!(
            config.data.categories_path("gpt-4o"),
            PathBuf::from("output").join("categories_gpt-4o.json")
        );
    }

    #[test]
    fn test_local_endpoint_needs_no_key() {
        let config = example();
        assert_eq!(config.resolve_endpoint_api_key("local").unwrap(), None);
        assert!(matches!(
            config.resolve_endpoint_api_key("nope"),
            Err(ConfigError::EndpointNotFound(_))
        ));
    }
}
