//! Model factory: configured model names to ready-to-call backends.

use crate::client::{
    AnthropicModel, ChatCompletionsModel, GeminiModel, LLMClient, LanguageModel, RateLimiterStats,
};
use crate::models::{Config, ConfigError, CpsEvalError, Provider, Result, expand_headers};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves model names to backends, sharing one [`LLMClient`] per endpoint.
///
/// All resolution happens at startup, so configuration mistakes (unknown
/// names, missing API keys) surface before any judge call is made.
pub struct ModelRegistry<'a> {
    config: &'a Config,
    clients: DashMap<String, Arc<LLMClient>>,
}

impl<'a> ModelRegistry<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            clients: DashMap::new(),
        }
    }

    /// Build (or reuse) the client for an endpoint.
    pub fn client(&self, endpoint_name: &str) -> Result<Arc<LLMClient>> {
        if let Some(client) = self.clients.get(endpoint_name) {
            return Ok(Arc::clone(&client));
        }

        let endpoint = self
            .config
            .endpoints
            .get(endpoint_name)
            .ok_or_else(|| ConfigError::EndpointNotFound(endpoint_name.to_string()))?;
        let api_key = self.config.resolve_endpoint_api_key(endpoint_name)?;
        let headers = expand_headers(&endpoint.headers);

        let client = Arc::new(LLMClient::from_endpoint(
            endpoint_name,
            endpoint,
            api_key,
            &headers,
        )?);
        debug!(
            endpoint = endpoint_name,
            provider = %endpoint.provider,
            base_url = %endpoint.base_url,
            "Endpoint client created"
        );

        Ok(Arc::clone(
            self.clients
                .entry(endpoint_name.to_string())
                .or_insert(client)
                .value(),
        ))
    }

    /// Resolve one model by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn LanguageModel>> {
        let spec = self.config.model(name)?.clone();
        let client = self.client(&spec.endpoint)?;

        let model: Arc<dyn LanguageModel> = match client.provider() {
            Provider::OpenAi => Arc::new(ChatCompletionsModel::new(name, spec, client)),
            Provider::Anthropic => Arc::new(AnthropicModel::new(name, spec, client)),
            Provider::Gemini => Arc::new(GeminiModel::new(name, spec, client)),
        };
        Ok(model)
    }

    /// Resolve the configured evaluator ensemble, in order.
    pub fn evaluators(&self) -> Result<Vec<Arc<dyn LanguageModel>>> {
        let models = self
            .config
            .evaluation
            .evaluators
            .iter()
            .map(|name| self.resolve(name))
            .collect::<Result<Vec<_>>>()?;

        if models.is_empty() {
            return Err(CpsEvalError::Config(ConfigError::Invalid(
                "no evaluators configured".to_string(),
            )));
        }

        info!(
            evaluators = ?self.config.evaluation.evaluators,
            endpoints = self.clients.len(),
            "Evaluator ensemble resolved"
        );
        Ok(models)
    }

    /// Number of endpoint clients built so far.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Pacing statistics per endpoint, sorted by endpoint name.
    pub fn rate_limiter_stats(&self) -> Vec<(String, RateLimiterStats)> {
        let mut stats: Vec<_> = self
            .clients
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().rate_limiter().stats()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    /// Log pacing statistics for every endpoint used.
    pub fn log_rate_limiter_stats(&self) {
        for (endpoint, stats) in self.rate_limiter_stats() {
            info!(
                endpoint = %endpoint,
                requests = stats.total_requests,
                exhausted = stats.total_exhausted,
                exhausted_ratio = format!("{:.3}", stats.exhausted_ratio),
                wait_secs = format!("{:.1}", stats.total_wait_secs),
                models = stats.models_tracked,
                "Endpoint pacing"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EXAMPLE_CONFIG;

    fn config() -> Config {
        let mut config: Config = toml::from_str(EXAMPLE_CONFIG).unwrap();
        for endpoint in config.endpoints.values_mut() {
            endpoint.api_key = Some("test-key".to_string());
        }
        config
    }

    #[test]
    fn test_resolve_evaluators_shares_clients() {
        let config = config();
        let registry = ModelRegistry::new(&config);

        let evaluators = registry.evaluators().unwrap();
        let names: Vec<&str> = evaluators.iter().map(|m| m.name()).collect();
        assert_eq!(names, ["gpt-4o", "claude-3-5-sonnet", "gemini-1.5-pro"]);
        assert_eq!(registry.client_count(), 3);

        // Same endpoint, same client
        let a = registry.client("openai").unwrap();
        let b = registry.client("openai").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.client_count(), 3);
    }

    #[tokio::test]
    async fn test_rate_limiter_stats_per_endpoint() {
        let config = config();
        let registry = ModelRegistry::new(&config);
        assert!(registry.rate_limiter_stats().is_empty());

        registry.evaluators().unwrap();
        registry
            .client("openai")
            .unwrap()
            .rate_limiter()
            .acquire("gpt-4o")
            .await;

        let stats = registry.rate_limiter_stats();
        let endpoints: Vec<&str> = stats.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(endpoints, ["anthropic", "gemini", "openai"]);
        assert_eq!(stats[2].1.total_requests, 1);
        assert_eq!(stats[2].1.models_tracked, 1);
        assert_eq!(stats[0].1.total_requests, 0);
    }

    #[test]
    fn test_unknown_model_fails_fast() {
        let config = config();
        let registry = ModelRegistry::new(&config);
        assert!(matches!(
            registry.resolve("gpt-5"),
            Err(CpsEvalError::Config(ConfigError::UnknownModel(_)))
        ));
    }

    #[test]
    fn test_missing_api_key_fails_fast() {
        let mut config = config();
        let openai = config.endpoints.get_mut("openai").unwrap();
        openai.api_key = None;
        openai.api_key_env = Some("CPSEVAL_TEST_UNSET_KEY_9F2A".to_string());

        let registry = ModelRegistry::new(&config);
        assert!(matches!(
            registry.resolve("gpt-4o"),
            Err(CpsEvalError::Config(ConfigError::MissingApiKey { .. }))
        ));
    }
}
