//! Provider adapters behind the `LanguageModel` seam.
//!
//! Judges and the generator only ever see `Arc<dyn LanguageModel>`; each
//! adapter knows its provider's request and response shapes and delegates
//! transport, pacing and retry to the shared [`LLMClient`].

use crate::client::{LLMClient, Message};
use crate::models::{ApiError, ModelSpec, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

/// A text-in, text-out language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Configured model name (the key used in verdict maps).
    fn name(&self) -> &str;

    /// Send one prompt and return the trimmed completion text.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// OpenAI-compatible `/chat/completions` (OpenAI, DeepSeek, vLLM, Ollama, TGI).
pub struct ChatCompletionsModel {
    name: String,
    spec: ModelSpec,
    client: Arc<LLMClient>,
}

impl ChatCompletionsModel {
    pub fn new(name: impl Into<String>, spec: ModelSpec, client: Arc<LLMClient>) -> Self {
        Self {
            name: name.into(),
            spec,
            client,
        }
    }

    fn request(&self, prompt: &str) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.spec.system_prompt {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(prompt));

        json!({
            "model": self.spec.id,
            "messages": messages,
            "max_tokens": self.spec.max_tokens,
            "temperature": self.spec.temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post_json(&self.spec.id, "/chat/completions", &self.request(prompt))
            .await?;

        response["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| missing(&self.name, "choices[0].message.content"))
    }
}

/// Anthropic `/messages`.
pub struct AnthropicModel {
    name: String,
    spec: ModelSpec,
    client: Arc<LLMClient>,
}

impl AnthropicModel {
    pub fn new(name: impl Into<String>, spec: ModelSpec, client: Arc<LLMClient>) -> Self {
        Self {
            name: name.into(),
            spec,
            client,
        }
    }

    fn request(&self, prompt: &str) -> Value {
        let mut body = json!({
            "model": self.spec.id,
            "max_tokens": self.spec.max_tokens,
            "temperature": self.spec.temperature,
            "messages": [Message::user(prompt)],
        });
        if let Some(system) = &self.spec.system_prompt {
            body["system"] = Value::String(system.clone());
        }
        body
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post_json(&self.spec.id, "/messages", &self.request(prompt))
            .await?;

        let blocks = response["content"]
            .as_array()
            .ok_or_else(|| missing(&self.name, "content"))?;

        let text: String = blocks
            .iter()
            .filter(|b| b["type"] == "text")
            .filter_map(|b| b["text"].as_str())
            .collect();

        Ok(text.trim().to_string())
    }
}

/// Google generative language `/models/{id}:generateContent`.
///
/// The prompt goes out as a bare string part; `system_prompt` maps onto
/// `systemInstruction`.
pub struct GeminiModel {
    name: String,
    spec: ModelSpec,
    client: Arc<LLMClient>,
}

impl GeminiModel {
    pub fn new(name: impl Into<String>, spec: ModelSpec, client: Arc<LLMClient>) -> Self {
        Self {
            name: name.into(),
            spec,
            client,
        }
    }

    fn request(&self, prompt: &str) -> Value {
        let mut body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "maxOutputTokens": self.spec.max_tokens,
                "temperature": self.spec.temperature,
            },
        });
        if let Some(system) = &self.spec.system_prompt {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let path = format!("/models/{}:generateContent", self.spec.id);
        let response = self
            .client
            .post_json(&self.spec.id, &path, &self.request(prompt))
            .await?;

        let parts = response["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| missing(&self.name, "candidates[0].content.parts"))?;

        let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
        Ok(text.trim().to_string())
    }
}

fn missing(model: &str, field: &str) -> crate::models::CpsEvalError {
    ApiError::InvalidResponse(format!("{model}: response has no {field}")).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{RateLimiter, RetryPolicy};
    use crate::models::{CpsEvalError, Provider};
    use std::collections::HashMap;
    use std::time::Duration;

    fn spec(id: &str, system_prompt: Option<&str>) -> ModelSpec {
        ModelSpec {
            endpoint: "test".to_string(),
            id: id.to_string(),
            max_tokens: 64,
            temperature: 0.0,
            system_prompt: system_prompt.map(str::to_string),
        }
    }

    fn client(server: &mockito::Server, provider: Provider) -> Arc<LLMClient> {
        Arc::new(
            LLMClient::new(
                "test",
                provider,
                Some("secret".to_string()),
                server.url(),
                &HashMap::new(),
                Duration::from_secs(5),
                RetryPolicy {
                    max_retries: 1,
                    backoff: Duration::ZERO,
                },
                Arc::new(RateLimiter::default()),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_chat_request_includes_system_message() {
        let server_url = "http://localhost:1";
        let client = Arc::new(
            LLMClient::new(
                "test",
                Provider::OpenAi,
                None,
                server_url,
                &HashMap::new(),
                Duration::from_secs(1),
                RetryPolicy::default(),
                Arc::new(RateLimiter::default()),
            )
            .unwrap(),
        );
        let model = ChatCompletionsModel::new("gpt-4o", spec("gpt-4o", Some("Be terse.")), client);
        let body = model.request("Solve it");

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Solve it");
        assert_eq!(body["max_tokens"], 64);
    }

    #[tokio::test]
    async fn test_chat_completions_generate() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": "  YES\n"}}]}"#)
            .create_async()
            .await;

        let model = ChatCompletionsModel::new(
            "gpt-4o",
            spec("gpt-4o", None),
            client(&server, Provider::OpenAi),
        );
        assert_eq!(model.generate("Is it correct?").await.unwrap(), "YES");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_anthropic_generate_joins_text_blocks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "secret")
            .match_header("anthropic-version", "2023-06-01")
            .with_status(200)
            .with_body(r#"{"content": [{"type": "text", "text": "NO"}, {"type": "text", "text": "."}]}"#)
            .create_async()
            .await;

        let model = AnthropicModel::new(
            "claude",
            spec("claude-3-5-sonnet", Some("Judge strictly.")),
            client(&server, Provider::Anthropic),
        );
        assert_eq!(model.generate("Novel?").await.unwrap(), "NO.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_gemini_generate() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-1.5-pro:generateContent")
            .match_header("x-goog-api-key", "secret")
            .with_status(200)
            .with_body(r#"{"candidates": [{"content": {"parts": [{"text": "YES"}]}}]}"#)
            .create_async()
            .await;

        let model = GeminiModel::new(
            "gemini",
            spec("gemini-1.5-pro", None),
            client(&server, Provider::Gemini),
        );
        assert_eq!(model.generate("Correct?").await.unwrap(), "YES");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_gemini_resource_exhausted_is_fatal_after_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-1.5-pro:generateContent")
            .with_status(400)
            .with_body(r#"{"error": {"status": "RESOURCE_EXHAUSTED", "message": "quota"}}"#)
            .expect(2)
            .create_async()
            .await;

        let model = GeminiModel::new(
            "gemini",
            spec("gemini-1.5-pro", None),
            client(&server, Provider::Gemini),
        );
        let err = model.generate("Correct?").await.unwrap_err();
        assert!(matches!(
            err,
            CpsEvalError::Api(ApiError::RetriesExhausted { attempts: 2, .. })
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_choices_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let model = ChatCompletionsModel::new(
            "local",
            spec("llama", None),
            client(&server, Provider::OpenAi),
        );
        let err = model.generate("hi").await.unwrap_err();
        assert!(matches!(err, CpsEvalError::Api(ApiError::InvalidResponse(_))));
    }
}
