//! OpenAI-compatible chat-completions client.
//!
//! Covers OpenAI, DeepSeek, Azure OpenAI, and any local endpoint speaking
//! the same dialect. These backends cache transparently on their side, so
//! the client sends the full context inline and reads the cached-token
//! figure back out of the usage block.

use std::time::Instant;

use serde::Deserialize;
use tracing::debug;

use crate::config::{AiConfig, ThinkingMode};
use crate::types::TokenUsage;

use super::context::DecisionContext;
use super::provider::{
    ConnectionProbe, GeneratedReply, LlmProvider, ProviderError, ProviderKind,
};

pub struct OpenAiCompatClient {
    http: reqwest::Client,
    kind: ProviderKind,
    model: String,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatClient {
    pub fn new(ai: &AiConfig, api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(ai.timeout))
            .build()
            .unwrap_or_default();

        let base_url = match (&ai.endpoint, ai.provider) {
            (Some(endpoint), _) => endpoint.trim_end_matches('/').to_string(),
            (None, ProviderKind::Deepseek) => "https://api.deepseek.com/v1".to_string(),
            (None, _) => "https://api.openai.com/v1".to_string(),
        };

        Self {
            http,
            kind: ai.provider,
            model: ai.model.clone(),
            base_url,
            api_key,
        }
    }

    fn completions_url(&self) -> String {
        match self.kind {
            // Azure routes per-deployment with the key as a header
            ProviderKind::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version=2024-10-21",
                self.base_url, self.model
            ),
            _ => format!("{}/chat/completions", self.base_url),
        }
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.kind {
            ProviderKind::Azure => req.header("api-key", &self.api_key),
            ProviderKind::Local if self.api_key.is_empty() => req,
            _ => req.header("Authorization", format!("Bearer {}", self.api_key)),
        }
    }

    async fn chat(
        &self,
        system: &str,
        user: &str,
        thinking: Option<&'static str>,
        max_tokens: Option<u32>,
    ) -> Result<(ChatResponse, u64), ProviderError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        if let Some(effort) = thinking {
            body["reasoning_effort"] = serde_json::json!(effort);
        }
        if let Some(n) = max_tokens {
            body["max_tokens"] = serde_json::json!(n);
        }

        let started = Instant::now();
        let resp = self
            .apply_auth(self.http.post(self.completions_url()))
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let status = resp.status();
        if !status.is_success() {
            return Err(map_status(status, resp.text().await.unwrap_or_default()));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        Ok((parsed, latency_ms))
    }

    fn usage_from(&self, usage: Option<ChatUsage>, latency_ms: u64) -> TokenUsage {
        let usage = usage.unwrap_or_default();
        let cached = usage
            .prompt_tokens_details
            .map(|d| d.cached_tokens)
            .unwrap_or(0);
        TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cached_input_tokens: cached,
            total_tokens: usage.total_tokens,
            latency_ms,
            provider: self.kind,
            model: self.model.clone(),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatClient {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_thinking(&self) -> bool {
        true
    }

    async fn generate_orders(
        &mut self,
        context: &DecisionContext,
    ) -> Result<GeneratedReply, ProviderError> {
        let effort = (context.thinking.enabled
            && context.thinking.mode == ThinkingMode::OpenaiCompat)
            .then(|| context.thinking.effort.as_wire())
            .flatten();

        let (resp, latency_ms) = self
            .chat(
                &context.system_prompt,
                &context.inline_user_message(),
                effort,
                None,
            )
            .await?;

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("no choices in reply".into()))?;
        debug!(provider = %self.kind, finish = ?choice.finish_reason, "chat completion received");

        Ok(GeneratedReply {
            text: choice.message.content.unwrap_or_default(),
            thoughts: choice.message.reasoning_content,
            usage: self.usage_from(resp.usage, latency_ms),
        })
    }

    async fn test_connection(&mut self) -> Result<ConnectionProbe, ProviderError> {
        let (resp, _) = self
            .chat(
                "You are a connectivity probe.",
                "Reply with one short greeting.",
                None,
                Some(32),
            )
            .await?;
        let greeting = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(ConnectionProbe {
            provider: self.kind,
            model: self.model.clone(),
            greeting,
        })
    }
}

fn map_transport(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(e)
    }
}

fn map_status(status: reqwest::StatusCode, body: String) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::AuthFailure,
        429 => ProviderError::RateLimited,
        500..=599 => ProviderError::Unavailable(format!("{status}: {body}")),
        _ => ProviderError::MalformedResponse(format!("{status}: {body}")),
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    /// DeepSeek-style separated reasoning channel
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AiConfig;

    fn client_for(kind: ProviderKind, endpoint: Option<&str>) -> OpenAiCompatClient {
        let ai = AiConfig {
            provider: kind,
            model: "test-model".to_string(),
            endpoint: endpoint.map(str::to_string),
            ..Default::default()
        };
        OpenAiCompatClient::new(&ai, "k".to_string())
    }

    #[test]
    fn url_shapes_per_variant() {
        let openai = client_for(ProviderKind::Openai, None);
        assert_eq!(
            openai.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );

        let deepseek = client_for(ProviderKind::Deepseek, None);
        assert_eq!(
            deepseek.completions_url(),
            "https://api.deepseek.com/v1/chat/completions"
        );

        let azure = client_for(ProviderKind::Azure, Some("https://unit.openai.azure.com"));
        assert!(azure.completions_url().contains("/openai/deployments/test-model/"));

        let local = client_for(ProviderKind::Local, Some("http://127.0.0.1:8000/v1/"));
        assert_eq!(
            local.completions_url(),
            "http://127.0.0.1:8000/v1/chat/completions"
        );
    }

    #[test]
    fn status_mapping() {
        use reqwest::StatusCode;
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, String::new()),
            ProviderError::AuthFailure
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ProviderError::RateLimited
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, String::new()),
            ProviderError::Unavailable(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST, String::new()),
            ProviderError::MalformedResponse(_)
        ));
    }

    #[test]
    fn usage_extracts_cached_tokens() {
        let raw = serde_json::json!({
            "choices": [{"message": {"content": "{}"}, "finish_reason": "stop"}],
            "usage": {
                "prompt_tokens": 4300,
                "completion_tokens": 220,
                "total_tokens": 4520,
                "prompt_tokens_details": {"cached_tokens": 2800}
            }
        });
        let resp: ChatResponse = serde_json::from_value(raw).unwrap();
        let client = client_for(ProviderKind::Openai, None);
        let usage = client.usage_from(resp.usage, 950);
        assert_eq!(usage.cached_input_tokens, 2800);
        assert_eq!(usage.fresh_input_tokens(), 1500);
        assert_eq!(usage.latency_ms, 950);
    }
}
