//! Anthropic messages client.
//!
//! Caching rides on `cache_control` breakpoints: the system prompt and the
//! standing block are marked ephemeral and the API reuses them while the
//! prefix stays byte-identical. The local `ContextCache` mirrors that
//! lifetime so cache churn is observable without another network call.

use std::time::Instant;

use serde::Deserialize;
use tracing::debug;

use crate::config::{AiConfig, ThinkingBudget, ThinkingLevel, ThinkingMode};
use crate::types::TokenUsage;

use super::cache::ContextCache;
use super::context::DecisionContext;
use super::provider::{
    ConnectionProbe, GeneratedReply, LlmProvider, ProviderError, ProviderKind,
};

const DEFAULT_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

pub struct AnthropicClient {
    http: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    cache: ContextCache,
}

impl AnthropicClient {
    pub fn new(ai: &AiConfig, api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(ai.timeout))
            .build()
            .unwrap_or_default();
        Self {
            http,
            model: ai.model.clone(),
            base_url: ai
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            cache: ContextCache::new(),
        }
    }

    /// Extended-thinking budget in tokens, if thinking applies to this call.
    fn thinking_budget_tokens(context: &DecisionContext) -> Option<u32> {
        if !context.thinking.enabled || context.thinking.mode != ThinkingMode::NativeSdk {
            return None;
        }
        match context.thinking.budget {
            ThinkingBudget::Off => None,
            ThinkingBudget::Tokens(n) => Some(n.max(1024)),
            ThinkingBudget::Dynamic => Some(match context.thinking.level {
                ThinkingLevel::Low => 2048,
                ThinkingLevel::High => 8192,
            }),
        }
    }

    async fn messages(
        &self,
        system_blocks: serde_json::Value,
        user_text: &str,
        thinking_budget: Option<u32>,
    ) -> Result<(MessagesResponse, u64), ProviderError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": system_blocks,
            "messages": [{"role": "user", "content": user_text}],
        });
        if let Some(budget) = thinking_budget {
            body["thinking"] = serde_json::json!({
                "type": "enabled",
                "budget_tokens": budget,
            });
            // max_tokens must leave room for the thinking budget
            body["max_tokens"] = serde_json::json!(MAX_TOKENS + budget);
        }

        let started = Instant::now();
        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let status = resp.status();
        if !status.is_success() {
            return Err(map_status(status, resp.text().await.unwrap_or_default()));
        }
        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        Ok((parsed, latency_ms))
    }

    fn reply_from(
        &self,
        resp: MessagesResponse,
        latency_ms: u64,
        include_thoughts: bool,
    ) -> GeneratedReply {
        let mut text = String::new();
        let mut thoughts = String::new();
        for block in resp.content {
            match block {
                ContentBlock::Text { text: t } => text.push_str(&t),
                ContentBlock::Thinking { thinking } => thoughts.push_str(&thinking),
                ContentBlock::Other => {}
            }
        }
        let usage = resp.usage.unwrap_or_default();
        let cached = usage.cache_read_input_tokens;
        let input = usage.input_tokens + cached + usage.cache_creation_input_tokens;
        GeneratedReply {
            text,
            thoughts: (include_thoughts && !thoughts.is_empty()).then_some(thoughts),
            usage: TokenUsage {
                input_tokens: input,
                output_tokens: usage.output_tokens,
                cached_input_tokens: cached,
                total_tokens: input + usage.output_tokens,
                latency_ms,
                provider: ProviderKind::Anthropic,
                model: self.model.clone(),
            },
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_caching(&self) -> bool {
        true
    }

    fn supports_thinking(&self) -> bool {
        true
    }

    async fn generate_orders(
        &mut self,
        context: &DecisionContext,
    ) -> Result<GeneratedReply, ProviderError> {
        // Track the prefix lifetime locally; the API decides reuse by prefix
        // identity, so hash churn here means cache churn there.
        let hash = context.cache_hash();
        if self.cache.valid_handle(hash).is_none() {
            self.cache.store(format!("prefix-{hash:016x}"), hash);
            debug!("standing context changed, new cache prefix registered");
        }

        let system_blocks = serde_json::json!([
            {
                "type": "text",
                "text": context.system_prompt,
                "cache_control": {"type": "ephemeral"},
            },
            {
                "type": "text",
                "text": context.standing_block,
                "cache_control": {"type": "ephemeral"},
            },
        ]);

        let (resp, latency_ms) = self
            .messages(
                system_blocks,
                context.cached_user_message(),
                Self::thinking_budget_tokens(context),
            )
            .await?;
        Ok(self.reply_from(resp, latency_ms, context.thinking.include_thoughts))
    }

    async fn test_connection(&mut self) -> Result<ConnectionProbe, ProviderError> {
        let system = serde_json::json!([
            {"type": "text", "text": "You are a connectivity probe."}
        ]);
        let (resp, latency_ms) = self
            .messages(system, "Reply with one short greeting.", None)
            .await?;
        let reply = self.reply_from(resp, latency_ms, false);
        Ok(ConnectionProbe {
            provider: ProviderKind::Anthropic,
            model: self.model.clone(),
            greeting: reply.text,
        })
    }

    fn clear_cache(&mut self) {
        self.cache.invalidate();
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
        529 => ProviderError::Unavailable("overloaded".into()),
        500..=599 => ProviderError::Unavailable(format!("{status}: {body}")),
        _ => ProviderError::MalformedResponse(format!("{status}: {body}")),
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Thinking { thinking: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::context::ThinkingKnobs;

    fn context(enabled: bool, budget: ThinkingBudget) -> DecisionContext {
        DecisionContext {
            system_prompt: "sys".into(),
            standing_block: "standing".into(),
            dynamic_block: "dynamic".into(),
            thinking: ThinkingKnobs {
                enabled,
                mode: ThinkingMode::NativeSdk,
                budget,
                level: ThinkingLevel::High,
                effort: Default::default(),
                include_thoughts: true,
            },
        }
    }

    #[test]
    fn budget_floors_at_minimum() {
        assert_eq!(
            AnthropicClient::thinking_budget_tokens(&context(true, ThinkingBudget::Tokens(100))),
            Some(1024)
        );
        assert_eq!(
            AnthropicClient::thinking_budget_tokens(&context(true, ThinkingBudget::Dynamic)),
            Some(8192)
        );
        assert_eq!(
            AnthropicClient::thinking_budget_tokens(&context(false, ThinkingBudget::Dynamic)),
            None
        );
    }

    #[test]
    fn reply_sums_cache_figures() {
        let ai = AiConfig::default();
        let client = AnthropicClient::new(&ai, "k".into());
        let raw = serde_json::json!({
            "content": [
                {"type": "thinking", "thinking": "considering flanks"},
                {"type": "text", "text": "{\"reasoning\":\"x\",\"orders\":[]}"}
            ],
            "usage": {
                "input_tokens": 1500,
                "output_tokens": 200,
                "cache_read_input_tokens": 2800,
                "cache_creation_input_tokens": 0
            }
        });
        let resp: MessagesResponse = serde_json::from_value(raw).unwrap();
        let reply = client.reply_from(resp, 1200, true);
        assert_eq!(reply.usage.input_tokens, 4300);
        assert_eq!(reply.usage.cached_input_tokens, 2800);
        assert_eq!(reply.usage.fresh_input_tokens(), 1500);
        assert_eq!(reply.thoughts.as_deref(), Some("considering flanks"));
    }

    #[test]
    fn unknown_content_blocks_are_ignored() {
        let raw = serde_json::json!({
            "content": [
                {"type": "tool_use", "id": "x", "name": "y", "input": {}},
                {"type": "text", "text": "ok"}
            ]
        });
        let resp: MessagesResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(resp.content.len(), 2);
    }
}
