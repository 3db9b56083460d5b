//! Gemini client with native context caching.
//!
//! The standing context is pushed into a `cachedContents` resource and
//! referenced by name on each `generateContent` call until the content hash
//! changes or the TTL lapses. Any caching failure downgrades the call to
//! inline context; the decision still goes out.

use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{AiConfig, ThinkingBudget, ThinkingMode};
use crate::types::TokenUsage;

use super::cache::ContextCache;
use super::context::DecisionContext;
use super::provider::{
    ConnectionProbe, GeneratedReply, LlmProvider, ProviderError, ProviderKind,
};

const DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    http: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    cache: ContextCache,
}

impl GeminiClient {
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

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    fn cache_url(&self) -> String {
        format!("{}/cachedContents?key={}", self.base_url, self.api_key)
    }

    /// Wire value for `thinkingConfig.thinkingBudget`.
    fn thinking_budget_value(context: &DecisionContext) -> Option<i64> {
        if !context.thinking.enabled || context.thinking.mode != ThinkingMode::NativeSdk {
            return None;
        }
        Some(match context.thinking.budget {
            ThinkingBudget::Dynamic => -1,
            ThinkingBudget::Tokens(n) => n as i64,
            ThinkingBudget::Off => 0,
        })
    }

    /// Create a cachedContents resource for the standing context.
    async fn create_cache(&self, context: &DecisionContext) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": format!("models/{}", self.model),
            "systemInstruction": {"parts": [{"text": context.system_prompt}]},
            "contents": [{"role": "user", "parts": [{"text": context.standing_block}]}],
            "ttl": "3600s",
        });
        let resp = self
            .http
            .post(self.cache_url())
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(map_status(status, resp.text().await.unwrap_or_default()));
        }
        let created: CachedContent = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        Ok(created.name)
    }

    async fn generate(
        &self,
        context: &DecisionContext,
        cached_name: Option<&str>,
    ) -> Result<(GenerateResponse, u64), ProviderError> {
        let mut generation_config = serde_json::json!({
            "responseMimeType": "application/json",
        });
        if let Some(budget) = Self::thinking_budget_value(context) {
            generation_config["thinkingConfig"] = serde_json::json!({
                "thinkingBudget": budget,
                "includeThoughts": context.thinking.include_thoughts,
            });
        }

        let body = match cached_name {
            Some(name) => serde_json::json!({
                "cachedContent": name,
                "contents": [{"role": "user", "parts": [{"text": context.cached_user_message()}]}],
                "generationConfig": generation_config,
            }),
            None => serde_json::json!({
                "systemInstruction": {"parts": [{"text": context.system_prompt}]},
                "contents": [{"role": "user", "parts": [{"text": context.inline_user_message()}]}],
                "generationConfig": generation_config,
            }),
        };

        let started = Instant::now();
        let resp = self
            .http
            .post(self.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let status = resp.status();
        if !status.is_success() {
            return Err(map_status(status, resp.text().await.unwrap_or_default()));
        }
        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        Ok((parsed, latency_ms))
    }

    fn reply_from(&self, resp: GenerateResponse, latency_ms: u64) -> Result<GeneratedReply, ProviderError> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("no candidates in reply".into()))?;

        let mut text = String::new();
        let mut thoughts = String::new();
        for part in candidate.content.parts {
            if part.thought {
                thoughts.push_str(&part.text);
            } else {
                text.push_str(&part.text);
            }
        }

        let meta = resp.usage_metadata.unwrap_or_default();
        Ok(GeneratedReply {
            text,
            thoughts: (!thoughts.is_empty()).then_some(thoughts),
            usage: TokenUsage {
                input_tokens: meta.prompt_token_count,
                output_tokens: meta.candidates_token_count + meta.thoughts_token_count,
                cached_input_tokens: meta.cached_content_token_count,
                total_tokens: meta.total_token_count,
                latency_ms,
                provider: ProviderKind::Gemini,
                model: self.model.clone(),
            },
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for GeminiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
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
        let hash = context.cache_hash();
        let mut cached_name = self.cache.valid_handle(hash).map(|h| h.id.clone());

        if cached_name.is_none() {
            match self.create_cache(context).await {
                Ok(name) => {
                    debug!(cache = %name, "created Gemini context cache");
                    self.cache.store(name.clone(), hash);
                    cached_name = Some(name);
                }
                Err(e) => {
                    warn!(error = %e, "context cache creation failed, sending inline");
                    self.cache.record_failure();
                }
            }
        }

        if let Some(name) = &cached_name {
            match self.generate(context, Some(name)).await {
                Ok((resp, latency)) => return self.reply_from(resp, latency),
                Err(e) if !e.is_transient() => {
                    // Handle likely expired server-side; retry inline
                    warn!(error = %e, "cached generate failed, falling back to inline");
                    self.cache.record_failure();
                }
                Err(e) => return Err(e),
            }
        }

        let (resp, latency) = self.generate(context, None).await?;
        self.reply_from(resp, latency)
    }

    async fn test_connection(&mut self) -> Result<ConnectionProbe, ProviderError> {
        let probe = DecisionContext {
            system_prompt: "You are a connectivity probe.".to_string(),
            standing_block: String::new(),
            dynamic_block: "Reply with one short greeting.".to_string(),
            thinking: super::context::ThinkingKnobs::disabled(),
        };
        let (resp, latency) = self.generate(&probe, None).await?;
        let reply = self.reply_from(resp, latency)?;
        Ok(ConnectionProbe {
            provider: ProviderKind::Gemini,
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
        500..=599 => ProviderError::Unavailable(format!("{status}: {body}")),
        _ => ProviderError::MalformedResponse(format!("{status}: {body}")),
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct CachedContent {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default, rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    cached_content_token_count: u64,
    #[serde(default)]
    thoughts_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AiConfig, ThinkingBudget, ThinkingMode};
    use crate::llm::context::ThinkingKnobs;

    fn context_with_budget(budget: ThinkingBudget) -> DecisionContext {
        DecisionContext {
            system_prompt: "sys".into(),
            standing_block: "standing".into(),
            dynamic_block: "dynamic".into(),
            thinking: ThinkingKnobs {
                enabled: true,
                mode: ThinkingMode::NativeSdk,
                budget,
                level: Default::default(),
                effort: Default::default(),
                include_thoughts: false,
            },
        }
    }

    #[test]
    fn thinking_budget_wire_values() {
        assert_eq!(
            GeminiClient::thinking_budget_value(&context_with_budget(ThinkingBudget::Dynamic)),
            Some(-1)
        );
        assert_eq!(
            GeminiClient::thinking_budget_value(&context_with_budget(ThinkingBudget::Tokens(512))),
            Some(512)
        );
        assert_eq!(
            GeminiClient::thinking_budget_value(&context_with_budget(ThinkingBudget::Off)),
            Some(0)
        );

        let mut ctx = context_with_budget(ThinkingBudget::Dynamic);
        ctx.thinking.enabled = false;
        assert_eq!(GeminiClient::thinking_budget_value(&ctx), None);
    }

    #[test]
    fn separates_thought_parts() {
        let ai = AiConfig::default();
        let client = GeminiClient::new(&ai, "k".into());
        let raw = serde_json::json!({
            "candidates": [{"content": {"parts": [
                {"text": "planning...", "thought": true},
                {"text": "{\"reasoning\":\"hold\",\"orders\":[]}"}
            ]}}],
            "usageMetadata": {
                "promptTokenCount": 4300,
                "candidatesTokenCount": 120,
                "cachedContentTokenCount": 2800,
                "thoughtsTokenCount": 300,
                "totalTokenCount": 4720
            }
        });
        let resp: GenerateResponse = serde_json::from_value(raw).unwrap();
        let reply = client.reply_from(resp, 800).unwrap();
        assert!(reply.text.starts_with("{\"reasoning\""));
        assert_eq!(reply.thoughts.as_deref(), Some("planning..."));
        assert_eq!(reply.usage.cached_input_tokens, 2800);
        assert_eq!(reply.usage.output_tokens, 420);
    }
}
