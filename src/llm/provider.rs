//! Provider contract: the capability trait and its tagged variants.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AiConfig;
use crate::types::TokenUsage;

use super::context::DecisionContext;

// ============================================================================
// Provider Variants
// ============================================================================

/// The supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Gemini,
    Openai,
    Anthropic,
    Deepseek,
    Azure,
    /// Any OpenAI-compatible endpoint reachable on the local network
    Local,
}

impl ProviderKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Some(ProviderKind::Gemini),
            "openai" => Some(ProviderKind::Openai),
            "anthropic" | "claude" => Some(ProviderKind::Anthropic),
            "deepseek" => Some(ProviderKind::Deepseek),
            "azure" | "azure_openai" => Some(ProviderKind::Azure),
            "local" | "local_openai" | "ollama" => Some(ProviderKind::Local),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Openai => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Deepseek => "deepseek",
            ProviderKind::Azure => "azure",
            ProviderKind::Local => "local",
        }
    }

    /// Environment variable consulted in the key resolution order.
    pub fn env_key_var(&self) -> String {
        format!("{}_API_KEY", self.as_str().to_uppercase())
    }

    /// Local endpoints run without credentials; everyone else fails closed.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderKind::Local)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Provider call failures, split along the retry/breaker taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("circuit breaker is open")]
    BreakerOpen,
    #[error("rate limited by provider")]
    RateLimited,
    #[error("request timed out")]
    Timeout,
    #[error("authentication failed")]
    AuthFailure,
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
    #[error("call cancelled by emergency stop")]
    Cancelled,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ProviderError {
    /// Transient failures get one retry and count toward the breaker;
    /// permanent ones skip the retry and count immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited | ProviderError::Timeout | ProviderError::Unavailable(_) => {
                true
            }
            ProviderError::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// Raw result of one `generate_orders` call. The order parser owns turning
/// `text` into orders; the provider never interprets it.
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    /// Full reply text (expected to be the JSON orders document)
    pub text: String,
    /// Model rationale when thinking is enabled and the provider returns it
    pub thoughts: Option<String>,
    pub usage: TokenUsage,
}

/// Result of a `test_connection` probe.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionProbe {
    pub provider: ProviderKind,
    pub model: String,
    pub greeting: String,
}

// ============================================================================
// Capability Trait
// ============================================================================

/// Uniform contract over every backend.
///
/// Implementations own their transport, their cache handles, and nothing
/// else; pacing, breaker state, and retries live in the session wrapper.
#[async_trait]
pub trait LlmProvider: Send {
    fn kind(&self) -> ProviderKind;
    fn model(&self) -> &str;

    /// Whether the backend offers native context caching.
    fn supports_caching(&self) -> bool {
        false
    }

    /// Whether the backend accepts a reasoning budget or effort knob.
    fn supports_thinking(&self) -> bool {
        false
    }

    /// One decision call. The provider decides how to split the context
    /// into cached and inline parts.
    async fn generate_orders(
        &mut self,
        context: &DecisionContext,
    ) -> Result<GeneratedReply, ProviderError>;

    /// Minimal round-trip used by the `test_connection` RPC.
    async fn test_connection(&mut self) -> Result<ConnectionProbe, ProviderError>;

    /// Drop any cache handles. Called by emergency stop and on redeploy.
    fn clear_cache(&mut self) {}
}

/// Construct the configured backend. The caller has already resolved the
/// API key through the documented resolution order.
pub fn build_provider(ai: &AiConfig, api_key: Option<String>) -> Box<dyn LlmProvider> {
    let key = api_key.unwrap_or_default();
    match ai.provider {
        ProviderKind::Gemini => Box::new(super::GeminiClient::new(ai, key)),
        ProviderKind::Anthropic => Box::new(super::AnthropicClient::new(ai, key)),
        ProviderKind::Openai | ProviderKind::Deepseek | ProviderKind::Azure | ProviderKind::Local => {
            Box::new(super::OpenAiCompatClient::new(ai, key))
        }
    }
}
