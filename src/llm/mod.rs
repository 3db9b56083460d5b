//! LLM Provider Module
//!
//! ## Architecture
//!
//! - **Provider contract** (`provider.rs`): one async trait over the six
//!   supported backends, dispatched through a capability set rather than
//!   inheritance. All variants accept the same `DecisionContext`.
//!
//! - **Guarded session** (`session.rs`): wraps a provider with the circuit
//!   breaker, min-interval pacing, the sliding RPM window, the request
//!   timeout, and the single-retry backoff policy. The commander only ever
//!   talks to the session.
//!
//! - **Context caching** (`cache.rs`): opaque handles keyed by content hash
//!   with a wall-clock expiry. On any caching failure providers fall back to
//!   inline context and record the failure; caching never raises.

pub mod breaker;
pub mod cache;
pub mod context;
pub mod prompt;
pub mod provider;
pub mod rate_limit;
pub mod session;

mod anthropic;
mod gemini;
mod openai_compat;

pub use anthropic::AnthropicClient;
pub use breaker::{CircuitBreaker, CircuitState};
pub use cache::ContextCache;
pub use context::{DecisionContext, ThinkingKnobs};
pub use gemini::GeminiClient;
pub use openai_compat::OpenAiCompatClient;
pub use provider::{
    build_provider, ConnectionProbe, GeneratedReply, LlmProvider, ProviderError, ProviderKind,
};
pub use session::ProviderSession;
