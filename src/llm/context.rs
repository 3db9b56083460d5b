//! Decision context: what one provider call is built from.
//!
//! The context is pre-rendered text, split along the caching contract:
//! system prompt plus the standing block (objectives, order history, prior
//! AOs, guardrails) are cacheable; world state and mission intent are
//! dynamic and always sent inline.

use crate::config::{AiConfig, ReasoningEffort, ThinkingBudget, ThinkingLevel, ThinkingMode};

use super::cache::content_hash;

/// Reasoning knobs forwarded to the provider, copied out of config so the
/// context stays self-contained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThinkingKnobs {
    pub enabled: bool,
    pub mode: ThinkingMode,
    pub budget: ThinkingBudget,
    pub level: ThinkingLevel,
    pub effort: ReasoningEffort,
    pub include_thoughts: bool,
}

impl ThinkingKnobs {
    pub fn from_ai_config(ai: &AiConfig) -> Self {
        Self {
            enabled: ai.thinking_enabled,
            mode: ai.thinking_mode,
            budget: ai.thinking_budget,
            level: ai.thinking_level,
            effort: ai.reasoning_effort,
            include_thoughts: ai.include_thoughts,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            mode: ThinkingMode::NativeSdk,
            budget: ThinkingBudget::Off,
            level: ThinkingLevel::Low,
            effort: ReasoningEffort::None,
            include_thoughts: false,
        }
    }
}

/// Fully rendered input for one `generate_orders` call.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    /// Invariant commander persona and reply schema
    pub system_prompt: String,
    /// Objectives, order history, previous AOs, guardrails — cacheable
    pub standing_block: String,
    /// Current world state and mission intent — always inline
    pub dynamic_block: String,
    pub thinking: ThinkingKnobs,
}

impl DecisionContext {
    /// The text covered by a cache handle.
    pub fn cacheable_text(&self) -> String {
        format!("{}\n\n{}", self.system_prompt, self.standing_block)
    }

    /// Hash of the cacheable part, compared against stored handles.
    pub fn cache_hash(&self) -> u64 {
        content_hash(&self.cacheable_text())
    }

    /// User message when a cache handle carries the standing part.
    pub fn cached_user_message(&self) -> &str {
        &self.dynamic_block
    }

    /// User message when sending everything inline.
    pub fn inline_user_message(&self) -> String {
        format!("{}\n\n{}", self.standing_block, self.dynamic_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(standing: &str, dynamic: &str) -> DecisionContext {
        DecisionContext {
            system_prompt: "You are the commander.".to_string(),
            standing_block: standing.to_string(),
            dynamic_block: dynamic.to_string(),
            thinking: ThinkingKnobs::disabled(),
        }
    }

    #[test]
    fn hash_tracks_standing_not_dynamic() {
        let a = context("objectives v1", "tick 1");
        let b = context("objectives v1", "tick 2");
        let c = context("objectives v2", "tick 1");
        assert_eq!(a.cache_hash(), b.cache_hash());
        assert_ne!(a.cache_hash(), c.cache_hash());
    }

    #[test]
    fn inline_message_carries_both_blocks() {
        let ctx = context("standing", "dynamic");
        let inline = ctx.inline_user_message();
        assert!(inline.contains("standing"));
        assert!(inline.contains("dynamic"));
        assert_eq!(ctx.cached_user_message(), "dynamic");
    }
}
