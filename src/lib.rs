//! BATCOM: Battlefield Tactical Commander
//!
//! Headless decision engine that drives AI force allocation in a simulated
//! battlefield by periodically consulting a Large Language Model.
//!
//! ## Architecture
//!
//! - **Bridge**: pair-list wire codec and world-snapshot normalizer
//! - **Evaluator**: objective state classification and dynamic priority
//! - **LLM Module**: multi-provider client with context caching, rate
//!   limiting, circuit breaker, and thinking-mode support
//! - **Sandbox**: layered validation of untrusted LLM orders
//! - **Commander**: the per-snapshot decision loop
//! - **State Manager**: per-AO history, telemetry roll-ups, HVT designation

pub mod config;
pub mod types;
pub mod bridge;
pub mod evaluator;
pub mod llm;
pub mod orders;
pub mod queue;
pub mod commander;
pub mod state;
pub mod telemetry;
pub mod engine;
pub mod api;

// Re-export engine configuration
pub use config::EngineConfig;

// Re-export commonly used types
pub use types::{
    AoBounds, Command, CommandType, Group, Objective, ObjectiveEval,
    ObjectiveState, Order, Position, Side, Snapshot, TacticalClass, TokenUsage,
};

// Re-export the engine entry point
pub use engine::{EngineError, EngineState};

// Re-export LLM components
pub use llm::{CircuitState, LlmProvider, ProviderError, ProviderKind};

// Re-export sandbox results
pub use orders::{RejectionKind, ValidationOutcome};
