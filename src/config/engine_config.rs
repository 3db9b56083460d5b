//! Engine Configuration - All tuning values as operator-editable TOML
//!
//! Every knob the host can set through the `init` record is a field in this
//! module. Each struct implements `Default`, ensuring the engine comes up
//! with sane behavior when no config file is present.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::llm::ProviderKind;
use crate::types::AoBounds;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for an engine deployment.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$BATCOM_CONFIG` env var
/// 2. `./batcom.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Log level and host-console echo
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Host scan cadences (advisory; the host honors these)
    #[serde(default)]
    pub scan: ScanConfig,

    /// Per-tick throughput limits
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// LLM provider selection and pacing
    #[serde(default)]
    pub ai: AiConfig,

    /// Sandbox and spawn limits
    #[serde(default)]
    pub safety: SafetyConfig,

    /// AO bounds and resource pools
    #[serde(default)]
    pub guardrails: GuardrailsConfig,
}

// ============================================================================
// [logging]
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of DEBUG, INFO, WARN, ERROR
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Mirror engine log lines back to the host console
    #[serde(default)]
    pub echo_to_host_console: bool,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            echo_to_host_console: false,
        }
    }
}

// ============================================================================
// [scan]
// ============================================================================

/// Host-side scan cadences in seconds. The engine never schedules these
/// itself; they are echoed back so mission scripts can read one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_scan_tick")]
    pub tick: f64,
    #[serde(default = "default_scan_groups")]
    pub ai_groups: f64,
    #[serde(default = "default_scan_players")]
    pub players: f64,
    #[serde(default = "default_scan_objectives")]
    pub objectives: f64,
}

fn default_scan_tick() -> f64 {
    5.0
}
fn default_scan_groups() -> f64 {
    10.0
}
fn default_scan_players() -> f64 {
    10.0
}
fn default_scan_objectives() -> f64 {
    15.0
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            tick: default_scan_tick(),
            ai_groups: default_scan_groups(),
            players: default_scan_players(),
            objectives: default_scan_objectives(),
        }
    }
}

// ============================================================================
// [runtime]
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_max_messages")]
    pub max_messages_per_tick: usize,
    #[serde(default = "default_max_commands")]
    pub max_commands_per_tick: usize,
    #[serde(default = "default_max_controlled_groups")]
    pub max_controlled_groups: usize,
}

fn default_max_messages() -> usize {
    50
}
fn default_max_commands() -> usize {
    30
}
fn default_max_controlled_groups() -> usize {
    40
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_messages_per_tick: default_max_messages(),
            max_commands_per_tick: default_max_commands(),
            max_controlled_groups: default_max_controlled_groups(),
        }
    }
}

// ============================================================================
// [ai]
// ============================================================================

/// LLM provider selection, pacing, and reasoning-mode knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Master switch. With `enabled = false` the commander never calls out;
    /// snapshots still accumulate state.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default = "default_model")]
    pub model: String,

    /// Override base URL (required for `local`, optional for `azure`)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Minimum seconds between decision cycles
    #[serde(default = "default_min_interval")]
    pub min_interval: f64,

    /// Sliding-window request cap, per minute
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: u32,

    /// API key. Resolution order: admin override, this field, then the
    /// `{PROVIDER}_API_KEY` environment variable. Fails closed if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default)]
    pub thinking_enabled: bool,

    #[serde(default)]
    pub thinking_mode: ThinkingMode,

    /// Reasoning token budget: integer tokens, `"dynamic"`, or 0 for off
    #[serde(default)]
    pub thinking_budget: ThinkingBudget,

    #[serde(default)]
    pub thinking_level: ThinkingLevel,

    /// Effort knob for `openai_compat` thinking mode
    #[serde(default)]
    pub reasoning_effort: ReasoningEffort,

    /// Return model rationale alongside orders
    #[serde(default)]
    pub include_thoughts: bool,

    /// Divert rationale to the per-AO log file instead of the host
    #[serde(default)]
    pub log_thoughts_to_file: bool,
}

fn default_true() -> bool {
    true
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_min_interval() -> f64 {
    30.0
}
fn default_rate_limit_rpm() -> u32 {
    10
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            provider: ProviderKind::default(),
            model: default_model(),
            endpoint: None,
            timeout: default_timeout(),
            min_interval: default_min_interval(),
            rate_limit_rpm: default_rate_limit_rpm(),
            api_key: None,
            thinking_enabled: false,
            thinking_mode: ThinkingMode::default(),
            thinking_budget: ThinkingBudget::default(),
            thinking_level: ThinkingLevel::default(),
            reasoning_effort: ReasoningEffort::default(),
            include_thoughts: false,
            log_thoughts_to_file: false,
        }
    }
}

/// How reasoning is requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingMode {
    /// Provider-native reasoning budget (token count or "dynamic")
    #[default]
    NativeSdk,
    /// OpenAI-style `reasoning_effort` string
    OpenaiCompat,
}

/// Reasoning token budget for `native_sdk` mode.
///
/// Serialized as an integer (`0` = off) or the string `"dynamic"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThinkingBudget {
    #[default]
    Off,
    Dynamic,
    Tokens(u32),
}

impl Serialize for ThinkingBudget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ThinkingBudget::Off => serializer.serialize_u32(0),
            ThinkingBudget::Dynamic => serializer.serialize_str("dynamic"),
            ThinkingBudget::Tokens(n) => serializer.serialize_u32(*n),
        }
    }
}

impl<'de> Deserialize<'de> for ThinkingBudget {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(i64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Num(n) if n <= 0 => Ok(ThinkingBudget::Off),
            Raw::Num(n) => Ok(ThinkingBudget::Tokens(n as u32)),
            Raw::Text(s) if s.eq_ignore_ascii_case("dynamic") => Ok(ThinkingBudget::Dynamic),
            Raw::Text(s) => Err(serde::de::Error::custom(format!(
                "thinking_budget must be an integer or \"dynamic\", got \"{s}\""
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingLevel {
    #[default]
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    #[default]
    Medium,
    High,
    None,
}

impl ReasoningEffort {
    /// Wire string for OpenAI-compatible request bodies. `None` means the
    /// field is omitted entirely.
    pub fn as_wire(&self) -> Option<&'static str> {
        match self {
            ReasoningEffort::Minimal => Some("minimal"),
            ReasoningEffort::Low => Some("low"),
            ReasoningEffort::Medium => Some("medium"),
            ReasoningEffort::High => Some("high"),
            ReasoningEffort::None => None,
        }
    }
}

// ============================================================================
// [safety]
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_true")]
    pub sandbox_enabled: bool,

    #[serde(default = "default_max_groups_per_objective")]
    pub max_groups_per_objective: usize,

    #[serde(default = "default_max_units_per_side")]
    pub max_units_per_side: usize,

    /// Command-type allow-list. Empty means "all known types".
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    /// Command-type block-list; wins over the allow-list.
    #[serde(default)]
    pub blocked_commands: Vec<String>,

    /// Append sandbox rejections to the per-AO log
    #[serde(default = "default_true")]
    pub audit_log: bool,
}

fn default_max_groups_per_objective() -> usize {
    6
}
fn default_max_units_per_side() -> usize {
    144
}
fn default_allowed_commands() -> Vec<String> {
    vec![
        "move_to".to_string(),
        "defend_area".to_string(),
        "patrol_route".to_string(),
        "seek_and_destroy".to_string(),
        "transport_group".to_string(),
        "escort_group".to_string(),
        "fire_support".to_string(),
        "deploy_asset".to_string(),
        "spawn_squad".to_string(),
    ]
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            sandbox_enabled: true,
            max_groups_per_objective: default_max_groups_per_objective(),
            max_units_per_side: default_max_units_per_side(),
            allowed_commands: default_allowed_commands(),
            blocked_commands: Vec::new(),
            audit_log: true,
        }
    }
}

// ============================================================================
// [guardrails]
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardrailsConfig {
    /// Geographic envelope for every ordered position. `None` reduces the
    /// geography check to a finite-coordinate check.
    #[serde(default)]
    pub ao_bounds: Option<AoBounds>,

    /// side → asset type → inventory spec
    #[serde(default)]
    pub resource_pool: HashMap<String, HashMap<String, AssetPoolSpec>>,
}

/// One asset type's inventory within a side's resource pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPoolSpec {
    /// Simulator class names the host may spawn for this asset type
    pub classnames: Vec<String>,
    /// Cap on cumulative deployments per AO
    pub max: u32,
    /// Only admitted while the AO defense phase is active
    #[serde(default)]
    pub defense_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = EngineConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.ai.min_interval, 30.0);
        assert_eq!(parsed.runtime.max_commands_per_tick, 30);
        assert!(parsed.safety.sandbox_enabled);
    }

    #[test]
    fn thinking_budget_accepts_int_and_dynamic() {
        #[derive(Deserialize)]
        struct Probe {
            budget: ThinkingBudget,
        }
        let p: Probe = toml::from_str("budget = 2048").unwrap();
        assert_eq!(p.budget, ThinkingBudget::Tokens(2048));
        let p: Probe = toml::from_str("budget = 0").unwrap();
        assert_eq!(p.budget, ThinkingBudget::Off);
        let p: Probe = toml::from_str("budget = \"dynamic\"").unwrap();
        assert_eq!(p.budget, ThinkingBudget::Dynamic);
        assert!(toml::from_str::<Probe>("budget = \"lots\"").is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let text = r#"
            [ai]
            provider = "anthropic"
            model = "claude-sonnet-4-5"
            min_interval = 45.0

            [safety]
            blocked_commands = ["deploy_asset"]
        "#;
        let config: EngineConfig = toml::from_str(text).unwrap();
        assert_eq!(config.ai.min_interval, 45.0);
        assert_eq!(config.ai.timeout, 30);
        assert_eq!(config.safety.blocked_commands, vec!["deploy_asset"]);
        assert!(!config.safety.allowed_commands.is_empty());
    }
}
