//! Config validation: fatal init-time checks plus non-fatal warnings.
//!
//! The fatal set matches the startup contract: an engine that comes up with
//! `ai.enabled = true` must be able to resolve an API key, and guardrails
//! must describe a usable geometry and inventory. Everything else is a
//! warning logged once and never breaks an existing config.

use tracing::warn;

use super::EngineConfig;
use crate::llm::ProviderKind;
use crate::types::AoBounds;

/// Fatal configuration error, returned from `init` before any state exists.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ai.enabled is true but no API key resolves for provider {0} (config, admin, or {1})")]
    MissingApiKey(ProviderKind, String),

    #[error("provider {0} requires an explicit endpoint")]
    MissingEndpoint(ProviderKind),

    #[error("malformed resource pool: {0}")]
    MalformedResourcePool(String),

    #[error("illegal AO bounds: {0}")]
    IllegalBounds(String),
}

/// Validate a config at init time. Returns the first fatal error, after
/// logging all non-fatal warnings.
pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    emit_warnings(config);

    if config.ai.enabled {
        let provider = config.ai.provider;
        if provider.requires_api_key() && resolve_api_key(config).is_none() {
            return Err(ConfigError::MissingApiKey(provider, provider.env_key_var()));
        }
        if provider == ProviderKind::Local && config.ai.endpoint.is_none() {
            return Err(ConfigError::MissingEndpoint(provider));
        }
    }

    if let Some(bounds) = &config.guardrails.ao_bounds {
        check_bounds(bounds)?;
    }

    for (side, assets) in &config.guardrails.resource_pool {
        for (asset_type, spec) in assets {
            if spec.classnames.is_empty() {
                return Err(ConfigError::MalformedResourcePool(format!(
                    "{side}/{asset_type} has no classnames"
                )));
            }
        }
    }

    Ok(())
}

/// Resolve the API key using the static half of the resolution order:
/// config file field, then `{PROVIDER}_API_KEY` environment variable.
/// Admin overrides layer on top at runtime, inside the engine.
pub fn resolve_api_key(config: &EngineConfig) -> Option<String> {
    if let Some(key) = &config.ai.api_key {
        if !key.trim().is_empty() {
            return Some(key.clone());
        }
    }
    std::env::var(config.ai.provider.env_key_var())
        .ok()
        .filter(|k| !k.trim().is_empty())
}

fn check_bounds(bounds: &AoBounds) -> Result<(), ConfigError> {
    match bounds {
        AoBounds::Circle { center, radius } => {
            if !radius.is_finite() || *radius <= 0.0 {
                return Err(ConfigError::IllegalBounds(format!(
                    "circle radius must be positive and finite, got {radius}"
                )));
            }
            if center.iter().any(|c| !c.is_finite()) {
                return Err(ConfigError::IllegalBounds("circle center is not finite".into()));
            }
        }
        AoBounds::Rectangle { min, max } => {
            if min.iter().chain(max.iter()).any(|c| !c.is_finite()) {
                return Err(ConfigError::IllegalBounds("rectangle corner is not finite".into()));
            }
            if min[0] >= max[0] || min[1] >= max[1] {
                return Err(ConfigError::IllegalBounds(format!(
                    "rectangle min {min:?} must be strictly below max {max:?}"
                )));
            }
        }
    }
    Ok(())
}

fn emit_warnings(config: &EngineConfig) {
    if config.ai.min_interval < 0.0 {
        warn!(
            min_interval = config.ai.min_interval,
            "ai.min_interval is negative, treating as 0 (every snapshot may trigger a call)"
        );
    }
    if config.ai.rate_limit_rpm == 0 {
        warn!("ai.rate_limit_rpm is 0, the transport window will block every call");
    }
    if !config.safety.sandbox_enabled {
        warn!("safety.sandbox_enabled is false — LLM orders reach the queue unvalidated");
    }
    for blocked in &config.safety.blocked_commands {
        if config.safety.allowed_commands.contains(blocked) {
            warn!(command = %blocked, "command is both allowed and blocked; block wins");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssetPoolSpec;

    fn base_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.ai.api_key = Some("test-key".to_string());
        config
    }

    #[test]
    fn accepts_default_config_with_key() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn rejects_enabled_ai_without_key() {
        let mut config = base_config();
        config.ai.api_key = None;
        // Point at a provider whose env var is certainly unset
        std::env::remove_var(config.ai.provider.env_key_var());
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingApiKey(_, _))
        ));
    }

    #[test]
    fn disabled_ai_needs_no_key() {
        let mut config = base_config();
        config.ai.api_key = None;
        config.ai.enabled = false;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn local_provider_needs_endpoint_not_key() {
        let mut config = base_config();
        config.ai.provider = ProviderKind::Local;
        config.ai.api_key = None;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingEndpoint(_))
        ));
        config.ai.endpoint = Some("http://127.0.0.1:8000/v1".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_degenerate_bounds() {
        let mut config = base_config();
        config.guardrails.ao_bounds = Some(AoBounds::Circle {
            center: [5000.0, 5000.0],
            radius: 0.0,
        });
        assert!(matches!(validate(&config), Err(ConfigError::IllegalBounds(_))));

        config.guardrails.ao_bounds = Some(AoBounds::Rectangle {
            min: [100.0, 100.0],
            max: [100.0, 500.0],
        });
        assert!(matches!(validate(&config), Err(ConfigError::IllegalBounds(_))));
    }

    #[test]
    fn rejects_pool_without_classnames() {
        let mut config = base_config();
        config.guardrails.resource_pool.insert(
            "EAST".to_string(),
            [(
                "infantry_squad".to_string(),
                AssetPoolSpec {
                    classnames: vec![],
                    max: 2,
                    defense_only: false,
                    description: None,
                },
            )]
            .into_iter()
            .collect(),
        );
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MalformedResourcePool(_))
        ));
    }

    #[test]
    fn pool_max_zero_is_legal() {
        let mut config = base_config();
        config.guardrails.resource_pool.insert(
            "EAST".to_string(),
            [(
                "armor_platoon".to_string(),
                AssetPoolSpec {
                    classnames: vec!["TANK_A".to_string()],
                    max: 0,
                    defense_only: false,
                    description: None,
                },
            )]
            .into_iter()
            .collect(),
        );
        assert!(validate(&config).is_ok());
    }
}
