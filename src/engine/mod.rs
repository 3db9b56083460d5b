//! Engine state and lifecycle.
//!
//! One `EngineState` value owns every subsystem; there are no globals. The
//! lifecycle is explicit: `init` builds it, `shutdown` consumes it. Every
//! host-facing operation is a method here, and the RPC layer serializes
//! calls so snapshot ingestion and admin mutations never interleave.

mod admin;

use std::path::PathBuf;

use serde_json::Value;
use tracing::{info, warn};

use crate::bridge::{self, BadSnapshot};
use crate::commander::{Commander, CycleDeps, TickOutcome};
use crate::config::{self, ConfigError, EngineConfig};
use crate::llm::{build_provider, ConnectionProbe, ProviderError, ProviderSession};
use crate::orders::ResourcePool;
use crate::state::{AoStateManager, StateError};
use crate::telemetry::{append_stats_jsonl, ApiCallLog, TokenTracker};
use crate::types::{AnalysisData, Command, TokenStats};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine-level failures surfaced through the RPC error envelope.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    State(#[from] StateError),
    #[error("bad snapshot: {0}")]
    Snapshot(String),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("engine is not initialized")]
    NotInitialized,
}

impl From<BadSnapshot> for EngineError {
    fn from(e: BadSnapshot) -> Self {
        EngineError::Snapshot(e.0)
    }
}

pub struct EngineState {
    config: EngineConfig,
    commander: Commander,
    state: AoStateManager,
    telemetry: TokenTracker,
    api_log: Option<ApiCallLog>,
    pool: ResourcePool,
    /// In-session admin key override, first in the resolution order
    admin_api_key: Option<String>,
    log_dir: PathBuf,
}

impl EngineState {
    /// Build the engine from a validated config. Fatal config problems are
    /// returned before any state exists.
    pub fn init(config: EngineConfig, log_dir: PathBuf) -> Result<Self, EngineError> {
        config::validate(&config)?;
        let pool = ResourcePool::from_config(&config.guardrails).map_err(EngineError::BadRequest)?;

        let session = build_session(&config, None);
        let commander = Commander::new(session, &config);
        let state = AoStateManager::new(log_dir.clone(), config.scan.ai_groups.max(1.0));

        info!(
            version = ENGINE_VERSION,
            provider = %config.ai.provider,
            model = %config.ai.model,
            ai_enabled = config.ai.enabled,
            "engine initialized"
        );
        Ok(Self {
            config,
            commander,
            state,
            telemetry: TokenTracker::new(),
            api_log: None,
            pool,
            admin_api_key: None,
            log_dir,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Direct commander access for embedders and harnesses (e.g. swapping
    /// in a scripted provider session).
    pub fn commander_mut(&mut self) -> &mut Commander {
        &mut self.commander
    }

    pub fn state(&self) -> &AoStateManager {
        &self.state
    }

    /// Seal any open AO and close log files. The analysis artifact of an
    /// implicitly sealed AO is discarded.
    pub fn shutdown(mut self) {
        if self.state.phase() == crate::state::AoPhase::Running {
            warn!("shutdown with a running AO, sealing it");
            let controlled = self.controlled_sides();
            let _ = self.state.end_ao(&controlled);
        }
        if let Some(log) = self.api_log.take() {
            log.close();
        }
        info!("engine shut down");
    }

    fn controlled_sides(&self) -> std::collections::BTreeSet<crate::types::Side> {
        self.commander.controlled_sides().clone()
    }

    // ------------------------------------------------------------------
    // RPC operations
    // ------------------------------------------------------------------

    /// `world_snapshot`: normalize and run the decision pipeline.
    pub async fn world_snapshot(&mut self, raw: &Value) -> Result<TickOutcome, EngineError> {
        let snapshot = bridge::ingest(raw)?;
        let outcome = self
            .commander
            .handle_snapshot(
                snapshot,
                CycleDeps {
                    state: &mut self.state,
                    telemetry: &mut self.telemetry,
                    api_log: &mut self.api_log,
                    pool: &mut self.pool,
                    config: &self.config,
                },
            )
            .await;
        Ok(outcome)
    }

    /// `get_pending_commands`: drain up to the per-tick cap.
    pub fn get_pending_commands(&mut self) -> Vec<Command> {
        self.commander
            .drain_commands(self.config.runtime.max_commands_per_tick)
    }

    /// `test_connection`: one guarded probe round-trip.
    pub async fn test_connection(&mut self) -> Result<ConnectionProbe, EngineError> {
        let session = self
            .commander
            .session_mut()
            .ok_or(EngineError::BadRequest("no provider configured".into()))?;
        Ok(session.test_connection().await?)
    }

    /// `get_token_stats`: snapshot the buckets and append the JSONL line.
    pub fn get_token_stats(&mut self) -> TokenStats {
        let breaker = self
            .commander
            .session()
            .map(|s| s.breaker_state().to_string())
            .unwrap_or_else(|| "disabled".to_string());
        let stats = self.telemetry.snapshot(breaker);
        append_stats_jsonl(&self.log_dir.join("token_usage.jsonl"), &stats);
        stats
    }

    /// `commanderStartAO`.
    pub fn start_ao(
        &mut self,
        ao_id: String,
        world_name: String,
        mission_name: String,
    ) -> Result<u32, EngineError> {
        let ao_index = self
            .state
            .start_ao(ao_id, world_name.clone(), mission_name.clone())?;
        self.pool.reset_counts();
        self.api_log = Some(ApiCallLog::open(
            &self.log_dir,
            &world_name,
            &mission_name,
            ao_index,
        ));
        Ok(ao_index)
    }

    /// `commanderEndAO`.
    pub fn end_ao(&mut self) -> Result<AnalysisData, EngineError> {
        let controlled = self.controlled_sides();
        let analysis = self.state.end_ao(&controlled)?;
        if let Some(log) = self.api_log.take() {
            log.close();
        }
        Ok(analysis)
    }

    /// `emergencyStop`: open the breaker, cancel in-flight work, clear
    /// caches, the queue, and the order history.
    pub fn emergency_stop(&mut self) {
        warn!("emergency stop requested by admin");
        self.commander.emergency_stop();
        self.state.clear_history();
    }

    /// Rebuild the provider session after a config or key change.
    fn rebuild_session(&mut self) {
        let session = build_session(&self.config, self.admin_api_key.clone());
        self.commander.replace_session(session);
    }
}

/// Resolve the API key (admin override → config → environment) and build
/// the guarded session. Returns `None` when AI is disabled.
fn build_session(config: &EngineConfig, admin_key: Option<String>) -> Option<ProviderSession> {
    if !config.ai.enabled {
        return None;
    }
    let key = admin_key.or_else(|| config::validation::resolve_api_key(config));
    let provider = build_provider(&config.ai, key);
    Some(ProviderSession::new(provider, &config.ai))
}
