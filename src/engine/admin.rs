//! Admin command dispatch.
//!
//! Every `admin_command` RPC lands here. Parameters arrive as a bridge pair
//! list; each handler decodes what it needs, mutates exactly one subsystem,
//! and returns a pair-list payload. Misuse comes back as `BadRequest` or
//! `StateError` — never a partial mutation.

use std::collections::BTreeSet;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use crate::bridge::{pair_list, PairValue};
use crate::config;
use crate::orders::resource_pool::builtin_templates;
use crate::state::HvtWeights;
use crate::types::{
    Objective, ObjectiveState, Position, ProgressEvent, ProgressEventType, Side,
};

use super::{EngineError, EngineState};

impl EngineState {
    /// Dispatch one admin command.
    pub fn admin_command(&mut self, name: &str, params: &Value) -> Result<Value, EngineError> {
        let params = PairValue::decode(params);
        info!(command = name, "admin command");
        match name {
            "commanderBrief" => self.cmd_brief(&params),
            "commanderAllies" => self.cmd_allies(&params),
            "commanderSides" => self.cmd_sides(&params),
            "commanderTask" => self.cmd_task(&params),
            "deployCommander" => self.cmd_deploy(&params),
            "commanderControlGroups" => self.cmd_control_groups(&params),
            "commanderGuardrails" => self.cmd_guardrails(&params),
            "setLLMConfig" => self.cmd_set_llm_config(&params),
            "setLLMApiKey" => self.cmd_set_api_key(&params),
            "commanderStartAO" => self.cmd_start_ao(&params),
            "commanderEndAO" => self.cmd_end_ao(),
            "commanderSetHVT" => self.cmd_set_hvt(&params),
            "aoProgress" => self.cmd_ao_progress(&params),
            "resource_pool_add_asset" => self.cmd_pool_add(&params),
            "resource_pool_remove_asset" => self.cmd_pool_remove(&params),
            "resource_pool_clear_side" => self.cmd_pool_clear(&params),
            "load_resource_template" => self.cmd_load_template(&params),
            "list_resource_templates" => Ok(pair_list([(
                "templates",
                json!(builtin_templates()
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()),
            )])),
            "set_ao_defense_phase" => self.cmd_defense_phase(&params),
            "emergencyStop" => {
                self.emergency_stop();
                Ok(Value::Array(Vec::new()))
            }
            other => Err(EngineError::BadRequest(format!(
                "unknown admin command \"{other}\""
            ))),
        }
    }

    fn cmd_brief(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        // An empty intent is legal: it clears the standing brief
        let intent = params
            .get("intent")
            .and_then(PairValue::as_str)
            .unwrap_or_default()
            .to_string();
        let clear_memory = opt_bool(params, "clear_memory").unwrap_or(false);
        self.state.set_mission_intent(intent, clear_memory);
        Ok(Value::Array(Vec::new()))
    }

    fn cmd_allies(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        let sides = req_sides(params, "sides")?;
        self.commander.set_friendly_sides(sides);
        Ok(Value::Array(Vec::new()))
    }

    fn cmd_sides(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        let sides = req_sides(params, "sides")?;
        self.commander.set_controlled_sides(sides);
        Ok(Value::Array(Vec::new()))
    }

    fn cmd_task(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        let task = params
            .get("task")
            .ok_or_else(|| EngineError::BadRequest("missing \"task\"".into()))?;
        let id = task
            .get("id")
            .and_then(PairValue::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EngineError::BadRequest("task requires an id".into()))?
            .to_string();
        let position = req_position(task, "position")?;
        let radius = task
            .get("radius")
            .and_then(PairValue::as_f64)
            .filter(|r| r.is_finite() && *r > 0.0)
            .ok_or_else(|| EngineError::BadRequest("task requires a positive radius".into()))?;
        let state = match task.get("state").and_then(PairValue::as_str) {
            None => ObjectiveState::Active,
            Some(s) => ObjectiveState::from_str(s)
                .ok_or_else(|| EngineError::BadRequest(format!("unknown objective state \"{s}\"")))?,
        };
        self.state.upsert_objective(Objective {
            id: id.clone(),
            description: task
                .get("description")
                .map(PairValue::to_display_string)
                .unwrap_or_default(),
            priority: task.get("priority").and_then(PairValue::as_f64).unwrap_or(5.0),
            position,
            radius,
            task_type: task
                .get("task_type")
                .map(PairValue::to_display_string)
                .unwrap_or_default(),
            state,
            metadata: Default::default(),
        });
        Ok(pair_list([("objective_id", json!(id))]))
    }

    fn cmd_deploy(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        let flag = params
            .get("flag")
            .and_then(PairValue::as_bool)
            .ok_or_else(|| EngineError::BadRequest("missing \"flag\"".into()))?;
        self.commander.set_deployed(flag);
        Ok(pair_list([("deployed", json!(flag))]))
    }

    fn cmd_control_groups(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        let ids: BTreeSet<String> = params
            .get("group_ids")
            .map(|v| {
                v.items()
                    .iter()
                    .filter_map(PairValue::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let count = ids.len();
        self.commander
            .set_control_group_filter(if ids.is_empty() { None } else { Some(ids) });
        Ok(pair_list([("controlled_groups", json!(count))]))
    }

    fn cmd_guardrails(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        let object = params.to_object_json();
        let patched: crate::config::GuardrailsConfig = serde_json::from_value(object)
            .map_err(|e| EngineError::BadRequest(format!("bad guardrails record: {e}")))?;
        // Validate through the same path as init before applying
        let mut candidate = self.config.clone();
        candidate.guardrails = patched;
        config::validate(&candidate)?;
        let pool = crate::orders::ResourcePool::from_config(&candidate.guardrails)
            .map_err(EngineError::BadRequest)?;
        self.config = candidate;
        self.pool = pool;
        Ok(Value::Array(Vec::new()))
    }

    fn cmd_set_llm_config(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        // Overlay the provided keys on the current [ai] section
        let mut current = serde_json::to_value(&self.config.ai)
            .map_err(|e| EngineError::BadRequest(e.to_string()))?;
        let overlay = params.to_object_json();
        let Value::Object(overlay_map) = overlay else {
            return Err(EngineError::BadRequest("record expected".into()));
        };
        if let Value::Object(current_map) = &mut current {
            for (key, value) in overlay_map {
                current_map.insert(key, value);
            }
        }
        let patched: crate::config::AiConfig = serde_json::from_value(current)
            .map_err(|e| EngineError::BadRequest(format!("bad ai config: {e}")))?;

        let mut candidate = self.config.clone();
        candidate.ai = patched;
        config::validate(&candidate)?;
        self.config = candidate;
        self.commander.set_min_interval(self.config.ai.min_interval);
        self.rebuild_session();
        Ok(pair_list([
            ("provider", json!(self.config.ai.provider.as_str())),
            ("model", json!(self.config.ai.model)),
        ]))
    }

    fn cmd_set_api_key(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        let provider = req_str(params, "provider")?;
        let api_key = req_str(params, "api_key")?;
        let kind = crate::llm::ProviderKind::from_str(&provider)
            .ok_or_else(|| EngineError::BadRequest(format!("unknown provider \"{provider}\"")))?;
        if kind != self.config.ai.provider {
            return Err(EngineError::BadRequest(format!(
                "key is for {kind} but the active provider is {}",
                self.config.ai.provider
            )));
        }
        self.admin_api_key = Some(api_key);
        self.rebuild_session();
        Ok(pair_list([("provider", json!(kind.as_str()))]))
    }

    fn cmd_start_ao(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        let ao_id = req_str(params, "ao_id")?;
        let world_name = req_str(params, "world_name")?;
        let mission_name = req_str(params, "mission_name")?;
        let ao_index = self.start_ao(ao_id, world_name, mission_name)?;
        Ok(pair_list([("ao_index", json!(ao_index))]))
    }

    fn cmd_end_ao(&mut self) -> Result<Value, EngineError> {
        let analysis = self.end_ao()?;
        let body = serde_json::to_value(&analysis)
            .map_err(|e| EngineError::BadRequest(e.to_string()))?;
        Ok(pair_list([("analysis", body)]))
    }

    fn cmd_set_hvt(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        if let Some(uids) = params.get("player_uids") {
            let uids: Vec<String> = uids
                .items()
                .iter()
                .filter_map(PairValue::as_str)
                .map(str::to_string)
                .collect();
            self.state.set_manual_hvt_players(uids);
        }
        if let Some(weights) = params.get("weights") {
            let weights: HvtWeights = serde_json::from_value(weights.to_object_json())
                .map_err(|e| EngineError::BadRequest(format!("bad HVT weights: {e}")))?;
            self.state.set_hvt_weights(weights);
        }
        Ok(Value::Array(Vec::new()))
    }

    fn cmd_ao_progress(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        let event_name = req_str(params, "event_type")?;
        let event_type = ProgressEventType::from_str(&event_name)
            .ok_or_else(|| EngineError::BadRequest(format!("unknown event type \"{event_name}\"")))?;
        let event = ProgressEvent {
            event_type,
            player_uid: req_str(params, "player_uid")?,
            objective_id: opt_str(params, "objective_id"),
            objective_type: opt_str(params, "objective_type"),
            completion_method: opt_str(params, "completion_method"),
            nearby_players: params
                .get("nearby_players")
                .map(|v| {
                    v.items()
                        .iter()
                        .filter_map(PairValue::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            wall_time: Utc::now(),
        };
        self.state.record_progress(event)?;
        Ok(Value::Array(Vec::new()))
    }

    fn cmd_pool_add(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        let side = req_side(params, "side")?;
        let asset_type = req_str(params, "asset_type")?;
        let classnames: Vec<String> = params
            .get("classnames")
            .map(|v| {
                v.items()
                    .iter()
                    .filter_map(PairValue::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if classnames.is_empty() {
            return Err(EngineError::BadRequest(
                "asset requires at least one classname".into(),
            ));
        }
        let max = params
            .get("max")
            .and_then(PairValue::as_u32)
            .ok_or_else(|| EngineError::BadRequest("missing \"max\"".into()))?;
        self.pool.add_asset(
            side,
            asset_type,
            crate::config::AssetPoolSpec {
                classnames,
                max,
                defense_only: opt_bool(params, "defense_only").unwrap_or(false),
                description: opt_str(params, "description"),
            },
        );
        Ok(Value::Array(Vec::new()))
    }

    fn cmd_pool_remove(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        let side = req_side(params, "side")?;
        let asset_type = req_str(params, "asset_type")?;
        let removed = self.pool.remove_asset(side, &asset_type);
        Ok(pair_list([("removed", json!(removed))]))
    }

    fn cmd_pool_clear(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        let side = req_side(params, "side")?;
        self.pool.clear_side(side);
        Ok(Value::Array(Vec::new()))
    }

    fn cmd_load_template(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        let template = req_str(params, "template")?;
        let side = req_side(params, "side")?;
        self.pool
            .load_template(&template, side)
            .map_err(EngineError::BadRequest)?;
        Ok(pair_list([("template", json!(template))]))
    }

    fn cmd_defense_phase(&mut self, params: &PairValue) -> Result<Value, EngineError> {
        let active = params
            .get("active")
            .and_then(PairValue::as_bool)
            .ok_or_else(|| EngineError::BadRequest("missing \"active\"".into()))?;
        self.pool.set_defense_phase(active);
        Ok(pair_list([("active", json!(active))]))
    }
}

// ============================================================================
// Parameter Helpers
// ============================================================================

fn req_str(params: &PairValue, key: &str) -> Result<String, EngineError> {
    params
        .get(key)
        .and_then(PairValue::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| EngineError::BadRequest(format!("missing \"{key}\"")))
}

fn opt_str(params: &PairValue, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(PairValue::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn opt_bool(params: &PairValue, key: &str) -> Option<bool> {
    params.get(key).and_then(PairValue::as_bool)
}

fn req_side(params: &PairValue, key: &str) -> Result<Side, EngineError> {
    let name = req_str(params, key)?;
    Side::from_str(&name)
        .ok_or_else(|| EngineError::BadRequest(format!("unknown side \"{name}\"")))
}

fn req_sides(params: &PairValue, key: &str) -> Result<BTreeSet<Side>, EngineError> {
    let list = params
        .get(key)
        .ok_or_else(|| EngineError::BadRequest(format!("missing \"{key}\"")))?;
    let mut sides = BTreeSet::new();
    for item in list.items() {
        let name = item
            .as_str()
            .ok_or_else(|| EngineError::BadRequest("side is not a string".into()))?;
        sides.insert(
            Side::from_str(name)
                .ok_or_else(|| EngineError::BadRequest(format!("unknown side \"{name}\"")))?,
        );
    }
    Ok(sides)
}

fn req_position(params: &PairValue, key: &str) -> Result<Position, EngineError> {
    let value = params
        .get(key)
        .ok_or_else(|| EngineError::BadRequest(format!("missing \"{key}\"")))?;
    let nums: Vec<f64> = value.items().iter().filter_map(PairValue::as_f64).collect();
    if !(2..=3).contains(&nums.len()) || nums.len() != value.items().len() {
        return Err(EngineError::BadRequest(format!("bad position for \"{key}\"")));
    }
    let position = Position::new(nums[0], nums[1], nums.get(2).copied().unwrap_or(0.0));
    if !position.is_finite() {
        return Err(EngineError::BadRequest(format!("non-finite position for \"{key}\"")));
    }
    Ok(position)
}
