//! RPC handlers.
//!
//! Each handler locks the engine, runs one operation, and wraps the result
//! in a status envelope. Handlers return 200 with an error envelope rather
//! than HTTP error codes — the bridge on the host side only understands the
//! pair-list protocol.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::warn;

use crate::bridge::PairValue;
use crate::commander::TickOutcome;
use crate::config::EngineConfig;
use crate::engine::{EngineError, EngineState, ENGINE_VERSION};

use super::envelope::{envelope_error, envelope_ok};
use super::EngineHandle;

/// POST /rpc/init — build the engine from file config overlaid with the
/// host's record. Re-init of a live engine shuts the old one down first.
pub async fn init(
    State(handle): State<EngineHandle>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut slot = handle.engine.lock().await;
    if let Some(old) = slot.take() {
        warn!("init while already initialized, restarting engine");
        old.shutdown();
    }

    let base = EngineConfig::load();
    let config = match overlay_config(base, &body) {
        Ok(config) => config,
        Err(e) => return Json(envelope_error(e)),
    };

    match EngineState::init(config, handle.log_dir.clone()) {
        Ok(engine) => {
            *slot = Some(engine);
            Json(envelope_ok(json!([["version", ENGINE_VERSION]])))
        }
        Err(e) => Json(envelope_error(e)),
    }
}

/// POST /rpc/shutdown
pub async fn shutdown(State(handle): State<EngineHandle>) -> Json<Value> {
    let mut slot = handle.engine.lock().await;
    match slot.take() {
        Some(engine) => {
            engine.shutdown();
            Json(envelope_ok(Value::Null))
        }
        None => Json(envelope_error(EngineError::NotInitialized)),
    }
}

/// POST /rpc/is_initialized
pub async fn is_initialized(State(handle): State<EngineHandle>) -> Json<Value> {
    let slot = handle.engine.lock().await;
    Json(envelope_ok(json!([["initialized", slot.is_some()]])))
}

/// POST /rpc/world_snapshot — body is the raw snapshot pair tree.
pub async fn world_snapshot(
    State(handle): State<EngineHandle>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut slot = handle.engine.lock().await;
    let Some(engine) = slot.as_mut() else {
        return Json(envelope_error(EngineError::NotInitialized));
    };
    match engine.world_snapshot(&body).await {
        Ok(outcome) => {
            let (decided, detail) = match outcome {
                TickOutcome::Decided { accepted, rejected } => (
                    true,
                    format!("accepted {accepted}, rejected {rejected}"),
                ),
                TickOutcome::Skipped(reason) => (false, reason.to_string()),
                TickOutcome::Failed(reason) => (false, reason),
            };
            Json(envelope_ok(json!([
                ["decided", decided],
                ["detail", detail]
            ])))
        }
        Err(e) => Json(envelope_error(e)),
    }
}

/// POST /rpc/get_pending_commands — drain up to the per-tick cap.
pub async fn get_pending_commands(State(handle): State<EngineHandle>) -> Json<Value> {
    let mut slot = handle.engine.lock().await;
    let Some(engine) = slot.as_mut() else {
        return Json(envelope_error(EngineError::NotInitialized));
    };
    let commands = engine.get_pending_commands();
    match serde_json::to_value(&commands) {
        Ok(body) => Json(envelope_ok(json!([["commands", body]]))),
        Err(e) => Json(envelope_error(e)),
    }
}

/// POST /rpc/admin_command — body: `[["name", ...], ["params", [...]]]`.
pub async fn admin_command(
    State(handle): State<EngineHandle>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let decoded = PairValue::decode(&body);
    let Some(name) = decoded.get("name").and_then(PairValue::as_str).map(str::to_string)
    else {
        return Json(envelope_error("missing \"name\""));
    };
    let params = decoded
        .get("params")
        .map(PairValue::encode)
        .unwrap_or(Value::Array(Vec::new()));

    let mut slot = handle.engine.lock().await;
    let Some(engine) = slot.as_mut() else {
        return Json(envelope_error(EngineError::NotInitialized));
    };
    match engine.admin_command(&name, &params) {
        Ok(payload) => Json(envelope_ok(payload)),
        Err(e) => Json(envelope_error(e)),
    }
}

/// POST /rpc/test_connection
pub async fn test_connection(State(handle): State<EngineHandle>) -> Json<Value> {
    let mut slot = handle.engine.lock().await;
    let Some(engine) = slot.as_mut() else {
        return Json(envelope_error(EngineError::NotInitialized));
    };
    match engine.test_connection().await {
        Ok(probe) => Json(envelope_ok(json!([
            ["model", probe.model],
            ["greeting", probe.greeting]
        ]))),
        Err(e) => Json(envelope_error(e)),
    }
}

/// POST /rpc/get_token_stats
pub async fn get_token_stats(State(handle): State<EngineHandle>) -> Json<Value> {
    let mut slot = handle.engine.lock().await;
    let Some(engine) = slot.as_mut() else {
        return Json(envelope_error(EngineError::NotInitialized));
    };
    let stats = engine.get_token_stats();
    match serde_json::to_value(&stats) {
        Ok(body) => Json(envelope_ok(json!([["stats", body]]))),
        Err(e) => Json(envelope_error(e)),
    }
}

/// Overlay the host's init record (pair list) onto the file-loaded config,
/// section by section.
fn overlay_config(base: EngineConfig, record: &Value) -> Result<EngineConfig, String> {
    let overlay = PairValue::decode(record).to_object_json();
    if !overlay.is_object() {
        // Empty or absent record: keep the file-loaded config
        return Ok(base);
    }
    let mut merged = serde_json::to_value(&base).map_err(|e| e.to_string())?;
    deep_merge(&mut merged, overlay);
    serde_json::from_value(merged).map_err(|e| format!("bad init record: {e}"))
}

fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_replaces_only_named_keys() {
        let base = EngineConfig::default();
        let record = json!([
            ["ai", [["min_interval", 45.0], ["enabled", false]]],
            ["runtime", [["max_commands_per_tick", 10]]]
        ]);
        let merged = overlay_config(base, &record).unwrap();
        assert_eq!(merged.ai.min_interval, 45.0);
        assert!(!merged.ai.enabled);
        assert_eq!(merged.runtime.max_commands_per_tick, 10);
        // Untouched section keeps its default
        assert_eq!(merged.safety.max_units_per_side, 144);
    }

    #[test]
    fn empty_record_is_identity() {
        let base = EngineConfig::default();
        let merged = overlay_config(base.clone(), &json!([])).unwrap();
        assert_eq!(merged.ai.min_interval, base.ai.min_interval);
    }

    #[test]
    fn bad_record_is_an_error() {
        let record = json!([["ai", [["min_interval", "soon"]]]]);
        assert!(overlay_config(EngineConfig::default(), &record).is_err());
    }
}
