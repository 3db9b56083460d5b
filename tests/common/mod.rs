//! Shared harness for integration tests: a scripted provider session and
//! raw pair-list payload builders standing in for the host simulator.

use std::collections::VecDeque;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use batcom::config::EngineConfig;
use batcom::llm::context::DecisionContext;
use batcom::llm::{
    ConnectionProbe, GeneratedReply, LlmProvider, ProviderError, ProviderKind, ProviderSession,
};
use batcom::types::TokenUsage;
use batcom::EngineState;

/// Backend that pops one canned outcome per call and counts invocations.
pub struct ScriptedProvider {
    replies: VecDeque<Result<String, ProviderError>>,
    pub calls: Arc<AtomicU32>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                replies: replies.into(),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate_orders(
        &mut self,
        _context: &DecisionContext,
    ) -> Result<GeneratedReply, ProviderError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let outcome = self
            .replies
            .pop_front()
            .unwrap_or_else(|| Ok(r#"{"reasoning":"hold","orders":[]}"#.to_string()));
        outcome.map(|text| GeneratedReply {
            text,
            thoughts: None,
            usage: TokenUsage {
                input_tokens: 4300,
                output_tokens: 200,
                cached_input_tokens: 2800,
                total_tokens: 4500,
                latency_ms: 25,
                provider: ProviderKind::Local,
                model: "scripted".to_string(),
            },
        })
    }

    async fn test_connection(&mut self) -> Result<ConnectionProbe, ProviderError> {
        Ok(ConnectionProbe {
            provider: ProviderKind::Local,
            model: "scripted".to_string(),
            greeting: "scripted backend ready".to_string(),
        })
    }
}

/// Engine config the tests run under: circle AO, EAST pool, fast pacing.
pub fn test_config() -> EngineConfig {
    let toml = r#"
        [ai]
        provider = "local"
        endpoint = "http://127.0.0.1:9/v1"
        model = "scripted"
        min_interval = 0.0
        rate_limit_rpm = 10000

        [guardrails.ao_bounds]
        shape = "circle"
        center = [5000.0, 5000.0]
        radius = 1500.0

        [guardrails.resource_pool.EAST.infantry_squad]
        classnames = ["RIFLE_SQUAD", "WEAPONS_SQUAD"]
        max = 2
    "#;
    toml::from_str(toml).expect("test config parses")
}

/// Initialized, deployed engine with a scripted provider swapped in.
pub fn scripted_engine(
    replies: Vec<Result<String, ProviderError>>,
    log_dir: &std::path::Path,
) -> (EngineState, Arc<AtomicU32>) {
    let config = test_config();
    let mut engine =
        EngineState::init(config.clone(), log_dir.to_path_buf()).expect("engine init");

    let (provider, calls) = ScriptedProvider::new(replies);
    let session = ProviderSession::new(Box::new(provider), &config.ai);
    engine.commander_mut().replace_session(Some(session));

    engine
        .admin_command("commanderSides", &json!([["sides", ["EAST"]]]))
        .expect("set sides");
    engine
        .admin_command("commanderAllies", &json!([["sides", ["EAST"]]]))
        .expect("set allies");
    engine
        .admin_command("deployCommander", &json!([["flag", true]]))
        .expect("deploy");
    engine
        .admin_command(
            "commanderStartAO",
            &json!([
                ["ao_id", "AO-TEST"],
                ["world_name", "Altis"],
                ["mission_name", "op_anvil"]
            ]),
        )
        .expect("start AO");
    (engine, calls)
}

/// Raw bridge payload: one controlled EAST group per entry in `groups`,
/// plus optional WEST hostiles, around one defend objective.
pub fn snapshot_payload(mission_time: f64, east_groups: &[&str], west_groups: &[&str]) -> Value {
    let mut groups = Vec::new();
    for id in east_groups {
        groups.push(json!([
            ["id", id],
            ["side", "EAST"],
            ["class", "infantry"],
            ["position", [5050.0, 5050.0, 0.0]],
            ["unit_count", 8],
            ["is_controlled", true],
            ["casualties", 0],
            ["posture", "AWARE/YELLOW/WEDGE"]
        ]));
    }
    for id in west_groups {
        groups.push(json!([
            ["id", id],
            ["side", "WEST"],
            ["class", "infantry"],
            ["position", [5100.0, 5000.0, 0.0]],
            ["unit_count", 6],
            ["is_controlled", false],
            ["is_friendly", false],
            ["knowledge", 3.0]
        ]));
    }

    json!([
        ["mission_time", mission_time],
        ["daytime", 0.5],
        ["weather", [0.1, 0.0, 0.0, 2.0]],
        ["world_name", "Altis"],
        ["mission_name", "op_anvil"],
        ["unit_counts", [["EAST", east_groups.len() as u64 * 8], ["WEST", west_groups.len() as u64 * 6]]],
        ["groups", groups],
        ["objectives", [[
            ["id", "obj_alpha"],
            ["description", "Hold the crossroads"],
            ["priority", 10],
            ["position", [5000.0, 5000.0, 0.0]],
            ["radius", 200.0],
            ["task_type", "defend_area"]
        ]]],
        ["mission_intent", "Hold the east ridge"]
    ])
}

/// A reply issuing one `move_to` per listed group.
pub fn move_orders_reply(group_ids: &[&str]) -> String {
    let orders: Vec<Value> = group_ids
        .iter()
        .map(|id| {
            json!({
                "type": "move_to",
                "group_id": id,
                "parameters": {"position": [5200.0, 4900.0, 0.0]},
                "priority": 6
            })
        })
        .collect();
    json!({"reasoning": "reposition", "orders": orders}).to_string()
}
