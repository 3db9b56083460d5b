//! Commander orchestrator.
//!
//! Drives the per-snapshot sequence: accumulate state, evaluate objectives,
//! decide whether this tick is worth an LLM call, and if so run the full
//! consult → parse → validate → enqueue → record pipeline. Pacing is
//! interval-gated and trigger-gated; a quiet battlefield costs nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::evaluator;
use crate::llm::prompt::{self, PromptInputs};
use crate::llm::{ProviderError, ProviderSession};
use crate::orders::{parse_reply, ResourcePool, Sandbox, SandboxInputs};
use crate::queue::CommandQueue;
use crate::state::AoStateManager;
use crate::telemetry::{ApiCallLog, TokenTracker};
use crate::types::{Command, DecisionCycle, ObjectiveEval, Side, Snapshot};

/// Outcome of one snapshot ingestion.
#[derive(Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Predicate said no; nothing was consulted or recorded
    Skipped(&'static str),
    /// LLM consulted; counts of accepted and rejected orders
    Decided { accepted: usize, rejected: usize },
    /// LLM consulted and the call or reply failed; cycle recorded with a note
    Failed(String),
}

/// Mutable collaborators for one tick, owned by the engine.
pub struct CycleDeps<'a> {
    pub state: &'a mut AoStateManager,
    pub telemetry: &'a mut TokenTracker,
    pub api_log: &'a mut Option<ApiCallLog>,
    pub pool: &'a mut ResourcePool,
    pub config: &'a EngineConfig,
}

pub struct Commander {
    session: Option<ProviderSession>,
    sandbox: Sandbox,
    queue: CommandQueue,

    deployed: bool,
    min_interval: f64,
    last_decision_mission_time: Option<f64>,

    /// Trigger memory: set when something decision-worthy happens, cleared
    /// after a decision goes out
    pending_trigger: bool,
    last_objectives_fingerprint: Option<u64>,
    groups_in_combat: BTreeSet<String>,
    /// group → cycle of its last issued command, for completion detection
    outstanding: BTreeMap<String, u64>,

    /// Admin-configured sides, stamped onto snapshots that omit them
    controlled_sides: BTreeSet<Side>,
    friendly_sides: BTreeSet<Side>,
    /// Optional restriction of which controlled groups may be ordered
    control_group_filter: Option<BTreeSet<String>>,

    engine_start: Instant,
}

impl Commander {
    pub fn new(session: Option<ProviderSession>, config: &EngineConfig) -> Self {
        Self {
            session,
            sandbox: Sandbox::new(),
            queue: CommandQueue::new(config.runtime.max_commands_per_tick),
            deployed: false,
            min_interval: config.ai.min_interval.max(0.0),
            last_decision_mission_time: None,
            pending_trigger: false,
            last_objectives_fingerprint: None,
            groups_in_combat: BTreeSet::new(),
            outstanding: BTreeMap::new(),
            controlled_sides: BTreeSet::new(),
            friendly_sides: BTreeSet::new(),
            control_group_filter: None,
            engine_start: Instant::now(),
        }
    }

    // ------------------------------------------------------------------
    // Admin surface
    // ------------------------------------------------------------------

    pub fn set_deployed(&mut self, deployed: bool) {
        if deployed {
            if !self.deployed {
                info!("commander deployed");
            }
            // Deploying is the explicit breaker reset path: an open breaker
            // moves to HalfOpen and the next snapshot probes
            if let Some(session) = self.session.as_mut() {
                session.redeploy();
            }
        } else if self.deployed {
            info!("commander stood down");
        }
        self.deployed = deployed;
    }

    pub fn deployed(&self) -> bool {
        self.deployed
    }

    pub fn set_controlled_sides(&mut self, sides: BTreeSet<Side>) {
        self.controlled_sides = sides;
        self.pending_trigger = true;
    }

    pub fn controlled_sides(&self) -> &BTreeSet<Side> {
        &self.controlled_sides
    }

    pub fn set_friendly_sides(&mut self, sides: BTreeSet<Side>) {
        self.friendly_sides = sides;
    }

    pub fn set_control_group_filter(&mut self, groups: Option<BTreeSet<String>>) {
        self.control_group_filter = groups;
    }

    pub fn set_min_interval(&mut self, seconds: f64) {
        self.min_interval = seconds.max(0.0);
        if let Some(session) = self.session.as_mut() {
            session.set_min_interval(self.min_interval);
        }
    }

    pub fn min_interval(&self) -> f64 {
        self.min_interval
    }

    pub fn session_mut(&mut self) -> Option<&mut ProviderSession> {
        self.session.as_mut()
    }

    pub fn session(&self) -> Option<&ProviderSession> {
        self.session.as_ref()
    }

    pub fn replace_session(&mut self, session: Option<ProviderSession>) {
        self.session = session;
    }

    pub fn queue_mut(&mut self) -> &mut CommandQueue {
        &mut self.queue
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Emergency stop: cancel in-flight work, open the breaker, drop cache
    /// handles, wipe the queue. The engine clears state history separately.
    pub fn emergency_stop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.emergency_stop();
        }
        self.queue.clear();
        self.outstanding.clear();
        self.pending_trigger = false;
    }

    /// Monotonic milliseconds since engine start.
    pub fn timestamp_ms(&self) -> u64 {
        self.engine_start.elapsed().as_millis() as u64
    }

    // ------------------------------------------------------------------
    // Per-snapshot flow
    // ------------------------------------------------------------------

    /// Ingest one normalized snapshot.
    pub async fn handle_snapshot(
        &mut self,
        mut snapshot: Snapshot,
        deps: CycleDeps<'_>,
    ) -> TickOutcome {
        // Admin-configured sides win over whatever the payload carried
        if !self.controlled_sides.is_empty() {
            snapshot.controlled_sides = self.controlled_sides.clone();
        }
        if !self.friendly_sides.is_empty() {
            snapshot.friendly_sides = self.friendly_sides.clone();
        }

        deps.state.observe_snapshot(&snapshot);

        let objectives = deps.state.active_objectives();
        let evals = evaluator::evaluate(&snapshot, &objectives);
        deps.state.update_postures(&evals);

        self.absorb_triggers(&snapshot, &evals);

        if !deps.config.ai.enabled {
            return TickOutcome::Skipped("ai disabled");
        }
        if !self.deployed {
            return TickOutcome::Skipped("commander not deployed");
        }
        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Skipped("no provider configured");
        };
        if !session.breaker().allows_call() {
            debug!("breaker open, decision skipped");
            return TickOutcome::Skipped("breaker open");
        }

        let half_open_probe =
            session.breaker_state() == crate::llm::CircuitState::HalfOpen;
        let interval_ok = self
            .last_decision_mission_time
            .map_or(true, |last| snapshot.mission_time - last >= self.min_interval);
        let trigger = self.pending_trigger || self.min_interval == 0.0;

        if !(half_open_probe || (interval_ok && trigger)) {
            let reason = if interval_ok { "no trigger" } else { "inside min interval" };
            return TickOutcome::Skipped(reason);
        }

        self.run_decision_cycle(snapshot, evals, objectives, deps).await
    }

    /// Observe trigger conditions on every tick, decided or not.
    fn absorb_triggers(&mut self, snapshot: &Snapshot, evals: &[ObjectiveEval]) {
        // Objective set or posture changed
        let fingerprint = objectives_fingerprint(evals);
        match self.last_objectives_fingerprint {
            Some(last) if last == fingerprint => {}
            Some(_) => {
                debug!("objectives changed since last decision");
                self.pending_trigger = true;
            }
            None if !evals.is_empty() => {
                self.pending_trigger = true;
            }
            None => {}
        }
        self.last_objectives_fingerprint = Some(fingerprint);

        // Newly reported engagements
        let now_in_combat: BTreeSet<String> = snapshot
            .groups
            .iter()
            .filter(|g| g.in_combat)
            .map(|g| g.id.clone())
            .collect();
        if now_in_combat.difference(&self.groups_in_combat).next().is_some()
            || !snapshot.casualty_events.is_empty()
        {
            debug!("new engagement reported");
            self.pending_trigger = true;
        }
        self.groups_in_combat = now_in_combat;

        // Completion of previously issued commands: the group went quiet
        // with no waypoint left
        let completed: Vec<String> = self
            .outstanding
            .keys()
            .filter(|group_id| {
                snapshot
                    .group(group_id)
                    .map(|g| g.waypoint_position.is_none() && !g.in_combat)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        for group_id in completed {
            debug!(group = %group_id, "issued command reported complete");
            self.outstanding.remove(&group_id);
            self.pending_trigger = true;
        }
    }

    async fn run_decision_cycle(
        &mut self,
        snapshot: Snapshot,
        evals: Vec<ObjectiveEval>,
        objectives: Vec<crate::types::Objective>,
        deps: CycleDeps<'_>,
    ) -> TickOutcome {
        let intent_override = deps.state.mission_intent().to_string();
        let mission_intent = if intent_override.is_empty() {
            snapshot.mission_intent.clone()
        } else {
            intent_override
        };

        let history = deps.state.history().to_vec();
        let previous_aos = deps.state.retained_aos();
        let inputs = PromptInputs {
            snapshot: &snapshot,
            evals: &evals,
            objectives: &objectives,
            history: &history,
            previous_aos: &previous_aos,
            guardrails: &deps.config.guardrails,
            safety: &deps.config.safety,
            pool_remaining: deps.pool.remaining_summary(),
            controlled_sides: &snapshot.controlled_sides,
            friendly_sides: &snapshot.friendly_sides,
            mission_intent: &mission_intent,
        };
        let context = prompt::build_context(&inputs, &deps.config.ai);

        let cycle_number = deps.state.next_cycle_number();
        let session = match self.session.as_mut() {
            Some(session) => session,
            None => return TickOutcome::Skipped("no provider configured"),
        };

        let reply = match session.generate_orders(&context).await {
            Ok(reply) => reply,
            Err(ProviderError::BreakerOpen) => {
                return TickOutcome::Skipped("breaker open");
            }
            Err(e) => {
                warn!(error = %e, cycle = cycle_number, "decision call failed");
                deps.state.record_cycle(DecisionCycle {
                    cycle_number,
                    mission_time: snapshot.mission_time,
                    wall_time: Utc::now(),
                    commentary: String::new(),
                    orders: vec![],
                    rejected: vec![],
                    active_objectives: evals,
                    failure_note: Some(format!("provider failure: {e}")),
                });
                return TickOutcome::Failed(e.to_string());
            }
        };

        // Bookkeeping that happens whether or not the reply parses
        self.last_decision_mission_time = Some(snapshot.mission_time);
        self.pending_trigger = false;
        deps.telemetry.record(&reply.usage);
        if let Some(api_log) = deps.api_log.as_mut() {
            let request_json = serde_json::json!({
                "system": context.system_prompt,
                "standing": context.standing_block,
                "dynamic": context.dynamic_block,
            })
            .to_string();
            api_log.append_block(
                cycle_number,
                snapshot.mission_time,
                &reply.usage,
                &request_json,
                &reply.text,
            );
        }

        let parsed = parse_reply(&reply.text);

        let sandbox_inputs = SandboxInputs {
            snapshot: &snapshot,
            bounds: deps.config.guardrails.ao_bounds.as_ref(),
            safety: &deps.config.safety,
            control_filter: self.control_group_filter.as_ref(),
            cycle: cycle_number,
            timestamp_ms: self.timestamp_ms(),
        };
        let (accepted, rejected) =
            self.sandbox
                .validate_batch(&parsed.orders, &sandbox_inputs, deps.pool);

        for command in &accepted {
            if !command.group_id.is_empty() {
                self.outstanding.insert(command.group_id.clone(), cycle_number);
            }
            self.queue.enqueue(command.clone());
        }

        let mut commentary = parsed.reasoning.clone();
        match reply.thoughts.as_deref() {
            Some(thoughts) if deps.config.ai.log_thoughts_to_file => {
                deps.state.log_thoughts(cycle_number, thoughts);
            }
            Some(thoughts) if deps.config.ai.include_thoughts => {
                commentary = format!("{commentary}\n\n[thoughts]\n{thoughts}");
            }
            _ => {}
        }

        let accepted_count = accepted.len();
        let rejected_count = rejected.len();
        deps.state.record_cycle(DecisionCycle {
            cycle_number,
            mission_time: snapshot.mission_time,
            wall_time: Utc::now(),
            commentary,
            orders: accepted,
            rejected,
            active_objectives: evals,
            failure_note: parsed.error,
        });

        info!(
            cycle = cycle_number,
            accepted = accepted_count,
            rejected = rejected_count,
            queue = self.queue.len(),
            "decision cycle complete"
        );
        TickOutcome::Decided {
            accepted: accepted_count,
            rejected: rejected_count,
        }
    }

    /// Drain for the host, honoring the per-tick cap.
    pub fn drain_commands(&mut self, max_commands_per_tick: usize) -> Vec<Command> {
        self.queue.drain(max_commands_per_tick)
    }
}

/// Order-insensitive fingerprint of objective IDs and postures.
fn objectives_fingerprint(evals: &[ObjectiveEval]) -> u64 {
    let mut keys: Vec<(&str, &str)> = evals
        .iter()
        .map(|e| (e.objective_id.as_str(), e.posture.as_str()))
        .collect();
    keys.sort_unstable();
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    keys.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::llm::context::DecisionContext;
    use crate::llm::provider::{ConnectionProbe, GeneratedReply, LlmProvider, ProviderKind};
    use crate::orders::resource_pool::ResourcePool;
    use crate::types::{
        AoBounds, Group, GroupDetail, Objective, Position, TacticalClass, TokenUsage,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Scripted {
        replies: VecDeque<Result<String, ProviderError>>,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl LlmProvider for Scripted {
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.pop_front() {
                Some(Ok(text)) => Ok(GeneratedReply {
                    text,
                    thoughts: None,
                    usage: TokenUsage {
                        input_tokens: 100,
                        output_tokens: 20,
                        cached_input_tokens: 0,
                        total_tokens: 120,
                        latency_ms: 10,
                        provider: ProviderKind::Local,
                        model: "scripted".into(),
                    },
                }),
                Some(Err(e)) => Err(e),
                None => Ok(GeneratedReply {
                    text: "{\"reasoning\":\"hold\",\"orders\":[]}".into(),
                    thoughts: None,
                    usage: TokenUsage {
                        input_tokens: 100,
                        output_tokens: 5,
                        cached_input_tokens: 0,
                        total_tokens: 105,
                        latency_ms: 10,
                        provider: ProviderKind::Local,
                        model: "scripted".into(),
                    },
                }),
            }
        }
        async fn test_connection(&mut self) -> Result<ConnectionProbe, ProviderError> {
            Ok(ConnectionProbe {
                provider: ProviderKind::Local,
                model: "scripted".into(),
                greeting: "hello".into(),
            })
        }
    }

    struct Harness {
        commander: Commander,
        state: AoStateManager,
        telemetry: TokenTracker,
        api_log: Option<ApiCallLog>,
        pool: ResourcePool,
        config: EngineConfig,
        calls: Arc<AtomicU32>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = EngineConfig::default();
            config.ai.min_interval = 30.0;
            config.ai.rate_limit_rpm = 1000;
            config.guardrails.ao_bounds = Some(AoBounds::Circle {
                center: [5000.0, 5000.0],
                radius: 1500.0,
            });

            let calls = Arc::new(AtomicU32::new(0));
            let provider = Scripted {
                replies: replies.into(),
                calls: calls.clone(),
            };
            let session = ProviderSession::new(Box::new(provider), &config.ai);
            let mut commander = Commander::new(Some(session), &config);
            commander.set_deployed(true);
            commander.set_controlled_sides(BTreeSet::from([Side::East]));
            commander.set_friendly_sides(BTreeSet::from([Side::East]));

            let mut state = AoStateManager::new(dir.path().to_path_buf(), 600.0);
            state
                .start_ao("AO-1".into(), "Altis".into(), "anvil".into())
                .unwrap();

            Self {
                commander,
                state,
                telemetry: TokenTracker::new(),
                api_log: None,
                pool: ResourcePool::default(),
                config,
                calls,
                _dir: dir,
            }
        }

        async fn tick(&mut self, snapshot: Snapshot) -> TickOutcome {
            self.commander
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
                .await
        }
    }

    fn group(id: &str, side: Side, count: u32, x: f64, y: f64) -> Group {
        Group {
            id: id.to_string(),
            side,
            class: TacticalClass::Infantry,
            position: Position::new(x, y, 0.0),
            unit_count: count,
            behaviour: String::new(),
            combat_mode: String::new(),
            formation: String::new(),
            in_combat: false,
            waypoint_type: String::new(),
            waypoint_position: None,
            detail: GroupDetail::Controlled { casualties: 0, posture: String::new() },
        }
    }

    fn objective() -> Objective {
        Objective {
            id: "obj_alpha".to_string(),
            description: "Hold the crossroads".to_string(),
            priority: 10.0,
            position: Position::new(5000.0, 5000.0, 0.0),
            radius: 200.0,
            task_type: "defend_area".to_string(),
            state: Default::default(),
            metadata: Default::default(),
        }
    }

    fn snapshot(mission_time: f64, groups: Vec<Group>) -> Snapshot {
        Snapshot {
            mission_time,
            groups,
            objectives: vec![objective()],
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn secured_objective_inside_interval_skips_llm() {
        let mut h = Harness::new(vec![]);
        // First tick decides (first objective sighting is a trigger)
        let first = h
            .tick(snapshot(0.0, vec![group("G1", Side::East, 8, 5050.0, 5050.0)]))
            .await;
        assert!(matches!(first, TickOutcome::Decided { .. }));

        // Ten seconds later, same picture: inside min_interval, no call
        let second = h
            .tick(snapshot(10.0, vec![group("G1", Side::East, 8, 5050.0, 5050.0)]))
            .await;
        assert_eq!(second, TickOutcome::Skipped("inside min interval"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        assert!(h.commander.drain_commands(30).is_empty());
        assert_eq!(h.state.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_picture_after_interval_has_no_trigger() {
        let mut h = Harness::new(vec![]);
        h.tick(snapshot(0.0, vec![group("G1", Side::East, 8, 5050.0, 5050.0)]))
            .await;
        // Interval elapsed but nothing changed
        let outcome = h
            .tick(snapshot(60.0, vec![group("G1", Side::East, 8, 5050.0, 5050.0)]))
            .await;
        assert_eq!(outcome, TickOutcome::Skipped("no trigger"));
    }

    #[tokio::test(start_paused = true)]
    async fn threat_triggers_defend_area_order() {
        let defend_reply = serde_json::json!({
            "reasoning": "Enemy column closing on the crossroads, digging in.",
            "orders": [{
                "type": "defend_area",
                "group_id": "GRP_EAST_1",
                "parameters": {"position": [5000.0, 5000.0, 0.0], "radius": 150.0},
                "priority": 9
            }]
        })
        .to_string();
        let mut h = Harness::new(vec![Ok(reply_empty()), Ok(defend_reply)]);

        // Calm opening picture consumes the first scripted reply
        h.tick(snapshot(0.0, vec![group("GRP_EAST_1", Side::East, 8, 5050.0, 5050.0)]))
            .await;

        // Threat appears after the interval: posture change triggers a call
        let mut groups = vec![group("GRP_EAST_1", Side::East, 8, 5050.0, 5050.0)];
        for i in 0..3 {
            groups.push(group(&format!("W{i}"), Side::West, 6, 5100.0, 5000.0));
        }
        let outcome = h.tick(snapshot(45.0, groups)).await;
        assert_eq!(outcome, TickOutcome::Decided { accepted: 1, rejected: 0 });

        let drained = h.commander.drain_commands(30);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].priority, 9);
        assert_eq!(drained[0].group_id, "GRP_EAST_1");
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_bounds_order_recorded_as_rejection() {
        let reply = serde_json::json!({
            "reasoning": "Push far east.",
            "orders": [{
                "type": "move_to",
                "group_id": "GRP_EAST_1",
                "parameters": {"position": [20000.0, 20000.0, 0.0]}
            }]
        })
        .to_string();
        let mut h = Harness::new(vec![Ok(reply)]);
        let outcome = h
            .tick(snapshot(0.0, vec![group("GRP_EAST_1", Side::East, 8, 5050.0, 5050.0)]))
            .await;
        assert_eq!(outcome, TickOutcome::Decided { accepted: 0, rejected: 1 });
        assert!(h.commander.drain_commands(30).is_empty());

        let cycle = &h.state.history()[0];
        assert_eq!(cycle.rejected.len(), 1);
        assert_eq!(cycle.rejected[0].kind, "out_of_bounds");
    }

    #[tokio::test(start_paused = true)]
    async fn min_interval_zero_calls_every_snapshot() {
        let mut h = Harness::new(vec![]);
        h.commander.set_min_interval(0.0);
        for t in 0..4 {
            let outcome = h
                .tick(snapshot(t as f64, vec![group("G1", Side::East, 8, 5050.0, 5050.0)]))
                .await;
            assert!(matches!(outcome, TickOutcome::Decided { .. }), "tick {t}: {outcome:?}");
        }
        assert_eq!(h.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_open_skips_without_recording() {
        let mut h = Harness::new(vec![
            Err(ProviderError::AuthFailure),
            Err(ProviderError::AuthFailure),
            Err(ProviderError::AuthFailure),
        ]);
        h.commander.set_min_interval(0.0);

        for t in 0..3 {
            let outcome = h
                .tick(snapshot(t as f64, vec![group("G1", Side::East, 8, 5050.0, 5050.0)]))
                .await;
            assert!(matches!(outcome, TickOutcome::Failed(_)));
        }
        assert_eq!(h.commander.session().unwrap().consecutive_failures(), 3);

        // Breaker now open: ingestion continues, provider untouched
        let before = h.calls.load(Ordering::SeqCst);
        for t in 3..6 {
            let outcome = h
                .tick(snapshot(t as f64, vec![group("G1", Side::East, 8, 5050.0, 5050.0)]))
                .await;
            assert_eq!(outcome, TickOutcome::Skipped("breaker open"));
        }
        assert_eq!(h.calls.load(Ordering::SeqCst), before);
        assert_eq!(h.commander.session().unwrap().consecutive_failures(), 3);

        // Failed cycles were recorded; skipped ones were not
        assert_eq!(h.state.history().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn parse_failure_records_cycle_with_note() {
        let mut h = Harness::new(vec![Ok("the dog ate my orders".to_string())]);
        let outcome = h
            .tick(snapshot(0.0, vec![group("G1", Side::East, 8, 5050.0, 5050.0)]))
            .await;
        assert_eq!(outcome, TickOutcome::Decided { accepted: 0, rejected: 0 });
        let cycle = &h.state.history()[0];
        assert!(cycle.failure_note.is_some());
        assert!(cycle.orders.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn not_deployed_never_calls() {
        let mut h = Harness::new(vec![]);
        h.commander.set_deployed(false);
        let outcome = h
            .tick(snapshot(0.0, vec![group("G1", Side::East, 8, 5050.0, 5050.0)]))
            .await;
        assert_eq!(outcome, TickOutcome::Skipped("commander not deployed"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        // State still accumulated
        assert_eq!(h.state.active_objectives().len(), 1);
    }

    fn reply_empty() -> String {
        "{\"reasoning\":\"hold\",\"orders\":[]}".to_string()
    }
}
