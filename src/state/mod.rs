//! AO-scoped state manager.
//!
//! Owns the `Idle → Running → Ended` lifecycle, the accumulated decision
//! cycles, group identity tracking, casualty and contribution roll-ups, and
//! the HVT designation computed when an AO is sealed. The engine retains the
//! three most recent sealed AOs so the next AO's prompt can be seeded with a
//! "previous AOs" block.

pub mod ao_log;
pub mod hvt;

pub use ao_log::AoLog;
pub use hvt::HvtWeights;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::types::{
    AnalysisData, AoRecord, DecisionCycle, HvtPlayer, Objective, ObjectiveEval, ObjectiveState,
    ProgressEvent, Side, Snapshot, PROXIMITY_BONUS,
};

/// How many sealed AO records stay in memory for cross-AO seeding.
pub const MAX_RETAINED_AOS: usize = 3;

/// AO lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AoPhase {
    Idle,
    Running,
    Ended,
}

/// Admin misuse of the AO lifecycle; returned to the caller, never applied.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("commanderStartAO while an AO is already running")]
    AoAlreadyRunning,
    #[error("no AO is running")]
    NoRunningAo,
}

pub struct AoStateManager {
    phase: AoPhase,
    current: Option<AoRecord>,
    ao_log: Option<AoLog>,
    log_dir: PathBuf,

    /// Objective registry: snapshot-reported plus admin-injected
    objectives: BTreeMap<String, Objective>,
    /// Group ID → first-observed side; an ID never rebinds while live
    group_sides: BTreeMap<String, Side>,
    group_last_seen: BTreeMap<String, f64>,
    /// Seconds without a report before a group counts as dissolved
    dissolve_after: f64,

    retained: VecDeque<AnalysisData>,
    weights: HvtWeights,
    manual_hvt_players: Vec<String>,
    mission_intent: String,

    next_cycle: u64,
    last_mission_time: Option<f64>,
    last_postures: BTreeMap<String, String>,
    ao_index_counter: u32,
}

impl AoStateManager {
    pub fn new(log_dir: PathBuf, dissolve_after: f64) -> Self {
        Self {
            phase: AoPhase::Idle,
            current: None,
            ao_log: None,
            log_dir,
            objectives: BTreeMap::new(),
            group_sides: BTreeMap::new(),
            group_last_seen: BTreeMap::new(),
            dissolve_after: dissolve_after.max(1.0),
            retained: VecDeque::new(),
            weights: HvtWeights::default(),
            manual_hvt_players: Vec::new(),
            mission_intent: String::new(),
            next_cycle: 0,
            last_mission_time: None,
            last_postures: BTreeMap::new(),
            ao_index_counter: 0,
        }
    }

    pub fn phase(&self) -> AoPhase {
        self.phase
    }

    pub fn mission_intent(&self) -> &str {
        &self.mission_intent
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Begin a new AO. Valid from `Idle` or `Ended` only.
    pub fn start_ao(
        &mut self,
        ao_id: String,
        world_name: String,
        mission_name: String,
    ) -> Result<u32, StateError> {
        if self.phase == AoPhase::Running {
            return Err(StateError::AoAlreadyRunning);
        }
        let ao_index = self.ao_index_counter;
        self.ao_index_counter += 1;

        info!(ao_id = %ao_id, world = %world_name, mission = %mission_name, ao_index, "AO started");
        self.ao_log = Some(AoLog::open(&self.log_dir, &world_name, &mission_name, ao_index));
        self.current = Some(AoRecord {
            ao_id,
            world_name,
            mission_name,
            ao_index,
            started_at: Utc::now(),
            cycles: Vec::new(),
            casualty_events: Vec::new(),
            progress_events: Vec::new(),
            contributions: BTreeMap::new(),
        });
        self.phase = AoPhase::Running;
        self.next_cycle = 0;
        self.last_mission_time = None;
        self.last_postures.clear();
        Ok(ao_index)
    }

    /// Seal the running AO and return its analysis artifact.
    pub fn end_ao(
        &mut self,
        controlled_sides: &BTreeSet<Side>,
    ) -> Result<AnalysisData, StateError> {
        if self.phase != AoPhase::Running {
            return Err(StateError::NoRunningAo);
        }
        let record = self.current.take().ok_or(StateError::NoRunningAo)?;

        let mut hvt_players = hvt::designate_players(&record.contributions, &self.weights);
        for uid in &self.manual_hvt_players {
            if !hvt_players.iter().any(|p| &p.uid == uid) {
                let score = record
                    .contributions
                    .get(uid)
                    .map(|c| hvt::player_score(c, &self.weights))
                    .unwrap_or(0.0);
                hvt_players.push(HvtPlayer {
                    uid: uid.clone(),
                    score,
                });
            }
        }
        let hvt_groups = hvt::designate_groups(
            &record.casualty_events,
            &self.group_sides,
            controlled_sides,
            &self.weights,
        );

        let total_orders = record.total_orders() as u64;
        let total_cycles = record.cycles.len() as u64;
        let analysis = AnalysisData {
            ao_id: record.ao_id.clone(),
            world_name: record.world_name.clone(),
            mission_name: record.mission_name.clone(),
            ao_index: record.ao_index,
            started_at: record.started_at,
            ended_at: Utc::now(),
            total_cycles,
            total_orders_issued: total_orders,
            objectives_summary: self.last_postures.clone(),
            orders_history: record.cycles,
            hvt_players,
            hvt_groups,
        };

        if let Some(log) = self.ao_log.take() {
            log.close(total_cycles, total_orders);
        }

        self.retained.push_back(analysis.clone());
        while self.retained.len() > MAX_RETAINED_AOS {
            self.retained.pop_front();
        }

        info!(
            ao_id = %analysis.ao_id,
            cycles = analysis.total_cycles,
            orders = analysis.total_orders_issued,
            hvt_players = analysis.hvt_players.len(),
            "AO sealed"
        );
        self.phase = AoPhase::Ended;
        Ok(analysis)
    }

    // ------------------------------------------------------------------
    // Snapshot accumulation
    // ------------------------------------------------------------------

    /// Fold a normalized snapshot into AO state. Outside `Running` the
    /// snapshot is accepted (identity tracking stays warm) but history does
    /// not accumulate.
    pub fn observe_snapshot(&mut self, snapshot: &Snapshot) {
        let mission_time = snapshot.mission_time;
        let elapsed = self
            .last_mission_time
            .map(|last| (mission_time - last).max(0.0))
            .unwrap_or(0.0);

        // Group identity: first side binding wins for a live group
        for group in &snapshot.groups {
            match self.group_sides.get(&group.id) {
                Some(bound) if *bound != group.side => {
                    warn!(
                        group = %group.id,
                        bound = %bound,
                        reported = %group.side,
                        "group reported under a different side, keeping original binding"
                    );
                }
                Some(_) => {}
                None => {
                    self.group_sides.insert(group.id.clone(), group.side);
                }
            }
            self.group_last_seen.insert(group.id.clone(), mission_time);
        }
        // Dissolve bindings nothing has reported for a full scan interval
        let cutoff = mission_time - self.dissolve_after;
        let dissolved: Vec<String> = self
            .group_last_seen
            .iter()
            .filter(|(_, seen)| **seen < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in dissolved {
            debug!(group = %id, "group dissolved (no reports for a scan interval)");
            self.group_last_seen.remove(&id);
            self.group_sides.remove(&id);
        }

        // Objective registry upsert
        for objective in &snapshot.objectives {
            self.objectives.insert(objective.id.clone(), objective.clone());
        }

        if self.phase == AoPhase::Running {
            if let Some(record) = self.current.as_mut() {
                for event in &snapshot.casualty_events {
                    if let Some(uid) = &event.killer_uid {
                        record.contributions.entry(uid.clone()).or_default().kills += 1;
                    }
                    record.casualty_events.push(event.clone());
                }
                for (uid, points) in &snapshot.contributions {
                    record
                        .contributions
                        .entry(uid.clone())
                        .or_default()
                        .objective_contributions += points;
                }
                // Proximity time at active objectives
                if elapsed > 0.0 {
                    for player in &snapshot.players {
                        let near_active = self.objectives.values().any(|o| {
                            o.state == ObjectiveState::Active
                                && player.position.distance_2d(&o.position) <= o.radius
                        });
                        if near_active {
                            record
                                .contributions
                                .entry(player.uid.clone())
                                .or_default()
                                .proximity_time_secs += elapsed;
                        }
                    }
                }
            }
        }

        self.last_mission_time = Some(mission_time);
    }

    /// Remember the latest posture per objective for the end-of-AO summary.
    pub fn update_postures(&mut self, evals: &[ObjectiveEval]) {
        for eval in evals {
            self.last_postures
                .insert(eval.objective_id.clone(), eval.posture.as_str().to_string());
        }
    }

    // ------------------------------------------------------------------
    // Cycles & progress
    // ------------------------------------------------------------------

    /// Hand out the next cycle number (strictly monotonic within an AO).
    pub fn next_cycle_number(&mut self) -> u64 {
        self.next_cycle += 1;
        self.next_cycle
    }

    /// Record a decision cycle. Outside `Running` the record is dropped.
    pub fn record_cycle(&mut self, cycle: DecisionCycle) {
        match (self.phase, self.current.as_mut()) {
            (AoPhase::Running, Some(record)) => {
                if let Some(log) = self.ao_log.as_mut() {
                    log.append_cycle(&cycle);
                }
                record.cycles.push(cycle);
            }
            _ => {
                debug!(
                    cycle = cycle.cycle_number,
                    "decision cycle outside a running AO, not recorded"
                );
            }
        }
    }

    /// Divert model rationale to the AO log.
    pub fn log_thoughts(&mut self, cycle_number: u64, thoughts: &str) {
        if let Some(log) = self.ao_log.as_mut() {
            log.append_thoughts(cycle_number, thoughts);
        }
    }

    /// Record an `aoProgress` event: capture points to the actor, the
    /// proximity bonus to every nearby player.
    pub fn record_progress(&mut self, event: ProgressEvent) -> Result<(), StateError> {
        let record = match (self.phase, self.current.as_mut()) {
            (AoPhase::Running, Some(record)) => record,
            _ => return Err(StateError::NoRunningAo),
        };
        let points = event.event_type.points();
        record
            .contributions
            .entry(event.player_uid.clone())
            .or_default()
            .capture_score += points;
        for nearby in &event.nearby_players {
            if nearby != &event.player_uid {
                record
                    .contributions
                    .entry(nearby.clone())
                    .or_default()
                    .capture_score += PROXIMITY_BONUS;
            }
        }
        record.progress_events.push(event);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Objectives & admin
    // ------------------------------------------------------------------

    pub fn active_objectives(&self) -> Vec<Objective> {
        self.objectives
            .values()
            .filter(|o| o.state == ObjectiveState::Active)
            .cloned()
            .collect()
    }

    pub fn upsert_objective(&mut self, objective: Objective) {
        self.objectives.insert(objective.id.clone(), objective);
    }

    pub fn remove_objective(&mut self, id: &str) -> bool {
        self.objectives.remove(id).is_some()
    }

    pub fn set_mission_intent(&mut self, intent: String, clear_memory: bool) {
        self.mission_intent = intent;
        if clear_memory {
            info!("commander brief cleared cross-AO memory");
            self.retained.clear();
        }
    }

    pub fn set_hvt_weights(&mut self, weights: HvtWeights) {
        self.weights = weights.sanitized();
    }

    pub fn set_manual_hvt_players(&mut self, uids: Vec<String>) {
        self.manual_hvt_players = uids;
    }

    /// Order history of the running AO (for the prompt and the RPC surface).
    pub fn history(&self) -> &[DecisionCycle] {
        self.current.as_ref().map(|r| r.cycles.as_slice()).unwrap_or(&[])
    }

    pub fn retained_aos(&self) -> Vec<AnalysisData> {
        self.retained.iter().cloned().collect()
    }

    /// Emergency stop wipes the running AO's order history.
    pub fn clear_history(&mut self) {
        if let Some(record) = self.current.as_mut() {
            let dropped = record.cycles.len();
            record.cycles.clear();
            if dropped > 0 {
                warn!(dropped, "order history cleared by emergency stop");
            }
        }
    }

    pub fn tracked_group_side(&self, group_id: &str) -> Option<Side> {
        self.group_sides.get(group_id).copied()
    }
}
