//! Per-AO records: decision cycles, progress events, contribution counters,
//! and the analysis artifact returned when an AO is sealed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{CasualtyEvent, Command, ObjectiveEval, Order};

// ============================================================================
// Progress Events
// ============================================================================

/// Scored mission events reported through `aoProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    CommanderKilled,
    CommanderCaptured,
    HvtKilled,
    HvtCaptured,
    TowerDestroyed,
    JammerDestroyed,
    DepotDestroyed,
    SmallObjective,
}

impl ProgressEventType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "commander_killed" => Some(Self::CommanderKilled),
            "commander_captured" => Some(Self::CommanderCaptured),
            "hvt_killed" => Some(Self::HvtKilled),
            "hvt_captured" => Some(Self::HvtCaptured),
            "tower_destroyed" => Some(Self::TowerDestroyed),
            "jammer_destroyed" => Some(Self::JammerDestroyed),
            "depot_destroyed" => Some(Self::DepotDestroyed),
            "small_objective" => Some(Self::SmallObjective),
            _ => None,
        }
    }

    /// Capture score awarded to the acting player.
    pub fn points(&self) -> f64 {
        match self {
            Self::CommanderKilled => 30.0,
            Self::CommanderCaptured => 40.0,
            Self::HvtKilled => 25.0,
            Self::HvtCaptured => 35.0,
            Self::TowerDestroyed | Self::JammerDestroyed => 20.0,
            Self::DepotDestroyed => 15.0,
            Self::SmallObjective => 5.0,
        }
    }
}

/// Bonus awarded to each player the host reported nearby a scored event.
pub const PROXIMITY_BONUS: f64 = 10.0;

/// One `aoProgress` record as stored in the AO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event_type: ProgressEventType,
    pub player_uid: String,
    #[serde(default)]
    pub objective_id: Option<String>,
    #[serde(default)]
    pub objective_type: Option<String>,
    #[serde(default)]
    pub completion_method: Option<String>,
    /// Players within the configured proximity radius at the time
    #[serde(default)]
    pub nearby_players: Vec<String>,
    pub wall_time: DateTime<Utc>,
}

// ============================================================================
// Contribution Roll-ups
// ============================================================================

/// Accumulated per-player telemetry inside one AO.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerContribution {
    pub kills: u32,
    pub objective_contributions: u32,
    /// Seconds spent inside an active objective's radius
    pub proximity_time_secs: f64,
    /// Points from scored progress events (capture/kill/proximity)
    pub capture_score: f64,
}

// ============================================================================
// Decision Cycles
// ============================================================================

/// One order the sandbox rejected, kept for the cycle's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedOrder {
    pub order: Order,
    /// Stable machine-readable class of the rejection
    pub kind: String,
    pub reason: String,
}

/// One orchestrator iteration where the LLM was consulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionCycle {
    pub cycle_number: u64,
    pub mission_time: f64,
    pub wall_time: DateTime<Utc>,
    /// Model commentary ("reasoning" field of the reply)
    pub commentary: String,
    pub orders: Vec<Command>,
    pub rejected: Vec<RejectedOrder>,
    pub active_objectives: Vec<ObjectiveEval>,
    /// Set when the whole reply was discarded (parse failure, breaker open)
    #[serde(default)]
    pub failure_note: Option<String>,
}

// ============================================================================
// HVT Designation
// ============================================================================

/// A player designated high-value for the next AO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HvtPlayer {
    pub uid: String,
    pub score: f64,
}

/// A controlled group designated high-value by casualties inflicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HvtGroup {
    pub group_id: String,
    pub kills_attributed: u32,
}

// ============================================================================
// AO Record & Analysis
// ============================================================================

/// The complete in-memory record of one AO, sealed by `end_ao`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AoRecord {
    pub ao_id: String,
    pub world_name: String,
    pub mission_name: String,
    pub ao_index: u32,
    pub started_at: DateTime<Utc>,
    pub cycles: Vec<DecisionCycle>,
    pub casualty_events: Vec<CasualtyEvent>,
    pub progress_events: Vec<ProgressEvent>,
    /// player UID → accumulated contribution
    pub contributions: BTreeMap<String, PlayerContribution>,
}

impl AoRecord {
    pub fn total_orders(&self) -> usize {
        self.cycles.iter().map(|c| c.orders.len()).sum()
    }
}

/// Post-AO analysis artifact returned from `end_ao`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisData {
    pub ao_id: String,
    pub world_name: String,
    pub mission_name: String,
    pub ao_index: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total_cycles: u64,
    pub total_orders_issued: u64,
    /// objective id → last known posture string
    pub objectives_summary: BTreeMap<String, String>,
    pub orders_history: Vec<DecisionCycle>,
    pub hvt_players: Vec<HvtPlayer>,
    pub hvt_groups: Vec<HvtGroup>,
}
