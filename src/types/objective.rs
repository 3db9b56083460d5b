//! Objective records and the evaluator's classification output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Position;

/// Lifecycle state of an objective. Not derived by the engine — injected by
/// admin commands or re-reported in snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveState {
    #[default]
    Active,
    Captured,
    Destroyed,
    Completed,
    Failed,
}

impl ObjectiveState {
    /// Terminal states end the objective's lifecycle.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ObjectiveState::Active)
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Some(ObjectiveState::Active),
            "captured" => Some(ObjectiveState::Captured),
            "destroyed" => Some(ObjectiveState::Destroyed),
            "completed" => Some(ObjectiveState::Completed),
            "failed" => Some(ObjectiveState::Failed),
            _ => None,
        }
    }
}

/// A tasked objective within the AO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    pub description: String,
    /// Base priority. Values ≤ 10 are read on the 10-scale, larger values on
    /// the 100-scale; dynamic priority clamps to the matching range.
    pub priority: f64,
    pub position: Position,
    /// Effect radius in meters
    pub radius: f64,
    /// Free-form task tag, e.g. "defend_area"
    pub task_type: String,
    #[serde(default)]
    pub state: ObjectiveState,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Tactical posture of an objective as classified by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectivePosture {
    Secured,
    Contested,
    Threatened,
    Undefended,
}

impl ObjectivePosture {
    /// Dynamic priority multiplier for this posture.
    pub fn priority_modifier(&self) -> f64 {
        match self {
            ObjectivePosture::Secured => 0.8,
            ObjectivePosture::Undefended => 1.0,
            ObjectivePosture::Contested => 1.2,
            ObjectivePosture::Threatened => 1.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectivePosture::Secured => "secured",
            ObjectivePosture::Contested => "contested",
            ObjectivePosture::Threatened => "threatened",
            ObjectivePosture::Undefended => "undefended",
        }
    }
}

impl std::fmt::Display for ObjectivePosture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Evaluator output for one objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveEval {
    pub objective_id: String,
    pub posture: ObjectivePosture,
    pub friendly_count: u32,
    pub enemy_count: u32,
    pub base_priority: f64,
    /// `base_priority × posture modifier`, clamped to the base's scale
    pub dynamic_priority: f64,
    pub radius: f64,
}
