//! World snapshot types: positions, sides, groups, players, weather.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Geometry
// ============================================================================

/// World-space position in meters. The simulator reports `[x, y, z]`; a bare
/// `[x, y]` is accepted with `z = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(into = "[f64; 3]")]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Ground-plane distance, ignoring altitude.
    pub fn distance_2d(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<Position> for [f64; 3] {
    fn from(p: Position) -> Self {
        [p.x, p.y, p.z]
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Vec<f64> = Vec::deserialize(deserializer)?;
        match raw.as_slice() {
            [x, y] => Ok(Position::new(*x, *y, 0.0)),
            [x, y, z] => Ok(Position::new(*x, *y, *z)),
            other => Err(serde::de::Error::custom(format!(
                "position must have 2 or 3 components, got {}",
                other.len()
            ))),
        }
    }
}

/// Geographic envelope of the Area of Operations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum AoBounds {
    Circle { center: [f64; 2], radius: f64 },
    Rectangle { min: [f64; 2], max: [f64; 2] },
}

impl AoBounds {
    /// Whether a position lies inside the envelope (ground plane only).
    pub fn contains(&self, pos: &Position) -> bool {
        match self {
            AoBounds::Circle { center, radius } => {
                let dx = pos.x - center[0];
                let dy = pos.y - center[1];
                (dx * dx + dy * dy).sqrt() <= *radius
            }
            AoBounds::Rectangle { min, max } => {
                pos.x >= min[0] && pos.x <= max[0] && pos.y >= min[1] && pos.y <= max[1]
            }
        }
    }

    /// Center of the envelope, used to aim spawn seeds back into the AO.
    pub fn center(&self) -> Position {
        match self {
            AoBounds::Circle { center, .. } => Position::new(center[0], center[1], 0.0),
            AoBounds::Rectangle { min, max } => Position::new(
                (min[0] + max[0]) / 2.0,
                (min[1] + max[1]) / 2.0,
                0.0,
            ),
        }
    }

    /// Distance from the center to the edge along the +X axis. For
    /// rectangles this is the half-diagonal, the conservative choice when
    /// placing a seed guaranteed to be outside.
    pub fn outer_radius(&self) -> f64 {
        match self {
            AoBounds::Circle { radius, .. } => *radius,
            AoBounds::Rectangle { min, max } => {
                let hw = (max[0] - min[0]) / 2.0;
                let hh = (max[1] - min[1]) / 2.0;
                (hw * hw + hh * hh).sqrt()
            }
        }
    }
}

// ============================================================================
// Sides
// ============================================================================

/// Faction identifier. Unknown spellings are rejected at the bridge; the
/// normalization table lives in `Side::from_str`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    East,
    West,
    Guer,
    Civ,
}

impl Side {
    /// Parse a side from any of its simulator spellings.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "EAST" | "OPFOR" | "RED" => Some(Side::East),
            "WEST" | "BLUFOR" => Some(Side::West),
            "GUER" | "RESISTANCE" | "INDEPENDENT" => Some(Side::Guer),
            "CIV" | "CIVILIAN" => Some(Side::Civ),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::East => "EAST",
            Side::West => "WEST",
            Side::Guer => "GUER",
            Side::Civ => "CIV",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Groups
// ============================================================================

/// Broad vehicle/unit classification used for prompt context and pool checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TacticalClass {
    Infantry,
    Motorized,
    Mechanized,
    Armor,
    AirRotary,
    AirFixed,
    Naval,
    #[default]
    Unknown,
}

impl TacticalClass {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "infantry" => TacticalClass::Infantry,
            "motorized" => TacticalClass::Motorized,
            "mechanized" => TacticalClass::Mechanized,
            "armor" | "armour" => TacticalClass::Armor,
            "air_rotary" | "rotary" | "helicopter" => TacticalClass::AirRotary,
            "air_fixed" | "fixed_wing" | "plane" => TacticalClass::AirFixed,
            "naval" | "boat" => TacticalClass::Naval,
            _ => TacticalClass::Unknown,
        }
    }

    /// Classes that spawn outside the AO and drive in rather than appearing
    /// at the ordered position.
    pub fn is_vehicle(&self) -> bool {
        matches!(
            self,
            TacticalClass::Motorized
                | TacticalClass::Mechanized
                | TacticalClass::Armor
                | TacticalClass::Naval
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TacticalClass::Infantry => "infantry",
            TacticalClass::Motorized => "motorized",
            TacticalClass::Mechanized => "mechanized",
            TacticalClass::Armor => "armor",
            TacticalClass::AirRotary => "air_rotary",
            TacticalClass::AirFixed => "air_fixed",
            TacticalClass::Naval => "naval",
            TacticalClass::Unknown => "unknown",
        }
    }
}

/// Controlled-vs-observed split for a group.
///
/// Controlled groups belong to the engine and report full posture.
/// Observed groups are everyone else, carried with the fog-of-war knowledge
/// level exactly as the host reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroupDetail {
    Controlled {
        /// Losses since the group spawned
        casualties: u32,
        /// Full posture string from the host (e.g. "AWARE/YELLOW/WEDGE")
        posture: String,
    },
    Observed {
        is_friendly: bool,
        /// Fog-of-war knowledge in [0, 4]
        knowledge: f64,
    },
}

/// One AI group as reported in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Stable for the group's lifetime; never rebinds to a different side
    pub id: String,
    pub side: Side,
    pub class: TacticalClass,
    pub position: Position,
    pub unit_count: u32,
    pub behaviour: String,
    pub combat_mode: String,
    pub formation: String,
    pub in_combat: bool,
    pub waypoint_type: String,
    pub waypoint_position: Option<Position>,
    #[serde(flatten)]
    pub detail: GroupDetail,
}

impl Group {
    pub fn is_controlled(&self) -> bool {
        matches!(self.detail, GroupDetail::Controlled { .. })
    }
}

/// A human player as reported in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub uid: String,
    pub name: String,
    pub side: Side,
    pub position: Position,
}

// ============================================================================
// Snapshot
// ============================================================================

/// Weather 4-tuple, each component in [0, 1] except wind (m/s).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Weather {
    pub overcast: f64,
    pub rain: f64,
    pub fog: f64,
    pub wind: f64,
}

/// A casualty event reported by the host since the previous snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasualtyEvent {
    pub group_id: String,
    pub side: Side,
    /// Player UID credited with the kill, when the host knows it
    #[serde(default)]
    pub killer_uid: Option<String>,
    /// AI group credited with the kill, when the host knows it
    #[serde(default)]
    pub killer_group_id: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    pub mission_time: f64,
}

/// Immutable world state for one tick. Produced only by the bridge
/// normalizer; nothing downstream mutates it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Seconds since AO start
    pub mission_time: f64,
    /// Fraction of the day in [0, 1)
    pub daytime: f64,
    pub weather: Weather,
    pub world_name: String,
    pub mission_name: String,
    /// side → total live AI units
    pub unit_counts: BTreeMap<Side, u32>,
    pub groups: Vec<Group>,
    pub players: Vec<Player>,
    pub objectives: Vec<crate::types::Objective>,
    /// Opaque mission variables, passed through to the prompt untouched
    pub mission_variables: BTreeMap<String, serde_json::Value>,
    pub mission_intent: String,
    pub friendly_sides: BTreeSet<Side>,
    pub controlled_sides: BTreeSet<Side>,
    pub casualty_events: Vec<CasualtyEvent>,
    /// player UID → objective contribution points reported this tick
    pub contributions: BTreeMap<String, u32>,
}

impl Snapshot {
    /// Controlled groups currently alive in this snapshot.
    pub fn controlled_groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter().filter(|g| g.is_controlled())
    }

    /// Look up a group by its stable ID.
    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Total live units for a side, as reported by the host.
    pub fn units_for_side(&self, side: Side) -> u32 {
        self.unit_counts.get(&side).copied().unwrap_or(0)
    }
}
