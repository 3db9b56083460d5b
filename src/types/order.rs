//! Orders as the LLM emits them, and commands as the queue carries them.
//!
//! An `Order` is untrusted input: the command type is still a free string
//! and the parameters are raw JSON. The sandbox turns surviving orders into
//! `Command`s with a typed payload, an assigned priority, and provenance.

use serde::{Deserialize, Serialize};

use super::{Position, Side};

// ============================================================================
// Command Types
// ============================================================================

/// The closed set of commands the engine knows how to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    MoveTo,
    DefendArea,
    PatrolRoute,
    SeekAndDestroy,
    TransportGroup,
    EscortGroup,
    FireSupport,
    DeployAsset,
    SpawnSquad,
}

impl CommandType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "move_to" => Some(CommandType::MoveTo),
            "defend_area" => Some(CommandType::DefendArea),
            "patrol_route" => Some(CommandType::PatrolRoute),
            "seek_and_destroy" => Some(CommandType::SeekAndDestroy),
            "transport_group" => Some(CommandType::TransportGroup),
            "escort_group" => Some(CommandType::EscortGroup),
            "fire_support" => Some(CommandType::FireSupport),
            "deploy_asset" => Some(CommandType::DeployAsset),
            "spawn_squad" => Some(CommandType::SpawnSquad),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::MoveTo => "move_to",
            CommandType::DefendArea => "defend_area",
            CommandType::PatrolRoute => "patrol_route",
            CommandType::SeekAndDestroy => "seek_and_destroy",
            CommandType::TransportGroup => "transport_group",
            CommandType::EscortGroup => "escort_group",
            CommandType::FireSupport => "fire_support",
            CommandType::DeployAsset => "deploy_asset",
            CommandType::SpawnSquad => "spawn_squad",
        }
    }

    /// Spawning commands may carry an empty `group_id`.
    pub fn is_spawn(&self) -> bool {
        matches!(self, CommandType::DeployAsset | CommandType::SpawnSquad)
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Pre-validation Order
// ============================================================================

/// One order exactly as parsed from the LLM reply, before any validation.
///
/// `command_type` stays a string here: whether it names a known command is
/// the sandbox's first check, not the parser's problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(alias = "type")]
    pub command_type: String,
    /// Empty for spawn/deploy orders
    #[serde(default)]
    pub group_id: String,
    /// Raw parameter object; typed by the sandbox
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// LLM-suggested priority, clamped to [0, 10] on acceptance
    #[serde(default)]
    pub priority: Option<f64>,
    /// Objective this order serves, if the LLM bound one
    #[serde(default)]
    pub objective_id: Option<String>,
}

// ============================================================================
// Post-validation Command
// ============================================================================

/// Typed, fully resolved parameters for an accepted command. Waypoint
/// expansion has already happened: the host applies these verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandPayload {
    /// Replace waypoints with a single MOVE
    MoveTo {
        position: Position,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        formation: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        behaviour: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        combat_mode: Option<String>,
    },
    /// Four-point compass patrol around the center, LIMITED speed
    DefendArea {
        center: Position,
        radius: f64,
        patrol_points: Vec<Position>,
    },
    /// Sequential MOVE waypoints, no cycle
    PatrolRoute {
        waypoints: Vec<Position>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        behaviour: Option<String>,
    },
    /// Five scattered SAD waypoints, COMBAT behaviour, RED combat mode
    SeekAndDestroy {
        center: Position,
        radius: f64,
        waypoints: Vec<Position>,
    },
    /// Two-group coordination: board, drive, TR_UNLOAD, disembark
    TransportGroup {
        passenger_group_id: String,
        pickup: Position,
        dropoff: Position,
    },
    /// Follow the target's leader; the host reissues the waypoint on a cadence
    EscortGroup {
        target_group_id: String,
        radius: f64,
        reissue_interval_secs: f64,
    },
    /// Five aggressive SAD waypoints at 40–100% of radius, FULL speed
    FireSupport {
        center: Position,
        radius: f64,
        waypoints: Vec<Position>,
    },
    /// Spawn a group from the resource pool. Vehicles seed outside the AO
    /// and drive to the destination; infantry appears at it.
    Deploy {
        side: Side,
        asset_type: String,
        unit_classes: Vec<String>,
        destination: Position,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed_position: Option<Position>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        objective_id: Option<String>,
    },
}

/// A validated command awaiting drain by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub command_type: CommandType,
    /// Empty for spawn/deploy
    pub group_id: String,
    pub payload: CommandPayload,
    /// Execution priority in [0, 10]; higher drains first
    pub priority: u8,
    /// Monotonic milliseconds since engine start
    pub timestamp_ms: u64,
    /// Decision cycle that produced this command
    pub cycle: u64,
    /// Always true for enqueued commands; carried for the host's audit trail
    pub validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_type_round_trip() {
        for name in [
            "move_to",
            "defend_area",
            "patrol_route",
            "seek_and_destroy",
            "transport_group",
            "escort_group",
            "fire_support",
            "deploy_asset",
            "spawn_squad",
        ] {
            let ct = CommandType::from_str(name).unwrap();
            assert_eq!(ct.as_str(), name);
        }
        assert_eq!(CommandType::from_str("nuke_site"), None);
    }

    #[test]
    fn order_accepts_type_alias() {
        let order: Order = serde_json::from_str(
            r#"{"type": "move_to", "group_id": "GRP_1", "parameters": {"position": [1,2,0]}}"#,
        )
        .unwrap();
        assert_eq!(order.command_type, "move_to");
        assert_eq!(order.group_id, "GRP_1");
        assert!(order.priority.is_none());
    }

    #[test]
    fn spawn_commands_flagged() {
        assert!(CommandType::DeployAsset.is_spawn());
        assert!(CommandType::SpawnSquad.is_spawn());
        assert!(!CommandType::MoveTo.is_spawn());
    }
}
