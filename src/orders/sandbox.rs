//! Order sandbox.
//!
//! Layered validation of untrusted LLM orders, applied in a fixed sequence;
//! the first failing layer rejects the order and later layers never run:
//!
//! 1. command type against the allow/block lists
//! 2. schema completeness for the command type
//! 3. group existence and controllability
//! 4. geography against the AO bounds
//! 5. resource pool capacity and defense-only gating
//! 6. per-side spawn cap
//! 7. parameter value ranges
//!
//! Orders that survive all layers come out as `Command`s with expanded
//! waypoints and an assigned execution priority.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::config::SafetyConfig;
use crate::types::{
    AoBounds, Command, CommandPayload, CommandType, Order, Position, RejectedOrder, Side,
    Snapshot,
};

use super::resource_pool::ResourcePool;
use super::waypoints;

/// Escort waypoint reissue cadence carried in the command payload.
const ESCORT_REISSUE_SECS: f64 = 5.0;

/// Default execution priority when the LLM supplies none.
const DEFAULT_PRIORITY: f64 = 5.0;

/// Radius ceiling for area commands, in meters.
const MAX_RADIUS_M: f64 = 10_000.0;

/// Stable machine-readable rejection classes, aggregated in post-AO analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    NotAllowed,
    Blocked,
    SchemaIncomplete,
    UnknownGroup,
    NotControlled,
    OutOfBounds,
    PoolRejected,
    SpawnCapExceeded,
    BadParameter,
}

impl RejectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionKind::NotAllowed => "not_allowed",
            RejectionKind::Blocked => "blocked",
            RejectionKind::SchemaIncomplete => "schema_incomplete",
            RejectionKind::UnknownGroup => "unknown_group",
            RejectionKind::NotControlled => "not_controlled",
            RejectionKind::OutOfBounds => "out_of_bounds",
            RejectionKind::PoolRejected => "pool_rejected",
            RejectionKind::SpawnCapExceeded => "spawn_cap_exceeded",
            RejectionKind::BadParameter => "bad_parameter",
        }
    }
}

/// Result of validating one order.
#[derive(Debug)]
pub enum ValidationOutcome {
    Accepted(Command),
    Rejected { kind: RejectionKind, reason: String },
}

/// Everything one validation batch reads. The pool is passed separately
/// because accepted deploys mutate it.
pub struct SandboxInputs<'a> {
    pub snapshot: &'a Snapshot,
    pub bounds: Option<&'a AoBounds>,
    pub safety: &'a SafetyConfig,
    /// When set, only these controlled groups may be ordered
    pub control_filter: Option<&'a BTreeSet<String>>,
    pub cycle: u64,
    pub timestamp_ms: u64,
}

/// The sandbox owns the RNG that scatters SAD/fire-support waypoints and
/// places deploy seeds.
pub struct Sandbox {
    rng: StdRng,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic variant for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Validate a whole reply's orders in sequence. Spawn-cap accounting is
    /// shared across the batch so two deploys cannot each claim the last
    /// slot.
    pub fn validate_batch(
        &mut self,
        orders: &[Order],
        inputs: &SandboxInputs<'_>,
        pool: &mut ResourcePool,
    ) -> (Vec<Command>, Vec<RejectedOrder>) {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut pending_units: BTreeMap<Side, u32> = BTreeMap::new();

        for order in orders {
            match self.validate_one(order, inputs, pool, &mut pending_units) {
                ValidationOutcome::Accepted(command) => accepted.push(command),
                ValidationOutcome::Rejected { kind, reason } => {
                    tracing::warn!(
                        command_type = %order.command_type,
                        kind = kind.as_str(),
                        %reason,
                        "order rejected by sandbox"
                    );
                    rejected.push(RejectedOrder {
                        order: order.clone(),
                        kind: kind.as_str().to_string(),
                        reason,
                    });
                }
            }
        }
        (accepted, rejected)
    }

    /// Validate a single order against the layered checks.
    pub fn validate_one(
        &mut self,
        order: &Order,
        inputs: &SandboxInputs<'_>,
        pool: &mut ResourcePool,
        pending_units: &mut BTreeMap<Side, u32>,
    ) -> ValidationOutcome {
        let sandbox_on = inputs.safety.sandbox_enabled;

        // Layer 1: allow/block lists
        let type_name = order.command_type.trim().to_lowercase();
        let Some(command_type) = CommandType::from_str(&type_name) else {
            return reject(
                RejectionKind::NotAllowed,
                format!("unknown command type \"{}\"", order.command_type),
            );
        };
        if sandbox_on {
            if inputs.safety.blocked_commands.iter().any(|b| b == &type_name) {
                return reject(
                    RejectionKind::Blocked,
                    format!("command type \"{type_name}\" is blocked"),
                );
            }
            if !inputs.safety.allowed_commands.is_empty()
                && !inputs.safety.allowed_commands.iter().any(|a| a == &type_name)
            {
                return reject(
                    RejectionKind::NotAllowed,
                    format!("command type \"{type_name}\" is not in the allow-list"),
                );
            }
        }

        // Layer 2: schema completeness
        let params = match extract_params(command_type, order) {
            Ok(params) => params,
            Err(reason) => return reject(RejectionKind::SchemaIncomplete, reason),
        };

        // Layer 3: group existence and controllability
        if sandbox_on {
            if let Some(outcome) = self.check_groups(command_type, order, &params, inputs) {
                return outcome;
            }
        }

        // Layer 4: geography
        if sandbox_on {
            if let Some(outcome) = check_geography(&params, inputs.bounds) {
                return outcome;
            }
        }

        // Layer 5: resource pool
        if let RawParams::Deploy { side, asset_type, .. } = &params {
            if sandbox_on {
                if let Err(e) = pool.check(*side, asset_type) {
                    return reject(RejectionKind::PoolRejected, e.to_string());
                }
            }
        }

        // Layer 6: spawn cap
        if sandbox_on {
            if let RawParams::Deploy { side, unit_classes, .. } = &params {
                let live = inputs.snapshot.units_for_side(*side)
                    + pending_units.get(side).copied().unwrap_or(0);
                let requested = unit_classes.len() as u32;
                if live + requested > inputs.safety.max_units_per_side as u32 {
                    return reject(
                        RejectionKind::SpawnCapExceeded,
                        format!(
                            "side {side} at {live} units, +{requested} exceeds cap {}",
                            inputs.safety.max_units_per_side
                        ),
                    );
                }
            }
        }

        // Layer 7: parameter value ranges
        if let Err(reason) = check_value_ranges(&params) {
            return reject(RejectionKind::BadParameter, reason);
        }

        // Commit side effects only after every layer passed
        if let RawParams::Deploy { side, asset_type, unit_classes, .. } = &params {
            if sandbox_on {
                if let Err(e) = pool.reserve(*side, asset_type) {
                    return reject(RejectionKind::PoolRejected, e.to_string());
                }
            }
            *pending_units.entry(*side).or_insert(0) += unit_classes.len() as u32;
        }

        let payload = self.expand(command_type, params, inputs.bounds);
        let priority = order
            .priority
            .unwrap_or(DEFAULT_PRIORITY)
            .clamp(0.0, 10.0)
            .round() as u8;

        ValidationOutcome::Accepted(Command {
            command_type,
            group_id: order.group_id.clone(),
            payload,
            priority,
            timestamp_ms: inputs.timestamp_ms,
            cycle: inputs.cycle,
            validated: true,
            objective_id: order.objective_id.clone(),
        })
    }

    fn check_groups(
        &self,
        command_type: CommandType,
        order: &Order,
        params: &RawParams,
        inputs: &SandboxInputs<'_>,
    ) -> Option<ValidationOutcome> {
        // Spawn commands may carry an empty group_id
        if !command_type.is_spawn() || !order.group_id.is_empty() {
            if let Some(outcome) =
                self.check_controlled_group(&order.group_id, command_type, inputs)
            {
                return Some(outcome);
            }
        }

        match params {
            RawParams::Transport { passenger_group_id, .. } => {
                self.check_controlled_group(passenger_group_id, command_type, inputs)
            }
            RawParams::Escort { target_group_id, .. } => {
                if inputs.snapshot.group(target_group_id).is_none() {
                    Some(reject(
                        RejectionKind::UnknownGroup,
                        format!("escort target \"{target_group_id}\" is not tracked"),
                    ))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn check_controlled_group(
        &self,
        group_id: &str,
        command_type: CommandType,
        inputs: &SandboxInputs<'_>,
    ) -> Option<ValidationOutcome> {
        if group_id.is_empty() && command_type.is_spawn() {
            return None;
        }
        let Some(group) = inputs.snapshot.group(group_id) else {
            return Some(reject(
                RejectionKind::UnknownGroup,
                format!("group \"{group_id}\" is not tracked"),
            ));
        };
        if !inputs.snapshot.controlled_sides.contains(&group.side) {
            return Some(reject(
                RejectionKind::NotControlled,
                format!("group \"{group_id}\" belongs to uncontrolled side {}", group.side),
            ));
        }
        if let Some(filter) = inputs.control_filter {
            if !filter.contains(group_id) {
                return Some(reject(
                    RejectionKind::NotControlled,
                    format!("group \"{group_id}\" is outside the controlled-groups filter"),
                ));
            }
        }
        None
    }

    /// Turn validated raw parameters into the final payload, expanding
    /// waypoints where the semantic calls for it.
    fn expand(
        &mut self,
        command_type: CommandType,
        params: RawParams,
        bounds: Option<&AoBounds>,
    ) -> CommandPayload {
        match params {
            RawParams::MoveTo { position, speed, formation, behaviour, combat_mode } => {
                CommandPayload::MoveTo { position, speed, formation, behaviour, combat_mode }
            }
            RawParams::Area { position, radius } => match command_type {
                CommandType::DefendArea => CommandPayload::DefendArea {
                    center: position,
                    radius,
                    patrol_points: waypoints::compass_patrol(position, radius),
                },
                CommandType::SeekAndDestroy => CommandPayload::SeekAndDestroy {
                    center: position,
                    radius,
                    waypoints: waypoints::sad_scatter(&mut self.rng, position, radius),
                },
                _ => CommandPayload::FireSupport {
                    center: position,
                    radius,
                    waypoints: waypoints::fire_support_ring(&mut self.rng, position, radius),
                },
            },
            RawParams::Patrol { waypoints, speed, behaviour } => {
                CommandPayload::PatrolRoute { waypoints, speed, behaviour }
            }
            RawParams::Transport { passenger_group_id, pickup, dropoff } => {
                CommandPayload::TransportGroup { passenger_group_id, pickup, dropoff }
            }
            RawParams::Escort { target_group_id, radius } => CommandPayload::EscortGroup {
                target_group_id,
                radius,
                reissue_interval_secs: ESCORT_REISSUE_SECS,
            },
            RawParams::Deploy { side, asset_type, unit_classes, position, group_id, objective_id } => {
                let seed_position = asset_is_vehicle(&asset_type)
                    .then(|| waypoints::deploy_seed(&mut self.rng, bounds, position))
                    .flatten();
                CommandPayload::Deploy {
                    side,
                    asset_type,
                    unit_classes,
                    destination: position,
                    seed_position,
                    group_id,
                    objective_id,
                }
            }
        }
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

fn reject(kind: RejectionKind, reason: String) -> ValidationOutcome {
    ValidationOutcome::Rejected { kind, reason }
}

/// Asset types that spawn outside the AO and drive in.
fn asset_is_vehicle(asset_type: &str) -> bool {
    let lower = asset_type.to_lowercase();
    ["motor", "mech", "armor", "armour", "vehicle", "truck", "ifv", "tank", "naval", "boat"]
        .iter()
        .any(|kw| lower.contains(kw))
}

// ============================================================================
// Schema Extraction (layer 2)
// ============================================================================

/// Typed parameters pulled out of the raw JSON, pre-range-check.
enum RawParams {
    MoveTo {
        position: Position,
        speed: Option<String>,
        formation: Option<String>,
        behaviour: Option<String>,
        combat_mode: Option<String>,
    },
    Area {
        position: Position,
        radius: f64,
    },
    Patrol {
        waypoints: Vec<Position>,
        speed: Option<String>,
        behaviour: Option<String>,
    },
    Transport {
        passenger_group_id: String,
        pickup: Position,
        dropoff: Position,
    },
    Escort {
        target_group_id: String,
        radius: f64,
    },
    Deploy {
        side: Side,
        asset_type: String,
        unit_classes: Vec<String>,
        position: Position,
        group_id: Option<String>,
        objective_id: Option<String>,
    },
}

fn extract_params(command_type: CommandType, order: &Order) -> Result<RawParams, String> {
    let p = &order.parameters;
    match command_type {
        CommandType::MoveTo => Ok(RawParams::MoveTo {
            position: req_position(p, "position")?,
            speed: opt_str(p, "speed"),
            formation: opt_str(p, "formation"),
            behaviour: opt_str(p, "behaviour"),
            combat_mode: opt_str(p, "combat_mode"),
        }),
        CommandType::DefendArea | CommandType::SeekAndDestroy | CommandType::FireSupport => {
            Ok(RawParams::Area {
                position: req_position(p, "position")?,
                radius: req_f64(p, "radius")?,
            })
        }
        CommandType::PatrolRoute => {
            let raw = p
                .get("waypoints")
                .and_then(|v| v.as_array())
                .ok_or("patrol_route requires a waypoints list")?;
            if raw.len() < 2 {
                return Err(format!("patrol_route requires at least 2 waypoints, got {}", raw.len()));
            }
            let mut route = Vec::with_capacity(raw.len());
            for (i, wp) in raw.iter().enumerate() {
                route.push(
                    serde_json::from_value::<Position>(wp.clone())
                        .map_err(|e| format!("waypoints[{i}]: {e}"))?,
                );
            }
            Ok(RawParams::Patrol {
                waypoints: route,
                speed: opt_str(p, "speed"),
                behaviour: opt_str(p, "behaviour"),
            })
        }
        CommandType::TransportGroup => Ok(RawParams::Transport {
            passenger_group_id: req_str(p, "passenger_group_id")?,
            pickup: req_position(p, "pickup")?,
            dropoff: req_position(p, "dropoff")?,
        }),
        CommandType::EscortGroup => Ok(RawParams::Escort {
            target_group_id: req_str(p, "target_group_id")?,
            radius: req_f64(p, "radius")?,
        }),
        CommandType::DeployAsset | CommandType::SpawnSquad => {
            let side_name = req_str(p, "side")?;
            let side = Side::from_str(&side_name)
                .ok_or_else(|| format!("unknown side \"{side_name}\""))?;
            let unit_classes: Vec<String> = p
                .get("unit_classes")
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if unit_classes.is_empty() {
                return Err("deploy requires at least one unit class".to_string());
            }
            let asset_type = match command_type {
                CommandType::SpawnSquad => opt_str(p, "asset_type")
                    .unwrap_or_else(|| "infantry_squad".to_string()),
                _ => req_str(p, "asset_type")?,
            };
            Ok(RawParams::Deploy {
                side,
                asset_type,
                unit_classes,
                position: req_position(p, "position")?,
                group_id: opt_str(p, "group_id").filter(|s| !s.is_empty()),
                objective_id: opt_str(p, "objective_id").filter(|s| !s.is_empty()),
            })
        }
    }
}

fn req_position(params: &serde_json::Value, key: &str) -> Result<Position, String> {
    let value = params
        .get(key)
        .ok_or_else(|| format!("missing \"{key}\""))?;
    serde_json::from_value(value.clone()).map_err(|e| format!("\"{key}\": {e}"))
}

fn req_f64(params: &serde_json::Value, key: &str) -> Result<f64, String> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| format!("missing or non-numeric \"{key}\""))
}

fn req_str(params: &serde_json::Value, key: &str) -> Result<String, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("missing \"{key}\""))
}

fn opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

// ============================================================================
// Geography (layer 4) and Value Ranges (layer 7)
// ============================================================================

fn positions_of(params: &RawParams) -> Vec<&Position> {
    match params {
        RawParams::MoveTo { position, .. } | RawParams::Area { position, .. } => vec![position],
        RawParams::Patrol { waypoints, .. } => waypoints.iter().collect(),
        RawParams::Transport { pickup, dropoff, .. } => vec![pickup, dropoff],
        RawParams::Escort { .. } => vec![],
        // The ordered destination must be inside; the seed is engine-chosen
        RawParams::Deploy { position, .. } => vec![position],
    }
}

fn check_geography(params: &RawParams, bounds: Option<&AoBounds>) -> Option<ValidationOutcome> {
    for position in positions_of(params) {
        match bounds {
            Some(bounds) if !bounds.contains(position) => {
                return Some(reject(
                    RejectionKind::OutOfBounds,
                    format!(
                        "position [{:.0}, {:.0}] outside AO",
                        position.x, position.y
                    ),
                ));
            }
            None if !position.is_finite() => {
                return Some(reject(
                    RejectionKind::OutOfBounds,
                    "position is not finite".to_string(),
                ));
            }
            _ => {}
        }
    }
    None
}

fn check_value_ranges(params: &RawParams) -> Result<(), String> {
    for position in positions_of(params) {
        if !position.is_finite() {
            return Err("position is not finite".to_string());
        }
    }
    let radius = match params {
        RawParams::Area { radius, .. } | RawParams::Escort { radius, .. } => Some(*radius),
        _ => None,
    };
    if let Some(radius) = radius {
        if !radius.is_finite() || radius <= 0.0 || radius > MAX_RADIUS_M {
            return Err(format!("radius {radius} outside (0, {MAX_RADIUS_M}]"));
        }
    }
    Ok(())
}
