//! World snapshot normalizer.
//!
//! `ingest` is the single entry point for world state: it rebuilds the typed
//! `Snapshot` from the bridge's pair tree, coercing numeric strings and
//! normalizing side spellings on the way in. It is pure and idempotent, and
//! it never partially applies — a shape mismatch anywhere fails the whole
//! payload with `BadSnapshot` and the engine keeps its previous state.
//!
//! Unknown top-level keys are dropped with a warning; unknown side spellings
//! are a hard failure.

use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::types::{
    CasualtyEvent, Group, GroupDetail, Objective, ObjectiveState, Player, Position, Side,
    Snapshot, TacticalClass, Weather,
};

use super::pairs::PairValue;

/// Snapshot payload rejected at the trust boundary.
#[derive(Debug, thiserror::Error)]
#[error("bad snapshot: {0}")]
pub struct BadSnapshot(pub String);

const KNOWN_KEYS: &[&str] = &[
    "mission_time",
    "daytime",
    "weather",
    "world_name",
    "mission_name",
    "unit_counts",
    "groups",
    "players",
    "objectives",
    "mission_variables",
    "mission_intent",
    "friendly_sides",
    "controlled_sides",
    "casualties",
    "contributions",
];

/// Normalize a raw bridge payload into a typed `Snapshot`.
pub fn ingest(raw: &serde_json::Value) -> Result<Snapshot, BadSnapshot> {
    let tree = PairValue::decode(raw);
    if !matches!(tree, PairValue::Pairs(_)) {
        return Err(BadSnapshot("top level is not a pair list".into()));
    }

    for (key, _) in tree.entries() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            warn!(key = %key, "snapshot carries unknown key, dropping");
        }
    }

    let mission_time = require_f64(&tree, "mission_time")?;
    let daytime = opt_f64(&tree, "daytime").unwrap_or(0.5);
    let weather = parse_weather(tree.get("weather"))?;
    let world_name = opt_string(&tree, "world_name");
    let mission_name = opt_string(&tree, "mission_name");
    let mission_intent = opt_string(&tree, "mission_intent");

    let mut unit_counts = BTreeMap::new();
    if let Some(counts) = tree.get("unit_counts") {
        for (side_name, count) in counts.entries() {
            let side = parse_side(side_name, "unit_counts")?;
            let n = count
                .as_u32()
                .ok_or_else(|| BadSnapshot(format!("unit_counts[{side_name}] is not a count")))?;
            unit_counts.insert(side, n);
        }
    }

    let mut groups = Vec::new();
    if let Some(list) = tree.get("groups") {
        ensure_list(list, "groups")?;
        for (i, entry) in list.items().iter().enumerate() {
            groups.push(parse_group(entry, i)?);
        }
    }

    let mut players = Vec::new();
    if let Some(list) = tree.get("players") {
        ensure_list(list, "players")?;
        for (i, entry) in list.items().iter().enumerate() {
            players.push(parse_player(entry, i)?);
        }
    }

    let mut objectives = Vec::new();
    if let Some(list) = tree.get("objectives") {
        ensure_list(list, "objectives")?;
        for (i, entry) in list.items().iter().enumerate() {
            objectives.push(parse_objective(entry, i)?);
        }
    }

    let mut mission_variables = BTreeMap::new();
    if let Some(vars) = tree.get("mission_variables") {
        for (key, value) in vars.entries() {
            mission_variables.insert(key.clone(), value.encode());
        }
    }

    let friendly_sides = parse_side_set(tree.get("friendly_sides"), "friendly_sides")?;
    let controlled_sides = parse_side_set(tree.get("controlled_sides"), "controlled_sides")?;

    let mut casualty_events = Vec::new();
    if let Some(list) = tree.get("casualties") {
        ensure_list(list, "casualties")?;
        for (i, entry) in list.items().iter().enumerate() {
            casualty_events.push(parse_casualty(entry, i, mission_time)?);
        }
    }

    let mut contributions = BTreeMap::new();
    if let Some(tree) = tree.get("contributions") {
        for (uid, count) in tree.entries() {
            let n = count
                .as_u32()
                .ok_or_else(|| BadSnapshot(format!("contributions[{uid}] is not a count")))?;
            contributions.insert(uid.clone(), n);
        }
    }

    Ok(Snapshot {
        mission_time,
        daytime,
        weather,
        world_name,
        mission_name,
        unit_counts,
        groups,
        players,
        objectives,
        mission_variables,
        mission_intent,
        friendly_sides,
        controlled_sides,
        casualty_events,
        contributions,
    })
}

// ============================================================================
// Field Helpers
// ============================================================================

fn require_f64(tree: &PairValue, key: &str) -> Result<f64, BadSnapshot> {
    tree.get(key)
        .and_then(PairValue::as_f64)
        .filter(|n| n.is_finite())
        .ok_or_else(|| BadSnapshot(format!("missing or non-numeric \"{key}\"")))
}

fn opt_f64(tree: &PairValue, key: &str) -> Option<f64> {
    tree.get(key).and_then(PairValue::as_f64).filter(|n| n.is_finite())
}

fn opt_string(tree: &PairValue, key: &str) -> String {
    tree.get(key)
        .map(PairValue::to_display_string)
        .unwrap_or_default()
}

fn ensure_list(value: &PairValue, key: &str) -> Result<(), BadSnapshot> {
    match value {
        PairValue::List(_) => Ok(()),
        // An empty pair list and an empty list are indistinguishable on the wire
        PairValue::Pairs(p) if p.is_empty() => Ok(()),
        _ => Err(BadSnapshot(format!("\"{key}\" is not a list"))),
    }
}

fn parse_side(s: &str, context: &str) -> Result<Side, BadSnapshot> {
    Side::from_str(s).ok_or_else(|| BadSnapshot(format!("{context}: unknown side \"{s}\"")))
}

fn parse_side_set(
    value: Option<&PairValue>,
    context: &str,
) -> Result<BTreeSet<Side>, BadSnapshot> {
    let mut sides = BTreeSet::new();
    if let Some(list) = value {
        for item in list.items() {
            let name = item
                .as_str()
                .ok_or_else(|| BadSnapshot(format!("{context}: side is not a string")))?;
            sides.insert(parse_side(name, context)?);
        }
    }
    Ok(sides)
}

fn parse_position(value: &PairValue, context: &str) -> Result<Position, BadSnapshot> {
    let items = value.items();
    let nums: Vec<f64> = items.iter().filter_map(PairValue::as_f64).collect();
    if nums.len() != items.len() || !(2..=3).contains(&nums.len()) {
        return Err(BadSnapshot(format!("{context}: bad position")));
    }
    let z = nums.get(2).copied().unwrap_or(0.0);
    let pos = Position::new(nums[0], nums[1], z);
    if !pos.is_finite() {
        return Err(BadSnapshot(format!("{context}: non-finite position")));
    }
    Ok(pos)
}

fn parse_weather(value: Option<&PairValue>) -> Result<Weather, BadSnapshot> {
    let Some(value) = value else {
        return Ok(Weather::default());
    };
    match value {
        PairValue::List(items) if items.len() == 4 => {
            let nums: Vec<f64> = items.iter().filter_map(PairValue::as_f64).collect();
            if nums.len() != 4 {
                return Err(BadSnapshot("weather has non-numeric component".into()));
            }
            Ok(Weather {
                overcast: nums[0],
                rain: nums[1],
                fog: nums[2],
                wind: nums[3],
            })
        }
        PairValue::Pairs(_) => Ok(Weather {
            overcast: opt_f64(value, "overcast").unwrap_or(0.0),
            rain: opt_f64(value, "rain").unwrap_or(0.0),
            fog: opt_f64(value, "fog").unwrap_or(0.0),
            wind: opt_f64(value, "wind").unwrap_or(0.0),
        }),
        _ => Err(BadSnapshot("weather is not a 4-tuple".into())),
    }
}

fn parse_group(entry: &PairValue, index: usize) -> Result<Group, BadSnapshot> {
    let ctx = format!("groups[{index}]");
    let id = entry
        .get("id")
        .and_then(PairValue::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BadSnapshot(format!("{ctx}: missing id")))?
        .to_string();
    let side_name = entry
        .get("side")
        .and_then(PairValue::as_str)
        .ok_or_else(|| BadSnapshot(format!("{ctx}: missing side")))?;
    let side = parse_side(side_name, &ctx)?;
    let class = entry
        .get("class")
        .and_then(PairValue::as_str)
        .map(TacticalClass::from_str)
        .unwrap_or_default();
    let position = parse_position(
        entry
            .get("position")
            .ok_or_else(|| BadSnapshot(format!("{ctx}: missing position")))?,
        &ctx,
    )?;
    let unit_count = entry
        .get("unit_count")
        .and_then(PairValue::as_u32)
        .ok_or_else(|| BadSnapshot(format!("{ctx}: missing unit_count")))?;
    let in_combat = entry
        .get("in_combat")
        .and_then(PairValue::as_bool)
        .unwrap_or(false);
    let waypoint_position = match entry.get("waypoint_position") {
        Some(PairValue::Null) | None => None,
        Some(v) => Some(parse_position(v, &ctx)?),
    };

    let is_controlled = entry
        .get("is_controlled")
        .and_then(PairValue::as_bool)
        .unwrap_or(false);
    let detail = if is_controlled {
        GroupDetail::Controlled {
            casualties: entry
                .get("casualties")
                .and_then(PairValue::as_u32)
                .unwrap_or(0),
            posture: opt_string(entry, "posture"),
        }
    } else {
        GroupDetail::Observed {
            is_friendly: entry
                .get("is_friendly")
                .and_then(PairValue::as_bool)
                .unwrap_or(false),
            knowledge: opt_f64(entry, "knowledge").unwrap_or(0.0).clamp(0.0, 4.0),
        }
    };

    Ok(Group {
        id,
        side,
        class,
        position,
        unit_count,
        behaviour: opt_string(entry, "behaviour"),
        combat_mode: opt_string(entry, "combat_mode"),
        formation: opt_string(entry, "formation"),
        in_combat,
        waypoint_type: opt_string(entry, "waypoint_type"),
        waypoint_position,
        detail,
    })
}

fn parse_player(entry: &PairValue, index: usize) -> Result<Player, BadSnapshot> {
    let ctx = format!("players[{index}]");
    let uid = entry
        .get("uid")
        .and_then(PairValue::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BadSnapshot(format!("{ctx}: missing uid")))?
        .to_string();
    let side_name = entry
        .get("side")
        .and_then(PairValue::as_str)
        .ok_or_else(|| BadSnapshot(format!("{ctx}: missing side")))?;
    Ok(Player {
        uid,
        name: opt_string(entry, "name"),
        side: parse_side(side_name, &ctx)?,
        position: parse_position(
            entry
                .get("position")
                .ok_or_else(|| BadSnapshot(format!("{ctx}: missing position")))?,
            &ctx,
        )?,
    })
}

fn parse_objective(entry: &PairValue, index: usize) -> Result<Objective, BadSnapshot> {
    let ctx = format!("objectives[{index}]");
    let id = entry
        .get("id")
        .and_then(PairValue::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BadSnapshot(format!("{ctx}: missing id")))?
        .to_string();
    let position = parse_position(
        entry
            .get("position")
            .ok_or_else(|| BadSnapshot(format!("{ctx}: missing position")))?,
        &ctx,
    )?;
    let radius = entry
        .get("radius")
        .and_then(PairValue::as_f64)
        .filter(|r| r.is_finite() && *r > 0.0)
        .ok_or_else(|| BadSnapshot(format!("{ctx}: missing or non-positive radius")))?;
    let state = match entry.get("state").and_then(PairValue::as_str) {
        None => ObjectiveState::Active,
        Some(s) => ObjectiveState::from_str(s)
            .ok_or_else(|| BadSnapshot(format!("{ctx}: unknown state \"{s}\"")))?,
    };
    let mut metadata = BTreeMap::new();
    if let Some(meta) = entry.get("metadata") {
        for (key, value) in meta.entries() {
            metadata.insert(key.clone(), value.encode());
        }
    }
    Ok(Objective {
        id,
        description: opt_string(entry, "description"),
        priority: opt_f64(entry, "priority").unwrap_or(5.0),
        position,
        radius,
        task_type: opt_string(entry, "task_type"),
        state,
        metadata,
    })
}

fn parse_casualty(
    entry: &PairValue,
    index: usize,
    default_time: f64,
) -> Result<CasualtyEvent, BadSnapshot> {
    let ctx = format!("casualties[{index}]");
    let group_id = entry
        .get("group_id")
        .and_then(PairValue::as_str)
        .ok_or_else(|| BadSnapshot(format!("{ctx}: missing group_id")))?
        .to_string();
    let side_name = entry
        .get("side")
        .and_then(PairValue::as_str)
        .ok_or_else(|| BadSnapshot(format!("{ctx}: missing side")))?;
    let position = match entry.get("position") {
        Some(PairValue::Null) | None => None,
        Some(v) => Some(parse_position(v, &ctx)?),
    };
    Ok(CasualtyEvent {
        group_id,
        side: parse_side(side_name, &ctx)?,
        killer_uid: entry
            .get("killer_uid")
            .and_then(PairValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        killer_group_id: entry
            .get("killer_group_id")
            .and_then(PairValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        position,
        mission_time: opt_f64(entry, "mission_time").unwrap_or(default_time),
    })
}
