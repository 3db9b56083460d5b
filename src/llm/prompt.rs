//! Prompt composition.
//!
//! Renders the typed world model into the text blocks of a
//! `DecisionContext`. All formatting choices live here so the providers
//! stay transport-only.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::config::{AiConfig, GuardrailsConfig, SafetyConfig};
use crate::types::{
    AnalysisData, AoBounds, DecisionCycle, GroupDetail, Objective, ObjectiveEval, Side, Snapshot,
};

use super::context::{DecisionContext, ThinkingKnobs};

/// How many past cycles the order-history block carries.
pub const HISTORY_CYCLES: usize = 5;

/// Invariant commander persona and reply schema.
pub const SYSTEM_PROMPT: &str = r#"You are BATCOM, the AI battlefield commander for a military simulation.
You are given the current tactical picture and must allocate your forces.

Reply with a single JSON document and nothing else:

{
  "reasoning": "<one short paragraph of tactical rationale>",
  "orders": [
    {
      "type": "<command type>",
      "group_id": "<controlled group id, or \"\" for deploy_asset/spawn_squad>",
      "parameters": { ... },
      "priority": <0-10>,
      "objective_id": "<optional objective this order serves>"
    }
  ]
}

Available command types and required parameters:
- move_to: position [x,y,z]; optional speed, formation, behaviour, combat_mode
- defend_area: position, radius
- patrol_route: waypoints (list of at least 2 positions); optional speed, behaviour
- seek_and_destroy: position, radius
- transport_group: passenger_group_id, pickup, dropoff
- escort_group: target_group_id, radius
- fire_support: position, radius
- deploy_asset: side, asset_type, unit_classes (at least 1), position; optional group_id, objective_id
- spawn_squad: same as deploy_asset

Rules:
- Only order groups you control. Never invent group IDs.
- Every position must lie inside the area of operations.
- Respect the resource pool: never deploy an asset type with no remaining capacity.
- Prefer fewer, decisive orders over many small adjustments.
- An empty orders list is a valid answer when no change is needed."#;

/// Inputs the commander hands to the prompt builder each decision cycle.
pub struct PromptInputs<'a> {
    pub snapshot: &'a Snapshot,
    pub evals: &'a [ObjectiveEval],
    pub objectives: &'a [Objective],
    pub history: &'a [DecisionCycle],
    pub previous_aos: &'a [AnalysisData],
    pub guardrails: &'a GuardrailsConfig,
    pub safety: &'a SafetyConfig,
    /// asset type remaining counts, rendered into the dynamic block
    pub pool_remaining: Vec<(String, String, u32)>,
    pub controlled_sides: &'a BTreeSet<Side>,
    pub friendly_sides: &'a BTreeSet<Side>,
    pub mission_intent: &'a str,
}

/// Build the full decision context from the current tactical picture.
pub fn build_context(inputs: &PromptInputs<'_>, ai: &AiConfig) -> DecisionContext {
    DecisionContext {
        system_prompt: SYSTEM_PROMPT.to_string(),
        standing_block: render_standing_block(inputs),
        dynamic_block: render_dynamic_block(inputs),
        thinking: ThinkingKnobs::from_ai_config(ai),
    }
}

fn render_standing_block(inputs: &PromptInputs<'_>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "## Standing orders");
    let _ = writeln!(
        out,
        "Controlled sides: {}",
        render_side_set(inputs.controlled_sides)
    );
    let _ = writeln!(
        out,
        "Allied sides: {}",
        render_side_set(inputs.friendly_sides)
    );
    match &inputs.guardrails.ao_bounds {
        Some(AoBounds::Circle { center, radius }) => {
            let _ = writeln!(
                out,
                "Area of operations: circle centered [{:.0}, {:.0}] radius {radius:.0} m",
                center[0], center[1]
            );
        }
        Some(AoBounds::Rectangle { min, max }) => {
            let _ = writeln!(
                out,
                "Area of operations: rectangle [{:.0}, {:.0}] to [{:.0}, {:.0}]",
                min[0], min[1], max[0], max[1]
            );
        }
        None => {
            let _ = writeln!(out, "Area of operations: unbounded");
        }
    }
    if !inputs.safety.blocked_commands.is_empty() {
        let _ = writeln!(
            out,
            "Forbidden command types: {}",
            inputs.safety.blocked_commands.join(", ")
        );
    }
    let _ = writeln!(
        out,
        "Assign at most {} groups to any single objective.",
        inputs.safety.max_groups_per_objective
    );

    let _ = writeln!(out, "\n## Resource pool (per-AO caps)");
    if inputs.guardrails.resource_pool.is_empty() {
        let _ = writeln!(out, "(none - deploy_asset is unavailable)");
    } else {
        for (side, assets) in &inputs.guardrails.resource_pool {
            for (asset_type, spec) in assets {
                let defense = if spec.defense_only { " [defense only]" } else { "" };
                let _ = writeln!(out, "- {side} {asset_type}: max {}{defense}", spec.max);
            }
        }
    }

    let _ = writeln!(out, "\n{}", render_objectives(inputs.evals, inputs.objectives));
    let _ = write!(out, "\n{}", render_history(inputs.history));
    if !inputs.previous_aos.is_empty() {
        let _ = write!(out, "\n{}", render_previous_aos(inputs.previous_aos));
    }
    out
}

fn render_dynamic_block(inputs: &PromptInputs<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Current world state");
    let _ = write!(out, "{}", render_world(inputs.snapshot));

    if !inputs.pool_remaining.is_empty() {
        let _ = writeln!(out, "\n## Resource pool remaining");
        for (side, asset_type, remaining) in &inputs.pool_remaining {
            let _ = writeln!(out, "- {side} {asset_type}: {remaining} left");
        }
    }

    let _ = writeln!(out, "\n## Mission intent");
    if inputs.mission_intent.is_empty() {
        let _ = writeln!(out, "(no specific intent given - act on the objectives)");
    } else {
        let _ = writeln!(out, "{}", inputs.mission_intent);
    }
    out
}

/// Objectives block with per-objective posture and the priority scale note.
pub fn render_objectives(evals: &[ObjectiveEval], objectives: &[Objective]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Objectives");
    if evals.is_empty() {
        let _ = writeln!(out, "(none active)");
        return out;
    }
    for eval in evals {
        let description = objectives
            .iter()
            .find(|o| o.id == eval.objective_id)
            .map(|o| o.description.as_str())
            .unwrap_or("");
        let obj = objectives.iter().find(|o| o.id == eval.objective_id);
        let scale = if eval.base_priority <= 10.0 { "0-10" } else { "0-100" };
        let _ = write!(
            out,
            "- {id}: {description} | posture {posture} | priority {dp:.1} ({scale} scale) | friendlies {f} enemies {e}",
            id = eval.objective_id,
            posture = eval.posture,
            dp = eval.dynamic_priority,
            f = eval.friendly_count,
            e = eval.enemy_count,
        );
        if let Some(obj) = obj {
            let _ = write!(
                out,
                " | at [{:.0}, {:.0}] r={:.0} m | task {}",
                obj.position.x, obj.position.y, obj.radius, obj.task_type
            );
        }
        let _ = writeln!(out);
    }
    out
}

/// Last few cycles, newest last, one line per issued command.
pub fn render_history(history: &[DecisionCycle]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Recent order history");
    let tail: Vec<&DecisionCycle> = history.iter().rev().take(HISTORY_CYCLES).rev().collect();
    if tail.is_empty() {
        let _ = writeln!(out, "(no prior cycles this AO)");
        return out;
    }
    for cycle in tail {
        let _ = writeln!(
            out,
            "- cycle {} at t={:.0}s: {} orders",
            cycle.cycle_number,
            cycle.mission_time,
            cycle.orders.len()
        );
        for cmd in &cycle.orders {
            let target = if cmd.group_id.is_empty() { "(spawn)" } else { &cmd.group_id };
            let _ = writeln!(out, "    {} -> {}", cmd.command_type, target);
        }
    }
    out
}

/// Summaries of retained prior AOs for cross-AO continuity.
pub fn render_previous_aos(previous: &[AnalysisData]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Previous areas of operations");
    for analysis in previous {
        let hvts: Vec<String> = analysis
            .hvt_players
            .iter()
            .map(|p| format!("{} ({:.0} pts)", p.uid, p.score))
            .collect();
        let _ = writeln!(
            out,
            "- AO {} on {}: {} cycles, {} orders, high-value players: {}",
            analysis.ao_id,
            analysis.world_name,
            analysis.total_cycles,
            analysis.total_orders_issued,
            if hvts.is_empty() { "none".to_string() } else { hvts.join(", ") }
        );
    }
    out
}

/// Current tactical picture: forces, contacts, weather, casualties.
pub fn render_world(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Mission time: {:.0}s | daytime {:.2} | overcast {:.2} rain {:.2} fog {:.2} wind {:.1} m/s",
        snapshot.mission_time,
        snapshot.daytime,
        snapshot.weather.overcast,
        snapshot.weather.rain,
        snapshot.weather.fog,
        snapshot.weather.wind
    );
    for (side, count) in &snapshot.unit_counts {
        let _ = writeln!(out, "{side}: {count} units total");
    }

    let _ = writeln!(out, "\nYour groups:");
    let mut any = false;
    for group in snapshot.groups.iter().filter(|g| g.is_controlled()) {
        any = true;
        let combat = if group.in_combat { " IN COMBAT" } else { "" };
        let casualties = match &group.detail {
            GroupDetail::Controlled { casualties, .. } => *casualties,
            GroupDetail::Observed { .. } => 0,
        };
        let _ = writeln!(
            out,
            "- {} ({} {} x{}) at [{:.0}, {:.0}]{combat}, {} casualties, waypoint {}",
            group.id,
            group.side,
            group.class.as_str(),
            group.unit_count,
            group.position.x,
            group.position.y,
            casualties,
            if group.waypoint_type.is_empty() { "none" } else { &group.waypoint_type }
        );
    }
    if !any {
        let _ = writeln!(out, "(no controlled groups alive)");
    }

    let _ = writeln!(out, "\nKnown contacts:");
    any = false;
    for group in &snapshot.groups {
        if let GroupDetail::Observed { is_friendly, knowledge } = &group.detail {
            any = true;
            let tag = if *is_friendly { "friendly" } else { "hostile" };
            let _ = writeln!(
                out,
                "- {} {} {} x{} at [{:.0}, {:.0}], knowledge {:.1}",
                tag,
                group.side,
                group.class.as_str(),
                group.unit_count,
                group.position.x,
                group.position.y,
                knowledge
            );
        }
    }
    if !any {
        let _ = writeln!(out, "(no contacts reported)");
    }

    if !snapshot.players.is_empty() {
        let _ = writeln!(out, "\nPlayers:");
        for player in &snapshot.players {
            let _ = writeln!(
                out,
                "- {} ({}) at [{:.0}, {:.0}]",
                player.name, player.side, player.position.x, player.position.y
            );
        }
    }

    if !snapshot.casualty_events.is_empty() {
        let _ = writeln!(out, "\nCasualties since last report:");
        for event in &snapshot.casualty_events {
            let killer = event.killer_uid.as_deref().unwrap_or("unknown");
            let _ = writeln!(
                out,
                "- {} group {} lost a unit (killer: {killer})",
                event.side, event.group_id
            );
        }
    }
    out
}

fn render_side_set(sides: &BTreeSet<Side>) -> String {
    if sides.is_empty() {
        "(none)".to_string()
    } else {
        sides
            .iter()
            .map(Side::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ObjectivePosture, Position};

    fn eval(id: &str, base: f64, dynamic: f64) -> ObjectiveEval {
        ObjectiveEval {
            objective_id: id.to_string(),
            posture: ObjectivePosture::Contested,
            friendly_count: 4,
            enemy_count: 3,
            base_priority: base,
            dynamic_priority: dynamic,
            radius: 200.0,
        }
    }

    fn objective(id: &str) -> Objective {
        Objective {
            id: id.to_string(),
            description: "Hold the crossroads".to_string(),
            priority: 10.0,
            position: Position::new(5000.0, 5000.0, 0.0),
            radius: 200.0,
            task_type: "defend_area".to_string(),
            state: Default::default(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn objectives_block_states_scale() {
        let text = render_objectives(&[eval("obj_a", 10.0, 8.0)], &[objective("obj_a")]);
        assert!(text.contains("0-10 scale"));
        assert!(text.contains("Hold the crossroads"));

        let text = render_objectives(&[eval("obj_b", 80.0, 96.0)], &[]);
        assert!(text.contains("0-100 scale"));
    }

    #[test]
    fn history_block_keeps_last_five() {
        let cycles: Vec<DecisionCycle> = (1..=8)
            .map(|n| DecisionCycle {
                cycle_number: n,
                mission_time: n as f64 * 30.0,
                wall_time: chrono::Utc::now(),
                commentary: String::new(),
                orders: vec![],
                rejected: vec![],
                active_objectives: vec![],
                failure_note: None,
            })
            .collect();
        let text = render_history(&cycles);
        assert!(!text.contains("cycle 3 "));
        assert!(text.contains("cycle 4 "));
        assert!(text.contains("cycle 8 "));
    }

    #[test]
    fn system_prompt_names_all_command_types() {
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
            assert!(SYSTEM_PROMPT.contains(name), "missing {name}");
        }
    }
}
