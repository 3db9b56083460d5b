//! Objective evaluator.
//!
//! Pure functions that classify each objective's tactical posture from a
//! snapshot and compute its dynamic priority. No engine state involved —
//! identical inputs always produce identical outputs, which is what makes
//! the decision predicate and the prompt builder testable.

use crate::types::{Objective, ObjectiveEval, ObjectivePosture, Snapshot};

/// Evaluate every objective against the snapshot.
///
/// Results are ordered for downstream consumption: higher dynamic priority
/// first, then smaller radius, then lexicographic ID.
pub fn evaluate(snapshot: &Snapshot, objectives: &[Objective]) -> Vec<ObjectiveEval> {
    let mut evals: Vec<ObjectiveEval> = objectives
        .iter()
        .map(|obj| evaluate_one(snapshot, obj))
        .collect();

    evals.sort_by(|a, b| {
        b.dynamic_priority
            .total_cmp(&a.dynamic_priority)
            .then(a.radius.total_cmp(&b.radius))
            .then_with(|| a.objective_id.cmp(&b.objective_id))
    });
    evals
}

/// Classify one objective.
///
/// Friendly strength is the unit count of controlled-side groups and players
/// inside the effect radius; enemy strength is everyone else except allies.
/// With no controlled sides at all there is no force to assess posture for,
/// and every objective reads as undefended.
pub fn evaluate_one(snapshot: &Snapshot, objective: &Objective) -> ObjectiveEval {
    let mut friendly_count: u32 = 0;
    let mut enemy_count: u32 = 0;

    if !snapshot.controlled_sides.is_empty() {
        for group in &snapshot.groups {
            if group.position.distance_2d(&objective.position) > objective.radius {
                continue;
            }
            if snapshot.controlled_sides.contains(&group.side) {
                friendly_count += group.unit_count;
            } else if !snapshot.friendly_sides.contains(&group.side) {
                enemy_count += group.unit_count;
            }
        }
        for player in &snapshot.players {
            if player.position.distance_2d(&objective.position) > objective.radius {
                continue;
            }
            if snapshot.controlled_sides.contains(&player.side) {
                friendly_count += 1;
            } else if !snapshot.friendly_sides.contains(&player.side) {
                enemy_count += 1;
            }
        }
    }

    let posture = derive_posture(snapshot, friendly_count, enemy_count);
    let dynamic_priority = dynamic_priority(objective.priority, posture);

    ObjectiveEval {
        objective_id: objective.id.clone(),
        posture,
        friendly_count,
        enemy_count,
        base_priority: objective.priority,
        dynamic_priority,
        radius: objective.radius,
    }
}

fn derive_posture(snapshot: &Snapshot, friendly: u32, enemy: u32) -> ObjectivePosture {
    if snapshot.controlled_sides.is_empty() {
        return ObjectivePosture::Undefended;
    }
    if enemy == 0 && friendly > 0 {
        ObjectivePosture::Secured
    } else if enemy > 0 && enemy >= 2 * friendly {
        ObjectivePosture::Threatened
    } else if enemy > 0 {
        ObjectivePosture::Contested
    } else {
        ObjectivePosture::Undefended
    }
}

/// `base × posture modifier`, clamped to whichever scale the base is on.
pub fn dynamic_priority(base: f64, posture: ObjectivePosture) -> f64 {
    let raw = base * posture.priority_modifier();
    if base <= 10.0 {
        raw.clamp(0.0, 10.0)
    } else {
        raw.clamp(0.0, 100.0)
    }
}
