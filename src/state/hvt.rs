//! High-value-target designation.
//!
//! At AO end, players are ranked by a weighted composite of kills,
//! objective contributions, proximity time, and scored capture events;
//! controlled groups are ranked by casualties inflicted. The top slices of
//! both rankings ride across the AO boundary to seed the next mission.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{CasualtyEvent, HvtGroup, HvtPlayer, PlayerContribution, Side};

/// Scoring weights and slice sizes, all operator-tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HvtWeights {
    pub kills: f64,
    pub contributions: f64,
    /// Points per second spent inside an active objective
    pub proximity: f64,
    /// Multiplier over the capture-event point values
    pub capture: f64,
    /// N: players carried forward
    pub top_players: usize,
    /// M: controlled groups carried forward
    pub top_groups: usize,
    /// Radius for the nearby-player proximity bonus, capped at 100 m
    pub proximity_radius_m: f64,
}

impl Default for HvtWeights {
    fn default() -> Self {
        Self {
            kills: 10.0,
            contributions: 5.0,
            proximity: 0.1,
            capture: 1.0,
            top_players: 3,
            top_groups: 3,
            proximity_radius_m: 50.0,
        }
    }
}

impl HvtWeights {
    /// Clamp operator input into the documented ranges.
    pub fn sanitized(mut self) -> Self {
        self.proximity_radius_m = self.proximity_radius_m.clamp(0.0, 100.0);
        self
    }
}

/// Composite score for one player.
pub fn player_score(contribution: &PlayerContribution, weights: &HvtWeights) -> f64 {
    weights.kills * contribution.kills as f64
        + weights.contributions * contribution.objective_contributions as f64
        + weights.proximity * contribution.proximity_time_secs
        + weights.capture * contribution.capture_score
}

/// Rank players and take the top N. Ties break on UID so the output is
/// stable across runs.
pub fn designate_players(
    contributions: &BTreeMap<String, PlayerContribution>,
    weights: &HvtWeights,
) -> Vec<HvtPlayer> {
    let mut ranked: Vec<HvtPlayer> = contributions
        .iter()
        .map(|(uid, c)| HvtPlayer {
            uid: uid.clone(),
            score: player_score(c, weights),
        })
        .filter(|p| p.score > 0.0)
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.uid.cmp(&b.uid)));
    ranked.truncate(weights.top_players);
    ranked
}

/// Rank controlled groups by casualties they inflicted and take the top M.
pub fn designate_groups(
    casualties: &[CasualtyEvent],
    group_sides: &BTreeMap<String, Side>,
    controlled_sides: &BTreeSet<Side>,
    weights: &HvtWeights,
) -> Vec<HvtGroup> {
    let mut kills: BTreeMap<&str, u32> = BTreeMap::new();
    for event in casualties {
        if let Some(killer) = event.killer_group_id.as_deref() {
            let controlled = group_sides
                .get(killer)
                .map(|side| controlled_sides.contains(side))
                .unwrap_or(false);
            if controlled {
                *kills.entry(killer).or_insert(0) += 1;
            }
        }
    }
    let mut ranked: Vec<HvtGroup> = kills
        .into_iter()
        .map(|(group_id, kills_attributed)| HvtGroup {
            group_id: group_id.to_string(),
            kills_attributed,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.kills_attributed
            .cmp(&a.kills_attributed)
            .then_with(|| a.group_id.cmp(&b.group_id))
    });
    ranked.truncate(weights.top_groups);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contribution(kills: u32, objectives: u32, proximity: f64, capture: f64) -> PlayerContribution {
        PlayerContribution {
            kills,
            objective_contributions: objectives,
            proximity_time_secs: proximity,
            capture_score: capture,
        }
    }

    #[test]
    fn capture_scores_rank_players() {
        let mut contributions = BTreeMap::new();
        contributions.insert("A".to_string(), contribution(0, 0, 0.0, 40.0));
        contributions.insert("B".to_string(), contribution(0, 0, 0.0, 25.0));
        contributions.insert("C".to_string(), contribution(0, 0, 0.0, 10.0));

        let weights = HvtWeights {
            top_players: 2,
            ..Default::default()
        };
        let ranked = designate_players(&contributions, &weights);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].uid, "A");
        assert_eq!(ranked[0].score, 40.0);
        assert_eq!(ranked[1].uid, "B");
    }

    #[test]
    fn zero_score_players_are_omitted() {
        let mut contributions = BTreeMap::new();
        contributions.insert("idle".to_string(), contribution(0, 0, 0.0, 0.0));
        assert!(designate_players(&contributions, &HvtWeights::default()).is_empty());
    }

    #[test]
    fn weights_combine_linearly() {
        let c = contribution(2, 3, 100.0, 15.0);
        let weights = HvtWeights::default();
        // 10*2 + 5*3 + 0.1*100 + 1*15
        assert!((player_score(&c, &weights) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn group_ranking_only_counts_controlled() {
        let group_sides: BTreeMap<String, Side> = [
            ("GRP_E".to_string(), Side::East),
            ("GRP_W".to_string(), Side::West),
        ]
        .into_iter()
        .collect();
        let controlled = BTreeSet::from([Side::East]);
        let event = |killer: &str| CasualtyEvent {
            group_id: "victim".to_string(),
            side: Side::West,
            killer_uid: None,
            killer_group_id: Some(killer.to_string()),
            position: None,
            mission_time: 0.0,
        };
        let casualties = vec![event("GRP_E"), event("GRP_E"), event("GRP_W")];
        let ranked = designate_groups(
            &casualties,
            &group_sides,
            &controlled,
            &HvtWeights::default(),
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].group_id, "GRP_E");
        assert_eq!(ranked[0].kills_attributed, 2);
    }

    #[test]
    fn radius_is_capped() {
        let weights = HvtWeights {
            proximity_radius_m: 900.0,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(weights.proximity_radius_m, 100.0);
    }
}
