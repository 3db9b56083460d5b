//! Resource pool: the inventory the LLM may draw spawns from.
//!
//! Partitioned by side and asset type with per-type caps. Deployment counts
//! are per-AO and reset when a new AO starts. The AO-defense phase is a
//! plain flag with an idempotent setter; while inactive, `defense_only`
//! assets are rejected.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::config::{AssetPoolSpec, GuardrailsConfig};
use crate::types::Side;

/// Why a pool draw was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolRejection {
    #[error("no pool configured for side {0}")]
    UnknownSide(Side),
    #[error("no asset type \"{0}\" in the pool")]
    UnknownAsset(String),
    #[error("pool exhausted for {0} {1}")]
    Exhausted(Side, String),
    #[error("asset type \"{0}\" is defense-only and the AO defense phase is inactive")]
    DefenseOnly(String),
}

#[derive(Debug, Clone, Serialize)]
struct PoolEntry {
    spec: AssetPoolSpec,
    deployed: u32,
}

/// side → asset type → entry, plus the defense-phase flag.
#[derive(Debug, Default)]
pub struct ResourcePool {
    pools: BTreeMap<Side, BTreeMap<String, PoolEntry>>,
    defense_phase_active: bool,
}

impl ResourcePool {
    /// Build from the guardrails config. Unknown side spellings are a
    /// config error surfaced at init.
    pub fn from_config(guardrails: &GuardrailsConfig) -> Result<Self, String> {
        let mut pools: BTreeMap<Side, BTreeMap<String, PoolEntry>> = BTreeMap::new();
        for (side_name, assets) in &guardrails.resource_pool {
            let side = Side::from_str(side_name)
                .ok_or_else(|| format!("resource pool: unknown side \"{side_name}\""))?;
            let entry = pools.entry(side).or_default();
            for (asset_type, spec) in assets {
                entry.insert(
                    asset_type.clone(),
                    PoolEntry {
                        spec: spec.clone(),
                        deployed: 0,
                    },
                );
            }
        }
        Ok(Self {
            pools,
            defense_phase_active: false,
        })
    }

    /// Check a draw without committing it.
    pub fn check(&self, side: Side, asset_type: &str) -> Result<(), PoolRejection> {
        let assets = self
            .pools
            .get(&side)
            .ok_or(PoolRejection::UnknownSide(side))?;
        let entry = assets
            .get(asset_type)
            .ok_or_else(|| PoolRejection::UnknownAsset(asset_type.to_string()))?;
        if entry.spec.defense_only && !self.defense_phase_active {
            return Err(PoolRejection::DefenseOnly(asset_type.to_string()));
        }
        if entry.deployed >= entry.spec.max {
            return Err(PoolRejection::Exhausted(side, asset_type.to_string()));
        }
        Ok(())
    }

    /// Commit a draw. Fails exactly when `check` would.
    pub fn reserve(&mut self, side: Side, asset_type: &str) -> Result<(), PoolRejection> {
        self.check(side, asset_type)?;
        if let Some(entry) = self.pools.get_mut(&side).and_then(|a| a.get_mut(asset_type)) {
            entry.deployed += 1;
        }
        Ok(())
    }

    pub fn remaining(&self, side: Side, asset_type: &str) -> Option<u32> {
        self.pools
            .get(&side)
            .and_then(|a| a.get(asset_type))
            .map(|e| e.spec.max.saturating_sub(e.deployed))
    }

    /// Class names configured for an asset type, consulted when the LLM
    /// omits or fabricates unit classes.
    pub fn classnames(&self, side: Side, asset_type: &str) -> Option<&[String]> {
        self.pools
            .get(&side)
            .and_then(|a| a.get(asset_type))
            .map(|e| e.spec.classnames.as_slice())
    }

    /// (side, asset type, remaining) rows for the prompt.
    pub fn remaining_summary(&self) -> Vec<(String, String, u32)> {
        let mut rows = Vec::new();
        for (side, assets) in &self.pools {
            for (asset_type, entry) in assets {
                rows.push((
                    side.to_string(),
                    asset_type.clone(),
                    entry.spec.max.saturating_sub(entry.deployed),
                ));
            }
        }
        rows
    }

    /// Reset per-AO deployment counts.
    pub fn reset_counts(&mut self) {
        for assets in self.pools.values_mut() {
            for entry in assets.values_mut() {
                entry.deployed = 0;
            }
        }
    }

    // ------------------------------------------------------------------
    // Admin surface
    // ------------------------------------------------------------------

    pub fn add_asset(&mut self, side: Side, asset_type: String, spec: AssetPoolSpec) {
        info!(side = %side, asset = %asset_type, max = spec.max, "resource pool asset added");
        self.pools
            .entry(side)
            .or_default()
            .insert(asset_type, PoolEntry { spec, deployed: 0 });
    }

    pub fn remove_asset(&mut self, side: Side, asset_type: &str) -> bool {
        self.pools
            .get_mut(&side)
            .map(|assets| assets.remove(asset_type).is_some())
            .unwrap_or(false)
    }

    pub fn clear_side(&mut self, side: Side) {
        self.pools.remove(&side);
    }

    /// Idempotent defense-phase setter.
    pub fn set_defense_phase(&mut self, active: bool) {
        if self.defense_phase_active != active {
            info!(active, "AO defense phase changed");
        }
        self.defense_phase_active = active;
    }

    pub fn defense_phase_active(&self) -> bool {
        self.defense_phase_active
    }

    /// Replace this side's inventory with a named template.
    pub fn load_template(&mut self, name: &str, side: Side) -> Result<(), String> {
        let template = builtin_templates()
            .into_iter()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| format!("no resource template named \"{name}\""))?;
        let assets: BTreeMap<String, PoolEntry> = template
            .1
            .into_iter()
            .map(|(asset_type, spec)| (asset_type, PoolEntry { spec, deployed: 0 }))
            .collect();
        info!(template = name, side = %side, assets = assets.len(), "resource template loaded");
        self.pools.insert(side, assets);
        Ok(())
    }
}

/// Built-in inventories selectable through `load_resource_template`.
pub fn builtin_templates() -> Vec<(&'static str, Vec<(String, AssetPoolSpec)>)> {
    fn spec(classnames: &[&str], max: u32, defense_only: bool, description: &str) -> AssetPoolSpec {
        AssetPoolSpec {
            classnames: classnames.iter().map(|s| s.to_string()).collect(),
            max,
            defense_only,
            description: Some(description.to_string()),
        }
    }

    vec![
        (
            "light_garrison",
            vec![
                (
                    "infantry_squad".to_string(),
                    spec(&["RIFLE_SQUAD", "WEAPONS_SQUAD"], 4, false, "Basic rifle squads"),
                ),
                (
                    "recon_team".to_string(),
                    spec(&["RECON_TEAM"], 2, false, "Two-man recon elements"),
                ),
            ],
        ),
        (
            "motorized_company",
            vec![
                (
                    "infantry_squad".to_string(),
                    spec(&["RIFLE_SQUAD", "WEAPONS_SQUAD"], 6, false, "Basic rifle squads"),
                ),
                (
                    "motorized_patrol".to_string(),
                    spec(&["TRUCK_ARMED", "TRUCK_TRANSPORT"], 4, false, "Armed truck patrols"),
                ),
                (
                    "aa_team".to_string(),
                    spec(&["AA_TEAM"], 2, true, "Anti-air, defense phase only"),
                ),
            ],
        ),
        (
            "combined_arms",
            vec![
                (
                    "infantry_squad".to_string(),
                    spec(&["RIFLE_SQUAD", "WEAPONS_SQUAD", "AT_SQUAD"], 8, false, "Rifle and AT squads"),
                ),
                (
                    "mechanized_section".to_string(),
                    spec(&["IFV_SECTION"], 3, false, "IFV with dismounts"),
                ),
                (
                    "armor_platoon".to_string(),
                    spec(&["MBT_PLATOON"], 2, false, "Main battle tanks"),
                ),
                (
                    "aa_team".to_string(),
                    spec(&["AA_TEAM"], 2, true, "Anti-air, defense phase only"),
                ),
            ],
        ),
    ]
}
