// Balance tables and tuning knobs for taming and combat.

use serde::{Deserialize, Serialize};

// Wild level roll: uniform [1, LEVEL_ROLL_MAX] times LEVEL_STEP
pub const LEVEL_ROLL_MAX: u32 = 30;
pub const LEVEL_STEP: u32 = 5;

// Weapon quality roll bounds (percent)
pub const QUALITY_MIN: f64 = 100.0;
pub const QUALITY_MAX: f64 = 350.0;

// Effectiveness bounds (percent)
pub const EFFECTIVENESS_MAX: f64 = 100.0;
pub const EFFECTIVENESS_MIN: f64 = 1.0;

// Safety chance never decays below this
pub const SAFETY_FLOOR: f64 = 0.01;
pub const SAFETY_DECAY: f64 = 0.9;

// Per-feeding penalty U{1..15}
pub const FEEDING_PENALTY: (u32, u32) = (1, 15);
// "Hit by you" negative event penalty U{5..15}
pub const HIT_BY_TAMER_PENALTY: (u32, u32) = (5, 15);

// Boss pot: fraction of each boss's max health
pub const BOSS_POT_FACTOR: f64 = 0.001;

/// A feeding material tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KibbleProfile {
    pub key: &'static str,
    /// Food points covered by one feeding.
    pub power: f64,
    /// Currency cost per contribution.
    pub cost: i64,
    /// Probability a feeding does not degrade effectiveness.
    pub safety: f64,
}

pub const KIBBLES: [KibbleProfile; 6] = [
    KibbleProfile { key: "basic", power: 1000.0, cost: 1, safety: 0.80 },
    KibbleProfile { key: "simple", power: 1500.0, cost: 2, safety: 0.83 },
    KibbleProfile { key: "regular", power: 2250.0, cost: 4, safety: 0.86 },
    KibbleProfile { key: "superior", power: 3000.0, cost: 8, safety: 0.90 },
    KibbleProfile { key: "exceptional", power: 4000.0, cost: 16, safety: 0.93 },
    KibbleProfile { key: "extraordinary", power: 5500.0, cost: 32, safety: 0.96 },
];

/// Look up a kibble tier by its (case-insensitive) key.
pub fn kibble(key: &str) -> Option<&'static KibbleProfile> {
    let key = key.trim();
    KIBBLES.iter().find(|k| k.key.eq_ignore_ascii_case(key))
}

/// A subdual or lethal tool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeaponProfile {
    pub name: &'static str,
    pub damage: f64,
    pub torpor: f64,
    pub durability: f64,
}

// Torpor-oriented tools, used for subdual
pub const TORPOR_WEAPONS: [WeaponProfile; 6] = [
    WeaponProfile { name: "Wooden Club", damage: 5.0, torpor: 20.0, durability: 40.0 },
    WeaponProfile { name: "Slingshot", damage: 14.0, torpor: 18.0, durability: 40.0 },
    WeaponProfile { name: "Tranquilizer Arrow", damage: 20.0, torpor: 90.0, durability: 35.0 },
    WeaponProfile { name: "Crossbow Tranq", damage: 35.0, torpor: 157.0, durability: 50.0 },
    WeaponProfile { name: "Tranq Dart", damage: 26.0, torpor: 221.0, durability: 60.0 },
    WeaponProfile { name: "Shocking Tranq Dart", damage: 26.0, torpor: 442.0, durability: 40.0 },
];

// Lethal tools, zero torpor
pub const LETHAL_WEAPONS: [WeaponProfile; 5] = [
    WeaponProfile { name: "Pike", damage: 27.0, torpor: 0.0, durability: 80.0 },
    WeaponProfile { name: "Sword", damage: 40.0, torpor: 0.0, durability: 70.0 },
    WeaponProfile { name: "Pistol", damage: 45.0, torpor: 0.0, durability: 70.0 },
    WeaponProfile { name: "Assault Rifle", damage: 35.0, torpor: 0.0, durability: 80.0 },
    WeaponProfile { name: "Pump-Action Shotgun", damage: 70.0, torpor: 0.0, durability: 50.0 },
];

/// Tunable probabilities and multipliers for the combat and taming modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSettings {
    /// Chance a contribution rolls a lethal tool instead of a torpor tool.
    pub lethal_tool_chance: f64,
    /// Chance of a negative event after the feeding loop.
    pub negative_event_chance: f64,
    pub duel_crit_chance: f64,
    pub duel_crit_multiplier: f64,
    pub arena_crit_chance: f64,
    pub arena_crit_multiplier: f64,
    /// Base damage multiplier applied to both rosters in a boss arena.
    pub boss_damage_multiplier: f64,
    pub boss_fighter_crit_chance: f64,
    pub boss_crit_chance: f64,
    /// Inclusive crit multiplier range in a boss arena.
    pub boss_crit_range: (u32, u32),
    /// Chance a readiness tick arms a boss arena instead of a normal arena.
    pub boss_ready_chance: f64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            lethal_tool_chance: 0.25,
            negative_event_chance: 0.05,
            duel_crit_chance: 0.25,
            duel_crit_multiplier: 3.0,
            arena_crit_chance: 0.25,
            arena_crit_multiplier: 3.0,
            boss_damage_multiplier: 5.0,
            boss_fighter_crit_chance: 0.25,
            boss_crit_chance: 0.10,
            boss_crit_range: (2, 6),
            boss_ready_chance: 0.25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kibble_tiers_monotonic() {
        for pair in KIBBLES.windows(2) {
            assert!(pair[1].power > pair[0].power);
            assert!(pair[1].cost > pair[0].cost);
        }
    }

    #[test]
    fn test_kibble_lookup_case_insensitive() {
        assert_eq!(kibble("Basic").map(|k| k.cost), Some(1));
        assert_eq!(kibble(" extraordinary ").map(|k| k.cost), Some(32));
        assert!(kibble("golden").is_none());
    }

    #[test]
    fn test_weapon_tables_disjoint() {
        assert!(TORPOR_WEAPONS.iter().all(|w| w.torpor > 0.0));
        assert!(LETHAL_WEAPONS.iter().all(|w| w.torpor == 0.0));
        for w in &TORPOR_WEAPONS {
            assert!(LETHAL_WEAPONS.iter().all(|l| l.name != w.name));
        }
    }
}
