// Stat definitions and leveled stat generation.

use serde::{Deserialize, Serialize};

/// The eight creature stats, in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatKind {
    Health,
    Stamina,
    Oxygen,
    Food,
    Weight,
    Damage,
    Speed,
    Torpor,
}

pub const STAT_COUNT: usize = 8;

impl StatKind {
    pub const ALL: [StatKind; STAT_COUNT] = [
        StatKind::Health,
        StatKind::Stamina,
        StatKind::Oxygen,
        StatKind::Food,
        StatKind::Weight,
        StatKind::Damage,
        StatKind::Speed,
        StatKind::Torpor,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Base value, per-wild-level growth and tame bonus percent for one stat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatDef {
    #[serde(rename = "Base", alias = "base", default)]
    pub base: f64,
    #[serde(rename = "Wild", alias = "wild", alias = "growth", default)]
    pub growth: f64,
    #[serde(rename = "Tame", alias = "tame", default)]
    pub tame_bonus: f64,
}

/// All stat definitions of a species, indexed by `StatKind`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatTable(pub [StatDef; STAT_COUNT]);

impl StatTable {
    pub fn get(&self, kind: StatKind) -> &StatDef {
        &self.0[kind.index()]
    }

    pub fn set(&mut self, kind: StatKind, def: StatDef) {
        self.0[kind.index()] = def;
    }
}

/// Stat block persisted on a tamed creature (torpor is not kept).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatBlock {
    pub health: i64,
    pub stamina: i64,
    pub oxygen: i64,
    pub food: i64,
    pub weight: i64,
    pub damage: i64,
    pub speed: i64,
}

/// Result of generating stats for a level/effectiveness pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeveledStats {
    /// Totals per stat, indexed by `StatKind`.
    pub totals: [i64; STAT_COUNT],
    /// Levels granted by taming effectiveness.
    pub bonus_levels: u32,
}

impl LeveledStats {
    pub fn get(&self, kind: StatKind) -> i64 {
        self.totals[kind.index()]
    }

    /// Level after taming: wild level plus effectiveness bonus levels.
    pub fn level(&self, wild_level: u32) -> u32 {
        wild_level + self.bonus_levels
    }

    pub fn block(&self) -> StatBlock {
        StatBlock {
            health: self.get(StatKind::Health),
            stamina: self.get(StatKind::Stamina),
            oxygen: self.get(StatKind::Oxygen),
            food: self.get(StatKind::Food),
            weight: self.get(StatKind::Weight),
            damage: self.get(StatKind::Damage),
            speed: self.get(StatKind::Speed),
        }
    }
}

/// Bonus levels granted for a tame at `effectiveness` percent.
pub fn bonus_levels(wild_level: u32, effectiveness: f64) -> u32 {
    if effectiveness <= 0.0 {
        return 0;
    }
    let growth_levels = wild_level.saturating_sub(1) as f64;
    (growth_levels * (effectiveness / 100.0) / 2.0).floor() as u32
}

/// Compute a single stat at the given wild level (no taming bonus).
pub fn wild_stat(def: &StatDef, wild_level: u32) -> f64 {
    def.base + def.growth * wild_level.saturating_sub(1) as f64
}

/// Generate every stat for `wild_level`, applying the taming bonus when `effectiveness > 0`.
///
/// Each bonus level adds `total * tame_bonus / 100` to a stat, so the bonus scales
/// with both the wild growth already accumulated and the species' tame bonus.
pub fn generate(table: &StatTable, wild_level: u32, effectiveness: f64) -> LeveledStats {
    let bonus = bonus_levels(wild_level, effectiveness);
    let mut totals = [0i64; STAT_COUNT];
    for kind in StatKind::ALL {
        let def = table.get(kind);
        let mut total = wild_stat(def, wild_level);
        if bonus > 0 {
            total += bonus as f64 * total * (def.tame_bonus / 100.0);
        }
        totals[kind.index()] = total.floor() as i64;
    }
    LeveledStats {
        totals,
        bonus_levels: bonus,
    }
}
