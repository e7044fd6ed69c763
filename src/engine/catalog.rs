// Species catalog: loading, filtering and boss grouping.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, GameResult};

use super::stats::{wild_stat, StatDef, StatKind, StatTable};

/// Stats block as written by the catalog converter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawStats {
    #[serde(default)]
    health: StatDef,
    #[serde(default)]
    stamina: StatDef,
    #[serde(default)]
    oxygen: StatDef,
    #[serde(default)]
    food: StatDef,
    #[serde(default)]
    weight: StatDef,
    #[serde(default)]
    damage: StatDef,
    #[serde(default)]
    speed: StatDef,
    #[serde(default)]
    torpor: StatDef,
}

impl From<RawStats> for StatTable {
    fn from(raw: RawStats) -> Self {
        let mut table = StatTable::default();
        table.set(StatKind::Health, raw.health);
        table.set(StatKind::Stamina, raw.stamina);
        table.set(StatKind::Oxygen, raw.oxygen);
        table.set(StatKind::Food, raw.food);
        table.set(StatKind::Weight, raw.weight);
        table.set(StatKind::Damage, raw.damage);
        table.set(StatKind::Speed, raw.speed);
        table.set(StatKind::Torpor, raw.torpor);
        table
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSpecies {
    #[serde(default)]
    id: Option<u32>,
    #[serde(alias = "name")]
    name: String,
    #[serde(default, alias = "Varianten", alias = "variant")]
    variant: String,
    #[serde(default, alias = "boss")]
    boss: String,
    #[serde(default, alias = "maps")]
    maps: Vec<String>,
    #[serde(default = "default_weight", alias = "spawn_chance", alias = "spawnWeight")]
    spawn_weight: f64,
    #[serde(default)]
    stats: RawStats,
}

fn default_weight() -> f64 {
    1.0
}

/// Immutable creature or boss definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Species {
    pub id: u32,
    pub name: String,
    pub variant: String,
    /// Boss group key; bosses only spawn in boss arenas.
    pub boss_group: Option<String>,
    pub habitats: Vec<String>,
    pub spawn_weight: f64,
    pub stats: StatTable,
}

impl Species {
    pub fn is_boss(&self) -> bool {
        self.boss_group.is_some()
    }

    /// Whether this species may appear in a normal (non-boss) spawn.
    pub fn is_wild_spawnable(&self) -> bool {
        !self.is_boss() && !self.habitats.is_empty()
    }

    pub fn lives_in(&self, habitats: &[String]) -> bool {
        self.habitats
            .iter()
            .any(|h| habitats.iter().any(|wanted| wanted.eq_ignore_ascii_case(h)))
    }

    /// Stat at the given wild level, without taming bonus.
    pub fn stat_at(&self, kind: StatKind, wild_level: u32) -> f64 {
        wild_stat(self.stats.get(kind), wild_level)
    }

    /// Display name including the variant label, if any.
    pub fn display_name(&self) -> String {
        if self.variant.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.variant)
        }
    }
}

/// Wild-level stat preview sent with spawn events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatPreview {
    pub health: f64,
    pub damage: f64,
    pub torpor: f64,
}

impl StatPreview {
    /// `base + growth * level` per stat. `wild_stat` counts growth from level 2.
    pub fn of(species: &Species, wild_level: u32) -> Self {
        let at = |kind: StatKind| {
            let def = species.stats.get(kind);
            def.base + def.growth * wild_level as f64
        };
        Self {
            health: at(StatKind::Health),
            damage: at(StatKind::Damage),
            torpor: at(StatKind::Torpor),
        }
    }
}

/// Split a habitat argument on commas or semicolons, trimming blanks.
pub fn parse_habitats(arg: &str) -> Vec<String> {
    arg.split([',', ';'])
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

/// Loaded catalog: wild species eligible for spawns plus boss groups.
#[derive(Debug, Clone, Default)]
pub struct SpeciesCatalog {
    wild: Vec<Species>,
    bosses: BTreeMap<String, Vec<Species>>,
}

impl SpeciesCatalog {
    /// Build a catalog, dropping species without habitats and routing bosses to their groups.
    pub fn new(species: Vec<Species>) -> Self {
        let mut catalog = SpeciesCatalog::default();
        for s in species {
            match &s.boss_group {
                Some(group) => catalog.bosses.entry(group.clone()).or_default().push(s),
                None if s.is_wild_spawnable() => catalog.wild.push(s),
                None => {}
            }
        }
        catalog
    }

    /// Parse a JSON array of species definitions.
    pub fn from_json(json: &str) -> GameResult<Self> {
        let raw: Vec<RawSpecies> = serde_json::from_str(json)
            .map_err(|e| GameError::Configuration(format!("failed to parse catalog: {e}")))?;
        let species = raw
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                let boss = r.boss.trim();
                Species {
                    id: r.id.unwrap_or(i as u32),
                    name: r.name.trim().to_string(),
                    variant: r.variant.trim().to_string(),
                    boss_group: (!boss.is_empty()).then(|| boss.to_string()),
                    habitats: r
                        .maps
                        .iter()
                        .map(|m| m.trim())
                        .filter(|m| !m.is_empty())
                        .map(str::to_string)
                        .collect(),
                    spawn_weight: r.spawn_weight,
                    stats: r.stats.into(),
                }
            })
            .collect();
        Ok(Self::new(species))
    }

    /// Load the catalog file, failing if it is missing or yields no spawnable species.
    pub fn load(path: &Path) -> GameResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GameError::Configuration(format!("failed to read catalog '{}': {e}", path.display()))
        })?;
        let catalog = Self::from_json(&contents)?;
        if catalog.wild.is_empty() {
            return Err(GameError::Configuration(format!(
                "no species with maps found in '{}'",
                path.display()
            )));
        }
        tracing::info!(
            wild = catalog.wild.len(),
            boss_groups = catalog.bosses.len(),
            "Loaded species catalog"
        );
        Ok(catalog)
    }

    /// Keep only wild species living in one of `habitats` (case-insensitive).
    /// Boss groups are left untouched.
    pub fn filter_habitats(&self, habitats: &[String]) -> Self {
        Self {
            wild: self
                .wild
                .iter()
                .filter(|s| s.lives_in(habitats))
                .cloned()
                .collect(),
            bosses: self.bosses.clone(),
        }
    }

    pub fn wild(&self) -> &[Species] {
        &self.wild
    }

    pub fn boss_groups(&self) -> impl Iterator<Item = &str> {
        self.bosses.keys().map(String::as_str)
    }

    pub fn boss_group(&self, key: &str) -> Option<&[Species]> {
        self.bosses.get(key).map(Vec::as_slice)
    }

    pub fn find(&self, name: &str) -> Option<&Species> {
        self.wild
            .iter()
            .chain(self.bosses.values().flatten())
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"[
        {"Name": "Raptor", "Varianten": "", "Boss": "", "Maps": ["The Island", "Ragnarok"],
         "SpawnWeight": 3,
         "Stats": {
            "Health": {"Base": 200, "Wild": 40, "Tame": 7},
            "Food": {"Base": 1200, "Wild": 120, "Tame": 0},
            "Damage": {"Base": 15, "Wild": 1, "Tame": 2},
            "Torpor": {"Base": 180, "Wild": 10.8}
         }},
        {"Name": "Dodo", "Maps": ["The Island"], "spawn_chance": 1,
         "Stats": {"Health": {"Base": 40, "Wild": 8, "Tame": 5}}},
        {"Name": "Phantom", "Maps": []},
        {"Name": "Broodmother", "Boss": "Island Trio", "Maps": [],
         "Stats": {"Health": {"Base": 5000}, "Damage": {"Base": 60}}},
        {"Name": "Megapithecus", "Boss": "Island Trio", "Maps": [],
         "Stats": {"Health": {"Base": 7000}, "Damage": {"Base": 80}}}
    ]"#;

    #[test]
    fn test_from_json_filters_and_groups() {
        let catalog = SpeciesCatalog::from_json(SAMPLE).unwrap();
        let names: Vec<_> = catalog.wild().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Raptor", "Dodo"]);
        assert_eq!(catalog.boss_groups().collect::<Vec<_>>(), vec!["Island Trio"]);
        assert_eq!(catalog.boss_group("Island Trio").unwrap().len(), 2);
    }

    #[test]
    fn test_from_json_fields() {
        let catalog = SpeciesCatalog::from_json(SAMPLE).unwrap();
        let raptor = catalog.find("raptor").unwrap();
        assert_eq!(raptor.id, 0);
        assert_eq!(raptor.spawn_weight, 3.0);
        assert_eq!(raptor.stats.get(StatKind::Torpor).growth, 10.8);
        assert_eq!(raptor.stat_at(StatKind::Health, 11), 600.0);
        let dodo = catalog.find("Dodo").unwrap();
        assert_eq!(dodo.spawn_weight, 1.0);
        assert_eq!(dodo.display_name(), "Dodo");
    }

    #[test]
    fn test_preview_counts_every_wild_level() {
        let catalog = SpeciesCatalog::from_json(SAMPLE).unwrap();
        let raptor = catalog.find("Raptor").unwrap();
        let preview = StatPreview::of(raptor, 10);
        assert_eq!(preview.health, 600.0);
        assert_eq!(preview.damage, 25.0);
        assert!((preview.torpor - 288.0).abs() < 1e-9);
    }

    #[test]
    fn test_filter_habitats_case_insensitive() {
        let catalog = SpeciesCatalog::from_json(SAMPLE).unwrap();
        let ragnarok = catalog.filter_habitats(&parse_habitats("ragnarok"));
        assert_eq!(ragnarok.wild().len(), 1);
        let island = catalog.filter_habitats(&parse_habitats(" The Island ;Aberration"));
        assert_eq!(island.wild().len(), 2);
        let none = catalog.filter_habitats(&parse_habitats("Valguero"));
        assert!(none.wild().is_empty());
        assert_eq!(none.boss_groups().count(), 1);
    }

    #[test]
    fn test_parse_habitats() {
        assert_eq!(parse_habitats("a, b;;c ,"), vec!["a", "b", "c"]);
        assert!(parse_habitats(" ; ").is_empty());
    }

    #[test]
    fn test_malformed_json_is_configuration_error() {
        let err = SpeciesCatalog::from_json("{not json").unwrap_err();
        assert!(matches!(err, GameError::Configuration(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SpeciesCatalog::load(Path::new("/nonexistent/Dinos.json")).unwrap_err();
        assert!(matches!(err, GameError::Configuration(_)));
    }
}
