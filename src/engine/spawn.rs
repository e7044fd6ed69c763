// Weighted species selection, boss group selection and wild level rolls.

use rand::Rng;

use super::catalog::{Species, SpeciesCatalog};
use super::config::{LEVEL_ROLL_MAX, LEVEL_STEP};

/// Pick an index from `weights` proportionally to its weight.
///
/// Draws uniformly in `[0, total)` and returns the first index whose cumulative
/// weight meets or exceeds the draw. Non-positive weights are never chosen.
pub fn weighted_index<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if weights.is_empty() || total <= 0.0 {
        return None;
    }
    let roll = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    let mut last_positive = None;
    for (i, &w) in weights.iter().enumerate() {
        if w <= 0.0 {
            continue;
        }
        cumulative += w;
        last_positive = Some(i);
        if roll <= cumulative {
            return Some(i);
        }
    }
    // Float accumulation can leave the roll a hair above the final sum
    last_positive
}

/// Pick one wild species by spawn weight.
pub fn select_species<'a, R: Rng + ?Sized>(species: &'a [Species], rng: &mut R) -> Option<&'a Species> {
    let weights: Vec<f64> = species.iter().map(|s| s.spawn_weight).collect();
    let idx = weighted_index(&weights, rng)?;
    let picked = &species[idx];
    tracing::debug!(species = %picked.name, weight = picked.spawn_weight, "Selected species");
    Some(picked)
}

/// Pick a boss group uniformly; every boss in the group spawns together.
pub fn select_boss_group<'a, R: Rng + ?Sized>(
    catalog: &'a SpeciesCatalog,
    rng: &mut R,
) -> Option<(&'a str, &'a [Species])> {
    let keys: Vec<&str> = catalog.boss_groups().collect();
    if keys.is_empty() {
        return None;
    }
    let key = keys[rng.gen_range(0..keys.len())];
    catalog.boss_group(key).map(|group| (key, group))
}

/// Roll a wild level: uniform [1, 30] times 5.
pub fn roll_level<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    rng.gen_range(1..=LEVEL_ROLL_MAX) * LEVEL_STEP
}
