// Combat primitives shared by duels, arenas and boss arenas.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;

/// A combatant's stats, snapshotted when it enters a fight.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Combatant {
    /// Owning user; bosses have none.
    pub owner: Option<String>,
    /// Ledger record id; bosses have none.
    pub record_id: Option<i64>,
    pub name: String,
    pub health: f64,
    pub max_health: f64,
    pub damage: f64,
}

impl Combatant {
    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    /// Subtract damage, never dropping below zero. Returns true if this hit was lethal.
    pub fn take_hit(&mut self, damage: f64) -> bool {
        let was_alive = self.is_alive();
        self.health = (self.health - damage).max(0.0);
        was_alive && !self.is_alive()
    }

    /// Label used in broadcasts: the owner for fighters, the name for bosses.
    pub fn label(&self) -> &str {
        self.owner.as_deref().unwrap_or(&self.name)
    }
}

/// One resolved attack, for broadcasting and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Strike {
    pub attacker: String,
    pub target: String,
    pub damage: f64,
    pub crit: bool,
    /// Target health after the hit.
    pub health: f64,
    pub lethal: bool,
}

/// Roll a critical hit with the given chance.
pub fn roll_crit<R: Rng + ?Sized>(chance: f64, rng: &mut R) -> bool {
    rng.gen::<f64>() < chance
}

/// Damage for one attack: `base * multiplier` on a crit, `base` otherwise.
pub fn strike_damage<R: Rng + ?Sized>(
    base: f64,
    crit_chance: f64,
    crit_multiplier: f64,
    rng: &mut R,
) -> (f64, bool) {
    if roll_crit(crit_chance, rng) {
        (base * crit_multiplier, true)
    } else {
        (base, false)
    }
}

/// Indices of living combatants, in turn order.
pub fn living(roster: &[Combatant]) -> Vec<usize> {
    roster
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_alive())
        .map(|(i, _)| i)
        .collect()
}

/// Pick a uniformly random living combatant other than `exclude`.
pub fn pick_target<R: Rng + ?Sized>(
    roster: &[Combatant],
    exclude: Option<usize>,
    rng: &mut R,
) -> Option<usize> {
    let candidates: Vec<usize> = living(roster)
        .into_iter()
        .filter(|&i| Some(i) != exclude)
        .collect();
    if candidates.is_empty() {
        return None;
    }
    Some(candidates[rng.gen_range(0..candidates.len())])
}

/// Presentation pacing: delay between exchanges and an animation speed that
/// ramps up the longer a battle runs. Never affects outcomes.
#[derive(Debug, Clone)]
pub struct Pacing {
    started: Instant,
    base_delay: Duration,
    ramp_every: Duration,
    speed_step: f64,
    max_speed: f64,
}

impl Pacing {
    pub fn new(base_delay: Duration) -> Self {
        Self {
            started: Instant::now(),
            base_delay,
            ramp_every: Duration::from_secs(10),
            speed_step: 0.25,
            max_speed: 4.0,
        }
    }

    /// Animation speed multiplier for the current elapsed time.
    pub fn animation_speed(&self) -> f64 {
        self.speed_at(self.started.elapsed())
    }

    pub fn speed_at(&self, elapsed: Duration) -> f64 {
        let steps = (elapsed.as_secs_f64() / self.ramp_every.as_secs_f64()).floor();
        (1.0 + steps * self.speed_step).min(self.max_speed)
    }

    /// Delay before the next exchange, shortened by the current speed.
    pub fn delay(&self) -> Duration {
        self.base_delay.div_f64(self.animation_speed())
    }
}
