// Boss arena: fighters against a whole boss group, alternating attack phases.

use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{GameError, Rejection, Resource};

use super::arena::ArenaPhase;
use super::catalog::Species;
use super::combat::{pick_target, roll_crit, Combatant, Strike};
use super::config::{GameSettings, BOSS_POT_FACTOR};
use super::stats::StatKind;

/// Build a boss combatant from its species definition at `level`.
pub fn boss_combatant(species: &Species, level: u32) -> Combatant {
    let health = species.stat_at(StatKind::Health, level).floor();
    Combatant {
        owner: None,
        record_id: None,
        name: species.display_name(),
        health,
        max_health: health,
        damage: species.stat_at(StatKind::Damage, level),
    }
}

/// Pot paid out on a boss victory: a small fraction of the bosses' max health.
pub fn boss_pot(bosses: &[Combatant]) -> i64 {
    bosses
        .iter()
        .map(|b| BOSS_POT_FACTOR * b.max_health)
        .sum::<f64>()
        .floor() as i64
}

#[derive(Debug, Clone)]
pub struct BossArena {
    pub id: Uuid,
    pub phase: ArenaPhase,
    pub group: String,
    pub fighters: Vec<Combatant>,
    pub bosses: Vec<Combatant>,
    pub pot: i64,
}

impl Default for BossArena {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: ArenaPhase::Closed,
            group: String::new(),
            fighters: Vec::new(),
            bosses: Vec::new(),
            pot: 0,
        }
    }
}

impl BossArena {
    pub fn make_ready(&mut self) -> Result<(), GameError> {
        match self.phase {
            ArenaPhase::Open | ArenaPhase::Fighting => {
                Err(GameError::ResourceBusy(Resource::BossArena))
            }
            _ => {
                self.phase = ArenaPhase::Ready;
                Ok(())
            }
        }
    }

    /// Spawn a boss group and open for fighters. The pot is fixed here.
    pub fn spawn(&mut self, group: &str, bosses: Vec<Combatant>) -> Result<Uuid, GameError> {
        match self.phase {
            ArenaPhase::Open | ArenaPhase::Fighting => {
                Err(GameError::ResourceBusy(Resource::BossArena))
            }
            ArenaPhase::Closed => Err(Rejection::NotReady(Resource::BossArena).into()),
            ArenaPhase::Ready => {
                self.id = Uuid::new_v4();
                self.group = group.to_string();
                self.pot = boss_pot(&bosses);
                self.bosses = bosses;
                self.fighters.clear();
                self.phase = ArenaPhase::Open;
                Ok(self.id)
            }
        }
    }

    pub fn check_entry(&self, user: &str) -> Result<(), Rejection> {
        if self.phase != ArenaPhase::Open {
            return Err(Rejection::NotActive(Resource::BossArena));
        }
        let entered = self
            .fighters
            .iter()
            .any(|f| f.owner.as_deref().is_some_and(|o| o.eq_ignore_ascii_case(user)));
        if entered {
            return Err(Rejection::AlreadyEntered(user.to_string()));
        }
        Ok(())
    }

    pub fn add(&mut self, fighter: Combatant) {
        self.fighters.push(fighter);
    }

    pub fn close(&mut self) {
        self.phase = ArenaPhase::Closed;
        self.group.clear();
        self.fighters.clear();
        self.bosses.clear();
        self.pot = 0;
    }
}

/// Which roster struck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Fighters,
    Bosses,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BossStrike {
    pub side: Side,
    #[serde(flatten)]
    pub strike: Strike,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BossReport {
    pub strikes: Vec<BossStrike>,
    /// True when every boss fell.
    pub victory: bool,
    /// Fighter roster indices still alive at the end.
    pub survivors: Vec<usize>,
    /// Fighter roster indices in the order they fell.
    pub fallen: Vec<usize>,
}

impl BossReport {
    /// Equal share of `pot` per survivor; zero on defeat.
    pub fn share(&self, pot: i64) -> i64 {
        if !self.victory || self.survivors.is_empty() {
            return 0;
        }
        pot / self.survivors.len() as i64
    }
}

fn boss_hit<R: Rng + ?Sized>(
    base: f64,
    crit_chance: f64,
    settings: &GameSettings,
    rng: &mut R,
) -> (f64, bool) {
    let damage = base * settings.boss_damage_multiplier;
    if roll_crit(crit_chance, rng) {
        let (lo, hi) = settings.boss_crit_range;
        let mult = rng.gen_range(lo.min(hi)..=hi.max(lo)) as f64;
        (damage * mult, true)
    } else {
        (damage, false)
    }
}

/// One side's attack phase: every living attacker hits a random living defender.
fn attack_phase<R: Rng + ?Sized>(
    side: Side,
    attackers: &[Combatant],
    defenders: &mut [Combatant],
    crit_chance: f64,
    settings: &GameSettings,
    rng: &mut R,
    strikes: &mut Vec<BossStrike>,
) -> Vec<usize> {
    let mut killed = Vec::new();
    for attacker in attackers.iter().filter(|a| a.is_alive()) {
        let Some(target) = pick_target(defenders, None, rng) else {
            break;
        };
        let (damage, crit) = boss_hit(attacker.damage, crit_chance, settings, rng);
        let lethal = defenders[target].take_hit(damage);
        strikes.push(BossStrike {
            side,
            strike: Strike {
                attacker: attacker.label().to_string(),
                target: defenders[target].label().to_string(),
                damage,
                crit,
                health: defenders[target].health,
                lethal,
            },
        });
        if lethal {
            killed.push(target);
        }
    }
    killed
}

/// Fight until one roster is wiped out. Returns `None` if either roster is empty.
pub fn fight<R: Rng + ?Sized>(
    fighters: &[Combatant],
    bosses: &[Combatant],
    settings: &GameSettings,
    rng: &mut R,
) -> Option<BossReport> {
    if fighters.is_empty() || bosses.is_empty() {
        return None;
    }
    let mut fighters = fighters.to_vec();
    let mut bosses = bosses.to_vec();
    let mut strikes = Vec::new();
    let mut fallen = Vec::new();

    let harmless = |roster: &[Combatant]| roster.iter().all(|c| c.damage <= 0.0);
    let stalemate = harmless(&fighters) && harmless(&bosses);

    while !stalemate
        && fighters.iter().any(Combatant::is_alive)
        && bosses.iter().any(Combatant::is_alive)
    {
        attack_phase(
            Side::Fighters,
            &fighters,
            &mut bosses,
            settings.boss_fighter_crit_chance,
            settings,
            rng,
            &mut strikes,
        );
        if !bosses.iter().any(Combatant::is_alive) {
            break;
        }
        let killed = attack_phase(
            Side::Bosses,
            &bosses,
            &mut fighters,
            settings.boss_crit_chance,
            settings,
            rng,
            &mut strikes,
        );
        fallen.extend(killed);
    }

    let victory = !stalemate && !bosses.iter().any(Combatant::is_alive);
    let survivors = if victory {
        fighters
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_alive())
            .map(|(i, _)| i)
            .collect()
    } else {
        Vec::new()
    };
    Some(BossReport {
        strikes,
        victory,
        survivors,
        fallen,
    })
}
