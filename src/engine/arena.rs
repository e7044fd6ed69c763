// Free-for-all arena: roster management and last-one-standing resolution.

use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{GameError, Rejection, Resource};

use super::combat::{pick_target, strike_damage, Combatant, Strike};

/// Arena lifecycle. `Ready` is set by the readiness gate; `Open` accepts entrants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ArenaPhase {
    Closed,
    Ready,
    Open,
    Fighting,
}

/// An open arena's roster and pot.
#[derive(Debug, Clone)]
pub struct Arena {
    pub id: Uuid,
    pub phase: ArenaPhase,
    pub fighters: Vec<Combatant>,
    pub pot: i64,
}

impl Default for Arena {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: ArenaPhase::Closed,
            fighters: Vec::new(),
            pot: 0,
        }
    }
}

impl Arena {
    /// Arm the arena so it can be opened.
    pub fn make_ready(&mut self) -> Result<(), GameError> {
        match self.phase {
            ArenaPhase::Open | ArenaPhase::Fighting => Err(GameError::ResourceBusy(Resource::Arena)),
            _ => {
                self.phase = ArenaPhase::Ready;
                Ok(())
            }
        }
    }

    /// Open for entries, clearing any previous roster.
    pub fn open(&mut self) -> Result<Uuid, GameError> {
        match self.phase {
            ArenaPhase::Open | ArenaPhase::Fighting => Err(GameError::ResourceBusy(Resource::Arena)),
            ArenaPhase::Closed => Err(Rejection::NotReady(Resource::Arena).into()),
            ArenaPhase::Ready => {
                self.id = Uuid::new_v4();
                self.fighters.clear();
                self.pot = 0;
                self.phase = ArenaPhase::Open;
                Ok(self.id)
            }
        }
    }

    pub fn has_entered(&self, user: &str) -> bool {
        self.fighters
            .iter()
            .any(|f| f.owner.as_deref().is_some_and(|o| o.eq_ignore_ascii_case(user)))
    }

    /// Validate an entry before any currency is spent.
    pub fn check_entry(&self, user: &str) -> Result<(), Rejection> {
        if self.phase != ArenaPhase::Open {
            return Err(Rejection::NotActive(Resource::Arena));
        }
        if self.has_entered(user) {
            return Err(Rejection::AlreadyEntered(user.to_string()));
        }
        Ok(())
    }

    pub fn add(&mut self, fighter: Combatant, entry_cost: i64) {
        self.pot += entry_cost;
        self.fighters.push(fighter);
    }

    /// Return to `Closed`, dropping the roster.
    pub fn close(&mut self) {
        self.phase = ArenaPhase::Closed;
        self.fighters.clear();
        self.pot = 0;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArenaReport {
    pub strikes: Vec<Strike>,
    /// Roster index of the last fighter standing.
    pub winner: usize,
    /// Roster indices in the order they fell.
    pub fallen: Vec<usize>,
}

/// Run the free-for-all until one fighter remains. Returns `None` with fewer than two fighters.
///
/// Every living fighter attacks in roster order each round, choosing a random
/// other living fighter as its target.
pub fn fight<R: Rng + ?Sized>(
    fighters: &[Combatant],
    crit_chance: f64,
    crit_multiplier: f64,
    rng: &mut R,
) -> Option<ArenaReport> {
    if fighters.len() < 2 {
        return None;
    }
    let mut roster = fighters.to_vec();
    let mut strikes = Vec::new();
    let mut fallen = Vec::new();

    // Fighters with no damage cannot end the fight; treat them as unable to win
    if roster.iter().all(|f| f.damage <= 0.0) {
        for (i, f) in roster.iter_mut().enumerate().skip(1) {
            f.health = 0.0;
            fallen.push(i);
        }
        return Some(ArenaReport {
            strikes,
            winner: 0,
            fallen,
        });
    }

    while roster.iter().filter(|f| f.is_alive()).count() > 1 {
        for attacker in 0..roster.len() {
            if !roster[attacker].is_alive() {
                continue;
            }
            let Some(target) = pick_target(&roster, Some(attacker), rng) else {
                break;
            };
            let (damage, crit) =
                strike_damage(roster[attacker].damage, crit_chance, crit_multiplier, rng);
            let lethal = roster[target].take_hit(damage);
            strikes.push(Strike {
                attacker: roster[attacker].label().to_string(),
                target: roster[target].label().to_string(),
                damage,
                crit,
                health: roster[target].health,
                lethal,
            });
            if lethal {
                fallen.push(target);
            }
        }
    }

    let winner = roster.iter().position(Combatant::is_alive)?;
    Some(ArenaReport {
        strikes,
        winner,
        fallen,
    })
}
