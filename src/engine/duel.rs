// One-on-one duels: challenge bookkeeping and the simultaneous-exchange auto battle.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use super::combat::{strike_damage, Combatant, Strike};

/// A pending challenge between two users.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuelRequest {
    pub id: Uuid,
    pub requester: String,
    pub target: String,
    pub requester_dino: Combatant,
    pub target_dino: Combatant,
    pub created_at: DateTime<Utc>,
}

/// Duel result from the requester's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DuelOutcome {
    Draw,
    RequesterWins,
    TargetWins,
}

impl DuelOutcome {
    /// 0 = draw, 1 = requester wins, -1 = target wins.
    pub fn code(self) -> i32 {
        match self {
            DuelOutcome::Draw => 0,
            DuelOutcome::RequesterWins => 1,
            DuelOutcome::TargetWins => -1,
        }
    }
}

/// Both sides' strikes in one exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exchange {
    pub requester: Strike,
    pub target: Strike,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuelReport {
    pub outcome: DuelOutcome,
    pub exchanges: Vec<Exchange>,
}

/// Fight until at least one side is down. Both sides strike every exchange and
/// damage lands simultaneously, so both can fall in the same exchange.
pub fn fight<R: Rng + ?Sized>(
    requester: &Combatant,
    target: &Combatant,
    crit_chance: f64,
    crit_multiplier: f64,
    rng: &mut R,
) -> DuelReport {
    let mut a = requester.clone();
    let mut b = target.clone();
    let mut exchanges = Vec::new();

    // Neither side can deal damage
    if a.damage <= 0.0 && b.damage <= 0.0 {
        return DuelReport {
            outcome: DuelOutcome::Draw,
            exchanges,
        };
    }

    while a.is_alive() && b.is_alive() {
        let (dmg_a, crit_a) = strike_damage(a.damage, crit_chance, crit_multiplier, rng);
        let (dmg_b, crit_b) = strike_damage(b.damage, crit_chance, crit_multiplier, rng);
        let lethal_on_b = b.take_hit(dmg_a);
        let lethal_on_a = a.take_hit(dmg_b);
        exchanges.push(Exchange {
            requester: Strike {
                attacker: a.label().to_string(),
                target: b.label().to_string(),
                damage: dmg_a,
                crit: crit_a,
                health: b.health,
                lethal: lethal_on_b,
            },
            target: Strike {
                attacker: b.label().to_string(),
                target: a.label().to_string(),
                damage: dmg_b,
                crit: crit_b,
                health: a.health,
                lethal: lethal_on_a,
            },
        });
    }

    let outcome = match (a.is_alive(), b.is_alive()) {
        (true, false) => DuelOutcome::RequesterWins,
        (false, true) => DuelOutcome::TargetWins,
        _ => DuelOutcome::Draw,
    };
    DuelReport { outcome, exchanges }
}
