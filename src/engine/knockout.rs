// Knockout sub-combat: contributors' tools against a wild creature's health and torpor.

use serde::Serialize;

use super::config::WeaponProfile;

/// How the knockout ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum KnockoutOutcome {
    /// Health reached zero first; the creature is lost.
    Dead,
    /// Torpor reached zero first; the creature can be tamed.
    KnockedOut,
    /// Every tool ran out of durability first.
    None,
}

/// One tool swing in the knockout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KnockoutHit {
    pub contributor: usize,
    pub health: f64,
    pub torpor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnockoutReport {
    pub outcome: KnockoutOutcome,
    pub health: f64,
    pub torpor: f64,
    /// Remaining pools after every hit, in order.
    pub trace: Vec<KnockoutHit>,
}

/// A contributor's tool and fixed quality roll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Striker {
    pub weapon: WeaponProfile,
    /// Quality percent (100 = nominal).
    pub quality: f64,
}

impl Striker {
    fn damage(&self) -> f64 {
        self.weapon.damage * (self.quality / 100.0)
    }

    fn torpor(&self) -> f64 {
        self.weapon.torpor * (self.quality / 100.0)
    }
}

/// Run round-robin passes until the creature dies, is knocked out, or every tool breaks.
///
/// Each striker gets `durability / strikers.len()` hits' worth of durability; a hit
/// is skipped once a striker's share is used up.
pub fn simulate(health: f64, torpor: f64, strikers: &[Striker]) -> KnockoutReport {
    let mut report = KnockoutReport {
        outcome: KnockoutOutcome::None,
        health,
        torpor,
        trace: Vec::new(),
    };
    if strikers.is_empty() {
        return report;
    }

    let share_divisor = strikers.len() as f64;
    let mut durability: Vec<f64> = strikers
        .iter()
        .map(|s| s.weapon.durability / share_divisor)
        .collect();

    loop {
        let mut hits = 0;
        for (i, striker) in strikers.iter().enumerate() {
            if durability[i] <= 0.0 {
                continue;
            }
            durability[i] -= 1.0;
            hits += 1;

            report.health -= striker.damage();
            report.torpor -= striker.torpor();
            report.trace.push(KnockoutHit {
                contributor: i,
                health: report.health,
                torpor: report.torpor,
            });

            if report.health <= 0.0 {
                report.outcome = KnockoutOutcome::Dead;
                return report;
            }
            if report.torpor <= 0.0 {
                report.outcome = KnockoutOutcome::KnockedOut;
                return report;
            }
        }
        if hits == 0 {
            return report;
        }
    }
}
