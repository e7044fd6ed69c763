// Taming session: contributions, tool rolls and resolution.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Rejection;

use super::catalog::{Species, StatPreview};
use super::config::{
    kibble, GameSettings, KibbleProfile, WeaponProfile, LETHAL_WEAPONS, QUALITY_MAX, QUALITY_MIN,
    TORPOR_WEAPONS,
};
use super::effectiveness::{self, TameAttempt};
use super::knockout::{self, KnockoutOutcome, KnockoutReport, Striker};
use super::stats::{self, LeveledStats, StatKind};

/// One user's entry in a taming session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub user: String,
    pub kibble: KibbleProfile,
    pub weapon: WeaponProfile,
    pub quality: f64,
}

/// Roll a weapon quality percent, skewed toward low rolls.
pub fn roll_quality<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u: f64 = rng.gen();
    (100.0 + (100.0 + u.powi(5) * 250.0).round()).clamp(QUALITY_MIN, QUALITY_MAX)
}

/// Roll a tool: a lethal one with `lethal_chance`, otherwise a torpor one.
pub fn roll_weapon<R: Rng + ?Sized>(lethal_chance: f64, rng: &mut R) -> WeaponProfile {
    let table: &[WeaponProfile] = if rng.gen::<f64>() < lethal_chance {
        &LETHAL_WEAPONS
    } else {
        &TORPOR_WEAPONS
    };
    table[rng.gen_range(0..table.len())]
}

/// Per-contributor taming result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TamerResult {
    pub user: String,
    pub kibble: &'static str,
    /// Present only when the knockout succeeded.
    pub attempt: Option<TameAttempt>,
    #[serde(skip)]
    pub stats: Option<LeveledStats>,
}

impl TamerResult {
    pub fn succeeded(&self) -> bool {
        self.attempt.as_ref().is_some_and(|a| a.success)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TamingReport {
    pub species: String,
    pub wild_level: u32,
    pub knockout: KnockoutReport,
    pub results: Vec<TamerResult>,
}

impl TamingReport {
    pub fn winners(&self) -> impl Iterator<Item = &TamerResult> {
        self.results.iter().filter(|r| r.succeeded())
    }
}

/// The single active capture attempt.
#[derive(Debug, Clone)]
pub struct TamingSession {
    pub id: Uuid,
    pub species: Species,
    pub wild_level: u32,
    pub contributions: Vec<Contribution>,
    pub started_at: DateTime<Utc>,
}

impl TamingSession {
    pub fn new(species: Species, wild_level: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            species,
            wild_level,
            contributions: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn preview(&self) -> StatPreview {
        StatPreview::of(&self.species, self.wild_level)
    }

    pub fn has_contributed(&self, user: &str) -> bool {
        self.contributions
            .iter()
            .any(|c| c.user.eq_ignore_ascii_case(user))
    }

    /// Validate a contribution before any currency is spent.
    pub fn check_contribution(
        &self,
        user: &str,
        kibble_input: &str,
    ) -> Result<&'static KibbleProfile, Rejection> {
        let profile =
            kibble(kibble_input).ok_or_else(|| Rejection::UnknownKibble(kibble_input.trim().to_lowercase()))?;
        if self.has_contributed(user) {
            return Err(Rejection::AlreadyContributed(user.to_string()));
        }
        Ok(profile)
    }

    /// Append a contribution with freshly rolled tool and quality.
    pub fn contribute<R: Rng + ?Sized>(
        &mut self,
        user: &str,
        profile: &KibbleProfile,
        settings: &GameSettings,
        rng: &mut R,
    ) -> &Contribution {
        let weapon = roll_weapon(settings.lethal_tool_chance, rng);
        let quality = roll_quality(rng);
        self.contributions.push(Contribution {
            user: user.to_string(),
            kibble: *profile,
            weapon,
            quality,
        });
        let idx = self.contributions.len() - 1;
        &self.contributions[idx]
    }

    /// Knock the creature out, then resolve effectiveness and stats per contributor.
    pub fn resolve<R: Rng + ?Sized>(&self, settings: &GameSettings, rng: &mut R) -> TamingReport {
        let health = self.species.stat_at(StatKind::Health, self.wild_level);
        let torpor = self.species.stat_at(StatKind::Torpor, self.wild_level);
        let strikers: Vec<Striker> = self
            .contributions
            .iter()
            .map(|c| Striker {
                weapon: c.weapon,
                quality: c.quality,
            })
            .collect();
        let knockout = knockout::simulate(health, torpor, &strikers);

        let food = self.species.stat_at(StatKind::Food, self.wild_level);
        let results = self
            .contributions
            .iter()
            .map(|c| {
                if knockout.outcome != KnockoutOutcome::KnockedOut {
                    return TamerResult {
                        user: c.user.clone(),
                        kibble: c.kibble.key,
                        attempt: None,
                        stats: None,
                    };
                }
                let attempt =
                    effectiveness::evaluate(food, &c.kibble, settings.negative_event_chance, rng);
                let stats = attempt
                    .success
                    .then(|| stats::generate(&self.species.stats, self.wild_level, attempt.effectiveness));
                TamerResult {
                    user: c.user.clone(),
                    kibble: c.kibble.key,
                    attempt: Some(attempt),
                    stats,
                }
            })
            .collect();

        TamingReport {
            species: self.species.name.clone(),
            wild_level: self.wild_level,
            knockout,
            results,
        }
    }
}
