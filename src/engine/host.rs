// Boundary with the hosting chat platform: overlay events, chat messages and host hooks.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::error::GameResult;

use super::catalog::StatPreview;
use super::combat::{Combatant, Strike};

/// Events for the presentation overlay.
#[derive(Clone, Serialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum OverlayEvent {
    #[serde(rename = "spawnDino")]
    SpawnDino {
        name: String,
        level: u32,
        #[serde(flatten)]
        preview: StatPreview,
    },
    #[serde(rename = "addFighter")]
    AddFighter {
        user: String,
        name: String,
        health: f64,
        #[serde(rename = "maxHealth")]
        max_health: f64,
        damage: f64,
    },
    #[serde(rename = "addBoss")]
    AddBoss {
        name: String,
        health: f64,
        #[serde(rename = "maxHealth")]
        max_health: f64,
        damage: f64,
    },
    #[serde(rename = "attackFighter")]
    AttackFighter {
        attacker: String,
        target: String,
        damage: f64,
        crit: bool,
        health: f64,
        lethal: bool,
        #[serde(rename = "animationSpeed")]
        animation_speed: f64,
    },
    #[serde(rename = "clearFighters")]
    ClearFighters,
}

impl OverlayEvent {
    pub fn add_fighter(c: &Combatant) -> Self {
        OverlayEvent::AddFighter {
            user: c.label().to_string(),
            name: c.name.clone(),
            health: c.health,
            max_health: c.max_health,
            damage: c.damage,
        }
    }

    pub fn add_boss(c: &Combatant) -> Self {
        OverlayEvent::AddBoss {
            name: c.name.clone(),
            health: c.health,
            max_health: c.max_health,
            damage: c.damage,
        }
    }

    pub fn attack(strike: &Strike, animation_speed: f64) -> Self {
        OverlayEvent::AttackFighter {
            attacker: strike.attacker.clone(),
            target: strike.target.clone(),
            damage: strike.damage,
            crit: strike.crit,
            health: strike.health,
            lethal: strike.lethal,
            animation_speed,
        }
    }
}

/// A chat message: template key plus named substitutions. Rendering is left to the host.
#[derive(Clone, Serialize, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub template: String,
    pub values: BTreeMap<String, String>,
}

impl ChatMessage {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

/// Called when a currency reward cannot be honored.
pub trait RewardHook: Send + Sync {
    fn cancel_redemption(&self, user: &str, reason: &str);
}

/// Resolves user names to real accounts.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Canonical account name, or `None` if the user is unknown.
    async fn resolve(&self, name: &str) -> GameResult<Option<String>>;
}

/// Called after a user's export file was written.
pub trait ExportNotifier: Send + Sync {
    fn exported(&self, user: &str, path: &Path);
}

/// Default hooks: log and move on.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHooks;

impl RewardHook for LogHooks {
    fn cancel_redemption(&self, user: &str, reason: &str) {
        tracing::warn!(user, reason, "Redemption cancelled");
    }
}

impl ExportNotifier for LogHooks {
    fn exported(&self, user: &str, path: &Path) {
        tracing::info!(user, path = %path.display(), "Export written");
    }
}
