// Per-user collections of tamed creatures, persisted in the key-value store
// and mirrored to an export file per user.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Database, Scope};
use crate::engine::combat::Combatant;
use crate::engine::host::ExportNotifier;
use crate::engine::stats::{LeveledStats, StatBlock};
use crate::error::{GameError, GameResult};
use crate::locks::UserLocks;

pub const CREATURES_KEY: &str = "dinoTame_TamedDinos";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TamedCreatureRecord {
    /// Millisecond timestamp of the tame, bumped on collision.
    pub id: i64,
    pub species: String,
    pub tamed_at: DateTime<Utc>,
    pub wild_level: u32,
    pub effectiveness: f64,
    pub level: u32,
    pub stats: StatBlock,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
}

impl TamedCreatureRecord {
    /// Battle snapshot of this creature for `owner`.
    pub fn combatant(&self, owner: &str) -> Combatant {
        let health = self.stats.health as f64;
        Combatant {
            owner: Some(owner.to_string()),
            record_id: Some(self.id),
            name: self.species.clone(),
            health,
            max_health: health,
            damage: self.stats.damage as f64,
        }
    }
}

#[derive(Clone)]
pub struct CreatureLedger {
    db: Database,
    locks: Arc<UserLocks>,
    export_dir: Option<PathBuf>,
    notifier: Arc<dyn ExportNotifier>,
}

impl CreatureLedger {
    pub fn new(
        db: Database,
        locks: Arc<UserLocks>,
        export_dir: Option<PathBuf>,
        notifier: Arc<dyn ExportNotifier>,
    ) -> Self {
        Self {
            db,
            locks,
            export_dir,
            notifier,
        }
    }

    async fn read(&self, user: &str) -> GameResult<Vec<TamedCreatureRecord>> {
        match self.db.get(Scope::User(user), CREATURES_KEY).await? {
            None => Ok(Vec::new()),
            Some(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Some(raw) => Ok(serde_json::from_str(&raw)?),
        }
    }

    async fn write(&self, user: &str, records: &[TamedCreatureRecord]) -> GameResult<()> {
        let json = serde_json::to_string(records)?;
        self.db.set(Scope::User(user), CREATURES_KEY, &json).await?;
        self.export(user, &json).await;
        Ok(())
    }

    /// Mirror to `<export_dir>/<user>.json`. Failures are logged, never propagated.
    async fn export(&self, user: &str, json: &str) {
        let Some(dir) = &self.export_dir else {
            return;
        };
        let path = export_path(dir, user);
        let result = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, json).await
        }
        .await;
        match result {
            Ok(()) => self.notifier.exported(user, &path),
            Err(e) => tracing::warn!(user, path = %path.display(), "Export failed: {e}"),
        }
    }

    pub async fn list(&self, user: &str) -> GameResult<Vec<TamedCreatureRecord>> {
        self.read(user).await
    }

    pub async fn get(&self, user: &str, id: i64) -> GameResult<Option<TamedCreatureRecord>> {
        Ok(self.read(user).await?.into_iter().find(|r| r.id == id))
    }

    /// Whether `user` owns at least one creature of `species`.
    pub async fn owns_species(&self, user: &str, species: &str) -> GameResult<bool> {
        Ok(self
            .read(user)
            .await?
            .iter()
            .any(|r| r.species.eq_ignore_ascii_case(species)))
    }

    /// Record a new tame.
    pub async fn add(
        &self,
        user: &str,
        species: &str,
        wild_level: u32,
        effectiveness: f64,
        stats: &LeveledStats,
    ) -> GameResult<TamedCreatureRecord> {
        let _guard = self.locks.lock(user).await;
        let mut records = self.read(user).await?;
        let tamed_at = Utc::now();
        let mut id = tamed_at.timestamp_millis();
        while records.iter().any(|r| r.id == id) {
            id += 1;
        }
        let record = TamedCreatureRecord {
            id,
            species: species.to_string(),
            tamed_at,
            wild_level,
            effectiveness,
            level: stats.level(wild_level),
            stats: stats.block(),
            wins: 0,
            losses: 0,
        };
        records.push(record.clone());
        self.write(user, &records).await?;
        tracing::info!(user, species, id, level = record.level, "Creature tamed");
        Ok(record)
    }

    /// A win bumps the record's win count and returns it; a loss deletes the record.
    pub async fn update_win_loss(
        &self,
        user: &str,
        id: i64,
        won: bool,
    ) -> GameResult<Option<TamedCreatureRecord>> {
        let _guard = self.locks.lock(user).await;
        let mut records = self.read(user).await?;
        let idx = records.iter().position(|r| r.id == id).ok_or_else(|| {
            GameError::DataIntegrity(format!("creature {id} not found for {user}"))
        })?;
        let updated = if won {
            records[idx].wins += 1;
            Some(records[idx].clone())
        } else {
            let lost = records.remove(idx);
            tracing::info!(user, id, species = %lost.species, "Creature lost and removed");
            None
        };
        self.write(user, &records).await?;
        Ok(updated)
    }
}

fn export_path(dir: &Path, user: &str) -> PathBuf {
    let safe: String = user
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    dir.join(format!("{safe}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::stats::STAT_COUNT;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<(String, PathBuf)>>);

    impl ExportNotifier for RecordingNotifier {
        fn exported(&self, user: &str, path: &Path) {
            self.0.lock().unwrap().push((user.to_string(), path.to_path_buf()));
        }
    }

    fn stats(health: i64, damage: i64) -> LeveledStats {
        let mut totals = [0i64; STAT_COUNT];
        totals[0] = health;
        totals[5] = damage;
        LeveledStats {
            totals,
            bonus_levels: 3,
        }
    }

    async fn ledger(export_dir: Option<PathBuf>) -> (CreatureLedger, Arc<RecordingNotifier>) {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let ledger = CreatureLedger::new(
            db,
            Arc::new(UserLocks::new()),
            export_dir,
            notifier.clone(),
        );
        (ledger, notifier)
    }

    #[tokio::test]
    async fn test_add_allows_duplicates_with_unique_ids() {
        let (ledger, _) = ledger(None).await;
        let a = ledger.add("alice", "Raptor", 10, 90.0, &stats(500, 20)).await.unwrap();
        let b = ledger.add("alice", "Raptor", 10, 80.0, &stats(480, 19)).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.level, 13);
        assert_eq!(a.stats.health, 500);
        assert_eq!(ledger.list("alice").await.unwrap().len(), 2);
        assert!(ledger.owns_species("alice", "raptor").await.unwrap());
        assert!(!ledger.owns_species("alice", "Dodo").await.unwrap());
        assert!(ledger.list("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_win_increments_loss_removes() {
        let (ledger, _) = ledger(None).await;
        let rec = ledger.add("alice", "Raptor", 10, 90.0, &stats(500, 20)).await.unwrap();

        let updated = ledger.update_win_loss("alice", rec.id, true).await.unwrap().unwrap();
        assert_eq!(updated.wins, 1);
        assert_eq!(ledger.get("alice", rec.id).await.unwrap().unwrap().wins, 1);

        assert!(ledger.update_win_loss("alice", rec.id, false).await.unwrap().is_none());
        assert!(ledger.get("alice", rec.id).await.unwrap().is_none());

        let missing = ledger.update_win_loss("alice", rec.id, true).await;
        assert!(matches!(missing, Err(GameError::DataIntegrity(_))));
    }

    #[tokio::test]
    async fn test_malformed_json_is_data_integrity() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.set(Scope::User("alice"), CREATURES_KEY, "{not json").await.unwrap();
        let ledger = CreatureLedger::new(
            db,
            Arc::new(UserLocks::new()),
            None,
            Arc::new(crate::engine::host::LogHooks),
        );
        assert!(matches!(
            ledger.list("alice").await,
            Err(GameError::DataIntegrity(_))
        ));
    }

    #[tokio::test]
    async fn test_export_file_and_notifier() {
        let dir = std::env::temp_dir().join(format!("dinotame-export-{}", uuid::Uuid::new_v4()));
        let (ledger, notifier) = ledger(Some(dir.clone())).await;
        ledger.add("Alice", "Dodo", 5, 100.0, &stats(60, 5)).await.unwrap();

        let path = dir.join("alice.json");
        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<TamedCreatureRecord> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].species, "Dodo");

        let calls = notifier.0.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, path);
        drop(calls);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_combatant_snapshot() {
        let rec = TamedCreatureRecord {
            id: 7,
            species: "Raptor".into(),
            tamed_at: Utc::now(),
            wild_level: 10,
            effectiveness: 90.0,
            level: 14,
            stats: StatBlock {
                health: 300,
                damage: 25,
                ..StatBlock::default()
            },
            wins: 0,
            losses: 0,
        };
        let c = rec.combatant("alice");
        assert_eq!(c.record_id, Some(7));
        assert_eq!(c.health, 300.0);
        assert_eq!(c.damage, 25.0);
        assert_eq!(c.label(), "alice");
    }

    #[test]
    fn test_export_path_sanitized() {
        let path = export_path(Path::new("out"), "Some User/..");
        assert_eq!(path, Path::new("out").join("some_user___.json"));
    }
}
