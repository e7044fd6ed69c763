// Game server: owns the exclusive game resources, drives every command and broadcasts
// overlay events and chat messages to subscribers.

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::db::{user_name, Database, Scope};
use crate::economy::EconomyLedger;
use crate::error::{GameError, GameResult, Rejection, Resource};
use crate::ledger::{CreatureLedger, TamedCreatureRecord};
use crate::locks::UserLocks;
use crate::metrics;

use super::arena::{self, Arena, ArenaPhase};
use super::boss_arena::{self, boss_combatant, BossArena};
use super::catalog::{SpeciesCatalog, StatPreview};
use super::combat::{Combatant, Pacing, Strike};
use super::config::GameSettings;
use super::duel::{self, DuelOutcome, DuelReport, DuelRequest};
use super::host::{
    ChatMessage, ExportNotifier, LogHooks, OverlayEvent, RewardHook, UserDirectory,
};
use super::knockout::KnockoutOutcome;
use super::spawn;
use super::taming::{TamingReport, TamingSession};

pub const DUEL_REQUESTER_KEY: &str = "dinoTame_duel_requester";
pub const DUEL_TARGET_KEY: &str = "dinoTame_duel_target";

/// Timers and economy knobs that come from configuration.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub tame_duration: Duration,
    pub duel_timeout: Duration,
    pub arena_entry_window: Duration,
    pub arena_entry_cost: i64,
    pub egg_paste_amount: i64,
    /// Delay between battle exchanges; zero disables pacing sleeps.
    pub pacing: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            tame_duration: Duration::from_secs(120),
            duel_timeout: Duration::from_secs(60),
            arena_entry_window: Duration::from_secs(90),
            arena_entry_cost: 0,
            egg_paste_amount: 10,
            pacing: Duration::from_millis(750),
        }
    }
}

/// What the readiness gate armed on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// Something is running; nothing was armed.
    Busy,
    Arena,
    BossArena,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpawnInfo {
    pub session_id: Uuid,
    pub species: String,
    pub level: u32,
    pub preview: StatPreview,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContributionReceipt {
    pub user: String,
    pub kibble: &'static str,
    pub weapon: &'static str,
    pub quality: f64,
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuelResult {
    pub accepted: bool,
    /// 0 = draw, 1 = requester wins, -1 = target wins.
    pub result: Option<i32>,
    pub report: Option<DuelReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArenaResult {
    pub winner: Option<String>,
    pub pot: i64,
    /// True when the fight was aborted for lack of entrants.
    pub aborted: bool,
    pub strikes: Vec<Strike>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BossSpawnInfo {
    pub arena_id: Uuid,
    pub group: String,
    pub bosses: Vec<Combatant>,
    pub pot: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BossResult {
    pub victory: bool,
    pub survivors: Vec<String>,
    pub share: i64,
    pub aborted: bool,
    pub strikes: Vec<boss_arena::BossStrike>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub taming: Option<SpawnInfo>,
    pub contributors: usize,
    pub duel_pending: bool,
    pub arena: ArenaPhase,
    pub boss_arena: ArenaPhase,
}

/// A pending challenge, or one being fought out.
enum DuelState {
    Pending(DuelRequest),
    Fighting,
}

/// Owns the single taming session, duel, arena and boss arena.
pub struct GameServer {
    catalog: SpeciesCatalog,
    settings: GameSettings,
    options: ServerOptions,
    db: Database,
    economy: EconomyLedger,
    ledger: CreatureLedger,
    locks: Arc<UserLocks>,
    users: Arc<dyn UserDirectory>,
    reward_hook: Arc<dyn RewardHook>,
    rng: StdMutex<StdRng>,
    taming: Mutex<Option<TamingSession>>,
    duel: Mutex<Option<DuelState>>,
    arena: Mutex<Arena>,
    boss_arena: Mutex<BossArena>,
    overlay_tx: broadcast::Sender<String>,
    chat_tx: broadcast::Sender<String>,
}

impl GameServer {
    pub fn new(catalog: SpeciesCatalog, db: Database, options: ServerOptions) -> Self {
        let (overlay_tx, _) = broadcast::channel(256);
        let (chat_tx, _) = broadcast::channel(256);
        let locks = Arc::new(UserLocks::new());
        Self {
            catalog,
            settings: GameSettings::default(),
            options,
            economy: EconomyLedger::new(db.clone(), locks.clone()),
            ledger: CreatureLedger::new(db.clone(), locks.clone(), None, Arc::new(LogHooks)),
            users: Arc::new(db.clone()),
            db,
            locks,
            reward_hook: Arc::new(LogHooks),
            rng: StdMutex::new(StdRng::from_entropy()),
            taming: Mutex::new(None),
            duel: Mutex::new(None),
            arena: Mutex::new(Arena::default()),
            boss_arena: Mutex::new(BossArena::default()),
            overlay_tx,
            chat_tx,
        }
    }

    /// Replace the random source, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = StdMutex::new(rng);
        self
    }

    pub fn with_settings(mut self, settings: GameSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Mirror creature collections to `dir` and notify `notifier` after each write.
    pub fn with_export(mut self, dir: PathBuf, notifier: Arc<dyn ExportNotifier>) -> Self {
        self.ledger = CreatureLedger::new(self.db.clone(), self.locks.clone(), Some(dir), notifier);
        self
    }

    pub fn with_reward_hook(mut self, hook: Arc<dyn RewardHook>) -> Self {
        self.reward_hook = hook;
        self
    }

    pub fn with_user_directory(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = users;
        self
    }

    pub fn subscribe_overlay(&self) -> broadcast::Receiver<String> {
        self.overlay_tx.subscribe()
    }

    pub fn subscribe_chat(&self) -> broadcast::Receiver<String> {
        self.chat_tx.subscribe()
    }

    pub fn economy(&self) -> &EconomyLedger {
        &self.economy
    }

    pub fn ledger(&self) -> &CreatureLedger {
        &self.ledger
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    fn roll<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    fn emit(&self, event: &OverlayEvent) {
        match serde_json::to_string(event) {
            Ok(json) => {
                let _ = self.overlay_tx.send(json);
            }
            Err(e) => tracing::error!("Failed to serialize overlay event: {e}"),
        }
    }

    fn say(&self, message: ChatMessage) {
        match serde_json::to_string(&message) {
            Ok(json) => {
                let _ = self.chat_tx.send(json);
            }
            Err(e) => tracing::error!("Failed to serialize chat message: {e}"),
        }
    }

    /// Log a refused command, tell the user, and return the error.
    fn reject<T>(&self, user: &str, template: &str, err: impl Into<GameError>) -> GameResult<T> {
        let err = err.into();
        metrics::REJECTIONS_TOTAL.inc();
        tracing::warn!(user, template, "Command rejected: {err}");
        let mut message = ChatMessage::new(template)
            .with("user", user)
            .with("reason", &err);
        if let Some(Rejection::InsufficientFunds { balance, cost, .. }) = err.rejection() {
            message = message.with("currentPaste", balance).with("cost", cost);
        }
        self.say(message);
        Err(err)
    }

    /// Refuse a command because `resource` is already running.
    fn busy<T>(&self, resource: Resource) -> GameResult<T> {
        let err = GameError::ResourceBusy(resource);
        metrics::REJECTIONS_TOTAL.inc();
        tracing::warn!(%resource, "Command rejected: {err}");
        self.say(ChatMessage::new("commandRejectedMessage").with("reason", &err));
        Err(err)
    }

    async fn touch_user(&self, user: &str) -> GameResult<()> {
        self.db.register_user(user).await?;
        Ok(())
    }

    fn pick_record<'a>(&self, records: &'a [TamedCreatureRecord]) -> Option<&'a TamedCreatureRecord> {
        if records.is_empty() {
            return None;
        }
        let idx = self.roll(|rng| rng.gen_range(0..records.len()));
        records.get(idx)
    }

    /// Record a battle result, logging instead of failing when the creature vanished mid-fight.
    async fn record_result(&self, combatant: &Combatant, won: bool) {
        let (Some(owner), Some(id)) = (combatant.owner.as_deref(), combatant.record_id) else {
            return;
        };
        if let Err(e) = self.ledger.update_win_loss(owner, id, won).await {
            tracing::warn!(user = owner, id, "Failed to record battle result: {e}");
        }
    }

    async fn pay(&self, user: &str, amount: i64) {
        if amount <= 0 {
            return;
        }
        if let Err(e) = self.economy.earn(user, amount).await {
            tracing::error!(user, amount, "Failed to pay out: {e}");
        }
    }

    /// Broadcast strikes with presentation pacing.
    async fn play_strikes<'a>(&self, strikes: impl IntoIterator<Item = &'a Strike>) {
        let pacing = Pacing::new(self.options.pacing);
        for strike in strikes {
            self.emit(&OverlayEvent::attack(strike, pacing.animation_speed()));
            if !self.options.pacing.is_zero() {
                tokio::time::sleep(pacing.delay()).await;
            }
        }
    }

    // Locks are always taken in the order taming, duel, arena, boss_arena.

    fn running(phase: ArenaPhase) -> bool {
        matches!(phase, ArenaPhase::Open | ArenaPhase::Fighting)
    }

    fn arena_busy(arena: &Arena, boss_arena: &BossArena) -> Option<Resource> {
        if Self::running(arena.phase) {
            Some(Resource::Arena)
        } else if Self::running(boss_arena.phase) {
            Some(Resource::BossArena)
        } else {
            None
        }
    }

    fn set_active(resource: Resource, active: bool) {
        let label = match resource {
            Resource::TamingSession => "taming",
            Resource::Duel => "duel",
            Resource::Arena => "arena",
            Resource::BossArena => "boss_arena",
        };
        metrics::ACTIVE_RESOURCES
            .with_label_values(&[label])
            .set(active as i64);
    }

    pub async fn status(&self) -> ServerStatus {
        let taming = self.taming.lock().await;
        let duel_pending = self.duel.lock().await.is_some();
        ServerStatus {
            taming: taming.as_ref().map(|s| SpawnInfo {
                session_id: s.id,
                species: s.species.display_name(),
                level: s.wild_level,
                preview: s.preview(),
            }),
            contributors: taming.as_ref().map_or(0, |s| s.contributions.len()),
            duel_pending,
            arena: self.arena.lock().await.phase,
            boss_arena: self.boss_arena.lock().await.phase,
        }
    }

    // ── Taming ────────────────────────────────────────────────────────

    /// Spawn a wild creature and start the taming window.
    pub async fn spawn(self: &Arc<Self>) -> GameResult<SpawnInfo> {
        let mut taming = self.taming.lock().await;
        if taming.is_some() {
            return self.busy(Resource::TamingSession);
        }
        {
            let arena = self.arena.lock().await;
            let boss_arena = self.boss_arena.lock().await;
            if let Some(resource) = Self::arena_busy(&arena, &boss_arena) {
                return self.busy(resource);
            }
        }
        let picked = self.roll(|rng| {
            spawn::select_species(self.catalog.wild(), rng)
                .map(|species| (species.clone(), spawn::roll_level(rng)))
        });
        let Some((species, level)) = picked else {
            tracing::warn!("Spawn failed: no species available");
            return Err(Rejection::NoSpecies.into());
        };

        let session = TamingSession::new(species, level);
        let info = SpawnInfo {
            session_id: session.id,
            species: session.species.display_name(),
            level,
            preview: session.preview(),
        };
        *taming = Some(session);
        drop(taming);

        metrics::TAMING_SESSIONS_TOTAL.inc();
        Self::set_active(Resource::TamingSession, true);
        tracing::info!(species = %info.species, level, "Creature spawned");
        self.emit(&OverlayEvent::SpawnDino {
            name: info.species.clone(),
            level,
            preview: info.preview,
        });
        self.say(
            ChatMessage::new("spawnDinoMessage")
                .with("currentDino", &info.species)
                .with("level", level)
                .with("duration", self.options.tame_duration.as_secs()),
        );

        let server = Arc::clone(self);
        let id = info.session_id;
        let delay = self.options.tame_duration;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = server.evaluate_session(id).await {
                tracing::error!(session = %id, "Timed taming evaluation failed: {e}");
            }
        });
        Ok(info)
    }

    /// Feed kibble to the active creature. Pays the kibble cost and rolls a tool.
    pub async fn contribute(&self, user: &str, kibble_input: &str) -> GameResult<ContributionReceipt> {
        let user = user_name(user);
        self.touch_user(user).await?;
        let mut taming = self.taming.lock().await;
        let Some(session) = taming.as_mut() else {
            return self.reject(user, "useKibbleMessageNotActive", Rejection::NotActive(Resource::TamingSession));
        };
        let profile = match session.check_contribution(user, kibble_input) {
            Ok(p) => p,
            Err(r @ Rejection::UnknownKibble(_)) => {
                return self.reject(user, "useKibbleMessageInvalidType", r)
            }
            Err(r) => return self.reject(user, "useKibbleMessageAlreadyTaming", r),
        };
        let balance = match self.economy.spend(user, profile.cost).await {
            Ok(b) => b,
            Err(GameError::Validation(r)) => {
                return self.reject(user, "useKibbleMessageNotEnoughPaste", r)
            }
            Err(e) => return Err(e),
        };
        let contribution =
            self.roll(|rng| session.contribute(user, profile, &self.settings, rng).clone());
        let receipt = ContributionReceipt {
            user: user.to_string(),
            kibble: contribution.kibble.key,
            weapon: contribution.weapon.name,
            quality: contribution.quality,
            balance,
        };
        tracing::info!(
            user,
            kibble = receipt.kibble,
            weapon = receipt.weapon,
            quality = receipt.quality,
            "Taming contribution"
        );
        self.say(
            ChatMessage::new("useKibbleMessageSuccess")
                .with("user", user)
                .with("input", receipt.kibble)
                .with("weapon", receipt.weapon)
                .with("quality", receipt.quality)
                .with("currentDino", session.species.display_name())
                .with("currentPaste", balance),
        );
        Ok(receipt)
    }

    /// Resolve the active session only if it is still the one `id` refers to.
    pub async fn evaluate_session(&self, id: Uuid) -> GameResult<Option<TamingReport>> {
        let session = {
            let mut taming = self.taming.lock().await;
            if taming.as_ref().is_some_and(|s| s.id == id) {
                taming.take()
            } else {
                None
            }
        };
        match session {
            Some(session) => self.resolve_session(session).await.map(Some),
            None => Ok(None),
        }
    }

    /// Knock out the creature and resolve every contributor.
    pub async fn evaluate(&self) -> GameResult<TamingReport> {
        let Some(session) = self.taming.lock().await.take() else {
            return Err(Rejection::NotActive(Resource::TamingSession).into());
        };
        self.resolve_session(session).await
    }

    async fn resolve_session(&self, session: TamingSession) -> GameResult<TamingReport> {
        Self::set_active(Resource::TamingSession, false);
        let name = session.species.display_name();

        if session.contributions.is_empty() {
            tracing::info!(species = %name, "Taming ended with no entries");
            self.say(ChatMessage::new("pickWinnerMessageNoEntries").with("currentDino", &name));
        }

        let report = self.roll(|rng| session.resolve(&self.settings, rng));
        let outcome = match report.knockout.outcome {
            KnockoutOutcome::Dead => "dead",
            KnockoutOutcome::KnockedOut => "knockedOut",
            KnockoutOutcome::None => "none",
        };
        if !session.contributions.is_empty() {
            metrics::KNOCKOUTS_TOTAL.with_label_values(&[outcome]).inc();
        }

        let mut winners = Vec::new();
        for result in &report.results {
            if result.attempt.is_none() {
                continue;
            }
            let label = if result.succeeded() { "success" } else { "failed" };
            metrics::TAME_ATTEMPTS_TOTAL.with_label_values(&[label]).inc();
            let (Some(attempt), Some(stats)) = (&result.attempt, &result.stats) else {
                continue;
            };
            match self
                .ledger
                .add(
                    &result.user,
                    &session.species.name,
                    session.wild_level,
                    attempt.effectiveness,
                    stats,
                )
                .await
            {
                Ok(_) => winners.push(result.user.clone()),
                Err(e) => tracing::error!(user = %result.user, "Failed to record tame: {e}"),
            }
        }

        tracing::info!(
            species = %name,
            outcome,
            contributors = report.results.len(),
            winners = winners.len(),
            "Taming evaluated"
        );
        if !session.contributions.is_empty() {
            if winners.is_empty() {
                self.say(ChatMessage::new("pickWinnerMessageFail").with("currentDino", &name));
            } else {
                self.say(
                    ChatMessage::new("pickWinnerMessage")
                        .with("currentDino", &name)
                        .with("winners", winners.join(", ")),
                );
            }
        }
        Ok(report)
    }

    /// Whether `user` already owns the currently spawned species.
    pub async fn check_tamed(&self, user: &str) -> GameResult<bool> {
        let user = user_name(user);
        self.touch_user(user).await?;
        let species = match self.taming.lock().await.as_ref() {
            Some(s) => s.species.name.clone(),
            None => {
                return self.reject(
                    user,
                    "checkUserTamedMessageNotActive",
                    Rejection::NotActive(Resource::TamingSession),
                )
            }
        };
        let owned = self.ledger.owns_species(user, &species).await?;
        let template = if owned {
            "checkUserTamedMessageYes"
        } else {
            "checkUserTamedMessageNo"
        };
        self.say(
            ChatMessage::new(template)
                .with("user", user)
                .with("currentDino", &species),
        );
        Ok(owned)
    }

    // ── Economy ───────────────────────────────────────────────────────

    pub async fn buy_paste(&self, user: &str) -> GameResult<i64> {
        let user = user_name(user);
        self.touch_user(user).await?;
        let amount = self.options.egg_paste_amount;
        let balance = self.economy.earn(user, amount).await?;
        self.say_credit(user, amount, balance);
        Ok(balance)
    }

    fn say_credit(&self, user: &str, amount: i64, balance: i64) {
        self.say(
            ChatMessage::new("buyEggPasteMessage")
                .with("user", user)
                .with("eggPasteAmountToAdd", amount)
                .with("amount", amount)
                .with("eggPaste", balance),
        );
    }

    pub async fn balance(&self, user: &str) -> GameResult<i64> {
        let user = user_name(user);
        self.touch_user(user).await?;
        let balance = self.economy.balance(user).await?;
        self.say(
            ChatMessage::new("getEggPasteMessage")
                .with("user", user)
                .with("eggPaste", balance),
        );
        Ok(balance)
    }

    /// Credit a reward redemption. Unparseable amounts cancel the redemption.
    pub async fn redeem(&self, user: &str, raw_amount: &str) -> GameResult<i64> {
        let user = user_name(user);
        self.touch_user(user).await?;
        let amount = match raw_amount.trim().parse::<i64>() {
            Ok(n) if n > 0 => n,
            _ => {
                self.reward_hook
                    .cancel_redemption(user, &format!("invalid amount '{raw_amount}'"));
                return self.reject(
                    user,
                    "commandRejectedMessage",
                    Rejection::InvalidAmount(raw_amount.trim().to_string()),
                );
            }
        };
        let balance = self.economy.earn(user, amount).await?;
        self.say_credit(user, amount, balance);
        Ok(balance)
    }

    pub async fn creatures(&self, user: &str) -> GameResult<Vec<TamedCreatureRecord>> {
        self.ledger.list(user_name(user)).await
    }

    // ── Duels ─────────────────────────────────────────────────────────

    /// Challenge `target`. Each side fights with one of their creatures, picked at random.
    pub async fn request_duel(self: &Arc<Self>, requester: &str, target: &str) -> GameResult<DuelRequest> {
        let requester = user_name(requester);
        self.touch_user(requester).await?;
        let mut duel = self.duel.lock().await;
        if duel.is_some() {
            return self.reject(requester, "commandRejectedMessage", GameError::ResourceBusy(Resource::Duel));
        }
        let mine = self.ledger.list(requester).await?;
        if mine.is_empty() {
            return self.reject(requester, "commandRejectedMessage", Rejection::NoCreatures(requester.to_string()));
        }
        let Some(target) = self.users.resolve(target).await? else {
            return self.reject(
                requester,
                "commandRejectedMessage",
                Rejection::UnknownUser(target.trim().to_string()),
            );
        };
        if target.eq_ignore_ascii_case(requester) {
            return self.reject(requester, "commandRejectedMessage", Rejection::SelfDuel(requester.to_string()));
        }
        let theirs = self.ledger.list(&target).await?;
        if theirs.is_empty() {
            return self.reject(requester, "commandRejectedMessage", Rejection::NoCreatures(target));
        }

        let (Some(a), Some(b)) = (self.pick_record(&mine), self.pick_record(&theirs)) else {
            return Err(GameError::DataIntegrity("duel roster vanished".into()));
        };
        let request = DuelRequest {
            id: Uuid::new_v4(),
            requester: requester.to_string(),
            target: target.clone(),
            requester_dino: a.combatant(requester),
            target_dino: b.combatant(&target),
            created_at: chrono::Utc::now(),
        };
        self.db.set(Scope::Global, DUEL_REQUESTER_KEY, requester).await?;
        self.db.set(Scope::Global, DUEL_TARGET_KEY, &target).await?;
        *duel = Some(DuelState::Pending(request.clone()));
        drop(duel);

        Self::set_active(Resource::Duel, true);
        tracing::info!(requester, target = %target, "Duel requested");
        self.say(
            ChatMessage::new("duelRequestMessage")
                .with("user", requester)
                .with("target", &target)
                .with("userDino", &request.requester_dino.name)
                .with("targetDino", &request.target_dino.name)
                .with("seconds", self.options.duel_timeout.as_secs()),
        );

        let server = Arc::clone(self);
        let id = request.id;
        let delay = self.options.duel_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = server.expire_duel(id).await {
                tracing::error!(duel = %id, "Duel expiry failed: {e}");
            }
        });
        Ok(request)
    }

    /// Move the pending duel to the fighting state if `claim` accepts it.
    async fn claim_duel(
        &self,
        claim: impl FnOnce(&DuelRequest) -> GameResult<()>,
    ) -> GameResult<DuelRequest> {
        let mut duel = self.duel.lock().await;
        match duel.take() {
            Some(DuelState::Pending(request)) => match claim(&request) {
                Ok(()) => {
                    *duel = Some(DuelState::Fighting);
                    Ok(request)
                }
                Err(e) => {
                    *duel = Some(DuelState::Pending(request));
                    Err(e)
                }
            },
            Some(DuelState::Fighting) => {
                *duel = Some(DuelState::Fighting);
                Err(GameError::ResourceBusy(Resource::Duel))
            }
            None => Err(Rejection::NotActive(Resource::Duel).into()),
        }
    }

    async fn finish_duel(&self) {
        *self.duel.lock().await = None;
        Self::set_active(Resource::Duel, false);
        for key in [DUEL_REQUESTER_KEY, DUEL_TARGET_KEY] {
            if let Err(e) = self.db.unset(Scope::Global, key).await {
                tracing::warn!(key, "Failed to clear duel variable: {e}");
            }
        }
    }

    /// Reject a duel if `id` is still pending.
    pub async fn expire_duel(&self, id: Uuid) -> GameResult<bool> {
        let claimed = self
            .claim_duel(|r| {
                if r.id == id {
                    Ok(())
                } else {
                    Err(Rejection::NotActive(Resource::Duel).into())
                }
            })
            .await;
        let Ok(request) = claimed else {
            return Ok(false);
        };
        tracing::info!(requester = %request.requester, target = %request.target, "Duel timed out");
        self.finish_duel().await;
        self.say(
            ChatMessage::new("duelRejectedMessage")
                .with("user", &request.requester)
                .with("target", &request.target),
        );
        Ok(true)
    }

    /// Accept or reject the pending duel. Only the challenged user may answer.
    pub async fn resolve_duel(&self, user: &str, accepted: bool) -> GameResult<DuelResult> {
        let user = user_name(user);
        let claimed = self
            .claim_duel(|r| {
                if r.target.eq_ignore_ascii_case(user) {
                    Ok(())
                } else {
                    Err(Rejection::NotChallenged(user.to_string()).into())
                }
            })
            .await;
        let request = match claimed {
            Ok(request) => request,
            Err(e) => return self.reject(user, "commandRejectedMessage", e),
        };

        if !accepted {
            tracing::info!(requester = %request.requester, target = %request.target, "Duel rejected");
            self.finish_duel().await;
            self.say(
                ChatMessage::new("duelRejectedMessage")
                    .with("user", &request.requester)
                    .with("target", &request.target),
            );
            return Ok(DuelResult {
                accepted: false,
                result: None,
                report: None,
            });
        }

        self.say(
            ChatMessage::new("duelAcceptedMessage")
                .with("user", &request.requester)
                .with("target", &request.target),
        );
        self.emit(&OverlayEvent::ClearFighters);
        self.emit(&OverlayEvent::add_fighter(&request.requester_dino));
        self.emit(&OverlayEvent::add_fighter(&request.target_dino));

        let report = self.roll(|rng| {
            duel::fight(
                &request.requester_dino,
                &request.target_dino,
                self.settings.duel_crit_chance,
                self.settings.duel_crit_multiplier,
                rng,
            )
        });
        metrics::BATTLES_TOTAL.with_label_values(&["duel"]).inc();
        metrics::BATTLE_EXCHANGES
            .with_label_values(&["duel"])
            .observe(report.exchanges.len() as f64);
        let played: Vec<&Strike> = report
            .exchanges
            .iter()
            .flat_map(|e| [&e.requester, &e.target])
            .collect();
        self.play_strikes(played).await;

        let (winner, loser) = match report.outcome {
            DuelOutcome::RequesterWins => (Some(&request.requester_dino), Some(&request.target_dino)),
            DuelOutcome::TargetWins => (Some(&request.target_dino), Some(&request.requester_dino)),
            DuelOutcome::Draw => (None, None),
        };
        if let Some(w) = winner {
            self.record_result(w, true).await;
        }
        if let Some(l) = loser {
            self.record_result(l, false).await;
        }

        tracing::info!(
            requester = %request.requester,
            target = %request.target,
            result = report.outcome.code(),
            exchanges = report.exchanges.len(),
            "Duel resolved"
        );
        self.say(
            ChatMessage::new("duelResultMessage")
                .with("winner", winner.map_or("", |c| c.label()))
                .with("loser", loser.map_or("", |c| c.label()))
                .with("result", report.outcome.code()),
        );
        self.emit(&OverlayEvent::ClearFighters);
        self.finish_duel().await;

        Ok(DuelResult {
            accepted: true,
            result: Some(report.outcome.code()),
            report: Some(report),
        })
    }

    // ── Readiness gate ────────────────────────────────────────────────

    /// Arm either a normal arena or a boss arena, unless something is running.
    pub async fn readiness_tick(&self) -> Readiness {
        let taming = self.taming.lock().await;
        let mut arena = self.arena.lock().await;
        let mut boss_arena = self.boss_arena.lock().await;
        if taming.is_some() || Self::arena_busy(&arena, &boss_arena).is_some() {
            return Readiness::Busy;
        }
        let boss = self.roll(|rng| rng.gen::<f64>() < self.settings.boss_ready_chance);
        let armed = if boss {
            arena.close();
            boss_arena.make_ready().map(|_| Readiness::BossArena)
        } else {
            boss_arena.close();
            arena.make_ready().map(|_| Readiness::Arena)
        };
        match armed {
            Ok(readiness) => {
                tracing::info!(?readiness, "Readiness gate armed");
                readiness
            }
            Err(_) => Readiness::Busy,
        }
    }

    // ── Arena ─────────────────────────────────────────────────────────

    /// Open the armed arena for entries and start the entry window.
    pub async fn open_arena(self: &Arc<Self>) -> GameResult<Uuid> {
        let taming = self.taming.lock().await;
        if taming.is_some() {
            return self.busy(Resource::TamingSession);
        }
        let mut arena = self.arena.lock().await;
        if Self::running(self.boss_arena.lock().await.phase) {
            return self.busy(Resource::BossArena);
        }
        let id = match arena.open() {
            Ok(id) => id,
            Err(GameError::ResourceBusy(resource)) => return self.busy(resource),
            Err(e) => return Err(e),
        };
        drop(arena);
        drop(taming);
        Self::set_active(Resource::Arena, true);
        tracing::info!(arena = %id, "Arena opened");
        self.emit(&OverlayEvent::ClearFighters);
        self.say(
            ChatMessage::new("arenaOpenMessage")
                .with("cost", self.options.arena_entry_cost)
                .with("seconds", self.options.arena_entry_window.as_secs()),
        );

        let server = Arc::clone(self);
        let delay = self.options.arena_entry_window;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let open = {
                let arena = server.arena.lock().await;
                arena.id == id && arena.phase == ArenaPhase::Open
            };
            if open {
                if let Err(e) = server.fight_arena().await {
                    tracing::error!(arena = %id, "Timed arena fight failed: {e}");
                }
            }
        });
        Ok(id)
    }

    /// Enter the open arena with a random owned creature.
    pub async fn join_arena(&self, user: &str) -> GameResult<Combatant> {
        let user = user_name(user);
        self.touch_user(user).await?;
        let mut arena = self.arena.lock().await;
        if let Err(r) = arena.check_entry(user) {
            return self.reject(user, "commandRejectedMessage", r);
        }
        let records = self.ledger.list(user).await?;
        let Some(record) = self.pick_record(&records) else {
            return self.reject(user, "commandRejectedMessage", Rejection::NoCreatures(user.to_string()));
        };
        let fighter = record.combatant(user);
        let cost = self.options.arena_entry_cost;
        if let Err(e) = self.economy.spend(user, cost).await {
            return match e {
                GameError::Validation(r) => self.reject(user, "commandRejectedMessage", r),
                other => Err(other),
            };
        }
        arena.add(fighter.clone(), cost.max(0));
        drop(arena);

        tracing::info!(user, dino = %fighter.name, "Arena entry");
        self.emit(&OverlayEvent::add_fighter(&fighter));
        self.say(
            ChatMessage::new("arenaJoinMessage")
                .with("user", user)
                .with("dino", &fighter.name),
        );
        Ok(fighter)
    }

    /// Fight out the open arena.
    pub async fn fight_arena(&self) -> GameResult<ArenaResult> {
        let (fighters, pot) = {
            let mut arena = self.arena.lock().await;
            if arena.phase != ArenaPhase::Open {
                return Err(Rejection::NotActive(Resource::Arena).into());
            }
            arena.phase = ArenaPhase::Fighting;
            (arena.fighters.clone(), arena.pot)
        };

        let report = self.roll(|rng| {
            arena::fight(
                &fighters,
                self.settings.arena_crit_chance,
                self.settings.arena_crit_multiplier,
                rng,
            )
        });
        let Some(report) = report else {
            if let Some(sole) = fighters.first().and_then(|f| f.owner.clone()) {
                if let Err(e) = self.economy.refund(&sole, pot).await {
                    tracing::error!(user = %sole, pot, "Arena refund failed: {e}");
                }
            }
            tracing::info!(entrants = fighters.len(), "Arena aborted");
            self.say(ChatMessage::new("arenaAbortMessage").with("pot", pot));
            self.close_arena().await;
            return Ok(ArenaResult {
                winner: None,
                pot,
                aborted: true,
                strikes: Vec::new(),
            });
        };

        metrics::BATTLES_TOTAL.with_label_values(&["arena"]).inc();
        metrics::BATTLE_EXCHANGES
            .with_label_values(&["arena"])
            .observe(report.strikes.len() as f64);
        self.play_strikes(&report.strikes).await;

        for &idx in &report.fallen {
            self.record_result(&fighters[idx], false).await;
        }
        let winner = &fighters[report.winner];
        self.record_result(winner, true).await;
        let winner_name = winner.label().to_string();
        self.pay(&winner_name, pot).await;

        tracing::info!(winner = %winner_name, pot, strikes = report.strikes.len(), "Arena resolved");
        self.say(
            ChatMessage::new("arenaWinnerMessage")
                .with("winner", &winner_name)
                .with("dino", &winner.name)
                .with("pot", pot),
        );
        self.close_arena().await;
        Ok(ArenaResult {
            winner: Some(winner_name),
            pot,
            aborted: false,
            strikes: report.strikes,
        })
    }

    async fn close_arena(&self) {
        self.arena.lock().await.close();
        Self::set_active(Resource::Arena, false);
        self.emit(&OverlayEvent::ClearFighters);
    }

    // ── Boss arena ────────────────────────────────────────────────────

    /// Spawn a random boss group into the armed boss arena.
    pub async fn spawn_boss(self: &Arc<Self>) -> GameResult<BossSpawnInfo> {
        let taming = self.taming.lock().await;
        if taming.is_some() {
            return self.busy(Resource::TamingSession);
        }
        let arena = self.arena.lock().await;
        if Self::running(arena.phase) {
            return self.busy(Resource::Arena);
        }
        let mut boss_arena = self.boss_arena.lock().await;
        if boss_arena.phase == ArenaPhase::Closed {
            return Err(Rejection::NotReady(Resource::BossArena).into());
        }
        let picked = self.roll(|rng| {
            spawn::select_boss_group(&self.catalog, rng).map(|(key, group)| {
                let level = spawn::roll_level(rng);
                let bosses: Vec<Combatant> =
                    group.iter().map(|s| boss_combatant(s, level)).collect();
                (key.to_string(), bosses)
            })
        });
        let Some((group, bosses)) = picked else {
            return Err(Rejection::NoSpecies.into());
        };
        let id = match boss_arena.spawn(&group, bosses.clone()) {
            Ok(id) => id,
            Err(GameError::ResourceBusy(resource)) => return self.busy(resource),
            Err(e) => return Err(e),
        };
        let pot = boss_arena.pot;
        drop(boss_arena);
        drop(arena);
        drop(taming);

        Self::set_active(Resource::BossArena, true);
        tracing::info!(group = %group, bosses = bosses.len(), pot, "Boss group spawned");
        self.emit(&OverlayEvent::ClearFighters);
        for boss in &bosses {
            self.emit(&OverlayEvent::add_boss(boss));
        }
        let names: Vec<&str> = bosses.iter().map(|b| b.name.as_str()).collect();
        self.say(
            ChatMessage::new("bossSpawnMessage")
                .with("bosses", names.join(", "))
                .with("pot", pot)
                .with("seconds", self.options.arena_entry_window.as_secs()),
        );

        let server = Arc::clone(self);
        let delay = self.options.arena_entry_window;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let open = {
                let arena = server.boss_arena.lock().await;
                arena.id == id && arena.phase == ArenaPhase::Open
            };
            if open {
                if let Err(e) = server.fight_boss().await {
                    tracing::error!(arena = %id, "Timed boss fight failed: {e}");
                }
            }
        });
        Ok(BossSpawnInfo {
            arena_id: id,
            group,
            bosses,
            pot,
        })
    }

    pub async fn join_boss(&self, user: &str) -> GameResult<Combatant> {
        let user = user_name(user);
        self.touch_user(user).await?;
        let mut boss_arena = self.boss_arena.lock().await;
        if let Err(r) = boss_arena.check_entry(user) {
            return self.reject(user, "commandRejectedMessage", r);
        }
        let records = self.ledger.list(user).await?;
        let Some(record) = self.pick_record(&records) else {
            return self.reject(user, "commandRejectedMessage", Rejection::NoCreatures(user.to_string()));
        };
        let fighter = record.combatant(user);
        boss_arena.add(fighter.clone());
        drop(boss_arena);

        tracing::info!(user, dino = %fighter.name, "Boss arena entry");
        self.emit(&OverlayEvent::add_fighter(&fighter));
        self.say(
            ChatMessage::new("arenaJoinMessage")
                .with("user", user)
                .with("dino", &fighter.name),
        );
        Ok(fighter)
    }

    pub async fn fight_boss(&self) -> GameResult<BossResult> {
        let (fighters, bosses, pot) = {
            let mut boss_arena = self.boss_arena.lock().await;
            if boss_arena.phase != ArenaPhase::Open {
                return Err(Rejection::NotActive(Resource::BossArena).into());
            }
            boss_arena.phase = ArenaPhase::Fighting;
            (
                boss_arena.fighters.clone(),
                boss_arena.bosses.clone(),
                boss_arena.pot,
            )
        };

        let report = self.roll(|rng| boss_arena::fight(&fighters, &bosses, &self.settings, rng));
        let Some(report) = report else {
            tracing::info!("Boss arena aborted: no fighters");
            self.say(ChatMessage::new("arenaAbortMessage").with("pot", 0));
            self.close_boss_arena().await;
            return Ok(BossResult {
                victory: false,
                survivors: Vec::new(),
                share: 0,
                aborted: true,
                strikes: Vec::new(),
            });
        };

        metrics::BATTLES_TOTAL.with_label_values(&["boss"]).inc();
        metrics::BATTLE_EXCHANGES
            .with_label_values(&["boss"])
            .observe(report.strikes.len() as f64);
        let played: Vec<&Strike> = report.strikes.iter().map(|s| &s.strike).collect();
        self.play_strikes(played).await;

        for &idx in &report.fallen {
            self.record_result(&fighters[idx], false).await;
        }
        let share = report.share(pot);
        let mut survivors = Vec::new();
        for &idx in &report.survivors {
            let fighter = &fighters[idx];
            self.record_result(fighter, true).await;
            self.pay(fighter.label(), share).await;
            survivors.push(fighter.label().to_string());
        }

        tracing::info!(
            victory = report.victory,
            survivors = survivors.len(),
            share,
            "Boss arena resolved"
        );
        if report.victory {
            self.say(
                ChatMessage::new("bossVictoryMessage")
                    .with("winners", survivors.join(", "))
                    .with("share", share),
            );
        } else {
            let names: Vec<&str> = bosses.iter().map(|b| b.name.as_str()).collect();
            self.say(ChatMessage::new("bossDefeatMessage").with("bosses", names.join(", ")));
        }
        self.close_boss_arena().await;
        Ok(BossResult {
            victory: report.victory,
            survivors,
            share,
            aborted: false,
            strikes: report.strikes,
        })
    }

    async fn close_boss_arena(&self) {
        self.boss_arena.lock().await.close();
        Self::set_active(Resource::BossArena, false);
        self.emit(&OverlayEvent::ClearFighters);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::catalog::tests::SAMPLE;

    async fn server() -> Arc<GameServer> {
        server_with(GameSettings::default()).await
    }

    async fn server_with(settings: GameSettings) -> Arc<GameServer> {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let catalog = SpeciesCatalog::from_json(SAMPLE).unwrap();
        let options = ServerOptions {
            pacing: Duration::ZERO,
            ..ServerOptions::default()
        };
        Arc::new(
            GameServer::new(catalog, db, options)
                .with_settings(settings)
                .with_rng(StdRng::seed_from_u64(7)),
        )
    }

    #[tokio::test]
    async fn test_second_spawn_is_busy() {
        let server = server().await;
        let info = server.spawn().await.unwrap();
        assert!(["Raptor", "Dodo"].contains(&info.species.as_str()));
        assert_eq!(info.level % 5, 0);
        assert!(matches!(
            server.spawn().await,
            Err(GameError::ResourceBusy(Resource::TamingSession))
        ));
    }

    #[tokio::test]
    async fn test_spawn_broadcasts_overlay_and_chat() {
        let server = server().await;
        let mut overlay = server.subscribe_overlay();
        let mut chat = server.subscribe_chat();
        server.spawn().await.unwrap();

        let event: serde_json::Value = serde_json::from_str(&overlay.recv().await.unwrap()).unwrap();
        assert_eq!(event["type"], "spawnDino");
        let msg: serde_json::Value = serde_json::from_str(&chat.recv().await.unwrap()).unwrap();
        assert_eq!(msg["template"], "spawnDinoMessage");
    }

    #[tokio::test]
    async fn test_contribute_requires_session_and_paste() {
        let server = server().await;
        let err = server.contribute("alice", "basic").await.unwrap_err();
        assert_eq!(
            err.rejection(),
            Some(&Rejection::NotActive(Resource::TamingSession))
        );

        server.spawn().await.unwrap();
        let err = server.contribute("alice", "basic").await.unwrap_err();
        assert!(matches!(
            err.rejection(),
            Some(Rejection::InsufficientFunds { .. })
        ));

        server.buy_paste("alice").await.unwrap();
        let receipt = server.contribute("alice", "regular").await.unwrap();
        assert_eq!(receipt.balance, 6);
        assert!((100.0..=350.0).contains(&receipt.quality));

        let err = server.contribute("alice", "basic").await.unwrap_err();
        assert_eq!(
            err.rejection(),
            Some(&Rejection::AlreadyContributed("alice".into()))
        );
        // Rejected contributions cost nothing
        assert_eq!(server.economy().balance("alice").await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_evaluate_clears_session() {
        let server = server().await;
        let info = server.spawn().await.unwrap();
        server.evaluate().await.unwrap();
        assert!(server.status().await.taming.is_none());
        // A stale timer is a no-op
        assert!(server.evaluate_session(info.session_id).await.unwrap().is_none());
        assert!(server.evaluate().await.is_err());
    }

    #[tokio::test]
    async fn test_redeem_invalid_amount() {
        let server = server().await;
        let err = server.redeem("alice", "lots").await.unwrap_err();
        assert_eq!(
            err.rejection(),
            Some(&Rejection::InvalidAmount("lots".into()))
        );
        assert_eq!(server.redeem("alice", " 25 ").await.unwrap(), 25);
    }

    #[tokio::test]
    async fn test_arena_requires_ready() {
        let server = server().await;
        let err = server.open_arena().await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::NotReady(Resource::Arena)));
    }

    fn drain(chat: &mut broadcast::Receiver<String>) -> Vec<serde_json::Value> {
        let mut messages = Vec::new();
        while let Ok(msg) = chat.try_recv() {
            messages.push(serde_json::from_str(&msg).unwrap());
        }
        messages
    }

    #[tokio::test]
    async fn test_spawn_and_arena_open_cannot_both_win() {
        let server = server_with(GameSettings {
            boss_ready_chance: 0.0,
            ..GameSettings::default()
        })
        .await;
        assert_eq!(server.readiness_tick().await, Readiness::Arena);

        // Park both commands behind the arena lock, then release them together
        let held = server.arena.lock().await;
        let spawner = tokio::spawn({
            let server = server.clone();
            async move { server.spawn().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let opener = tokio::spawn({
            let server = server.clone();
            async move { server.open_arena().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(held);

        let spawned = spawner.await.unwrap();
        let opened = opener.await.unwrap();
        assert!(spawned.is_ok());
        assert!(matches!(
            opened,
            Err(GameError::ResourceBusy(Resource::TamingSession))
        ));
        let status = server.status().await;
        assert!(status.taming.is_some());
        assert_eq!(status.arena, ArenaPhase::Ready);
    }

    #[tokio::test]
    async fn test_stale_timer_leaves_new_session() {
        let server = server().await;
        let first = server.spawn().await.unwrap();
        server.evaluate().await.unwrap();
        let second = server.spawn().await.unwrap();

        assert!(server.evaluate_session(first.session_id).await.unwrap().is_none());
        let current = server.status().await.taming.map(|t| t.session_id);
        assert_eq!(current, Some(second.session_id));
    }

    #[tokio::test]
    async fn test_spawn_fails_when_no_species_live_on_map() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let catalog = SpeciesCatalog::from_json(SAMPLE)
            .unwrap()
            .filter_habitats(&["Valguero".to_string()]);
        assert!(catalog.wild().is_empty());
        let server = Arc::new(GameServer::new(catalog, db, ServerOptions::default()));

        let err = server.spawn().await.unwrap_err();
        assert!(matches!(err, GameError::Validation(Rejection::NoSpecies)));
        assert!(server.status().await.taming.is_none());
    }

    #[tokio::test]
    async fn test_busy_spawn_is_reported_in_chat() {
        let server = server().await;
        server.spawn().await.unwrap();
        let mut chat = server.subscribe_chat();
        server.spawn().await.unwrap_err();

        let messages = drain(&mut chat);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["template"], "commandRejectedMessage");
        assert_eq!(
            messages[0]["values"]["reason"],
            "taming session is already active"
        );
    }

    #[tokio::test]
    async fn test_paste_messages_carry_amounts() {
        let server = server().await;
        server.spawn().await.unwrap();
        let mut chat = server.subscribe_chat();

        server.contribute("alice", "regular").await.unwrap_err();
        server.buy_paste("alice").await.unwrap();
        server.contribute("alice", "regular").await.unwrap();

        let messages = drain(&mut chat);
        let find = |template: &str| {
            messages
                .iter()
                .find(|m| m["template"] == template)
                .map(|m| m["values"].clone())
                .unwrap()
        };
        let poor = find("useKibbleMessageNotEnoughPaste");
        assert_eq!(poor["user"], "alice");
        assert_eq!(poor["currentPaste"], "0");
        assert_eq!(poor["cost"], "4");

        let bought = find("buyEggPasteMessage");
        assert_eq!(bought["eggPasteAmountToAdd"], "10");
        assert_eq!(bought["eggPaste"], "10");

        let fed = find("useKibbleMessageSuccess");
        assert_eq!(fed["input"], "regular");
        assert_eq!(fed["currentPaste"], "6");
        assert!(fed["currentDino"].is_string());
    }

    #[tokio::test]
    async fn test_user_names_are_normalized() {
        let server = server().await;
        server.buy_paste(" alice").await.unwrap();
        assert_eq!(server.balance("@Alice ").await.unwrap(), 10);

        server.spawn().await.unwrap();
        let receipt = server.contribute("alice", "basic").await.unwrap();
        assert_eq!(receipt.user, "alice");
        let err = server.contribute(" ALICE ", "basic").await.unwrap_err();
        assert!(matches!(
            err.rejection(),
            Some(Rejection::AlreadyContributed(_))
        ));
        assert_eq!(server.balance("alice").await.unwrap(), receipt.balance);
    }
}
