// Integration tests driving the game server end to end against an in-memory
// database: taming, duels, arenas and boss arenas.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use dinotame::db::{Database, Scope};
use dinotame::engine::arena::ArenaPhase;
use dinotame::engine::catalog::SpeciesCatalog;
use dinotame::engine::config::GameSettings;
use dinotame::engine::knockout::KnockoutOutcome;
use dinotame::engine::server::{GameServer, Readiness, ServerOptions, DUEL_REQUESTER_KEY};
use dinotame::engine::stats::{LeveledStats, StatKind, STAT_COUNT};
use dinotame::error::{GameError, Rejection, Resource};

/// One wild species that any torpor tool knocks out on the first hit, and a
/// harmless boss group worth a pot of 20.
const CATALOG: &str = r#"[
    {"Name": "Gigant", "Maps": ["Test Island"],
     "Stats": {
        "Health": {"Base": 1000000000, "Wild": 0, "Tame": 0},
        "Food": {"Base": 500, "Wild": 0},
        "Damage": {"Base": 30, "Wild": 0, "Tame": 0},
        "Torpor": {"Base": 1, "Wild": 0}
     }},
    {"Name": "Titan", "Boss": "Titans", "Maps": [],
     "Stats": {"Health": {"Base": 20000, "Wild": 0}, "Damage": {"Base": 0}}}
]"#;

fn settings() -> GameSettings {
    GameSettings {
        lethal_tool_chance: 0.0,
        negative_event_chance: 0.0,
        ..GameSettings::default()
    }
}

fn options() -> ServerOptions {
    ServerOptions {
        tame_duration: Duration::from_secs(3600),
        duel_timeout: Duration::from_secs(3600),
        arena_entry_window: Duration::from_secs(3600),
        arena_entry_cost: 5,
        egg_paste_amount: 10,
        pacing: Duration::ZERO,
    }
}

async fn setup(settings: GameSettings) -> (Arc<GameServer>, Database) {
    let db = Database::new("sqlite::memory:").await.unwrap();
    let catalog = SpeciesCatalog::from_json(CATALOG).unwrap();
    let server = GameServer::new(catalog, db.clone(), options())
        .with_settings(settings)
        .with_rng(StdRng::seed_from_u64(42));
    (Arc::new(server), db)
}

fn stats(health: i64, damage: i64) -> LeveledStats {
    let mut totals = [0i64; STAT_COUNT];
    totals[StatKind::Health.index()] = health;
    totals[StatKind::Damage.index()] = damage;
    LeveledStats {
        totals,
        bonus_levels: 0,
    }
}

/// Give `user` one creature with the given stats and register them.
async fn give_creature(server: &GameServer, user: &str, health: i64, damage: i64) -> i64 {
    server.balance(user).await.unwrap();
    server
        .ledger()
        .add(user, "Gigant", 10, 100.0, &stats(health, damage))
        .await
        .unwrap()
        .id
}

// ── Taming ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_taming_knockout_records_creatures() {
    let (server, _db) = setup(settings()).await;
    server.buy_paste("alice").await.unwrap();
    server.buy_paste("bob").await.unwrap();

    let info = server.spawn().await.unwrap();
    assert_eq!(info.species, "Gigant");

    server.contribute("alice", "basic").await.unwrap();
    server.contribute("bob", "Superior").await.unwrap();
    assert_eq!(server.status().await.contributors, 2);
    assert_eq!(server.economy().balance("alice").await.unwrap(), 9);
    assert_eq!(server.economy().balance("bob").await.unwrap(), 2);

    let report = server.evaluate().await.unwrap();
    assert_eq!(report.knockout.outcome, KnockoutOutcome::KnockedOut);
    assert_eq!(report.winners().count(), 2);

    let alice = server.creatures("alice").await.unwrap();
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].species, "Gigant");
    assert_eq!(alice[0].wild_level, info.level);
    assert_eq!(alice[0].wins, 0);
    assert_eq!(server.creatures("bob").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_check_tamed_against_current_spawn() {
    let (server, _db) = setup(settings()).await;
    let err = server.check_tamed("alice").await.unwrap_err();
    assert_eq!(
        err.rejection(),
        Some(&Rejection::NotActive(Resource::TamingSession))
    );

    give_creature(&server, "alice", 100, 10).await;
    server.spawn().await.unwrap();
    assert!(server.check_tamed("ALICE").await.unwrap());
    assert!(!server.check_tamed("bob").await.unwrap());
}

#[tokio::test]
async fn test_empty_taming_emits_no_entries() {
    let (server, _db) = setup(settings()).await;
    let mut chat = server.subscribe_chat();
    server.spawn().await.unwrap();
    let report = server.evaluate().await.unwrap();
    assert!(report.results.is_empty());
    assert_eq!(report.knockout.outcome, KnockoutOutcome::None);

    let mut templates = Vec::new();
    while let Ok(msg) = chat.try_recv() {
        let value: serde_json::Value = serde_json::from_str(&msg).unwrap();
        templates.push(value["template"].as_str().unwrap().to_string());
    }
    assert_eq!(templates, vec!["spawnDinoMessage", "pickWinnerMessageNoEntries"]);
}

// ── Duels ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_duel_winner_gains_loser_removed() {
    let (server, db) = setup(settings()).await;
    let alice_id = give_creature(&server, "alice", 1000, 250).await;
    give_creature(&server, "bob", 100, 1).await;
    let mut overlay = server.subscribe_overlay();

    let request = server.request_duel("alice", "@Bob").await.unwrap();
    assert_eq!(request.target, "bob");
    assert_eq!(
        db.get(Scope::Global, DUEL_REQUESTER_KEY).await.unwrap().as_deref(),
        Some("alice")
    );

    let result = server.resolve_duel("bob", true).await.unwrap();
    assert!(result.accepted);
    assert_eq!(result.result, Some(1));
    assert_eq!(result.report.unwrap().exchanges.len(), 1);

    let alice = server.ledger().get("alice", alice_id).await.unwrap().unwrap();
    assert_eq!(alice.wins, 1);
    assert!(server.creatures("bob").await.unwrap().is_empty());

    // Duel variables are cleared once the fight is over
    assert!(db.get(Scope::Global, DUEL_REQUESTER_KEY).await.unwrap().is_none());
    assert!(!server.status().await.duel_pending);

    let mut kinds = Vec::new();
    while let Ok(msg) = overlay.try_recv() {
        let value: serde_json::Value = serde_json::from_str(&msg).unwrap();
        kinds.push(value["type"].as_str().unwrap().to_string());
    }
    assert_eq!(kinds.first().map(String::as_str), Some("clearFighters"));
    assert_eq!(kinds.iter().filter(|k| *k == "addFighter").count(), 2);
    assert!(kinds.iter().any(|k| k == "attackFighter"));
    assert_eq!(kinds.last().map(String::as_str), Some("clearFighters"));
}

#[tokio::test]
async fn test_duel_rejections() {
    let (server, _db) = setup(settings()).await;
    let err = server.request_duel("alice", "bob").await.unwrap_err();
    assert_eq!(
        err.rejection(),
        Some(&Rejection::NoCreatures("alice".into()))
    );

    give_creature(&server, "alice", 100, 10).await;
    let err = server.request_duel("alice", "nobody").await.unwrap_err();
    assert_eq!(
        err.rejection(),
        Some(&Rejection::UnknownUser("nobody".into()))
    );
    let err = server.request_duel("alice", "Alice").await.unwrap_err();
    assert!(matches!(err.rejection(), Some(Rejection::SelfDuel(_))));

    server.balance("bob").await.unwrap();
    let err = server.request_duel("alice", "bob").await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::NoCreatures("bob".into())));

    give_creature(&server, "bob", 100, 10).await;
    give_creature(&server, "carol", 100, 10).await;
    server.request_duel("alice", "bob").await.unwrap();
    assert!(matches!(
        server.request_duel("carol", "bob").await,
        Err(GameError::ResourceBusy(Resource::Duel))
    ));
    let err = server.resolve_duel("carol", true).await.unwrap_err();
    assert_eq!(
        err.rejection(),
        Some(&Rejection::NotChallenged("carol".into()))
    );
}

#[tokio::test]
async fn test_duel_declined_leaves_records() {
    let (server, _db) = setup(settings()).await;
    give_creature(&server, "alice", 100, 10).await;
    give_creature(&server, "bob", 100, 10).await;

    server.request_duel("alice", "bob").await.unwrap();
    let result = server.resolve_duel("bob", false).await.unwrap();
    assert!(!result.accepted);
    assert!(result.result.is_none());
    assert_eq!(server.creatures("alice").await.unwrap()[0].wins, 0);
    assert_eq!(server.creatures("bob").await.unwrap().len(), 1);

    let err = server.resolve_duel("bob", true).await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::NotActive(Resource::Duel)));
}

#[tokio::test]
async fn test_duel_expires() {
    let (server, _db) = setup(settings()).await;
    give_creature(&server, "alice", 100, 10).await;
    give_creature(&server, "bob", 100, 10).await;

    let request = server.request_duel("alice", "bob").await.unwrap();
    assert!(server.expire_duel(request.id).await.unwrap());
    assert!(!server.status().await.duel_pending);
    // A second expiry for the same request is a no-op
    assert!(!server.expire_duel(request.id).await.unwrap());
}

#[tokio::test]
async fn test_stale_duel_expiry_spares_new_request() {
    let (server, _db) = setup(settings()).await;
    give_creature(&server, "alice", 100, 10).await;
    give_creature(&server, "bob", 100, 10).await;

    let first = server.request_duel("alice", "bob").await.unwrap();
    server.resolve_duel("bob", false).await.unwrap();
    let second = server.request_duel(" alice", "bob").await.unwrap();
    assert_eq!(second.requester, "alice");

    assert!(!server.expire_duel(first.id).await.unwrap());
    assert!(server.status().await.duel_pending);
    assert!(server.expire_duel(second.id).await.unwrap());
}

// ── Arena ─────────────────────────────────────────────────────────────

fn arena_settings() -> GameSettings {
    GameSettings {
        boss_ready_chance: 0.0,
        ..settings()
    }
}

#[tokio::test]
async fn test_arena_single_survivor_takes_pot() {
    let (server, _db) = setup(arena_settings()).await;
    give_creature(&server, "alice", 300, 40).await;
    give_creature(&server, "bob", 300, 40).await;
    server.buy_paste("alice").await.unwrap();
    server.buy_paste("bob").await.unwrap();

    assert_eq!(server.readiness_tick().await, Readiness::Arena);
    server.open_arena().await.unwrap();
    server.join_arena("alice").await.unwrap();
    server.join_arena("bob").await.unwrap();
    let err = server.join_arena("Alice").await.unwrap_err();
    assert!(matches!(err.rejection(), Some(Rejection::AlreadyEntered(_))));

    let result = server.fight_arena().await.unwrap();
    assert!(!result.aborted);
    assert_eq!(result.pot, 10);
    assert!(result.strikes.last().unwrap().lethal);
    let winner = result.winner.unwrap();
    let loser = if winner == "alice" { "bob" } else { "alice" };

    assert_eq!(server.economy().balance(&winner).await.unwrap(), 15);
    assert_eq!(server.economy().balance(loser).await.unwrap(), 5);
    assert_eq!(server.creatures(&winner).await.unwrap()[0].wins, 1);
    assert!(server.creatures(loser).await.unwrap().is_empty());
    assert_eq!(server.status().await.arena, ArenaPhase::Closed);
}

#[tokio::test]
async fn test_arena_sole_entrant_refunded() {
    let (server, _db) = setup(arena_settings()).await;
    give_creature(&server, "alice", 300, 40).await;
    server.buy_paste("alice").await.unwrap();

    server.readiness_tick().await;
    server.open_arena().await.unwrap();
    server.join_arena("alice").await.unwrap();
    assert_eq!(server.economy().balance("alice").await.unwrap(), 5);

    let result = server.fight_arena().await.unwrap();
    assert!(result.aborted);
    assert!(result.winner.is_none());
    assert_eq!(server.economy().balance("alice").await.unwrap(), 10);
    assert_eq!(server.creatures("alice").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_arena_entry_needs_paste_and_creature() {
    let (server, _db) = setup(arena_settings()).await;
    server.readiness_tick().await;
    server.open_arena().await.unwrap();

    let err = server.join_arena("alice").await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::NoCreatures("alice".into())));

    give_creature(&server, "alice", 300, 40).await;
    let err = server.join_arena("alice").await.unwrap_err();
    assert!(matches!(
        err.rejection(),
        Some(Rejection::InsufficientFunds { cost: 5, .. })
    ));
}

#[tokio::test]
async fn test_arena_and_taming_are_exclusive() {
    let (server, _db) = setup(arena_settings()).await;
    server.readiness_tick().await;
    server.open_arena().await.unwrap();
    assert!(matches!(
        server.spawn().await,
        Err(GameError::ResourceBusy(Resource::Arena))
    ));
    assert_eq!(server.readiness_tick().await, Readiness::Busy);
}

#[tokio::test]
async fn test_readiness_busy_while_taming() {
    let (server, _db) = setup(arena_settings()).await;
    server.spawn().await.unwrap();
    assert_eq!(server.readiness_tick().await, Readiness::Busy);
    assert!(matches!(
        server.open_arena().await,
        Err(GameError::ResourceBusy(Resource::TamingSession))
    ));
}

// ── Boss arena ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_boss_arena_victory_splits_pot() {
    let settings = GameSettings {
        boss_ready_chance: 1.0,
        ..settings()
    };
    let (server, _db) = setup(settings).await;
    give_creature(&server, "alice", 500, 200).await;
    give_creature(&server, "bob", 500, 200).await;

    assert_eq!(server.readiness_tick().await, Readiness::BossArena);
    let err = server.open_arena().await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::NotReady(Resource::Arena)));

    let info = server.spawn_boss().await.unwrap();
    assert_eq!(info.group, "Titans");
    assert_eq!(info.pot, 20);

    server.join_boss("alice").await.unwrap();
    server.join_boss("bob").await.unwrap();
    let result = server.fight_boss().await.unwrap();
    assert!(result.victory);
    assert_eq!(result.survivors.len(), 2);
    assert_eq!(result.share, 10);

    for user in ["alice", "bob"] {
        assert_eq!(server.economy().balance(user).await.unwrap(), 10);
        assert_eq!(server.creatures(user).await.unwrap()[0].wins, 1);
    }
    assert_eq!(server.status().await.boss_arena, ArenaPhase::Closed);
}

#[tokio::test]
async fn test_boss_arena_without_fighters_aborts() {
    let settings = GameSettings {
        boss_ready_chance: 1.0,
        ..settings()
    };
    let (server, _db) = setup(settings).await;
    let err = server.spawn_boss().await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::NotReady(Resource::BossArena)));

    server.readiness_tick().await;
    server.spawn_boss().await.unwrap();
    let result = server.fight_boss().await.unwrap();
    assert!(result.aborted);
    assert_eq!(result.share, 0);
}
