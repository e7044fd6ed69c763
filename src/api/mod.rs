// HTTP API routes: a thin JSON adapter over the game server.

pub mod ws;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::engine::server::GameServer;
use crate::error::{GameError, GameResult};
use crate::metrics;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ContributeRequest {
    pub user: String,
    pub kibble: String,
}

#[derive(Deserialize)]
pub struct RedeemRequest {
    /// Raw reward input; anything but a positive integer cancels the redemption.
    pub amount: Value,
}

#[derive(Deserialize)]
pub struct DuelRequestBody {
    pub requester: String,
    pub target: String,
}

#[derive(Deserialize)]
pub struct DuelResolveRequest {
    pub user: String,
    pub accepted: bool,
}

#[derive(Deserialize)]
pub struct UserRequest {
    pub user: String,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub game_server: Arc<GameServer>,
}

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

fn game_error(e: GameError) -> Response {
    match &e {
        GameError::Validation(_) => {
            json_error(StatusCode::BAD_REQUEST, &e.to_string()).into_response()
        }
        GameError::ResourceBusy(_) => json_error(StatusCode::CONFLICT, &e.to_string()).into_response(),
        GameError::Configuration(_) | GameError::DataIntegrity(_) | GameError::Storage(_) => {
            tracing::error!("Request failed: {e}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

fn respond<T: Serialize>(result: GameResult<T>) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => game_error(e),
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(game_server: Arc<GameServer>) -> Router {
    let state = AppState { game_server };

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/status", get(status))
        // Taming
        .route("/api/taming/spawn", post(spawn))
        .route("/api/taming/contribute", post(contribute))
        .route("/api/taming/evaluate", post(evaluate))
        // Users
        .route("/api/users/{user}/balance", get(balance))
        .route("/api/users/{user}/paste", post(buy_paste))
        .route("/api/users/{user}/redeem", post(redeem))
        .route("/api/users/{user}/creatures", get(creatures))
        .route("/api/users/{user}/has-tamed", get(has_tamed))
        // Duels
        .route("/api/duel/request", post(request_duel))
        .route("/api/duel/resolve", post(resolve_duel))
        // Arena
        .route("/api/arena/open", post(open_arena))
        .route("/api/arena/join", post(join_arena))
        .route("/api/arena/fight", post(fight_arena))
        // Boss arena
        .route("/api/boss/spawn", post(spawn_boss))
        .route("/api/boss/join", post(join_boss))
        .route("/api/boss/fight", post(fight_boss))
        .route("/api/readiness/tick", post(readiness_tick))
        // WebSocket
        .route("/ws/overlay", get(ws::ws_overlay))
        .route("/ws/chat", get(ws::ws_chat))
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "dinotame" }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

async fn status(State(state): State<AppState>) -> Response {
    respond(Ok(state.game_server.status().await))
}

// ── Taming handlers ───────────────────────────────────────────────────

async fn spawn(State(state): State<AppState>) -> Response {
    respond(state.game_server.spawn().await)
}

async fn contribute(State(state): State<AppState>, Json(req): Json<ContributeRequest>) -> Response {
    if req.user.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "user is required").into_response();
    }
    respond(state.game_server.contribute(&req.user, &req.kibble).await)
}

async fn evaluate(State(state): State<AppState>) -> Response {
    respond(state.game_server.evaluate().await)
}

// ── User handlers ─────────────────────────────────────────────────────

async fn balance(State(state): State<AppState>, Path(user): Path<String>) -> Response {
    respond(
        state
            .game_server
            .balance(&user)
            .await
            .map(|balance| json!({ "user": user, "balance": balance })),
    )
}

async fn buy_paste(State(state): State<AppState>, Path(user): Path<String>) -> Response {
    respond(
        state
            .game_server
            .buy_paste(&user)
            .await
            .map(|balance| json!({ "user": user, "balance": balance })),
    )
}

async fn redeem(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<RedeemRequest>,
) -> Response {
    let raw = match &req.amount {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    respond(
        state
            .game_server
            .redeem(&user, &raw)
            .await
            .map(|balance| json!({ "user": user, "balance": balance })),
    )
}

async fn creatures(State(state): State<AppState>, Path(user): Path<String>) -> Response {
    respond(state.game_server.creatures(&user).await)
}

async fn has_tamed(State(state): State<AppState>, Path(user): Path<String>) -> Response {
    respond(
        state
            .game_server
            .check_tamed(&user)
            .await
            .map(|owned| json!({ "user": user, "tamed": owned })),
    )
}

// ── Duel handlers ─────────────────────────────────────────────────────

async fn request_duel(State(state): State<AppState>, Json(req): Json<DuelRequestBody>) -> Response {
    respond(state.game_server.request_duel(&req.requester, &req.target).await)
}

async fn resolve_duel(
    State(state): State<AppState>,
    Json(req): Json<DuelResolveRequest>,
) -> Response {
    respond(state.game_server.resolve_duel(&req.user, req.accepted).await)
}

// ── Arena handlers ────────────────────────────────────────────────────

async fn open_arena(State(state): State<AppState>) -> Response {
    respond(
        state
            .game_server
            .open_arena()
            .await
            .map(|id| json!({ "arena_id": id })),
    )
}

async fn join_arena(State(state): State<AppState>, Json(req): Json<UserRequest>) -> Response {
    respond(state.game_server.join_arena(&req.user).await)
}

async fn fight_arena(State(state): State<AppState>) -> Response {
    respond(state.game_server.fight_arena().await)
}

async fn spawn_boss(State(state): State<AppState>) -> Response {
    respond(state.game_server.spawn_boss().await)
}

async fn join_boss(State(state): State<AppState>, Json(req): Json<UserRequest>) -> Response {
    respond(state.game_server.join_boss(&req.user).await)
}

async fn fight_boss(State(state): State<AppState>) -> Response {
    respond(state.game_server.fight_boss().await)
}

async fn readiness_tick(State(state): State<AppState>) -> Response {
    respond(Ok(json!({ "armed": state.game_server.readiness_tick().await })))
}
