// Error taxonomy shared by the engine, ledgers and the HTTP adapter.

use serde::Serialize;
use thiserror::Error;

/// One-at-a-time resources guarded by the game server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    TamingSession,
    Duel,
    Arena,
    BossArena,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::TamingSession => write!(f, "taming session"),
            Resource::Duel => write!(f, "duel"),
            Resource::Arena => write!(f, "arena"),
            Resource::BossArena => write!(f, "boss arena"),
        }
    }
}

/// Why a user command was refused. No state is mutated when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no {0} is active")]
    NotActive(Resource),
    #[error("{0} is not ready")]
    NotReady(Resource),
    #[error("no species available to spawn")]
    NoSpecies,
    #[error("{0} already contributed to this taming")]
    AlreadyContributed(String),
    #[error("unknown kibble type '{0}'")]
    UnknownKibble(String),
    #[error("{user} has {balance} egg paste but needs {cost}")]
    InsufficientFunds { user: String, balance: i64, cost: i64 },
    #[error("{0} cannot duel themselves")]
    SelfDuel(String),
    #[error("{0} owns no creatures")]
    NoCreatures(String),
    #[error("unknown user '{0}'")]
    UnknownUser(String),
    #[error("{0} is not the challenged user")]
    NotChallenged(String),
    #[error("{0} already entered")]
    AlreadyEntered(String),
    #[error("'{0}' is not a valid currency amount")]
    InvalidAmount(String),
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Validation(#[from] Rejection),
    #[error("data integrity error: {0}")]
    DataIntegrity(String),
    #[error("{0} is already active")]
    ResourceBusy(Resource),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl From<serde_json::Error> for GameError {
    fn from(e: serde_json::Error) -> Self {
        GameError::DataIntegrity(format!("malformed JSON: {e}"))
    }
}

impl GameError {
    /// The rejection reason, if this is a validation failure.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            GameError::Validation(r) => Some(r),
            _ => None,
        }
    }
}

pub type GameResult<T> = Result<T, GameError>;
