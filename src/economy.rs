// Egg paste balances: the integer currency that pays for kibble and arena entry.

use std::sync::Arc;

use crate::db::{Database, Scope};
use crate::error::{GameError, GameResult, Rejection};
use crate::locks::UserLocks;
use crate::metrics;

pub const BALANCE_KEY: &str = "dinoTame_egg_paste";

#[derive(Clone)]
pub struct EconomyLedger {
    db: Database,
    locks: Arc<UserLocks>,
}

impl EconomyLedger {
    pub fn new(db: Database, locks: Arc<UserLocks>) -> Self {
        Self { db, locks }
    }

    async fn read(&self, user: &str) -> GameResult<i64> {
        match self.db.get(Scope::User(user), BALANCE_KEY).await? {
            None => Ok(0),
            Some(raw) => raw.trim().parse().map_err(|_| {
                GameError::DataIntegrity(format!("balance for {user} is not a number: {raw:?}"))
            }),
        }
    }

    async fn write(&self, user: &str, balance: i64) -> GameResult<()> {
        self.db
            .set(Scope::User(user), BALANCE_KEY, &balance.to_string())
            .await?;
        Ok(())
    }

    pub async fn balance(&self, user: &str) -> GameResult<i64> {
        self.read(user).await
    }

    /// Credit `amount`; returns the new balance.
    pub async fn earn(&self, user: &str, amount: i64) -> GameResult<i64> {
        if amount <= 0 {
            return Err(Rejection::InvalidAmount(amount.to_string()).into());
        }
        let _guard = self.locks.lock(user).await;
        let balance = self.read(user).await? + amount;
        self.write(user, balance).await?;
        metrics::CURRENCY_TOTAL
            .with_label_values(&["earned"])
            .inc_by(amount as u64);
        tracing::info!(user, amount, balance, "Egg paste earned");
        Ok(balance)
    }

    /// Debit `cost`, failing without change if the balance is short. Returns the new balance.
    pub async fn spend(&self, user: &str, cost: i64) -> GameResult<i64> {
        let _guard = self.locks.lock(user).await;
        let balance = self.read(user).await?;
        if cost <= 0 {
            return Ok(balance);
        }
        if balance < cost {
            return Err(Rejection::InsufficientFunds {
                user: user.to_string(),
                balance,
                cost,
            }
            .into());
        }
        let balance = balance - cost;
        self.write(user, balance).await?;
        metrics::CURRENCY_TOTAL
            .with_label_values(&["spent"])
            .inc_by(cost as u64);
        tracing::info!(user, cost, balance, "Egg paste spent");
        Ok(balance)
    }

    /// Return a previously spent amount. Zero is a no-op.
    pub async fn refund(&self, user: &str, amount: i64) -> GameResult<i64> {
        if amount <= 0 {
            return self.balance(user).await;
        }
        let _guard = self.locks.lock(user).await;
        let balance = self.read(user).await? + amount;
        self.write(user, balance).await?;
        metrics::CURRENCY_TOTAL
            .with_label_values(&["refunded"])
            .inc_by(amount as u64);
        tracing::info!(user, amount, balance, "Egg paste refunded");
        Ok(balance)
    }
}
