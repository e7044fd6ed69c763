// Per-user async locks around read-modify-write on persisted variables.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::user_name;

#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `user`. Names fold ASCII case only, matching SQLite `NOCASE`.
    pub async fn lock(&self, user: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(user_name(user).to_ascii_lowercase())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}
