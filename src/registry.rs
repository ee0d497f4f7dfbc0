//! User registry: resolves the sender of every inbound event to a stored
//! user row, and serializes event handling per user.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::db;

/// Look up or create the user for an inbound sender identity.
///
/// First contact creates the row with defaults (not banned, no fee
/// override, no active state). A known, non-banned user gets their display
/// fields overwritten unconditionally and persisted. A banned user returns
/// `None`: the caller must stop entirely; no replies, no state mutation,
/// not even a display-field refresh.
pub async fn resolve(
    pool: &SqlitePool,
    user_id: i64,
    username: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> Result<Option<db::User>> {
    match db::get_user(pool, user_id).await? {
        None => {
            db::create_user(pool, user_id, username, first_name, last_name).await?;
            Ok(db::get_user(pool, user_id).await?)
        }
        Some(user) if user.is_banned => {
            debug!(user_id, "dropping event from banned user");
            Ok(None)
        }
        Some(_) => {
            db::refresh_user(pool, user_id, username, first_name, last_name).await?;
            Ok(db::get_user(pool, user_id).await?)
        }
    }
}

/// Per-user async mutex map.
///
/// The transport layer may deliver two updates from the same user
/// concurrently; conversation state is a read-modify-write, so each
/// inbound event holds its user's gate for the duration of handling.
#[derive(Clone, Default)]
pub struct UserGate {
    locks: Arc<StdMutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl UserGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = db::connect_with_pool_size("sqlite::memory:", 1).await.unwrap();
        db::init_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_resolve_creates_then_refreshes() {
        let pool = test_pool().await;

        let user = resolve(&pool, 10, Some("bob"), Some("Bob"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.user_id, 10);
        assert_eq!(user.username.as_deref(), Some("bob"));

        let user = resolve(&pool, 10, Some("bobby"), Some("Bob"), Some("B"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.username.as_deref(), Some("bobby"));
        assert_eq!(user.last_name.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_resolve_banned_user_is_dropped_untouched() {
        let pool = test_pool().await;
        db::create_user(&pool, 11, Some("old"), Some("Old"), None)
            .await
            .unwrap();
        sqlx::query("UPDATE users SET is_banned = 1 WHERE user_id = 11")
            .execute(&pool)
            .await
            .unwrap();

        let resolved = resolve(&pool, 11, Some("new"), Some("New"), None)
            .await
            .unwrap();
        assert!(resolved.is_none());

        // No refresh happened either.
        let user = db::get_user(&pool, 11).await.unwrap().unwrap();
        assert_eq!(user.username.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_user_gate_serializes_same_user() {
        let gate = UserGate::new();

        let guard = gate.acquire(1).await;
        // A different user is not blocked.
        let _other = gate.acquire(2).await;

        let gate2 = gate.clone();
        let contended = tokio::spawn(async move {
            let _guard = gate2.acquire(1).await;
        });

        tokio::task::yield_now().await;
        assert!(!contended.is_finished());

        drop(guard);
        contended.await.unwrap();
    }
}
