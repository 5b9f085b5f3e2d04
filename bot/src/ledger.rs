//! Typed store boundary over the gift ledger.
//!
//! Two logical tables back the minigame:
//!
//! ```sql
//! CREATE TABLE user_data (
//!     user_id        BIGINT PRIMARY KEY,
//!     nickname       TEXT NOT NULL UNIQUE,
//!     gifts_sent     BIGINT NOT NULL DEFAULT 0,
//!     gifts_received BIGINT NOT NULL DEFAULT 0,
//!     last_gift      TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//!
//! CREATE TABLE gifts (
//!     user_id        BIGINT NOT NULL REFERENCES user_data (user_id) ON DELETE CASCADE,
//!     target_user_id BIGINT NOT NULL REFERENCES user_data (user_id) ON DELETE CASCADE,
//!     active         BOOLEAN NOT NULL DEFAULT TRUE
//! );
//! ```
//!
//! Completed assignments are deactivated, never deleted, so `gifts` doubles
//! as an append-only delivery history. A giver has at most one active row.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gift_core::{GifterSummary, UserId};
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("user {0} has not joined the event")]
    NotJoined(UserId),
    #[error("user {0} has no active assignment")]
    NoActiveAssignment(UserId),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// One participant's ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: UserId,
    pub nickname: String,
    pub gifts_sent: i64,
    pub gifts_received: i64,
    pub last_gift: DateTime<Utc>,
}

/// The giver's current secret recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub target_user_id: UserId,
    pub target_nickname: String,
}

/// Everything the announcement path needs after a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub giver_nickname: String,
    pub gifts_sent: i64,
    pub gifts_received: i64,
    pub target_nickname: String,
}

/// Contract consumed from the relational store.
///
/// Mutating operations that touch more than one row run inside a single
/// transaction; the trait provides no additional serialization beyond what
/// the store's isolation gives it.
#[async_trait]
pub trait GiftLedger: Send + Sync {
    async fn user(&self, user_id: UserId) -> Result<Option<UserRecord>, LedgerError>;

    /// Insert a participant. On a nickname collision the label falls back to
    /// the stringified user id.
    async fn join_user(
        &self,
        user_id: UserId,
        nickname: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<UserRecord, LedgerError>;

    async fn active_assignment(&self, giver: UserId)
        -> Result<Option<Assignment>, LedgerError>;

    /// All joined users except the giver.
    async fn eligible_targets(&self, giver: UserId)
        -> Result<Vec<(UserId, String)>, LedgerError>;

    /// Stamp the giver's `last_gift`; on a first attempt also create the
    /// assignment row. Re-drops only refresh the stamp.
    async fn record_drop(
        &self,
        giver: UserId,
        target: UserId,
        when: DateTime<Utc>,
        first_attempt: bool,
    ) -> Result<(), LedgerError>;

    /// Deactivate the active assignment and bump both counters, atomically.
    async fn complete_delivery(
        &self,
        giver: UserId,
        when: DateTime<Utc>,
    ) -> Result<DeliveryReceipt, LedgerError>;

    /// Delete the active assignment (give-up), returning the answer.
    async fn abandon_assignment(&self, giver: UserId) -> Result<String, LedgerError>;

    async fn has_active(&self, giver: UserId) -> Result<bool, LedgerError>;

    async fn leaderboard(&self, limit: i64) -> Result<Vec<GifterSummary>, LedgerError>;

    async fn roster(&self) -> Result<Vec<GifterSummary>, LedgerError>;

    async fn delete_user(&self, user_id: UserId) -> Result<bool, LedgerError>;

    /// Givers with an active assignment, for startup reconciliation of the
    /// in-memory awaiting cache.
    async fn awaiting_givers(&self) -> Result<Vec<UserId>, LedgerError>;
}

/// PostgreSQL ledger.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        user_id: row.get("user_id"),
        nickname: row.get("nickname"),
        gifts_sent: row.get("gifts_sent"),
        gifts_received: row.get("gifts_received"),
        last_gift: row.get("last_gift"),
    }
}

fn summary_from_row(row: &sqlx::postgres::PgRow) -> GifterSummary {
    GifterSummary {
        user_id: row.get("user_id"),
        nickname: row.get("nickname"),
        gifts_sent: row.get("gifts_sent"),
        gifts_received: row.get("gifts_received"),
    }
}

#[async_trait]
impl GiftLedger for PgLedger {
    async fn user(&self, user_id: UserId) -> Result<Option<UserRecord>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, nickname, gifts_sent, gifts_received, last_gift
            FROM user_data
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn join_user(
        &self,
        user_id: UserId,
        nickname: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<UserRecord, LedgerError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO user_data (user_id, nickname, last_gift)
            VALUES ($1, $2, $3)
            ON CONFLICT (nickname) DO NOTHING
            RETURNING user_id, nickname, gifts_sent, gifts_received, last_gift
            "#,
        )
        .bind(user_id)
        .bind(nickname)
        .bind(joined_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(user_from_row(&row));
        }

        // Nickname taken: fall back to the stringified user id.
        let row = sqlx::query(
            r#"
            INSERT INTO user_data (user_id, nickname, last_gift)
            VALUES ($1, $2, $3)
            RETURNING user_id, nickname, gifts_sent, gifts_received, last_gift
            "#,
        )
        .bind(user_id)
        .bind(user_id.to_string())
        .bind(joined_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(user_from_row(&row))
    }

    async fn active_assignment(
        &self,
        giver: UserId,
    ) -> Result<Option<Assignment>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT user_data.user_id AS target_user_id, nickname
            FROM gifts
            INNER JOIN user_data ON target_user_id = user_data.user_id
            WHERE gifts.user_id = $1 AND active
            "#,
        )
        .bind(giver)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Assignment {
            target_user_id: row.get("target_user_id"),
            target_nickname: row.get("nickname"),
        }))
    }

    async fn eligible_targets(
        &self,
        giver: UserId,
    ) -> Result<Vec<(UserId, String)>, LedgerError> {
        let rows = sqlx::query("SELECT user_id, nickname FROM user_data WHERE user_id != $1")
            .bind(giver)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("user_id"), row.get("nickname")))
            .collect())
    }

    async fn record_drop(
        &self,
        giver: UserId,
        target: UserId,
        when: DateTime<Utc>,
        first_attempt: bool,
    ) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE user_data SET last_gift = $2 WHERE user_id = $1")
            .bind(giver)
            .bind(when)
            .execute(&mut *tx)
            .await?;

        if first_attempt {
            sqlx::query("INSERT INTO gifts (user_id, target_user_id) VALUES ($1, $2)")
                .bind(giver)
                .bind(target)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn complete_delivery(
        &self,
        giver: UserId,
        when: DateTime<Utc>,
    ) -> Result<DeliveryReceipt, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let deactivated = sqlx::query(
            r#"
            UPDATE gifts
            SET active = FALSE
            WHERE user_id = $1 AND active = TRUE
            RETURNING target_user_id
            "#,
        )
        .bind(giver)
        .fetch_optional(&mut *tx)
        .await?;

        let target_user_id: UserId = match deactivated {
            Some(row) => row.get("target_user_id"),
            None => return Err(LedgerError::NoActiveAssignment(giver)),
        };

        let target = sqlx::query(
            r#"
            UPDATE user_data
            SET gifts_received = gifts_received + 1
            WHERE user_id = $1
            RETURNING nickname
            "#,
        )
        .bind(target_user_id)
        .fetch_one(&mut *tx)
        .await?;

        let giver_row = sqlx::query(
            r#"
            UPDATE user_data
            SET last_gift = $2, gifts_sent = gifts_sent + 1
            WHERE user_id = $1
            RETURNING nickname, gifts_sent, gifts_received
            "#,
        )
        .bind(giver)
        .bind(when)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(DeliveryReceipt {
            giver_nickname: giver_row.get("nickname"),
            gifts_sent: giver_row.get("gifts_sent"),
            gifts_received: giver_row.get("gifts_received"),
            target_nickname: target.get("nickname"),
        })
    }

    async fn abandon_assignment(&self, giver: UserId) -> Result<String, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let answer = sqlx::query(
            r#"
            SELECT nickname
            FROM gifts
            INNER JOIN user_data ON target_user_id = user_data.user_id
            WHERE gifts.user_id = $1 AND active
            "#,
        )
        .bind(giver)
        .fetch_optional(&mut *tx)
        .await?;

        let nickname: String = match answer {
            Some(row) => row.get("nickname"),
            None => return Err(LedgerError::NoActiveAssignment(giver)),
        };

        sqlx::query("DELETE FROM gifts WHERE active = TRUE AND user_id = $1")
            .bind(giver)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(nickname)
    }

    async fn has_active(&self, giver: UserId) -> Result<bool, LedgerError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM gifts WHERE active = TRUE AND user_id = $1) AS present",
        )
        .bind(giver)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("present"))
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<GifterSummary>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, nickname, gifts_sent, gifts_received
            FROM user_data
            ORDER BY gifts_sent DESC, gifts_received DESC, nickname ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(summary_from_row).collect())
    }

    async fn roster(&self) -> Result<Vec<GifterSummary>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, nickname, gifts_sent, gifts_received
            FROM user_data
            ORDER BY nickname ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(summary_from_row).collect())
    }

    async fn delete_user(&self, user_id: UserId) -> Result<bool, LedgerError> {
        let result = sqlx::query("DELETE FROM user_data WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn awaiting_givers(&self) -> Result<Vec<UserId>, LedgerError> {
        let rows = sqlx::query("SELECT user_id FROM gifts WHERE active = TRUE")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|row| row.get("user_id")).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GiftRow {
    user_id: UserId,
    target_user_id: UserId,
    active: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<UserId, UserRecord>,
    gifts: Vec<GiftRow>,
}

/// In-memory ledger with the same semantics as [`PgLedger`], used as a test
/// double and for running the minigame without a database.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: Mutex<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total assignment rows ever created for a giver, active or not.
    /// Test hook for the one-active-assignment invariant.
    pub async fn assignment_rows(&self, giver: UserId) -> usize {
        let state = self.inner.lock().await;
        state.gifts.iter().filter(|g| g.user_id == giver).count()
    }
}

#[async_trait]
impl GiftLedger for MemoryLedger {
    async fn user(&self, user_id: UserId) -> Result<Option<UserRecord>, LedgerError> {
        let state = self.inner.lock().await;
        Ok(state.users.get(&user_id).cloned())
    }

    async fn join_user(
        &self,
        user_id: UserId,
        nickname: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<UserRecord, LedgerError> {
        let mut state = self.inner.lock().await;
        let taken = state.users.values().any(|u| u.nickname == nickname);
        let nickname = if taken {
            user_id.to_string()
        } else {
            nickname.to_string()
        };
        let record = UserRecord {
            user_id,
            nickname,
            gifts_sent: 0,
            gifts_received: 0,
            last_gift: joined_at,
        };
        state.users.insert(user_id, record.clone());
        Ok(record)
    }

    async fn active_assignment(
        &self,
        giver: UserId,
    ) -> Result<Option<Assignment>, LedgerError> {
        let state = self.inner.lock().await;
        let Some(row) = state
            .gifts
            .iter()
            .find(|g| g.user_id == giver && g.active)
        else {
            return Ok(None);
        };
        let target = state
            .users
            .get(&row.target_user_id)
            .ok_or(LedgerError::NotJoined(row.target_user_id))?;
        Ok(Some(Assignment {
            target_user_id: row.target_user_id,
            target_nickname: target.nickname.clone(),
        }))
    }

    async fn eligible_targets(
        &self,
        giver: UserId,
    ) -> Result<Vec<(UserId, String)>, LedgerError> {
        let state = self.inner.lock().await;
        let mut targets: Vec<(UserId, String)> = state
            .users
            .values()
            .filter(|u| u.user_id != giver)
            .map(|u| (u.user_id, u.nickname.clone()))
            .collect();
        // Stable order so seeded target picks are reproducible.
        targets.sort_by_key(|(id, _)| *id);
        Ok(targets)
    }

    async fn record_drop(
        &self,
        giver: UserId,
        target: UserId,
        when: DateTime<Utc>,
        first_attempt: bool,
    ) -> Result<(), LedgerError> {
        let mut state = self.inner.lock().await;
        let user = state
            .users
            .get_mut(&giver)
            .ok_or(LedgerError::NotJoined(giver))?;
        user.last_gift = when;
        if first_attempt {
            state.gifts.push(GiftRow {
                user_id: giver,
                target_user_id: target,
                active: true,
            });
        }
        Ok(())
    }

    async fn complete_delivery(
        &self,
        giver: UserId,
        when: DateTime<Utc>,
    ) -> Result<DeliveryReceipt, LedgerError> {
        let mut state = self.inner.lock().await;
        let row = state
            .gifts
            .iter_mut()
            .find(|g| g.user_id == giver && g.active)
            .ok_or(LedgerError::NoActiveAssignment(giver))?;
        row.active = false;
        let target_user_id = row.target_user_id;

        let target = state
            .users
            .get_mut(&target_user_id)
            .ok_or(LedgerError::NotJoined(target_user_id))?;
        target.gifts_received += 1;
        let target_nickname = target.nickname.clone();

        let user = state
            .users
            .get_mut(&giver)
            .ok_or(LedgerError::NotJoined(giver))?;
        user.gifts_sent += 1;
        user.last_gift = when;

        Ok(DeliveryReceipt {
            giver_nickname: user.nickname.clone(),
            gifts_sent: user.gifts_sent,
            gifts_received: user.gifts_received,
            target_nickname,
        })
    }

    async fn abandon_assignment(&self, giver: UserId) -> Result<String, LedgerError> {
        let mut state = self.inner.lock().await;
        let Some(position) = state
            .gifts
            .iter()
            .position(|g| g.user_id == giver && g.active)
        else {
            return Err(LedgerError::NoActiveAssignment(giver));
        };
        let row = state.gifts.remove(position);
        let target = state
            .users
            .get(&row.target_user_id)
            .ok_or(LedgerError::NotJoined(row.target_user_id))?;
        Ok(target.nickname.clone())
    }

    async fn has_active(&self, giver: UserId) -> Result<bool, LedgerError> {
        let state = self.inner.lock().await;
        Ok(state.gifts.iter().any(|g| g.user_id == giver && g.active))
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<GifterSummary>, LedgerError> {
        let state = self.inner.lock().await;
        let mut rows: Vec<GifterSummary> = state
            .users
            .values()
            .map(|u| GifterSummary {
                user_id: u.user_id,
                nickname: u.nickname.clone(),
                gifts_sent: u.gifts_sent,
                gifts_received: u.gifts_received,
            })
            .collect();
        gift_core::rank_leaderboard(&mut rows);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn roster(&self) -> Result<Vec<GifterSummary>, LedgerError> {
        let state = self.inner.lock().await;
        let mut rows: Vec<GifterSummary> = state
            .users
            .values()
            .map(|u| GifterSummary {
                user_id: u.user_id,
                nickname: u.nickname.clone(),
                gifts_sent: u.gifts_sent,
                gifts_received: u.gifts_received,
            })
            .collect();
        gift_core::sort_roster(&mut rows);
        Ok(rows)
    }

    async fn delete_user(&self, user_id: UserId) -> Result<bool, LedgerError> {
        let mut state = self.inner.lock().await;
        let existed = state.users.remove(&user_id).is_some();
        state
            .gifts
            .retain(|g| g.user_id != user_id && g.target_user_id != user_id);
        Ok(existed)
    }

    async fn awaiting_givers(&self) -> Result<Vec<UserId>, LedgerError> {
        let state = self.inner.lock().await;
        Ok(state
            .gifts
            .iter()
            .filter(|g| g.active)
            .map(|g| g.user_id)
            .collect())
    }
}
