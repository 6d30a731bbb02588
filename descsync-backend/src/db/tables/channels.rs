//! Channel database operations: credentials, sync status, limit-guarded connection

use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult, Row, TransactionBehavior, params};

use crate::models::{Channel, SyncStatus, TokenStatus};
use super::super::Database;
use super::super::sqlite::{enum_at, opt_timestamp_at, timestamp_at};

const CHANNEL_COLUMNS: &str = "id, user_id, external_channel_id, title, access_token, refresh_token,
     token_expires_at, token_status, sync_status, last_synced_at, default_container_id,
     created_at, updated_at";

/// Credentials and identity for a newly authorised channel (tokens already encrypted)
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    pub user_id: i64,
    pub external_channel_id: String,
    pub title: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: DateTime<Utc>,
}

/// Result of a limit-guarded insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(i64),
    /// The channel already belonged to this user; credentials were replaced
    Reconnected(i64),
    LimitReached { current: u32 },
    OwnedByOtherUser,
}

impl Database {
    fn row_to_channel(row: &Row<'_>) -> SqliteResult<Channel> {
        Ok(Channel {
            id: row.get(0)?,
            user_id: row.get(1)?,
            external_channel_id: row.get(2)?,
            title: row.get(3)?,
            access_token: row.get(4)?,
            refresh_token: row.get(5)?,
            token_expires_at: opt_timestamp_at(row, 6)?,
            token_status: enum_at::<TokenStatus>(row, 7)?,
            sync_status: enum_at::<SyncStatus>(row, 8)?,
            last_synced_at: opt_timestamp_at(row, 9)?,
            default_container_id: row.get(10)?,
            created_at: timestamp_at(row, 11)?,
            updated_at: timestamp_at(row, 12)?,
        })
    }

    /// Get a channel by ID
    pub fn get_channel(&self, id: i64) -> SqliteResult<Option<Channel>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM channels WHERE id = ?1", CHANNEL_COLUMNS),
            [id],
            Self::row_to_channel,
        )
        .optional()
    }

    /// List all channels owned by a user
    pub fn list_channels_for_user(&self, user_id: i64) -> SqliteResult<Vec<Channel>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM channels WHERE user_id = ?1 ORDER BY id",
            CHANNEL_COLUMNS
        ))?;
        let channels = stmt
            .query_map([user_id], Self::row_to_channel)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(channels)
    }

    /// IDs of every known channel, for fleet-wide sync
    pub fn list_channel_ids(&self) -> SqliteResult<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM channels ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<SqliteResult<Vec<i64>>>()?;
        Ok(ids)
    }

    pub fn count_channels_for_user(&self, user_id: i64) -> SqliteResult<u32> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM channels WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )
    }

    /// Insert a channel, or replace the credentials of one the user already owns.
    /// The count check and the insert share one immediate transaction.
    pub fn connect_channel_within_limit(
        &self,
        connection: &ChannelConnection,
        limit: u32,
    ) -> SqliteResult<InsertOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();
        let expires_at = connection.token_expires_at.to_rfc3339();

        let existing: Option<(i64, i64)> = tx
            .query_row(
                "SELECT id, user_id FROM channels WHERE external_channel_id = ?1",
                [&connection.external_channel_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let outcome = match existing {
            Some((_, owner)) if owner != connection.user_id => InsertOutcome::OwnedByOtherUser,
            Some((id, _)) => {
                tx.execute(
                    "UPDATE channels SET title = ?1, access_token = ?2,
                     refresh_token = COALESCE(?3, refresh_token), token_expires_at = ?4,
                     token_status = 'valid', updated_at = ?5 WHERE id = ?6",
                    params![
                        &connection.title,
                        &connection.access_token,
                        &connection.refresh_token,
                        &expires_at,
                        &now,
                        id
                    ],
                )?;
                InsertOutcome::Reconnected(id)
            }
            None => {
                let current: u32 = tx.query_row(
                    "SELECT COUNT(*) FROM channels WHERE user_id = ?1",
                    [connection.user_id],
                    |row| row.get(0),
                )?;
                if current >= limit {
                    InsertOutcome::LimitReached { current }
                } else {
                    tx.execute(
                        "INSERT INTO channels (user_id, external_channel_id, title, access_token,
                         refresh_token, token_expires_at, token_status, sync_status, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'valid', 'idle', ?7, ?7)",
                        params![
                            connection.user_id,
                            &connection.external_channel_id,
                            &connection.title,
                            &connection.access_token,
                            &connection.refresh_token,
                            &expires_at,
                            &now
                        ],
                    )?;
                    InsertOutcome::Created(tx.last_insert_rowid())
                }
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// Persist a refreshed access token (and rotated refresh token, if any)
    pub fn update_channel_tokens(
        &self,
        channel_id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE channels SET access_token = ?1, refresh_token = COALESCE(?2, refresh_token),
             token_expires_at = ?3, token_status = 'valid', updated_at = ?4 WHERE id = ?5",
            params![
                access_token,
                refresh_token,
                expires_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
                channel_id
            ],
        )?;
        Ok(())
    }

    pub fn set_token_status(&self, channel_id: i64, status: TokenStatus) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE channels SET token_status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_ref(), Utc::now().to_rfc3339(), channel_id],
        )?;
        Ok(())
    }

    /// Compare-and-swap into `syncing`. A `syncing` row whose lease has run out
    /// is taken over, since its worker never reached `finish_sync`.
    /// Returns the start stamp that `finish_sync` must present, or `None`
    /// while another sync holds the channel.
    pub fn try_begin_sync(&self, channel_id: i64, lease: Duration) -> SqliteResult<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let started_at = now.timestamp_millis();
        let expired_before = (now - lease).timestamp_millis();
        let rows = conn.execute(
            "UPDATE channels SET sync_status = 'syncing', sync_started_at = ?1, updated_at = ?2
             WHERE id = ?3 AND (sync_status IN ('idle', 'error')
                OR (sync_status = 'syncing'
                    AND (sync_started_at IS NULL OR sync_started_at < ?4)))",
            params![started_at, now.to_rfc3339(), channel_id, expired_before],
        )?;
        Ok((rows == 1).then_some(started_at))
    }

    /// Leave `syncing`; `last_synced_at` only moves on success. Does nothing
    /// if the lease was taken over by a newer sync.
    pub fn finish_sync(&self, channel_id: i64, started_at: i64, succeeded: bool) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let rows = if succeeded {
            conn.execute(
                "UPDATE channels SET sync_status = 'idle', sync_started_at = NULL,
                     last_synced_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND sync_status = 'syncing' AND sync_started_at = ?3",
                params![&now, channel_id, started_at],
            )?
        } else {
            conn.execute(
                "UPDATE channels SET sync_status = 'error', sync_started_at = NULL, updated_at = ?1
                 WHERE id = ?2 AND sync_status = 'syncing' AND sync_started_at = ?3",
                params![&now, channel_id, started_at],
            )?
        };
        Ok(rows == 1)
    }

    pub fn set_default_container(
        &self,
        channel_id: i64,
        container_id: Option<i64>,
    ) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE channels SET default_container_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![container_id, Utc::now().to_rfc3339(), channel_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestStack;

    fn insert_channel(db: &Database) -> i64 {
        match db
            .connect_channel_within_limit(&TestStack::connection(1, "UC1"), 10)
            .unwrap()
        {
            InsertOutcome::Created(id) => id,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_sync_guard_and_lease_takeover() {
        let db = Database::new(":memory:").unwrap();
        let id = insert_channel(&db);
        let lease = Duration::minutes(30);

        let first = db.try_begin_sync(id, lease).unwrap().unwrap();
        assert!(db.try_begin_sync(id, lease).unwrap().is_none());

        // A zero lease treats the running sync as abandoned
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = db.try_begin_sync(id, Duration::zero()).unwrap().unwrap();
        assert!(second > first);

        // The abandoned run can no longer settle the channel
        assert!(!db.finish_sync(id, first, true).unwrap());
        let channel = db.get_channel(id).unwrap().unwrap();
        assert_eq!(channel.sync_status, SyncStatus::Syncing);
        assert!(channel.last_synced_at.is_none());

        assert!(db.finish_sync(id, second, true).unwrap());
        let channel = db.get_channel(id).unwrap().unwrap();
        assert_eq!(channel.sync_status, SyncStatus::Idle);
        assert!(channel.last_synced_at.is_some());
    }

    #[test]
    fn test_sync_abandoned_by_restart_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("descsync.db");
        let path = path.to_str().unwrap();

        let id = {
            let db = Database::new(path).unwrap();
            let id = insert_channel(&db);
            db.try_begin_sync(id, Duration::minutes(30)).unwrap().unwrap();
            id
        };

        let db = Database::new(path).unwrap();
        assert!(db.try_begin_sync(id, Duration::minutes(30)).unwrap().is_none());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(db.try_begin_sync(id, Duration::milliseconds(1)).unwrap().is_some());
    }
}
