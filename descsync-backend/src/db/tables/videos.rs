//! Video database operations: assignment, reconciliation, push bookkeeping

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult, Row, TransactionBehavior, params};

use crate::models::{ReconcileSummary, RemoteVideo, Video};
use super::super::Database;
use super::super::sqlite::{opt_timestamp_at, timestamp_at};

const VIDEO_COLUMNS: &str = "id, channel_id, external_video_id, title, container_id, description,
     is_missing, last_pushed_at, created_at, updated_at";

/// Result of a limit-guarded container assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned,
    /// Already assigned to the requested container
    Unchanged,
    Unassigned,
    LimitReached { current: u32 },
    VideoNotFound,
}

impl Database {
    fn row_to_video(row: &Row<'_>) -> SqliteResult<Video> {
        Ok(Video {
            id: row.get(0)?,
            channel_id: row.get(1)?,
            external_video_id: row.get(2)?,
            title: row.get(3)?,
            container_id: row.get(4)?,
            description: row.get(5)?,
            is_missing: row.get::<_, i64>(6)? != 0,
            last_pushed_at: opt_timestamp_at(row, 7)?,
            created_at: timestamp_at(row, 8)?,
            updated_at: timestamp_at(row, 9)?,
        })
    }

    pub fn get_video(&self, id: i64) -> SqliteResult<Option<Video>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM videos WHERE id = ?1", VIDEO_COLUMNS),
            [id],
            Self::row_to_video,
        )
        .optional()
    }

    pub fn list_videos_for_channel(&self, channel_id: i64) -> SqliteResult<Vec<Video>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM videos WHERE channel_id = ?1 ORDER BY id",
            VIDEO_COLUMNS
        ))?;
        let videos = stmt
            .query_map([channel_id], Self::row_to_video)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(videos)
    }

    /// Video IDs assigned to any of the given containers, deduplicated
    pub fn list_video_ids_for_containers(&self, container_ids: &[i64]) -> SqliteResult<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM videos WHERE container_id = ?1 ORDER BY id")?;

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for container_id in container_ids {
            let rows = stmt
                .query_map([container_id], |row| row.get::<_, i64>(0))?
                .collect::<SqliteResult<Vec<_>>>()?;
            for id in rows {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Number of videos with a container, across all of the user's channels
    pub fn count_assigned_videos_for_user(&self, user_id: i64) -> SqliteResult<u32> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM videos v JOIN channels c ON c.id = v.channel_id
             WHERE c.user_id = ?1 AND v.container_id IS NOT NULL",
            [user_id],
            |row| row.get(0),
        )
    }

    /// Assign (or clear) a video's container. The assigned-video count is checked
    /// inside the same immediate transaction that performs the update.
    pub fn assign_container_within_limit(
        &self,
        video_id: i64,
        user_id: i64,
        container_id: Option<i64>,
        limit: u32,
    ) -> SqliteResult<AssignOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();

        let current_assignment: Option<Option<i64>> = tx
            .query_row(
                "SELECT container_id FROM videos WHERE id = ?1",
                [video_id],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match (current_assignment, container_id) {
            (None, _) => AssignOutcome::VideoNotFound,
            (Some(current), Some(target)) if current == Some(target) => AssignOutcome::Unchanged,
            (Some(_), None) => {
                tx.execute(
                    "UPDATE videos SET container_id = NULL, updated_at = ?1 WHERE id = ?2",
                    params![&now, video_id],
                )?;
                AssignOutcome::Unassigned
            }
            (Some(current), Some(target)) => {
                // Moving between containers does not change the assigned count
                let assigned: u32 = tx.query_row(
                    "SELECT COUNT(*) FROM videos v JOIN channels c ON c.id = v.channel_id
                     WHERE c.user_id = ?1 AND v.container_id IS NOT NULL",
                    [user_id],
                    |row| row.get(0),
                )?;
                if current.is_none() && assigned >= limit {
                    AssignOutcome::LimitReached { current: assigned }
                } else {
                    tx.execute(
                        "UPDATE videos SET container_id = ?1, updated_at = ?2 WHERE id = ?3",
                        params![target, &now, video_id],
                    )?;
                    AssignOutcome::Assigned
                }
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// Reconcile local videos of a channel against the platform listing:
    /// insert new ones, flag vanished ones as missing, restore reappeared ones.
    pub fn reconcile_channel_videos(
        &self,
        channel_id: i64,
        remote: &[RemoteVideo],
    ) -> SqliteResult<ReconcileSummary> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();

        let local: HashMap<String, (i64, bool)> = {
            let mut stmt = tx.prepare(
                "SELECT external_video_id, id, is_missing FROM videos WHERE channel_id = ?1",
            )?;
            let rows = stmt
                .query_map([channel_id], |row| {
                    Ok((row.get::<_, String>(0)?, (row.get(1)?, row.get::<_, i64>(2)? != 0)))
                })?
                .collect::<SqliteResult<HashMap<_, _>>>()?;
            rows
        };

        let mut summary = ReconcileSummary::default();
        let mut listed = HashSet::new();

        for video in remote {
            if !listed.insert(video.external_video_id.as_str()) {
                continue;
            }
            match local.get(&video.external_video_id) {
                Some(&(id, was_missing)) => {
                    tx.execute(
                        "UPDATE videos SET title = ?1, is_missing = 0, updated_at = ?2 WHERE id = ?3",
                        params![&video.title, &now, id],
                    )?;
                    if was_missing {
                        summary.restored.push(id);
                    }
                }
                None => {
                    tx.execute(
                        "INSERT INTO videos (channel_id, external_video_id, title, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?4)",
                        params![channel_id, &video.external_video_id, &video.title, &now],
                    )?;
                    summary.discovered.push(tx.last_insert_rowid());
                }
            }
        }

        for (external_id, &(id, was_missing)) in &local {
            if !was_missing && !listed.contains(external_id.as_str()) {
                tx.execute(
                    "UPDATE videos SET is_missing = 1, updated_at = ?1 WHERE id = ?2",
                    params![&now, id],
                )?;
                summary.missing.push(id);
            }
        }

        tx.commit()?;
        summary.missing.sort_unstable();
        summary.restored.sort_unstable();
        Ok(summary)
    }

    /// Remember the description last pushed to the platform
    pub fn record_video_pushed(&self, video_id: i64, description: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE videos SET description = ?1, last_pushed_at = ?2, updated_at = ?2 WHERE id = ?3",
            params![description, &now, video_id],
        )?;
        Ok(())
    }

    pub fn delete_video(&self, video_id: i64) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM videos WHERE id = ?1", [video_id])?;
        Ok(rows > 0)
    }
}
