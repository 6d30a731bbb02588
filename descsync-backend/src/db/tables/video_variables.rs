//! Video variable database operations

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{Result as SqliteResult, TransactionBehavior, params};

use crate::models::{VideoVariable, VideoVariableView};
use super::super::Database;

impl Database {
    /// Insert an empty row for every (template, name) pair the video lacks.
    /// Existing rows are never touched. Returns the number of rows inserted.
    pub fn insert_missing_video_variables(
        &self,
        video_id: i64,
        pairs: &[(i64, String)],
    ) -> SqliteResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO video_variables (video_id, template_id, name, value, updated_at)
                 VALUES (?1, ?2, ?3, '', ?4)",
            )?;
            for (template_id, name) in pairs {
                inserted += stmt.execute(params![video_id, template_id, name, &now])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Insert-or-update keyed by (video, template, name); only the value changes
    pub fn upsert_video_variables(&self, video_id: i64, entries: &[VideoVariable]) -> SqliteResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO video_variables (video_id, template_id, name, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(video_id, template_id, name)
                 DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )?;
            for entry in entries {
                stmt.execute(params![video_id, entry.template_id, &entry.name, &entry.value, &now])?;
            }
        }

        tx.commit()
    }

    pub fn list_video_variables(&self, video_id: i64) -> SqliteResult<Vec<VideoVariable>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT video_id, template_id, name, value FROM video_variables
             WHERE video_id = ?1 ORDER BY template_id, name",
        )?;
        let variables = stmt
            .query_map([video_id], |row| {
                Ok(VideoVariable {
                    video_id: row.get(0)?,
                    template_id: row.get(1)?,
                    name: row.get(2)?,
                    value: row.get(3)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(variables)
    }

    /// Variable rows with their template's identity. Rows whose template has
    /// been deleted are kept and reported with an empty template name.
    pub fn list_video_variable_views(&self, video_id: i64) -> SqliteResult<Vec<VideoVariableView>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT vv.template_id, COALESCE(t.name, ''), vv.name, vv.value
             FROM video_variables vv LEFT JOIN templates t ON t.id = vv.template_id
             WHERE vv.video_id = ?1 ORDER BY vv.template_id, vv.name",
        )?;
        let views = stmt
            .query_map([video_id], |row| {
                Ok(VideoVariableView {
                    template_id: row.get(0)?,
                    template_name: row.get(1)?,
                    name: row.get(2)?,
                    value: row.get(3)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(views)
    }

    /// Subset of the given template IDs that exist
    pub fn existing_template_ids(&self, template_ids: &[i64]) -> SqliteResult<HashSet<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT 1 FROM templates WHERE id = ?1")?;
        let mut found = HashSet::new();
        for id in template_ids {
            if stmt.exists([id])? {
                found.insert(*id);
            }
        }
        Ok(found)
    }
}
