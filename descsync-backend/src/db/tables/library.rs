//! Template and container database operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult, Row, TransactionBehavior, params};

use crate::models::{Container, Template};
use super::super::Database;
use super::super::sqlite::timestamp_at;

impl Database {
    // ============================================
    // Templates
    // ============================================

    fn row_to_template(row: &Row<'_>) -> SqliteResult<Template> {
        Ok(Template {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            content: row.get(3)?,
            created_at: timestamp_at(row, 4)?,
            updated_at: timestamp_at(row, 5)?,
        })
    }

    pub fn get_template(&self, id: i64) -> SqliteResult<Option<Template>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, user_id, name, content, created_at, updated_at FROM templates WHERE id = ?1",
            [id],
            Self::row_to_template,
        )
        .optional()
    }

    pub fn list_templates_for_user(&self, user_id: i64) -> SqliteResult<Vec<Template>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, content, created_at, updated_at
             FROM templates WHERE user_id = ?1 ORDER BY name",
        )?;
        let templates = stmt
            .query_map([user_id], Self::row_to_template)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(templates)
    }

    pub fn insert_template(&self, user_id: i64, name: &str, content: &str) -> SqliteResult<Template> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO templates (user_id, name, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![user_id, name, content, &now],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_template(id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// Last writer wins at the row level
    pub fn update_template(&self, id: i64, name: &str, content: &str) -> SqliteResult<Option<Template>> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE templates SET name = ?1, content = ?2, updated_at = ?3 WHERE id = ?4",
            params![name, content, Utc::now().to_rfc3339(), id],
        )?;
        drop(conn);

        if rows == 0 {
            return Ok(None);
        }
        self.get_template(id)
    }

    pub fn delete_template(&self, id: i64) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM templates WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }

    /// Templates of a container in concatenation order
    pub fn list_container_templates(&self, container_id: i64) -> SqliteResult<Vec<Template>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.user_id, t.name, t.content, t.created_at, t.updated_at
             FROM container_templates ct JOIN templates t ON t.id = ct.template_id
             WHERE ct.container_id = ?1 ORDER BY ct.position",
        )?;
        let templates = stmt
            .query_map([container_id], Self::row_to_template)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(templates)
    }

    // ============================================
    // Containers
    // ============================================

    fn load_template_order(conn: &rusqlite::Connection, container_id: i64) -> SqliteResult<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT template_id FROM container_templates WHERE container_id = ?1 ORDER BY position",
        )?;
        let ids = stmt
            .query_map([container_id], |row| row.get(0))?
            .collect::<SqliteResult<Vec<i64>>>()?;
        Ok(ids)
    }

    pub fn get_container(&self, id: i64) -> SqliteResult<Option<Container>> {
        let conn = self.conn.lock().unwrap();
        let container = conn
            .query_row(
                "SELECT id, user_id, name, created_at, updated_at FROM containers WHERE id = ?1",
                [id],
                |row| {
                    Ok(Container {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        name: row.get(2)?,
                        template_ids: Vec::new(),
                        created_at: timestamp_at(row, 3)?,
                        updated_at: timestamp_at(row, 4)?,
                    })
                },
            )
            .optional()?;

        match container {
            Some(mut container) => {
                container.template_ids = Self::load_template_order(&conn, id)?;
                Ok(Some(container))
            }
            None => Ok(None),
        }
    }

    /// Create a container or replace its name and template order
    pub fn save_container(
        &self,
        id: Option<i64>,
        user_id: i64,
        name: &str,
        template_ids: &[i64],
    ) -> SqliteResult<Option<Container>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();

        let container_id = match id {
            Some(id) => {
                let rows = tx.execute(
                    "UPDATE containers SET name = ?1, updated_at = ?2 WHERE id = ?3",
                    params![name, &now, id],
                )?;
                if rows == 0 {
                    return Ok(None);
                }
                tx.execute("DELETE FROM container_templates WHERE container_id = ?1", [id])?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO containers (user_id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                    params![user_id, name, &now],
                )?;
                tx.last_insert_rowid()
            }
        };

        for (position, template_id) in template_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO container_templates (container_id, position, template_id) VALUES (?1, ?2, ?3)",
                params![container_id, position as i64, template_id],
            )?;
        }

        tx.commit()?;
        drop(conn);

        self.get_container(container_id)
    }

    /// Delete a container. Assigned videos are detached; their variable rows are kept.
    pub fn delete_container(&self, id: i64) -> SqliteResult<Vec<i64>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now().to_rfc3339();

        let detached = {
            let mut stmt = tx.prepare("SELECT id FROM videos WHERE container_id = ?1 ORDER BY id")?;
            let ids = stmt
                .query_map([id], |row| row.get(0))?
                .collect::<SqliteResult<Vec<i64>>>()?;
            ids
        };

        tx.execute(
            "UPDATE videos SET container_id = NULL, updated_at = ?1 WHERE container_id = ?2",
            params![&now, id],
        )?;
        tx.execute(
            "UPDATE channels SET default_container_id = NULL, updated_at = ?1 WHERE default_container_id = ?2",
            params![&now, id],
        )?;
        tx.execute("DELETE FROM containers WHERE id = ?1", [id])?;
        tx.commit()?;

        Ok(detached)
    }

    /// Containers whose template order includes the given template
    pub fn list_container_ids_with_template(&self, template_id: i64) -> SqliteResult<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT container_id FROM container_templates WHERE template_id = ?1 ORDER BY container_id",
        )?;
        let ids = stmt
            .query_map([template_id], |row| row.get(0))?
            .collect::<SqliteResult<Vec<i64>>>()?;
        Ok(ids)
    }
}
