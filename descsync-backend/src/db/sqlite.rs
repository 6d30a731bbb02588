//! SQLite database - schema definitions and connection management
//!
//! This file contains:
//! - Database struct definition
//! - Connection management (new, init)
//! - Schema creation
//! - Row conversion helpers shared by the table modules
//!
//! All database operations are in the tables/ subdirectory.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Result as SqliteResult, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

/// Main database wrapper with connection pooling via Mutex
pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

impl Database {
    /// Create a new database connection and initialize schema
    pub fn new(database_url: &str) -> SqliteResult<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(database_url)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Initialize all database tables
    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        // API sessions, written by the external auth service
        conn.execute(
            "CREATE TABLE IF NOT EXISTS api_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT UNIQUE NOT NULL,
                user_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )",
            [],
        )?;

        // Plan tier per user, mirrored from billing
        conn.execute(
            "CREATE TABLE IF NOT EXISTS user_plans (
                user_id INTEGER PRIMARY KEY,
                tier TEXT NOT NULL DEFAULT 'free',
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS containers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Ordered template membership; position is the concatenation order
        conn.execute(
            "CREATE TABLE IF NOT EXISTS container_templates (
                container_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                template_id INTEGER NOT NULL,
                PRIMARY KEY (container_id, position),
                FOREIGN KEY (container_id) REFERENCES containers(id) ON DELETE CASCADE,
                FOREIGN KEY (template_id) REFERENCES templates(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // Connected channels; tokens are stored encrypted
        conn.execute(
            "CREATE TABLE IF NOT EXISTS channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                external_channel_id TEXT UNIQUE NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                token_expires_at TEXT,
                token_status TEXT NOT NULL DEFAULT 'valid',
                sync_status TEXT NOT NULL DEFAULT 'idle',
                sync_started_at INTEGER,
                last_synced_at TEXT,
                default_container_id INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (default_container_id) REFERENCES containers(id) ON DELETE SET NULL
            )",
            [],
        )?;

        // Migration: Add sync_started_at column if it doesn't exist (for old DBs)
        let has_sync_started_at: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('channels') WHERE name='sync_started_at'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count > 0)?;

        if !has_sync_started_at {
            conn.execute("ALTER TABLE channels ADD COLUMN sync_started_at INTEGER", [])?;
        }

        conn.execute(
            "CREATE TABLE IF NOT EXISTS videos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel_id INTEGER NOT NULL,
                external_video_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                container_id INTEGER,
                description TEXT,
                is_missing INTEGER NOT NULL DEFAULT 0,
                last_pushed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(channel_id, external_video_id),
                FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE,
                FOREIGN KEY (container_id) REFERENCES containers(id) ON DELETE SET NULL
            )",
            [],
        )?;

        // Variable values survive template and container deletion (no FK on template_id)
        conn.execute(
            "CREATE TABLE IF NOT EXISTS video_variables (
                video_id INTEGER NOT NULL,
                template_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                value TEXT NOT NULL DEFAULT '',
                updated_at TEXT NOT NULL,
                PRIMARY KEY (video_id, template_id, name),
                FOREIGN KEY (video_id) REFERENCES videos(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // Append-only quota accounting
        conn.execute(
            "CREATE TABLE IF NOT EXISTS usage_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                endpoint TEXT NOT NULL,
                quota_pool TEXT NOT NULL,
                units INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_videos_container ON videos(container_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_container_templates_template ON container_templates(template_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_usage_log_user ON usage_log(user_id, created_at)",
            [],
        )?;

        Ok(())
    }
}

/// Read an RFC 3339 timestamp column
pub(crate) fn timestamp_at(row: &Row<'_>, idx: usize) -> SqliteResult<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a nullable RFC 3339 timestamp column
pub(crate) fn opt_timestamp_at(row: &Row<'_>, idx: usize) -> SqliteResult<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Read a text column holding a strum-encoded enum
pub(crate) fn enum_at<T>(row: &Row<'_>, idx: usize) -> SqliteResult<T>
where
    T: FromStr<Err = strum::ParseError>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
