//! API session lookups and plan tiers, both written by external collaborators

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult, params};

use crate::models::PlanTier;
use super::super::Database;

impl Database {
    /// Resolve a bearer token to its user, ignoring expired sessions
    pub fn validate_session(&self, token: &str) -> SqliteResult<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT user_id FROM api_sessions WHERE token = ?1 AND expires_at > ?2",
            params![token, Utc::now().to_rfc3339()],
            |row| row.get(0),
        )
        .optional()
    }

    #[cfg(test)]
    pub fn create_session(&self, token: &str, user_id: i64, ttl: chrono::Duration) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO api_sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![token, user_id, now.to_rfc3339(), (now + ttl).to_rfc3339()],
        )?;
        Ok(())
    }

    /// Stored tier for a user; `None` when billing has never reported one
    pub fn get_user_plan(&self, user_id: i64) -> SqliteResult<Option<PlanTier>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row(
                "SELECT tier FROM user_plans WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(tier) => tier.parse::<PlanTier>().map(Some).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            }),
            None => Ok(None),
        }
    }

    /// Billing writes tiers directly; only tests set them here
    #[cfg(test)]
    pub fn set_user_plan(&self, user_id: i64, tier: PlanTier) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user_plans (user_id, tier, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET tier = excluded.tier, updated_at = excluded.updated_at",
            params![user_id, tier.as_ref(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
