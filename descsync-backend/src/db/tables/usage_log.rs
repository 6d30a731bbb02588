//! Usage log: append-only quota accounting

use chrono::{DateTime, Utc};
use rusqlite::{Result as SqliteResult, params};

use crate::models::{QuotaPool, UsageLogEntry, UsageSummary};
use super::super::Database;
use super::super::sqlite::{enum_at, timestamp_at};

impl Database {
    pub fn record_usage(
        &self,
        user_id: i64,
        endpoint: &str,
        pool: QuotaPool,
        units: i64,
        status: &str,
    ) -> SqliteResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO usage_log (user_id, endpoint, quota_pool, units, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, endpoint, pool.as_ref(), units, status, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent entries first
    pub fn list_usage(&self, user_id: i64, limit: usize) -> SqliteResult<Vec<UsageLogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, endpoint, quota_pool, units, status, created_at
             FROM usage_log WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok(UsageLogEntry {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    endpoint: row.get(2)?,
                    quota_pool: enum_at::<QuotaPool>(row, 3)?,
                    units: row.get(4)?,
                    status: row.get(5)?,
                    created_at: timestamp_at(row, 6)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    /// Units charged per pool since the given instant
    pub fn usage_summary(&self, user_id: i64, since: DateTime<Utc>) -> SqliteResult<UsageSummary> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT quota_pool, SUM(units), COUNT(*), SUM(CASE WHEN status = 'ok' THEN 0 ELSE 1 END)
             FROM usage_log WHERE user_id = ?1 AND created_at >= ?2 GROUP BY quota_pool",
        )?;
        let rows = stmt
            .query_map(params![user_id, since.to_rfc3339()], |row| {
                Ok((
                    enum_at::<QuotaPool>(row, 0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut summary = UsageSummary::default();
        for (pool, units, calls, failed) in rows {
            match pool {
                QuotaPool::DataApi => summary.data_api_units = units,
                QuotaPool::AnalyticsApi => summary.analytics_api_units = units,
            }
            summary.calls += calls;
            summary.failed_calls += failed;
        }
        Ok(summary)
    }
}
