//! Alert store and alert listing operations

use chrono::{DateTime, Utc};
use rusqlite::{params, ErrorCode, OptionalExtension};

use super::{format_datetime, parse_datetime, parse_enum, Database};
use crate::error::{Error, Result};
use crate::models::{Alert, AlertMeta, AlertStatus, NewAlert, Scope};
use crate::store::AlertStore;

const ALERT_COLUMNS: &str = r#"
    id, user_id, scope, area_key, page, title, level, status,
    last_risk_score, last_positivity_score, last_transaction_id,
    last_triggered_at, cool_down_until, trigger_count, resolved_count,
    ignored_count, meta, resolved_at, resolved_by, resolution_reason,
    version, created_at, updated_at
"#;

fn optional_datetime(idx: usize, s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_datetime(idx, &s)).transpose()
}

/// A unique-index violation means another writer already holds the active slot
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl Database {
    pub(crate) fn row_to_alert(row: &rusqlite::Row) -> rusqlite::Result<Alert> {
        let scope: String = row.get(2)?;
        let level: String = row.get(6)?;
        let status: String = row.get(7)?;
        let last_triggered_at: String = row.get(11)?;
        let cool_down_until: String = row.get(12)?;
        let meta: String = row.get(16)?;
        let resolved_by: Option<String> = row.get(18)?;
        let resolution_reason: Option<String> = row.get(19)?;
        let created_at: String = row.get(21)?;
        let updated_at: String = row.get(22)?;

        Ok(Alert {
            id: row.get(0)?,
            user_id: row.get(1)?,
            scope: parse_enum(2, &scope)?,
            area_key: row.get(3)?,
            page: row.get(4)?,
            title: row.get(5)?,
            level: parse_enum(6, &level)?,
            status: parse_enum(7, &status)?,
            last_risk_score: row.get(8)?,
            last_positivity_score: row.get(9)?,
            last_transaction_id: row.get(10)?,
            last_triggered_at: parse_datetime(11, &last_triggered_at)?,
            cool_down_until: parse_datetime(12, &cool_down_until)?,
            trigger_count: row.get(13)?,
            resolved_count: row.get(14)?,
            ignored_count: row.get(15)?,
            meta: serde_json::from_str::<AlertMeta>(&meta).unwrap_or_default(),
            resolved_at: optional_datetime(17, row.get(17)?)?,
            resolved_by: resolved_by.map(|s| parse_enum(18, &s)).transpose()?,
            resolution_reason: resolution_reason.map(|s| parse_enum(19, &s)).transpose()?,
            version: row.get(20)?,
            created_at: parse_datetime(21, &created_at)?,
            updated_at: parse_datetime(22, &updated_at)?,
        })
    }

    fn query_alerts(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Alert>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let alerts = stmt
            .query_map(params, Self::row_to_alert)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(alerts)
    }

    /// Every alert for a user, active first then most recently updated
    pub fn list_alerts(&self, user_id: &str, include_resolved: bool) -> Result<Vec<Alert>> {
        let filter = if include_resolved {
            ""
        } else {
            "AND status = 'active'"
        };
        let sql = format!(
            "SELECT {} FROM coach_alerts WHERE user_id = ? {} \
             ORDER BY status = 'active' DESC, updated_at DESC, id DESC",
            ALERT_COLUMNS, filter
        );
        self.query_alerts(&sql, params![user_id])
    }

    /// Users holding at least one active alert
    pub fn users_with_active_alerts(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT user_id FROM coach_alerts WHERE status = 'active' ORDER BY user_id",
        )?;
        let users = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(users)
    }

    pub fn count_active_alerts(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM coach_alerts WHERE user_id = ? AND status = 'active'",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl AlertStore for Database {
    fn find_active(&self, user_id: &str, scope: Scope, area_key: &str) -> Result<Option<Alert>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM coach_alerts \
             WHERE user_id = ? AND scope = ? AND area_key = ? AND status = 'active'",
            ALERT_COLUMNS
        );
        let alert = conn
            .query_row(&sql, params![user_id, scope.as_str(), area_key], Self::row_to_alert)
            .optional()?;
        Ok(alert)
    }

    fn create(&self, alert: &NewAlert) -> Result<Alert> {
        let conn = self.conn()?;
        let meta = serde_json::to_string(&alert.meta)?;
        let stamp = format_datetime(&alert.last_triggered_at);

        let inserted = conn.execute(
            r#"
            INSERT INTO coach_alerts (
                user_id, scope, area_key, page, title, level, status,
                last_risk_score, last_positivity_score, last_transaction_id,
                last_triggered_at, cool_down_until, trigger_count, resolved_count,
                ignored_count, meta, version, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, 'active', ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
            params![
                alert.user_id,
                alert.area.scope.as_str(),
                alert.area.area_key,
                alert.area.page,
                alert.area.title,
                alert.level.as_str(),
                alert.last_risk_score,
                alert.last_positivity_score,
                alert.last_transaction_id,
                stamp,
                format_datetime(&alert.cool_down_until),
                alert.trigger_count,
                alert.resolved_count,
                alert.ignored_count,
                meta,
                stamp,
                stamp,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::Conflict(format!(
                    "active alert already exists for {}/{}/{}",
                    alert.user_id, alert.area.scope, alert.area.area_key
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let id = conn.last_insert_rowid();
        let sql = format!("SELECT {} FROM coach_alerts WHERE id = ?", ALERT_COLUMNS);
        Ok(conn.query_row(&sql, params![id], Self::row_to_alert)?)
    }

    fn save(&self, alert: &Alert) -> Result<Alert> {
        let conn = self.conn()?;
        let meta = serde_json::to_string(&alert.meta)?;

        let updated = conn.execute(
            r#"
            UPDATE coach_alerts SET
                page = ?, title = ?, level = ?, status = ?,
                last_risk_score = ?, last_positivity_score = ?, last_transaction_id = ?,
                last_triggered_at = ?, cool_down_until = ?, trigger_count = ?,
                resolved_count = ?, ignored_count = ?, meta = ?,
                resolved_at = ?, resolved_by = ?, resolution_reason = ?,
                updated_at = ?, version = version + 1
            WHERE id = ? AND version = ? AND status = 'active'
            "#,
            params![
                alert.page,
                alert.title,
                alert.level.as_str(),
                alert.status.as_str(),
                alert.last_risk_score,
                alert.last_positivity_score,
                alert.last_transaction_id,
                format_datetime(&alert.last_triggered_at),
                format_datetime(&alert.cool_down_until),
                alert.trigger_count,
                alert.resolved_count,
                alert.ignored_count,
                meta,
                alert.resolved_at.as_ref().map(format_datetime),
                alert.resolved_by.map(|b| b.as_str()),
                alert.resolution_reason.map(|r| r.as_str()),
                format_datetime(&alert.updated_at),
                alert.id,
                alert.version,
            ],
        )?;

        if updated == 0 {
            return Err(Error::Conflict(format!(
                "alert {} changed since version {}",
                alert.id, alert.version
            )));
        }

        let mut stored = alert.clone();
        stored.version += 1;
        Ok(stored)
    }

    fn find_all_active(&self, user_id: &str) -> Result<Vec<Alert>> {
        let sql = format!(
            "SELECT {} FROM coach_alerts WHERE user_id = ? AND status = ? ORDER BY id",
            ALERT_COLUMNS
        );
        self.query_alerts(&sql, params![user_id, AlertStatus::Active.as_str()])
    }

    fn get(&self, id: i64) -> Result<Option<Alert>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM coach_alerts WHERE id = ?", ALERT_COLUMNS);
        let alert = conn
            .query_row(&sql, params![id], Self::row_to_alert)
            .optional()?;
        Ok(alert)
    }

    fn find_last_resolved(
        &self,
        user_id: &str,
        scope: Scope,
        area_key: &str,
    ) -> Result<Option<Alert>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM coach_alerts \
             WHERE user_id = ? AND scope = ? AND area_key = ? AND status = 'resolved' \
             ORDER BY resolved_at DESC, id DESC LIMIT 1",
            ALERT_COLUMNS
        );
        let alert = conn
            .query_row(&sql, params![user_id, scope.as_str(), area_key], Self::row_to_alert)
            .optional()?;
        Ok(alert)
    }
}
