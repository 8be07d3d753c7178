//! Behavior profile persistence

use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::error::Result;
use crate::models::BehaviorProfile;

impl Database {
    /// Stored profile, or the neutral default for a new user
    pub fn get_profile(&self, user_id: &str) -> Result<BehaviorProfile> {
        let conn = self.conn()?;
        let profile = conn
            .query_row(
                r#"
                SELECT discipline_score, impulse_score, consistency_index, risk_index, saving_streak
                FROM coach_profiles WHERE user_id = ?
                "#,
                params![user_id],
                |row| {
                    Ok(BehaviorProfile {
                        discipline_score: row.get(0)?,
                        impulse_score: row.get(1)?,
                        consistency_index: row.get(2)?,
                        risk_index: row.get(3)?,
                        saving_streak: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(profile.unwrap_or_default())
    }

    pub fn save_profile(&self, user_id: &str, profile: &BehaviorProfile) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO coach_profiles
                (user_id, discipline_score, impulse_score, consistency_index, risk_index, saving_streak, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)
            ON CONFLICT(user_id) DO UPDATE SET
                discipline_score = ?2,
                impulse_score = ?3,
                consistency_index = ?4,
                risk_index = ?5,
                saving_streak = ?6,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![
                user_id,
                profile.discipline_score,
                profile.impulse_score,
                profile.consistency_index,
                profile.risk_index,
                profile.saving_streak,
            ],
        )?;
        Ok(())
    }
}
