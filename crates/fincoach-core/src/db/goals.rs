//! Goal operations

use rusqlite::{params, OptionalExtension};

use super::{parse_date, parse_enum, Database};
use crate::error::{Error, Result};
use crate::models::{Goal, GoalStatus};

const GOAL_COLUMNS: &str =
    "id, name, target_amount, current_amount, deadline, priority, category, status";

impl Database {
    pub fn insert_goal(&self, user_id: &str, goal: &Goal) -> Result<()> {
        if goal.target_amount <= 0.0 {
            return Err(Error::Validation(format!(
                "goal target must be positive, got {}",
                goal.target_amount
            )));
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO coach_goals
                (id, user_id, name, target_amount, current_amount, deadline, priority, category, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                goal.id,
                user_id,
                goal.name,
                goal.target_amount,
                goal.current_amount,
                goal.deadline.map(|d| d.format("%Y-%m-%d").to_string()),
                goal.priority,
                goal.category,
                goal.status.as_str(),
            ],
        )?;
        Ok(())
    }

    fn row_to_goal(row: &rusqlite::Row) -> rusqlite::Result<Goal> {
        let deadline: Option<String> = row.get(4)?;
        let status: String = row.get(7)?;
        Ok(Goal {
            id: row.get(0)?,
            name: row.get(1)?,
            target_amount: row.get(2)?,
            current_amount: row.get(3)?,
            deadline: deadline.map(|d| parse_date(4, &d)).transpose()?,
            priority: row.get(5)?,
            category: row.get(6)?,
            status: parse_enum(7, &status)?,
        })
    }

    pub fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM coach_goals WHERE user_id = ? ORDER BY created_at, id",
            GOAL_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let goals = stmt
            .query_map(params![user_id], Self::row_to_goal)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(goals)
    }

    pub fn get_goal(&self, id: &str) -> Result<Option<Goal>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM coach_goals WHERE id = ?", GOAL_COLUMNS);
        let goal = conn
            .query_row(&sql, params![id], Self::row_to_goal)
            .optional()?;
        Ok(goal)
    }

    /// Add to a goal's balance, completing it once the target is reached
    pub fn contribute_to_goal(&self, id: &str, amount: f64) -> Result<Goal> {
        if amount <= 0.0 {
            return Err(Error::Validation(format!(
                "contribution must be positive, got {}",
                amount
            )));
        }

        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE coach_goals SET
                current_amount = current_amount + ?1,
                status = CASE WHEN current_amount + ?1 >= target_amount THEN ?2 ELSE status END
            WHERE id = ?3
            "#,
            params![amount, GoalStatus::Completed.as_str(), id],
        )?;

        if updated == 0 {
            return Err(Error::NotFound(format!("goal {}", id)));
        }

        self.get_goal(id)?
            .ok_or_else(|| Error::NotFound(format!("goal {}", id)))
    }
}
