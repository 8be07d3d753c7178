//! Goal management commands

use anyhow::{Context, Result};
use chrono::NaiveDate;
use fincoach_core::db::Database;
use fincoach_core::models::{Goal, GoalStatus};
use fincoach_core::normalize_category;

use super::truncate;

/// Everything `goals add` accepts
pub struct GoalSpec<'a> {
    pub user: &'a str,
    pub name: &'a str,
    pub target: f64,
    pub current: f64,
    pub deadline: Option<&'a str>,
    pub category: &'a str,
    pub priority: Option<&'a str>,
    pub id: Option<&'a str>,
}

pub fn cmd_goals_add(db: &Database, spec: GoalSpec<'_>) -> Result<Goal> {
    let deadline = spec
        .deadline
        .map(|d| {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .with_context(|| format!("Invalid deadline '{}' (expected YYYY-MM-DD)", d))
        })
        .transpose()?;

    let goal = Goal {
        id: spec
            .id
            .map(str::to_string)
            .unwrap_or_else(|| normalize_category(spec.name)),
        name: spec.name.to_string(),
        target_amount: spec.target,
        current_amount: spec.current,
        deadline,
        priority: spec.priority.map(str::to_string),
        category: spec.category.to_string(),
        status: if spec.current >= spec.target {
            GoalStatus::Completed
        } else {
            GoalStatus::Active
        },
    };

    db.insert_goal(spec.user, &goal)
        .with_context(|| format!("Failed to add goal '{}'", spec.name))?;

    println!("🎯 Added goal '{}' ({})", goal.name, goal.id);
    println!(
        "   {:.2} of {:.2} saved ({:.0}%)",
        goal.current_amount,
        goal.target_amount,
        goal.progress()
    );
    Ok(goal)
}

pub fn cmd_goals_list(db: &Database, user: &str) -> Result<()> {
    let goals = db.list_goals(user)?;

    if goals.is_empty() {
        println!("No goals yet. Add one with: fincoach goals add --user {} ...", user);
        return Ok(());
    }

    println!();
    println!("🎯 Goals for {}", user);
    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   {:<16} {:<24} {:>12} {:>12} {:>6}  {}",
        "ID", "Name", "Saved", "Target", "%", "Deadline"
    );

    for goal in &goals {
        let done = if goal.status == GoalStatus::Completed {
            " ✅"
        } else {
            ""
        };
        println!(
            "   {:<16} {:<24} {:>12.2} {:>12.2} {:>5.0}%  {}{}",
            truncate(&goal.id, 16),
            truncate(&goal.name, 24),
            goal.current_amount,
            goal.target_amount,
            goal.progress(),
            goal.deadline
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            done
        );
    }

    Ok(())
}

pub fn cmd_goals_contribute(db: &Database, id: &str, amount: f64) -> Result<Goal> {
    let goal = db
        .contribute_to_goal(id, amount)
        .with_context(|| format!("Failed to contribute to goal '{}'", id))?;

    if goal.status == GoalStatus::Completed {
        println!("🎉 Goal '{}' reached!", goal.name);
    } else {
        println!(
            "💰 Goal '{}': {:.2} remaining ({:.0}%)",
            goal.name,
            goal.remaining(),
            goal.progress()
        );
    }
    Ok(goal)
}
