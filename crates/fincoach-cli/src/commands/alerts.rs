//! Alert listing and feedback commands

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use fincoach_core::models::{Alert, AlertStatus, Level};
use fincoach_core::{db::Database, AlertLifecycle, EngineConfig};

use super::truncate;

fn level_icon(level: Level) -> &'static str {
    match level {
        Level::Critical => "🚨",
        Level::High => "⚠️ ",
        Level::Medium => "🔶",
        Level::Low => "🔹",
        Level::Positive => "🌟",
    }
}

fn lifecycle(db: &Database, config: &EngineConfig) -> AlertLifecycle {
    AlertLifecycle::new(Arc::new(db.clone()), config.lifecycle.clone())
}

pub fn cmd_alerts_list(db: &Database, user: &str, all: bool, json: bool) -> Result<()> {
    let alerts = db.list_alerts(user, all)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&alerts)?);
        return Ok(());
    }

    if alerts.is_empty() {
        println!("✅ No active alerts for {}.", user);
        return Ok(());
    }

    println!();
    println!("🔔 Alerts for {}", user);
    println!("   ─────────────────────────────────────────────────────────────");

    for alert in &alerts {
        let status = match alert.status {
            AlertStatus::Active => String::new(),
            AlertStatus::Resolved => format!(
                " (resolved: {})",
                alert
                    .resolution_reason
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            ),
        };
        println!(
            "   {} #{} [{}] {}{}",
            level_icon(alert.level),
            alert.id,
            alert.level,
            truncate(&alert.title, 60),
            status
        );
        println!(
            "      {}/{}  risk {}  positivity {}  triggered {}x  last {}",
            alert.scope,
            alert.area_key,
            alert.last_risk_score,
            alert.last_positivity_score,
            alert.trigger_count,
            alert.last_triggered_at.format("%Y-%m-%d %H:%M")
        );
        for reason in &alert.meta.last_reasons {
            println!("      • {}", truncate(reason, 80));
        }
        println!();
    }

    Ok(())
}

pub fn cmd_alerts_ignore(db: &Database, config: &EngineConfig, id: i64) -> Result<Alert> {
    let alert = lifecycle(db, config)
        .mark_ignored(id, Utc::now())
        .with_context(|| format!("Failed to ignore alert {}", id))?;
    println!(
        "🔕 Ignored alert #{} ({} of {} triggers ignored)",
        alert.id, alert.ignored_count, alert.trigger_count
    );
    Ok(alert)
}

pub fn cmd_alerts_resolve(db: &Database, config: &EngineConfig, id: i64) -> Result<Alert> {
    let alert = lifecycle(db, config)
        .resolve_by_user(id, Utc::now())
        .with_context(|| format!("Failed to resolve alert {}", id))?;
    println!("✅ Resolved alert #{}: {}", alert.id, alert.title);
    Ok(alert)
}
