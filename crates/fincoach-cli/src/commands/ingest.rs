//! Transaction ingestion command

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fincoach_core::models::{NewTransaction, TransactionType};
use fincoach_core::{
    db::Database, AlertAction, CoachService, EngineConfig, IngestOutcome, Outbox,
};

use super::{deliver, truncate};

/// Parse an RFC 3339 timestamp, or take the current time
pub fn parse_at(at: Option<&str>) -> Result<DateTime<Utc>> {
    match at {
        Some(raw) => Ok(DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Invalid --at timestamp '{}' (expected RFC 3339)", raw))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

/// Ingest one transaction, evaluated as of its own timestamp
#[allow(clippy::too_many_arguments)]
pub async fn cmd_ingest(
    db: &Database,
    config: &EngineConfig,
    user: &str,
    tx_type: &str,
    category: &str,
    amount: f64,
    id: Option<&str>,
    note: Option<&str>,
    at: Option<&str>,
) -> Result<IngestOutcome> {
    let tx_type: TransactionType = tx_type.parse().map_err(anyhow::Error::msg)?;
    let occurred_at = parse_at(at)?;

    let (outbox, worker) = Outbox::channel();
    let service = CoachService::new(Arc::new(db.clone()), config.clone(), outbox);

    let outcome = service
        .ingest(
            NewTransaction {
                id: id.map(str::to_string),
                user_id: user.to_string(),
                tx_type,
                category: category.to_string(),
                amount,
                occurred_at,
                note: note.map(str::to_string),
            },
            occurred_at,
        )
        .context("Failed to ingest transaction")?;

    print_outcome(&outcome);

    drop(service);
    deliver(worker, config).await;

    Ok(outcome)
}

fn print_outcome(outcome: &IngestOutcome) {
    let tx = &outcome.transaction;
    println!(
        "💳 {} {} {:.2} ({}) for {}",
        tx.tx_type, tx.category, tx.amount, tx.id, tx.user_id
    );

    if !outcome.inserted {
        println!("   Already recorded, nothing to do");
        return;
    }

    let Some(processed) = &outcome.processed else {
        println!("   ⚠️  Scoring unavailable; the transaction was recorded");
        return;
    };

    let decision = &processed.assessment.decision;
    println!(
        "   Level: {}  Risk: {}  Positivity: {}",
        decision.level, decision.risk_score, decision.positivity_score
    );
    for reason in &decision.reasons {
        println!("   • {}", truncate(reason, 90));
    }

    match &processed.action {
        None => println!("   No alert needed"),
        Some(AlertAction::Created(alert)) => {
            println!("   🔔 New alert #{}: {}", alert.id, alert.title)
        }
        Some(AlertAction::Updated(alert)) => println!(
            "   🔁 Updated alert #{}: {} (triggered {} times)",
            alert.id, alert.title, alert.trigger_count
        ),
        Some(AlertAction::Skipped(reason)) => println!("   Alert unchanged: {}", reason),
        Some(AlertAction::Unavailable) => {
            println!("   ⚠️  Alert store unavailable; no alert state changed")
        }
    }

    if let Some(sweep) = &outcome.sweep {
        if sweep.resolved > 0 {
            println!("   ✅ {} alert(s) auto-resolved", sweep.resolved);
        }
    }
}
