//! Ingestion service
//!
//! The path a new transaction takes through the system: persist it, update the
//! behavior profile, derive stats and history from the ledger, run the engine,
//! then sweep the user's active alerts. Once the transaction is stored nothing
//! downstream can fail the ingest; those failures are logged and the outcome
//! simply carries no alert result.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::db::Database;
use crate::engine::{validate, CoachEngine, ProcessOutcome};
use crate::error::Result;
use crate::models::{Alert, EvaluationInput, NewTransaction, Transaction};
use crate::notify::Outbox;
use crate::resolution::{ResolutionEngine, ResolutionEvidence, SweepReport};
use crate::stats::{build_history, compute_stats};

/// What happened to one ingested transaction
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub transaction: Transaction,
    /// False when the same transaction id was already in the ledger
    pub inserted: bool,
    /// Engine result; `None` for duplicates and fail-closed ingests
    pub processed: Option<ProcessOutcome>,
    pub sweep: Option<SweepReport>,
}

pub struct CoachService {
    db: Arc<Database>,
    engine: CoachEngine,
    resolution: ResolutionEngine,
}

impl CoachService {
    pub fn new(db: Arc<Database>, config: EngineConfig, outbox: Outbox) -> Self {
        let resolution =
            ResolutionEngine::new(db.clone(), config.resolution.clone(), outbox.clone());
        let engine = CoachEngine::new(config, db.clone(), outbox);
        Self {
            db,
            engine,
            resolution,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn engine(&self) -> &CoachEngine {
        &self.engine
    }

    pub fn ingest(&self, new: NewTransaction, now: DateTime<Utc>) -> Result<IngestOutcome> {
        let tx = new.into_transaction();
        validate(&tx)?;

        let inserted = self.db.insert_transaction(&tx)?;
        if !inserted {
            info!("Transaction {} already ingested, skipping", tx.id);
            return Ok(IngestOutcome {
                transaction: tx,
                inserted,
                processed: None,
                sweep: None,
            });
        }

        let processed = match self
            .gather(&tx, now)
            .and_then(|input| self.engine.process(&input, now))
        {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(
                    transaction_id = %tx.id,
                    error = %e,
                    "Scoring failed after the transaction was stored, failing closed"
                );
                None
            }
        };

        let sweep = match self.sweep(&tx.user_id, now) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(user_id = %tx.user_id, error = %e, "Resolution sweep failed");
                None
            }
        };

        Ok(IngestOutcome {
            transaction: tx,
            inserted,
            processed,
            sweep,
        })
    }

    /// Build the engine input for a stored transaction and advance the profile
    fn gather(&self, tx: &Transaction, now: DateTime<Utc>) -> Result<EvaluationInput> {
        let ledger = self.db.list_transactions(&tx.user_id)?;
        let goals = self.db.list_goals(&tx.user_id)?;
        let profile = self.db.get_profile(&tx.user_id)?;

        let mut updated = profile.clone();
        updated.apply(tx);
        self.db.save_profile(&tx.user_id, &updated)?;

        debug!(
            "Gathered {} ledger entries and {} goals for {}",
            ledger.len(),
            goals.len(),
            tx.user_id
        );

        Ok(EvaluationInput {
            transaction: tx.clone(),
            stats: compute_stats(&ledger, &goals, now),
            history: build_history(&ledger, now),
            goals,
            profile,
        })
    }

    /// Resolution sweep for one user against fresh ledger evidence
    pub fn sweep(&self, user_id: &str, now: DateTime<Utc>) -> Result<SweepReport> {
        let window = Duration::days(self.engine.config().resolution.window_days);
        let ledger = self.db.list_transactions(user_id)?;
        let goals = self.db.list_goals(user_id)?;

        let evidence = ResolutionEvidence {
            recent_transactions: self.db.list_transactions_since(user_id, now - window)?,
            stats: compute_stats(&ledger, &goals, now),
            goals,
        };
        self.resolution.sweep(user_id, &evidence, now)
    }

    /// Sweep every user holding an active alert; one user's failure is counted, not fatal
    pub fn sweep_all(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut total = SweepReport::default();
        for user_id in self.db.users_with_active_alerts()? {
            match self.sweep(&user_id, now) {
                Ok(report) => {
                    total.checked += report.checked;
                    total.resolved += report.resolved;
                    total.failed += report.failed;
                }
                Err(e) => {
                    total.failed += 1;
                    warn!(user_id = %user_id, error = %e, "Sweep failed for user");
                }
            }
        }
        info!(
            "Sweep complete: checked={} resolved={} failed={}",
            total.checked, total.resolved, total.failed
        );
        Ok(total)
    }

    pub fn mark_ignored(&self, alert_id: i64, now: DateTime<Utc>) -> Result<Alert> {
        self.engine.lifecycle().mark_ignored(alert_id, now)
    }

    pub fn resolve_by_user(&self, alert_id: i64, now: DateTime<Utc>) -> Result<Alert> {
        self.engine.lifecycle().resolve_by_user(alert_id, now)
    }

    pub fn active_alerts(&self, user_id: &str) -> Result<Vec<Alert>> {
        self.engine.lifecycle().active_alerts(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::lifecycle::AlertAction;
    use crate::models::{Level, TransactionType};
    use crate::notify::{AlertEvent, OutboxWorker};
    use crate::test_utils::*;

    fn setup() -> (Arc<Database>, CoachService, OutboxWorker) {
        let db = Arc::new(Database::in_memory().unwrap());
        let (outbox, worker) = Outbox::channel();
        let service = CoachService::new(db.clone(), EngineConfig::default(), outbox);
        (db, service, worker)
    }

    fn new_tx(id: &str, tx_type: TransactionType, category: &str, amount: f64) -> NewTransaction {
        NewTransaction {
            id: Some(id.to_string()),
            user_id: USER.to_string(),
            tx_type,
            category: category.to_string(),
            amount,
            occurred_at: noon(),
            note: None,
        }
    }

    #[test]
    fn test_rejects_invalid_before_persisting() {
        let (db, service, _worker) = setup();
        let err = service
            .ingest(new_tx("t1", TransactionType::Expense, "Food", 0.0), noon())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(db.count_transactions(USER).unwrap(), 0);
    }

    #[test]
    fn test_ingest_persists_and_updates_profile() {
        let (db, service, _worker) = setup();
        let outcome = service
            .ingest(new_tx("s1", TransactionType::Saving, "Fund", 300.0), noon())
            .unwrap();
        assert!(outcome.inserted);
        assert!(outcome.processed.is_some());
        assert!(outcome.sweep.is_some());

        assert_eq!(db.count_transactions(USER).unwrap(), 1);
        let profile = db.get_profile(USER).unwrap();
        assert_eq!(profile.saving_streak, 1);
        assert_eq!(profile.discipline_score, 52);
    }

    #[test]
    fn test_duplicate_ingest_is_a_no_op() {
        let (db, service, mut worker) = setup();
        let first = service
            .ingest(new_tx("t1", TransactionType::Expense, "Gadgets", 9000.0), noon())
            .unwrap();
        assert!(first.inserted);
        worker.drain_pending();

        let again = service
            .ingest(new_tx("t1", TransactionType::Expense, "Gadgets", 9000.0), noon())
            .unwrap();
        assert!(!again.inserted);
        assert!(again.processed.is_none());
        assert!(worker.drain_pending().is_empty());
        assert_eq!(db.count_transactions(USER).unwrap(), 1);
    }

    #[test]
    fn test_first_large_expense_opens_alert() {
        let (db, service, mut worker) = setup();
        service
            .ingest(new_tx("i1", TransactionType::Income, "Salary", 5000.0), noon())
            .unwrap();
        let outcome = service
            .ingest(new_tx("e1", TransactionType::Expense, "Gadgets", 9000.0), noon())
            .unwrap();

        let processed = outcome.processed.unwrap();
        assert!(processed.assessment.should_alert);
        let alert = match processed.action {
            Some(AlertAction::Created(alert)) => alert,
            other => panic!("expected create, got {:?}", other),
        };
        assert!(matches!(alert.level, Level::High | Level::Critical));
        assert!(db.count_active_alerts(USER).unwrap() >= 1);

        let finalized = worker
            .drain_pending()
            .into_iter()
            .filter(|e| matches!(e, AlertEvent::Finalized(_)))
            .count();
        assert!(finalized >= 1);
    }

    #[test]
    fn test_sweep_all_without_alerts() {
        let (_db, service, _worker) = setup();
        assert_eq!(service.sweep_all(noon()).unwrap(), SweepReport::default());
    }
}
