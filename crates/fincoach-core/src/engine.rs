//! Engine orchestration
//!
//! `evaluate` is the pure half: validate, extract signals, score, let the
//! income analyzer override, then gate. `process` adds the side effects:
//! classify, run the lifecycle against the store, and queue the finalized
//! event once the alert is committed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::area::classify;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::income::{IncomeAnalyzer, IncomeSkip, IncomeVerdict};
use crate::lifecycle::{AlertAction, AlertLifecycle, Trigger};
use crate::models::{AlertArea, Decision, EvaluationInput, Transaction, TransactionType};
use crate::notify::{AlertEvent, FinalizedAlert, Outbox};
use crate::scoring::Scorer;
use crate::signals::{SignalExtractor, Signals};
use crate::store::AlertStore;

/// Judgment for one transaction, before any alert state is touched
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub decision: Decision,
    pub signals: Signals,
    pub should_alert: bool,
    pub email_worthy: bool,
    /// Title the income analyzer gave its verdict
    pub headline: Option<String>,
    /// Set when the income analyzer explicitly declined to alert
    pub income_skip: Option<IncomeSkip>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub assessment: Assessment,
    pub area: Option<AlertArea>,
    /// `None` when the assessment did not pass the alert gate
    pub action: Option<AlertAction>,
}

/// Reject input the engine must not score
pub fn validate(tx: &Transaction) -> Result<()> {
    if tx.id.trim().is_empty() {
        return Err(Error::Validation("transaction id is required".into()));
    }
    if tx.user_id.trim().is_empty() {
        return Err(Error::Validation("user id is required".into()));
    }
    if !tx.amount.is_finite() {
        return Err(Error::Validation(format!(
            "amount must be a number, got {}",
            tx.amount
        )));
    }
    if tx.amount <= 0.0 {
        return Err(Error::Validation(format!(
            "amount must be positive, got {}",
            tx.amount
        )));
    }
    Ok(())
}

pub struct CoachEngine {
    config: EngineConfig,
    lifecycle: AlertLifecycle,
    outbox: Outbox,
}

impl CoachEngine {
    pub fn new(config: EngineConfig, store: Arc<dyn AlertStore>, outbox: Outbox) -> Self {
        let lifecycle = AlertLifecycle::new(store, config.lifecycle.clone());
        Self {
            config,
            lifecycle,
            outbox,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &AlertLifecycle {
        &self.lifecycle
    }

    pub fn evaluate(&self, input: &EvaluationInput, now: DateTime<Utc>) -> Result<Assessment> {
        let tx = &input.transaction;
        validate(tx)?;

        let signals = SignalExtractor::new(&self.config.signals).extract(input, now);
        let mut decision = Scorer::new(&self.config.scoring).score(tx, &signals);
        let mut headline = None;
        let mut income_skip = None;

        let should_alert = if tx.tx_type == TransactionType::Income {
            match IncomeAnalyzer::new(&self.config.income).analyze(
                input,
                decision.behavioral_flags,
                now,
            ) {
                IncomeVerdict::Alert {
                    decision: income,
                    headline: title,
                } => {
                    decision = income;
                    headline = Some(title);
                    true
                }
                IncomeVerdict::Skip(reason) => {
                    debug!("Income {} needs no alert: {:?}", tx.id, reason);
                    income_skip = Some(reason);
                    false
                }
            }
        } else {
            self.passes_gate(&decision, &signals)
        };

        let email_worthy = should_alert && self.is_email_worthy(input, &decision);

        Ok(Assessment {
            decision,
            signals,
            should_alert,
            email_worthy,
            headline,
            income_skip,
        })
    }

    fn passes_gate(&self, decision: &Decision, signals: &Signals) -> bool {
        let gate = &self.config.gate;
        decision.level.is_notable()
            || decision.behavioral_flags.any()
            || signals.change_from_last_week.abs() > gate.alert_weekly_change_percent
            || signals.saving_streak >= gate.alert_min_streak
            || decision.risk_score >= gate.alert_min_risk
            || decision.positivity_score >= gate.alert_min_positivity
    }

    fn is_email_worthy(&self, input: &EvaluationInput, decision: &Decision) -> bool {
        let gate = &self.config.gate;
        let flags = &decision.behavioral_flags;
        input.stats.total_transactions >= gate.email_min_transactions
            && (decision.level.is_notable()
                || flags.milestone
                || flags.goal_impact
                || flags.habit_broken
                || decision.risk_score >= gate.email_min_risk
                || decision.positivity_score >= gate.email_min_positivity)
    }

    /// Score one transaction and apply it to its alert identity
    pub fn process(&self, input: &EvaluationInput, now: DateTime<Utc>) -> Result<ProcessOutcome> {
        let mut assessment = self.evaluate(input, now)?;
        let tx = &input.transaction;

        if !assessment.should_alert {
            debug!(
                "No alert for {} ({} {}, risk {}, positivity {})",
                tx.id,
                tx.tx_type,
                assessment.decision.level,
                assessment.decision.risk_score,
                assessment.decision.positivity_score
            );
            return Ok(ProcessOutcome {
                assessment,
                area: None,
                action: None,
            });
        }

        let mut area = classify(&assessment.decision, tx);
        if let Some(headline) = &assessment.headline {
            area.title = headline.clone();
        }

        let trigger = Trigger {
            decision: &assessment.decision,
            transaction: tx,
            stats: &input.stats,
        };
        let action = self.lifecycle.apply(&tx.user_id, &area, &trigger, now);

        match &action {
            AlertAction::Created(alert) | AlertAction::Updated(alert) => {
                self.outbox.emit(AlertEvent::Finalized(FinalizedAlert {
                    alert_id: alert.id,
                    user_id: alert.user_id.clone(),
                    level: alert.level,
                    scope: alert.scope,
                    area_key: alert.area_key.clone(),
                    title: alert.title.clone(),
                    reasons: assessment.decision.reasons.clone(),
                    risk_score: alert.last_risk_score,
                    positivity_score: alert.last_positivity_score,
                    transaction: tx.clone(),
                    stats: input.stats.clone(),
                    created: matches!(action, AlertAction::Created(_)),
                    email_worthy: assessment.email_worthy,
                }));
            }
            AlertAction::Unavailable => {
                warn!(
                    transaction_id = %tx.id,
                    "Alert store unavailable, failing closed"
                );
                assessment.decision = Decision::fail_closed();
                assessment.should_alert = false;
                assessment.email_worthy = false;
            }
            AlertAction::Skipped(_) => {}
        }

        Ok(ProcessOutcome {
            assessment,
            area: Some(area),
            action: Some(action),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::lifecycle::SkipReason;
    use crate::models::{Alert, Level, NewAlert, Scope};
    use crate::notify::OutboxWorker;
    use crate::test_utils::*;
    use chrono::Duration;

    fn setup() -> (Arc<Database>, CoachEngine, OutboxWorker) {
        let db = Arc::new(Database::in_memory().unwrap());
        let (outbox, worker) = Outbox::channel();
        let engine = CoachEngine::new(EngineConfig::default(), db.clone(), outbox);
        (db, engine, worker)
    }

    fn salary_history() -> Vec<Transaction> {
        (1..=3)
            .map(|i| income(&format!("p{i}"), "Salary", 5000.0, noon() - Duration::days(30 * i)))
            .collect()
    }

    struct Offline;

    impl AlertStore for Offline {
        fn find_active(&self, _: &str, _: Scope, _: &str) -> Result<Option<Alert>> {
            Err(Error::InvalidData("store offline".into()))
        }
        fn create(&self, _: &NewAlert) -> Result<Alert> {
            Err(Error::InvalidData("store offline".into()))
        }
        fn save(&self, _: &Alert) -> Result<Alert> {
            Err(Error::InvalidData("store offline".into()))
        }
        fn find_all_active(&self, _: &str) -> Result<Vec<Alert>> {
            Err(Error::InvalidData("store offline".into()))
        }
        fn get(&self, _: i64) -> Result<Option<Alert>> {
            Err(Error::InvalidData("store offline".into()))
        }
        fn find_last_resolved(&self, _: &str, _: Scope, _: &str) -> Result<Option<Alert>> {
            Err(Error::InvalidData("store offline".into()))
        }
    }

    #[test]
    fn test_six_times_average_is_critical() {
        let (_db, engine, _worker) = setup();
        let input = InputBuilder::new(expense("t1", "Electronics", 6000.0, noon()))
            .avg(1000.0)
            .build();
        let assessment = engine.evaluate(&input, noon()).unwrap();
        assert_eq!(assessment.decision.level, Level::Critical);
        assert!(assessment.should_alert);
        assert!(assessment.email_worthy);
    }

    #[test]
    fn test_routine_income_does_not_alert() {
        let (_db, engine, _worker) = setup();
        let input = InputBuilder::new(income("t1", "Salary", 5200.0, noon()))
            .income(salary_history())
            .avg(1000.0)
            .build();
        let assessment = engine.evaluate(&input, noon()).unwrap();
        assert!(!assessment.should_alert);
        assert_eq!(assessment.income_skip, Some(IncomeSkip::Routine));
    }

    #[test]
    fn test_income_goal_completion_opportunity() {
        let (_db, engine, _worker) = setup();
        let priors = (1..=3)
            .map(|i| income(&format!("p{i}"), "Side", 600.0, noon() - Duration::days(20 * i)))
            .collect();
        let input = InputBuilder::new(income("t1", "Side", 600.0, noon()))
            .income(priors)
            .goal(goal("g1", "Laptop", 10000.0, 9500.0, "tech"))
            .build();
        let assessment = engine.evaluate(&input, noon()).unwrap();
        assert_eq!(assessment.decision.level, Level::Positive);
        assert_eq!(assessment.decision.positivity_score, 80);
        assert_eq!(
            assessment.headline.as_deref(),
            Some("Goal Completion Opportunity: Laptop")
        );
    }

    #[test]
    fn test_invalid_input_touches_nothing() {
        let (db, engine, mut worker) = setup();
        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let input = InputBuilder::new(expense("t1", "Food", bad, noon())).build();
            let err = engine.process(&input, noon()).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{bad}: {err}");
        }

        let input = InputBuilder::new(expense(" ", "Food", 50.0, noon())).build();
        assert!(matches!(
            engine.process(&input, noon()),
            Err(Error::Validation(_))
        ));

        assert_eq!(db.count_active_alerts(USER).unwrap(), 0);
        assert!(worker.drain_pending().is_empty());
    }

    #[test]
    fn test_small_expense_is_gated() {
        let (db, engine, _worker) = setup();
        let input = InputBuilder::new(expense("t1", "Food", 40.0, noon()))
            .avg(1000.0)
            .expenses(vec![expense("e0", "Food", 45.0, noon() - Duration::days(3))])
            .build();
        let outcome = engine.process(&input, noon()).unwrap();
        assert!(!outcome.assessment.should_alert);
        assert!(outcome.action.is_none());
        assert_eq!(db.count_active_alerts(USER).unwrap(), 0);
    }

    #[test]
    fn test_process_creates_then_absorbs_duplicate_critical() {
        let (db, engine, mut worker) = setup();
        let input = InputBuilder::new(expense("t1", "Electronics", 6000.0, noon()))
            .avg(1000.0)
            .build();

        let first = engine.process(&input, noon()).unwrap();
        let alert = match first.action {
            Some(AlertAction::Created(alert)) => alert,
            other => panic!("expected create, got {:?}", other),
        };
        // One 6x expense against a 1000 average also reads as drift
        assert_eq!(alert.area_key, "behavior_behaviorDrift_electronics");
        assert_eq!(alert.level, Level::Critical);

        let events = worker.drain_pending();
        assert_eq!(events.len(), 1);
        match &events[0] {
            AlertEvent::Finalized(event) => {
                assert_eq!(event.alert_id, alert.id);
                assert!(event.created);
                assert!(event.email_worthy);
                assert_eq!(event.transaction.id, "t1");
            }
            other => panic!("expected finalized event, got {:?}", other),
        }

        let later = noon() + Duration::hours(2);
        let mut input = input;
        input.transaction.id = "t2".to_string();
        input.transaction.occurred_at = later;
        let second = engine.process(&input, later).unwrap();
        assert_eq!(
            second.action,
            Some(AlertAction::Skipped(SkipReason::DuplicateCritical))
        );
        assert!(worker.drain_pending().is_empty());
        assert_eq!(db.count_active_alerts(USER).unwrap(), 1);
    }

    #[test]
    fn test_income_headline_becomes_alert_title() {
        let (_db, engine, _worker) = setup();
        let input = InputBuilder::new(income("t1", "Freelance", 2000.0, noon()))
            .income(salary_history())
            .build();
        let outcome = engine.process(&input, noon()).unwrap();
        let area = outcome.area.unwrap();
        assert_eq!(area.area_key, "income_freelance");
        assert_eq!(area.title, "New Income Source: Freelance");
        assert!(matches!(outcome.action, Some(AlertAction::Created(_))));
    }

    #[test]
    fn test_store_failure_fails_closed() {
        let (outbox, mut worker) = Outbox::channel();
        let engine = CoachEngine::new(EngineConfig::default(), Arc::new(Offline), outbox);
        let input = InputBuilder::new(expense("t1", "Electronics", 6000.0, noon()))
            .avg(1000.0)
            .build();

        let outcome = engine.process(&input, noon()).unwrap();
        assert_eq!(outcome.action, Some(AlertAction::Unavailable));
        assert_eq!(outcome.assessment.decision, Decision::fail_closed());
        assert!(!outcome.assessment.should_alert);
        assert!(worker.drain_pending().is_empty());
    }

    #[test]
    fn test_email_needs_enough_history() {
        let (_db, engine, _worker) = setup();
        let input = InputBuilder::new(expense("t1", "Electronics", 6000.0, noon()))
            .avg(1000.0)
            .stats(|s| s.total_transactions = 2)
            .build();
        let assessment = engine.evaluate(&input, noon()).unwrap();
        assert!(assessment.should_alert);
        assert!(!assessment.email_worthy);
    }
}
