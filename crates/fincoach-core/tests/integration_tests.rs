//! Integration tests for fincoach-core
//!
//! These tests exercise the full ingest → score → alert → resolve workflow
//! against a real database, and outbox delivery against the mock notifier
//! server.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use fincoach_core::{
    db::Database,
    models::{
        Alert, AlertStatus, Level, NewTransaction, ResolutionReason, ResolvedBy, TransactionType,
    },
    notify::{AlertEvent, EmailNotifier, InsightNotifier, Notifier, Outbox, OutboxWorker},
    resolution::Improvement,
    test_utils::{goal, noon, MockNotifyServer, USER},
    AlertAction, AlertStore, CoachService, EngineConfig, Error,
};

fn setup() -> (Arc<Database>, CoachService, OutboxWorker) {
    let db = Arc::new(Database::in_memory().expect("Failed to create in-memory database"));
    let (outbox, worker) = Outbox::channel();
    let service = CoachService::new(db.clone(), EngineConfig::default(), outbox);
    (db, service, worker)
}

fn submit(
    id: &str,
    tx_type: TransactionType,
    category: &str,
    amount: f64,
    at: DateTime<Utc>,
) -> NewTransaction {
    NewTransaction {
        id: Some(id.to_string()),
        user_id: USER.to_string(),
        tx_type,
        category: category.to_string(),
        amount,
        occurred_at: at,
        note: None,
    }
}

fn stored(db: &Database, id: i64) -> Alert {
    db.get(id).unwrap().expect("alert exists")
}

fn tagged(mut tx: NewTransaction, note: &str) -> NewTransaction {
    tx.note = Some(note.to_string());
    tx
}

// =============================================================================
// Ingest Workflow Tests
// =============================================================================

#[test]
fn test_invalid_transaction_is_rejected_without_side_effects() {
    let (db, service, mut worker) = setup();

    for amount in [0.0, -20.0, f64::NAN] {
        let err = service
            .ingest(submit("t1", TransactionType::Expense, "Food", amount, noon()), noon())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    let mut blank_user = submit("t2", TransactionType::Expense, "Food", 10.0, noon());
    blank_user.user_id = String::new();
    assert!(matches!(
        service.ingest(blank_user, noon()),
        Err(Error::Validation(_))
    ));

    assert_eq!(db.count_transactions(USER).unwrap(), 0);
    assert!(db.list_alerts(USER, true).unwrap().is_empty());
    assert!(worker.drain_pending().is_empty());
}

#[test]
fn test_missing_id_gets_stable_fingerprint() {
    let (db, service, _worker) = setup();

    let mut tx = submit("unused", TransactionType::Expense, "Food", 25.0, noon());
    tx.id = None;
    let first = service.ingest(tx.clone(), noon()).unwrap();
    let second = service.ingest(tx, noon()).unwrap();

    assert!(first.inserted);
    assert!(!second.inserted);
    assert_eq!(first.transaction.id, second.transaction.id);
    assert_eq!(db.count_transactions(USER).unwrap(), 1);
}

#[test]
fn test_large_expense_opens_one_alert_and_repeat_is_absorbed() {
    let (db, service, mut worker) = setup();
    let start = noon() - Duration::days(5);

    for (i, amount) in [900.0, 1100.0, 1000.0].into_iter().enumerate() {
        let at = start + Duration::hours(i as i64);
        service
            .ingest(submit(&format!("e{i}"), TransactionType::Expense, "Groceries", amount, at), at)
            .unwrap();
    }
    worker.drain_pending();

    let outcome = service
        .ingest(submit("big", TransactionType::Expense, "Travel", 8000.0, noon()), noon())
        .unwrap();
    let processed = outcome.processed.expect("engine ran");
    assert_eq!(processed.assessment.decision.level, Level::Critical);
    let alert = match processed.action {
        Some(AlertAction::Created(alert)) => alert,
        other => panic!("expected a new alert, got {:?}", other),
    };

    let events = worker.drain_pending();
    assert!(events.iter().any(|e| matches!(
        e,
        AlertEvent::Finalized(f) if f.alert_id == alert.id && f.email_worthy
    )));

    // Same kind of event an hour later: absorbed by the 24h CRITICAL guard
    let later = noon() + Duration::hours(1);
    let again = service
        .ingest(submit("big2", TransactionType::Expense, "Travel", 8000.0, later), later)
        .unwrap();
    let action = again.processed.and_then(|p| p.action);
    assert!(
        !matches!(action, Some(AlertAction::Created(_))),
        "got {:?}",
        action
    );

    let current = stored(&db, alert.id);
    assert_eq!(current.trigger_count, 1);
    assert_eq!(current.cool_down_until, alert.cool_down_until);
}

#[test]
fn test_goal_contributions_resolve_goal_alert() {
    let (db, service, mut worker) = setup();
    db.insert_goal(USER, &goal("g1", "Laptop", 1000.0, 0.0, "tech"))
        .unwrap();

    let first = service
        .ingest(
            tagged(submit("s1", TransactionType::Saving, "Tech", 300.0, noon()), "goal: laptop"),
            noon(),
        )
        .unwrap();
    let alert = match first.processed.and_then(|p| p.action) {
        Some(AlertAction::Created(alert)) => alert,
        other => panic!("expected a goal alert, got {:?}", other),
    };
    assert_eq!(alert.area_key, "goal_tech");
    assert_eq!(alert.level, Level::Positive);
    assert_eq!(first.sweep.map(|s| s.resolved), Some(0));

    let next_day = noon() + Duration::days(1);
    let second = service
        .ingest(
            tagged(
                submit("s2", TransactionType::Saving, "Tech", 200.0, next_day),
                "Goal top-up",
            ),
            next_day,
        )
        .unwrap();
    assert_eq!(second.sweep.map(|s| s.resolved), Some(1));

    let resolved = stored(&db, alert.id);
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert_eq!(resolved.resolved_by, Some(ResolvedBy::System));
    assert_eq!(
        resolved.resolution_reason,
        Some(ResolutionReason::BehaviorImproved)
    );
    assert_eq!(resolved.resolved_count, 1);

    let resolved_event = worker
        .drain_pending()
        .into_iter()
        .find_map(|e| match e {
            AlertEvent::Resolved(r) => Some(r),
            _ => None,
        })
        .expect("resolution event queued");
    assert_eq!(resolved_event.alert_id, alert.id);
    assert_eq!(resolved_event.improvement, Some(Improvement::GoalContributions));
    assert_eq!(resolved_event.reasons.len(), 3);
}

#[test]
fn test_user_feedback_carries_into_next_alert() {
    let (db, service, _worker) = setup();

    let outcome = service
        .ingest(submit("big", TransactionType::Expense, "Travel", 8000.0, noon()), noon())
        .unwrap();
    let alert = outcome
        .processed
        .and_then(|p| p.action)
        .and_then(|a| a.committed().cloned())
        .expect("alert committed");

    let ignored = service.mark_ignored(alert.id, noon()).unwrap();
    assert_eq!(ignored.ignored_count, 1);
    assert_eq!(service.active_alerts(USER).unwrap().len(), 1);

    let resolved = service.resolve_by_user(alert.id, noon()).unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert_eq!(
        resolved.resolution_reason,
        Some(ResolutionReason::UserAcknowledged)
    );
    assert!(service.active_alerts(USER).unwrap().is_empty());
    assert!(matches!(
        service.mark_ignored(alert.id, noon()),
        Err(Error::NotFound(_))
    ));

    let later = noon() + Duration::days(10);
    let reopened = service
        .ingest(submit("big2", TransactionType::Expense, "Travel", 8000.0, later), later)
        .unwrap()
        .processed
        .and_then(|p| p.action)
        .and_then(|a| a.committed().cloned())
        .expect("new alert committed");
    assert_eq!(reopened.area_key, alert.area_key);
    assert_ne!(reopened.id, alert.id);
    assert_eq!(reopened.trigger_count, 1);
    assert_eq!(reopened.ignored_count, 1);
    assert_eq!(reopened.resolved_count, 1);
    assert_eq!(stored(&db, alert.id).status, AlertStatus::Resolved);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_ingest_keeps_one_active_alert_per_identity() {
    let (db, service, _worker) = setup();
    let service = Arc::new(service);

    std::thread::scope(|scope| {
        for i in 0..8 {
            let service = service.clone();
            scope.spawn(move || {
                let at = noon() + Duration::minutes(i);
                service
                    .ingest(
                        submit(&format!("c{i}"), TransactionType::Expense, "Travel", 7000.0, at),
                        at,
                    )
                    .unwrap();
            });
        }
    });

    assert_eq!(db.count_transactions(USER).unwrap(), 8);
    let active = db.list_alerts(USER, false).unwrap();
    let identities: HashSet<(String, String)> = active
        .iter()
        .map(|a| (a.scope.to_string(), a.area_key.clone()))
        .collect();
    assert_eq!(identities.len(), active.len());
}

// =============================================================================
// Notifier Delivery Tests
// =============================================================================

#[tokio::test]
async fn test_outbox_delivers_to_http_notifiers() {
    let server = MockNotifyServer::start().await;
    let (db, service, worker) = setup();

    for (i, amount) in [40.0, 60.0, 50.0].into_iter().enumerate() {
        let at = noon() - Duration::days(3) + Duration::hours(i as i64);
        service
            .ingest(submit(&format!("e{i}"), TransactionType::Expense, "Food", amount, at), at)
            .unwrap();
    }
    service
        .ingest(submit("big", TransactionType::Expense, "Travel", 8000.0, noon()), noon())
        .unwrap();
    let committed = db.list_alerts(USER, true).unwrap();
    assert!(!committed.is_empty());

    // Every outbox handle lives in the service; dropping it ends the worker
    drop(service);
    let notifiers: Vec<Arc<dyn Notifier>> = vec![
        Arc::new(InsightNotifier::new(&server.url())),
        Arc::new(EmailNotifier::new(&server.url())),
    ];
    let report = worker.run(notifiers, StdDuration::from_secs(5)).await;

    assert!(report.events >= 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.timed_out, 0);

    let requests = server.requests();
    let insights: Vec<_> = requests.iter().filter(|r| r.path == "/ai/insights").collect();
    assert_eq!(insights.len(), report.events);
    assert!(insights
        .iter()
        .all(|r| r.body["userId"] == USER && r.body["dataConfidence"] == "high"));
    assert!(requests
        .iter()
        .any(|r| r.path == "/email/coach" && r.body["alert"]["level"] == "CRITICAL"));
}

#[tokio::test]
async fn test_failing_notifier_does_not_affect_committed_alerts() {
    let server = MockNotifyServer::start_failing().await;
    let (db, service, worker) = setup();

    service
        .ingest(submit("big", TransactionType::Expense, "Travel", 8000.0, noon()), noon())
        .unwrap();
    let before = db.list_alerts(USER, true).unwrap();
    drop(service);

    let notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(InsightNotifier::new(&server.url()))];
    let report = worker.run(notifiers, StdDuration::from_secs(5)).await;

    assert_eq!(report.failed, report.events);
    assert_eq!(db.list_alerts(USER, true).unwrap(), before);
}
