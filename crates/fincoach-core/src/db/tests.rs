//! Database tests

use super::*;
use crate::models::*;
use crate::store::AlertStore;
use crate::test_utils::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn food_area() -> AlertArea {
        AlertArea {
            scope: Scope::Expense,
            area_key: "expense_food".to_string(),
            page: "expenses".to_string(),
            title: "Expense alert – Food".to_string(),
        }
    }

    fn new_alert(level: Level, now: DateTime<Utc>) -> NewAlert {
        NewAlert {
            user_id: USER.to_string(),
            area: food_area(),
            level,
            last_risk_score: 40,
            last_positivity_score: 0,
            last_transaction_id: Some("t1".to_string()),
            last_triggered_at: now,
            cool_down_until: now + Duration::days(3),
            trigger_count: 1,
            resolved_count: 0,
            ignored_count: 0,
            meta: AlertMeta {
                last_reasons: vec!["Large purchase".to_string()],
                last_category: "Food".to_string(),
                last_type: Some(TransactionType::Expense),
                last_amount: 2000.0,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_schema_exists() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();

        let result: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('coach_alerts', 'coach_transactions', 'coach_goals', 'coach_profiles')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(result, 4, "all coach tables should exist");

        let result: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master \
                 WHERE type = 'index' AND name = 'idx_coach_alerts_active_identity'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(result, 1, "active identity index should exist");
    }

    #[test]
    fn test_unencrypted_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coach.db");
        let db = Database::new_unencrypted(path.to_str().unwrap()).unwrap();
        assert!(!db.is_encrypted().unwrap());
        assert_eq!(db.count_transactions(USER).unwrap(), 0);
    }

    // ==================== Alerts ====================

    #[test]
    fn test_alert_create_and_read_back() {
        let db = Database::in_memory().unwrap();
        let created = db.create(&new_alert(Level::High, noon())).unwrap();

        assert!(created.id > 0);
        assert_eq!(created.version, 1);
        assert_eq!(created.status, AlertStatus::Active);
        assert_eq!(created.last_triggered_at, noon());
        assert_eq!(created.meta.last_amount, 2000.0);
        assert_eq!(created.meta.last_type, Some(TransactionType::Expense));

        let found = db
            .find_active(USER, Scope::Expense, "expense_food")
            .unwrap()
            .unwrap();
        assert_eq!(found, created);
        assert_eq!(db.get(created.id).unwrap(), Some(created));
    }

    #[test]
    fn test_second_active_alert_for_identity_conflicts() {
        let db = Database::in_memory().unwrap();
        db.create(&new_alert(Level::High, noon())).unwrap();

        let err = db.create(&new_alert(Level::Critical, noon())).unwrap_err();
        assert!(err.is_conflict(), "got {err}");
        assert_eq!(db.count_active_alerts(USER).unwrap(), 1);
    }

    #[test]
    fn test_save_with_stale_version_conflicts() {
        let db = Database::in_memory().unwrap();
        let mut alert = db.create(&new_alert(Level::High, noon())).unwrap();

        alert.trigger_count = 2;
        let saved = db.save(&alert).unwrap();
        assert_eq!(saved.version, 2);

        // `alert` still carries version 1
        alert.trigger_count = 3;
        let err = db.save(&alert).unwrap_err();
        assert!(err.is_conflict());

        let stored = db.get(alert.id).unwrap().unwrap();
        assert_eq!(stored.trigger_count, 2);
        assert_eq!(stored.version, 2);
    }

    #[test]
    fn test_resolved_alert_cannot_be_saved_again() {
        let db = Database::in_memory().unwrap();
        let mut alert = db.create(&new_alert(Level::High, noon())).unwrap();
        alert.resolve(ResolvedBy::System, ResolutionReason::MetricsImproved, noon());
        let resolved = db.save(&alert).unwrap();
        assert_eq!(resolved.resolved_at, Some(noon()));

        let mut reopened = resolved.clone();
        reopened.status = AlertStatus::Active;
        assert!(db.save(&reopened).unwrap_err().is_conflict());

        let stored = db.get(alert.id).unwrap().unwrap();
        assert_eq!(stored.status, AlertStatus::Resolved);
        assert_eq!(stored.resolved_by, Some(ResolvedBy::System));
        assert_eq!(
            stored.resolution_reason,
            Some(ResolutionReason::MetricsImproved)
        );
    }

    #[test]
    fn test_new_alert_after_resolve_and_last_resolved() {
        let db = Database::in_memory().unwrap();
        let mut first = db.create(&new_alert(Level::High, noon())).unwrap();
        first.ignored_count = 2;
        first.resolve(ResolvedBy::User, ResolutionReason::UserAcknowledged, noon());
        db.save(&first).unwrap();

        let later = noon() + Duration::days(5);
        let second = db.create(&new_alert(Level::High, later)).unwrap();
        assert_ne!(second.id, first.id);

        let last = db
            .find_last_resolved(USER, Scope::Expense, "expense_food")
            .unwrap()
            .unwrap();
        assert_eq!(last.id, first.id);
        assert_eq!(last.ignored_count, 2);
        assert_eq!(last.resolved_count, 1);

        let all = db.list_alerts(USER, true).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id, "active alerts list first");
        assert_eq!(db.list_alerts(USER, false).unwrap().len(), 1);
        assert_eq!(db.users_with_active_alerts().unwrap(), vec![USER.to_string()]);
    }

    // ==================== Ledger ====================

    #[test]
    fn test_transaction_insert_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let mut tx = expense("t1", "Food", 42.5, noon());
        tx.note = Some("lunch".to_string());

        assert!(db.insert_transaction(&tx).unwrap());
        assert!(!db.insert_transaction(&tx).unwrap());
        assert_eq!(db.count_transactions(USER).unwrap(), 1);
        assert_eq!(db.get_transaction("t1").unwrap(), Some(tx));
    }

    #[test]
    fn test_transactions_since_newest_first() {
        let db = Database::in_memory().unwrap();
        for (id, days) in [("a", 10), ("b", 2), ("c", 1)] {
            db.insert_transaction(&expense(id, "Food", 10.0, noon() - Duration::days(days)))
                .unwrap();
        }

        let recent = db
            .list_transactions_since(USER, noon() - Duration::days(7))
            .unwrap();
        let ids: Vec<&str> = recent.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(db.list_transactions(USER).unwrap().len(), 3);
        assert!(db.list_transactions("someone-else").unwrap().is_empty());
    }

    // ==================== Goals ====================

    #[test]
    fn test_goal_contribution_completes_goal() {
        let db = Database::in_memory().unwrap();
        db.insert_goal(USER, &goal("g1", "Laptop", 1000.0, 900.0, "tech"))
            .unwrap();

        let goal = db.contribute_to_goal("g1", 50.0).unwrap();
        assert_eq!(goal.current_amount, 950.0);
        assert_eq!(goal.status, GoalStatus::Active);

        let goal = db.contribute_to_goal("g1", 50.0).unwrap();
        assert_eq!(goal.status, GoalStatus::Completed);
        assert_eq!(db.list_goals(USER).unwrap().len(), 1);
    }

    #[test]
    fn test_goal_validation_and_missing() {
        let db = Database::in_memory().unwrap();
        let err = db
            .insert_goal(USER, &goal("g0", "Nothing", 0.0, 0.0, "misc"))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert!(matches!(
            db.contribute_to_goal("missing", 10.0),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            db.contribute_to_goal("missing", -1.0),
            Err(Error::Validation(_))
        ));
    }

    // ==================== Profiles ====================

    #[test]
    fn test_profile_defaults_and_round_trip() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.get_profile(USER).unwrap(), BehaviorProfile::default());

        let profile = BehaviorProfile {
            discipline_score: 70,
            impulse_score: 40,
            consistency_index: 55,
            risk_index: 45,
            saving_streak: 4,
        };
        db.save_profile(USER, &profile).unwrap();
        db.save_profile(USER, &profile).unwrap();
        assert_eq!(db.get_profile(USER).unwrap(), profile);
    }
}
