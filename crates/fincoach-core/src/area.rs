//! Alert area classification
//!
//! Maps a decision and its transaction to the stable identity repeated events
//! are grouped under.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{AlertArea, Decision, Scope, Transaction, TransactionType};

fn non_key_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9_]").expect("valid regex"))
}

fn gig_keywords() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"freelance|gig|contractor|self-employed|consulting|commission|tips|side hustle")
            .expect("valid regex")
    })
}

/// Lower-case, with every character outside `[a-z0-9_]` replaced by `_`
pub fn normalize_category(category: &str) -> String {
    let raw = if category.trim().is_empty() {
        "general"
    } else {
        category
    };
    non_key_chars()
        .replace_all(&raw.to_lowercase(), "_")
        .into_owned()
}

pub fn classify(decision: &Decision, tx: &Transaction) -> AlertArea {
    let flags = &decision.behavioral_flags;
    let key = normalize_category(&tx.category);
    let raw = if tx.category.trim().is_empty() {
        "general"
    } else {
        tx.category.as_str()
    };

    if flags.goal_impact || flags.milestone {
        return AlertArea {
            scope: Scope::Goal,
            area_key: format!("goal_{}", key),
            page: "goals".to_string(),
            title: "Goal-related financial behavior".to_string(),
        };
    }

    match tx.tx_type {
        TransactionType::Expense => {
            let anomaly = [
                (flags.micro_leak, "microLeak"),
                (flags.behavior_drift, "behaviorDrift"),
                (flags.spending_burst, "spendingBurst"),
            ]
            .into_iter()
            .find_map(|(set, name)| set.then_some(name));

            match anomaly {
                Some(flag) => AlertArea {
                    scope: Scope::Expense,
                    area_key: format!("behavior_{}_{}", flag, key),
                    page: "expenses".to_string(),
                    title: format!("Behavioral spending pattern: {}", raw),
                },
                None => AlertArea {
                    scope: Scope::Expense,
                    area_key: format!("expense_{}", key),
                    page: "expenses".to_string(),
                    title: format!("Expense alert – {}", raw),
                },
            }
        }
        TransactionType::Income => {
            let title = if gig_keywords().is_match(&raw.to_lowercase()) {
                format!("Gig income: {}", raw)
            } else {
                format!("Income pattern: {}", raw)
            };
            AlertArea {
                scope: Scope::Income,
                area_key: format!("income_{}", key),
                page: "income".to_string(),
                title,
            }
        }
        TransactionType::Saving => AlertArea {
            scope: Scope::Saving,
            area_key: format!("saving_{}", key),
            page: "savings".to_string(),
            title: format!("Saving behavior: {}", raw),
        },
        TransactionType::Investment => AlertArea {
            scope: Scope::Investment,
            area_key: format!("investment_{}", key),
            page: "investments".to_string(),
            title: format!("Investment: {}", raw),
        },
    }
}

/// Area used when nothing more specific applies
pub fn overall_area() -> AlertArea {
    AlertArea {
        scope: Scope::Overall,
        area_key: "overall_risk".to_string(),
        page: "dashboard".to_string(),
        title: "Overall financial behavior".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BehavioralFlags, Level};
    use crate::test_utils::*;

    fn decision_with(flags: BehavioralFlags) -> Decision {
        Decision {
            behavioral_flags: flags,
            ..decision(Level::High, 30, &[])
        }
    }

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category("Food & Dining"), "food___dining");
        assert_eq!(normalize_category("Rent"), "rent");
        assert_eq!(normalize_category("side-hustle_2"), "side_hustle_2");
        assert_eq!(normalize_category(""), "general");
        assert_eq!(normalize_category("Café"), "caf_");
    }

    #[test]
    fn test_goal_flags_take_priority() {
        let flags = BehavioralFlags {
            goal_impact: true,
            micro_leak: true,
            ..Default::default()
        };
        let area = classify(&decision_with(flags), &expense("t1", "Food", 10.0, noon()));
        assert_eq!(area.scope, Scope::Goal);
        assert_eq!(area.area_key, "goal_food");
        assert_eq!(area.page, "goals");
    }

    #[test]
    fn test_expense_anomaly_order() {
        let flags = BehavioralFlags {
            behavior_drift: true,
            spending_burst: true,
            ..Default::default()
        };
        let area = classify(&decision_with(flags), &expense("t1", "Eating Out", 10.0, noon()));
        assert_eq!(area.scope, Scope::Expense);
        assert_eq!(area.area_key, "behavior_behaviorDrift_eating_out");
        assert_eq!(area.title, "Behavioral spending pattern: Eating Out");
    }

    #[test]
    fn test_plain_type_mapping() {
        let d = decision_with(BehavioralFlags::default());
        assert_eq!(
            classify(&d, &expense("t1", "Food", 10.0, noon())).area_key,
            "expense_food"
        );
        assert_eq!(
            classify(&d, &saving("t1", "Emergency", 10.0, noon())).area_key,
            "saving_emergency"
        );
        let inv = tx("t1", TransactionType::Investment, "Index Fund", 10.0, noon());
        let area = classify(&d, &inv);
        assert_eq!(area.scope, Scope::Investment);
        assert_eq!(area.area_key, "investment_index_fund");
        assert_eq!(area.page, "investments");
    }

    #[test]
    fn test_income_titles() {
        let d = decision_with(BehavioralFlags::default());
        let gig = classify(&d, &income("t1", "Freelance Design", 10.0, noon()));
        assert_eq!(gig.title, "Gig income: Freelance Design");
        assert_eq!(gig.area_key, "income_freelance_design");

        let salary = classify(&d, &income("t1", "Salary", 10.0, noon()));
        assert_eq!(salary.title, "Income pattern: Salary");
        assert_eq!(salary.page, "income");
    }

    #[test]
    fn test_overall_area() {
        let area = overall_area();
        assert_eq!(area.scope, Scope::Overall);
        assert_eq!(area.area_key, "overall_risk");
    }
}
