//! Income analysis
//!
//! Income transactions get their own verdict from six months of same-category
//! history. The rules short-circuit in order: new source, bonus/raise, drop,
//! goal completion, routine.

use chrono::{DateTime, Duration, Utc};

use crate::config::IncomeConfig;
use crate::models::{BehavioralFlags, Decision, EvaluationInput, Goal, Level};
use crate::scoring::format_amount;

/// Why an income transaction produced no alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomeSkip {
    /// Within the usual band with enough samples to know what usual is
    Routine,
    Unremarkable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IncomeVerdict {
    /// Replace the generic decision with this one
    Alert { decision: Decision, headline: String },
    Skip(IncomeSkip),
}

pub struct IncomeAnalyzer<'a> {
    config: &'a IncomeConfig,
}

impl<'a> IncomeAnalyzer<'a> {
    pub fn new(config: &'a IncomeConfig) -> Self {
        Self { config }
    }

    pub fn analyze(
        &self,
        input: &EvaluationInput,
        flags: BehavioralFlags,
        now: DateTime<Utc>,
    ) -> IncomeVerdict {
        let cfg = self.config;
        let tx = &input.transaction;
        let since = now - Duration::days(cfg.history_days);

        let prior: Vec<f64> = input
            .history
            .recent_income
            .iter()
            .filter(|t| t.id != tx.id && t.in_category(&tx.category) && t.occurred_at >= since)
            .map(|t| t.amount)
            .collect();

        let alert = |level: Level, risk: u32, positivity: u32, reasons: Vec<String>, headline| {
            IncomeVerdict::Alert {
                decision: Decision {
                    level,
                    risk_score: risk,
                    positivity_score: positivity,
                    reasons,
                    behavioral_flags: flags,
                },
                headline,
            }
        };

        if prior.is_empty() {
            return alert(
                Level::Positive,
                0,
                cfg.new_source_positivity,
                vec![
                    format!("New income source detected: {}", tx.category),
                    "Diversifying income streams improves financial stability".to_string(),
                ],
                format!("New Income Source: {}", tx.category),
            );
        }

        let avg = prior.iter().sum::<f64>() / prior.len() as f64;
        let variance = if avg > 0.0 {
            (tx.amount - avg) / avg * 100.0
        } else {
            0.0
        };

        if variance >= cfg.bonus_variance_percent {
            let extra = tx.amount - avg;
            let mut reasons = vec![format!(
                "Income {}% higher than usual - possible bonus or raise",
                variance.round()
            )];
            if let Some(goal) = open_goals(&input.goals)
                .find(|g| g.remaining() <= extra * cfg.goal_surplus_multiplier)
            {
                reasons.push(format!(
                    "Extra {} can accelerate your {} goal",
                    format_amount(extra.round()),
                    goal.name
                ));
            }
            return alert(
                Level::Positive,
                0,
                cfg.bonus_positivity,
                reasons,
                format!("Bonus/Raise Detected: {}", tx.category),
            );
        }

        if variance <= -cfg.drop_variance_percent {
            return alert(
                Level::High,
                cfg.drop_risk,
                0,
                vec![
                    format!(
                        "Income dropped by {} vs average",
                        format_amount((avg - tx.amount).round())
                    ),
                    "May impact your ability to meet monthly expenses".to_string(),
                ],
                format!("Income Drop Alert: {}", tx.category),
            );
        }

        if let Some(goal) = open_goals(&input.goals).find(|g| g.remaining() <= tx.amount) {
            return alert(
                Level::Positive,
                0,
                cfg.goal_completion_positivity,
                vec![
                    format!("This income can complete your {} goal!", goal.name),
                    format!(
                        "Only {} needed to reach your target",
                        format_amount(goal.remaining())
                    ),
                ],
                format!("Goal Completion Opportunity: {}", goal.name),
            );
        }

        if variance.abs() <= cfg.routine_variance_percent && prior.len() >= cfg.routine_min_samples
        {
            return IncomeVerdict::Skip(IncomeSkip::Routine);
        }

        IncomeVerdict::Skip(IncomeSkip::Unremarkable)
    }
}

fn open_goals(goals: &[Goal]) -> impl Iterator<Item = &Goal> {
    goals.iter().filter(|g| g.is_open())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn analyze(input: &EvaluationInput) -> IncomeVerdict {
        let config = IncomeConfig::default();
        IncomeAnalyzer::new(&config).analyze(input, BehavioralFlags::default(), noon())
    }

    fn prior_salary(amounts: &[f64]) -> Vec<crate::models::Transaction> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, a)| {
                income(
                    &format!("p{i}"),
                    "Salary",
                    *a,
                    noon() - Duration::days(30 * (i as i64 + 1)),
                )
            })
            .collect()
    }

    fn unwrap_alert(verdict: IncomeVerdict) -> (Decision, String) {
        match verdict {
            IncomeVerdict::Alert { decision, headline } => (decision, headline),
            other => panic!("expected alert, got {:?}", other),
        }
    }

    #[test]
    fn test_new_income_source() {
        let input = InputBuilder::new(income("t1", "Freelance", 2000.0, noon()))
            .income(prior_salary(&[5000.0]))
            .build();
        let (decision, headline) = unwrap_alert(analyze(&input));
        assert_eq!(decision.level, Level::Positive);
        assert_eq!(decision.positivity_score, 60);
        assert_eq!(decision.reasons[0], "New income source detected: Freelance");
        assert_eq!(headline, "New Income Source: Freelance");
    }

    #[test]
    fn test_routine_income_is_skipped() {
        let input = InputBuilder::new(income("t1", "Salary", 5200.0, noon()))
            .income(prior_salary(&[5000.0, 4900.0, 5100.0]))
            .build();
        assert_eq!(analyze(&input), IncomeVerdict::Skip(IncomeSkip::Routine));
    }

    #[test]
    fn test_single_sample_within_band_is_unremarkable() {
        let input = InputBuilder::new(income("t1", "Salary", 5200.0, noon()))
            .income(prior_salary(&[5000.0]))
            .build();
        assert_eq!(analyze(&input), IncomeVerdict::Skip(IncomeSkip::Unremarkable));
    }

    #[test]
    fn test_bonus_mentions_reachable_goal() {
        let input = InputBuilder::new(income("t1", "Salary", 7000.0, noon()))
            .income(prior_salary(&[5000.0, 5000.0]))
            .goal(goal("g1", "Emergency Fund", 10000.0, 7000.0, "fund"))
            .build();
        let (decision, headline) = unwrap_alert(analyze(&input));
        assert_eq!(decision.level, Level::Positive);
        assert_eq!(decision.positivity_score, 70);
        assert_eq!(
            decision.reasons,
            vec![
                "Income 40% higher than usual - possible bonus or raise".to_string(),
                "Extra ₹2000 can accelerate your Emergency Fund goal".to_string(),
            ]
        );
        assert_eq!(headline, "Bonus/Raise Detected: Salary");
    }

    #[test]
    fn test_income_drop_is_high() {
        let input = InputBuilder::new(income("t1", "Salary", 3000.0, noon()))
            .income(prior_salary(&[5000.0, 5000.0]))
            .build();
        let (decision, _) = unwrap_alert(analyze(&input));
        assert_eq!(decision.level, Level::High);
        assert_eq!(decision.risk_score, 60);
        assert_eq!(decision.reasons[0], "Income dropped by ₹2000 vs average");
    }

    #[test]
    fn test_goal_completion_opportunity() {
        let input = InputBuilder::new(income("t1", "Side", 600.0, noon()))
            .income(vec![
                income("p1", "side", 600.0, noon() - Duration::days(20)),
                income("p2", "Side", 550.0, noon() - Duration::days(50)),
            ])
            .goal(goal("g1", "Laptop", 10000.0, 9500.0, "tech"))
            .build();
        let (decision, headline) = unwrap_alert(analyze(&input));
        assert_eq!(decision.level, Level::Positive);
        assert_eq!(decision.positivity_score, 80);
        assert_eq!(
            decision.reasons,
            vec![
                "This income can complete your Laptop goal!".to_string(),
                "Only ₹500 needed to reach your target".to_string(),
            ]
        );
        assert_eq!(headline, "Goal Completion Opportunity: Laptop");
    }

    #[test]
    fn test_history_older_than_six_months_is_ignored() {
        let input = InputBuilder::new(income("t1", "Salary", 5000.0, noon()))
            .income(vec![income(
                "old",
                "Salary",
                5000.0,
                noon() - Duration::days(400),
            )])
            .build();
        let (decision, _) = unwrap_alert(analyze(&input));
        assert_eq!(decision.positivity_score, 60);
    }
}
