//! Auto-resolution of active alerts
//!
//! Runs independently of ingestion. Each active alert is checked against the
//! trailing week of transactions and the current stats; the first rule that
//! finds improvement resolves it. One alert failing never stops the sweep.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::area::normalize_category;
use crate::config::ResolutionConfig;
use crate::error::Result;
use crate::models::{
    Alert, Goal, GoalStatus, ResolutionReason, ResolvedBy, Stats, Transaction, TransactionType,
};
use crate::notify::{AlertEvent, Outbox, ResolvedAlert};
use crate::store::AlertStore;

/// What kind of behavior change resolved an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Improvement {
    ConsistentLowExpenses,
    SavingsStreak,
    GoalContributions,
    StableIncome,
}

impl Improvement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConsistentLowExpenses => "consistent_low_expenses",
            Self::SavingsStreak => "savings_streak",
            Self::GoalContributions => "goal_contributions",
            Self::StableIncome => "stable_income",
        }
    }
}

impl std::fmt::Display for Improvement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub reason: ResolutionReason,
    pub improvement: Option<Improvement>,
}

impl Resolution {
    fn improved(improvement: Improvement) -> Self {
        Self {
            reason: ResolutionReason::BehaviorImproved,
            improvement: Some(improvement),
        }
    }

    fn because(reason: ResolutionReason) -> Self {
        Self {
            reason,
            improvement: None,
        }
    }

    /// Messages sent with a behavior-improved resolution
    pub fn reasons(&self, alert: &Alert) -> Vec<String> {
        match self.improvement {
            Some(improvement) if self.reason == ResolutionReason::BehaviorImproved => vec![
                format!("You've shown consistent improvement in {}", alert.scope),
                format!("Your {} resolved the alert", improvement),
                "Keep up the excellent work!".to_string(),
            ],
            _ => Vec::new(),
        }
    }
}

/// Fresh data a sweep judges improvement against
#[derive(Debug, Clone, Default)]
pub struct ResolutionEvidence {
    /// Transactions from the trailing window, any order
    pub recent_transactions: Vec<Transaction>,
    pub stats: Stats,
    pub goals: Vec<Goal>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub resolved: usize,
    pub failed: usize,
}

/// Recent transactions split the way the rules read them, newest first
struct Windows<'a> {
    expenses: Vec<&'a Transaction>,
    set_aside: Vec<&'a Transaction>,
    income: Vec<&'a Transaction>,
}

impl<'a> Windows<'a> {
    fn new(evidence: &'a ResolutionEvidence, since: DateTime<Utc>) -> Self {
        let mut recent: Vec<&Transaction> = evidence
            .recent_transactions
            .iter()
            .filter(|t| t.occurred_at >= since)
            .collect();
        recent.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));

        let of = |pred: fn(&Transaction) -> bool| -> Vec<&'a Transaction> {
            recent.iter().copied().filter(|t| pred(*t)).collect()
        };
        Self {
            expenses: of(|t| t.tx_type == TransactionType::Expense),
            set_aside: of(|t| t.tx_type.is_set_aside()),
            income: of(|t| t.tx_type == TransactionType::Income),
        }
    }
}

pub struct ResolutionEngine {
    store: Arc<dyn AlertStore>,
    config: ResolutionConfig,
    outbox: Outbox,
}

impl ResolutionEngine {
    pub fn new(store: Arc<dyn AlertStore>, config: ResolutionConfig, outbox: Outbox) -> Self {
        Self {
            store,
            config,
            outbox,
        }
    }

    /// Whether this alert's underlying problem has improved
    pub fn evaluate(
        &self,
        alert: &Alert,
        evidence: &ResolutionEvidence,
        now: DateTime<Utc>,
    ) -> Option<Resolution> {
        let windows = Windows::new(evidence, now - Duration::days(self.config.window_days));
        let area = alert.area_key.as_str();

        if let Some(category) = area.strip_prefix("overspending_") {
            if let Some(found) = self.overspending(alert, category, &windows, &evidence.stats) {
                return Some(found);
            }
        }

        if area == "low_savings_rate" {
            if let Some(found) = self.low_savings(&windows, &evidence.stats, now) {
                return Some(found);
            }
        }

        if area.contains("goal") {
            if let Some(found) = self.goal(area, &windows, &evidence.goals) {
                return Some(found);
            }
        }

        if area.contains("income") || area.contains("instability") {
            if let Some(found) = self.income(&windows) {
                return Some(found);
            }
        }

        None
    }

    fn overspending(
        &self,
        alert: &Alert,
        category: &str,
        windows: &Windows<'_>,
        stats: &Stats,
    ) -> Option<Resolution> {
        let cfg = &self.config;
        let amounts: Vec<f64> = windows
            .expenses
            .iter()
            .filter(|t| normalize_category(&t.category) == category)
            .map(|t| t.amount)
            .collect();

        if amounts.len() >= cfg.overspending_min_count {
            let avg = amounts.iter().sum::<f64>() / amounts.len() as f64;
            if avg < alert.meta.last_amount * cfg.overspending_ratio {
                return Some(Resolution::improved(Improvement::ConsistentLowExpenses));
            }
        }

        let share = stats
            .category_percents
            .iter()
            .find(|(name, _)| normalize_category(name) == category)
            .map_or(0.0, |(_, percent)| *percent);
        if share < cfg.overspending_share_percent {
            return Some(Resolution::because(ResolutionReason::MetricsImproved));
        }
        None
    }

    fn low_savings(
        &self,
        windows: &Windows<'_>,
        stats: &Stats,
        now: DateTime<Utc>,
    ) -> Option<Resolution> {
        let cfg = &self.config;
        if windows.set_aside.len() >= cfg.savings_min_count {
            let cutoff = now - Duration::days(cfg.savings_recent_days);
            let all_recent = windows
                .set_aside
                .iter()
                .take(cfg.savings_min_count)
                .all(|t| t.occurred_at >= cutoff);
            if all_recent {
                return Some(Resolution::improved(Improvement::SavingsStreak));
            }
        }

        if stats.savings_rate >= cfg.savings_rate_target {
            return Some(Resolution::because(ResolutionReason::MetricsImproved));
        }
        None
    }

    fn goal(&self, area: &str, windows: &Windows<'_>, goals: &[Goal]) -> Option<Resolution> {
        let cfg = &self.config;
        let contributions = windows
            .set_aside
            .iter()
            .filter(|t| t.is_goal_tagged())
            .count();
        if contributions >= cfg.goal_min_contributions {
            return Some(Resolution::improved(Improvement::GoalContributions));
        }

        let target = area
            .strip_prefix("goal_delay_")
            .or_else(|| area.strip_prefix("goal_"))
            .unwrap_or(area);
        let goal = goals
            .iter()
            .find(|g| g.id == target || normalize_category(&g.category) == target)?;

        let completed = goal.status == GoalStatus::Completed
            || (goal.target_amount > 0.0 && goal.current_amount >= goal.target_amount);
        if completed || goal.progress().round() >= cfg.goal_progress_percent {
            return Some(Resolution::because(ResolutionReason::GoalCompleted));
        }
        None
    }

    fn income(&self, windows: &Windows<'_>) -> Option<Resolution> {
        if windows.income.len() < self.config.income_min_count {
            return None;
        }
        let amounts: Vec<f64> = windows.income.iter().map(|t| t.amount).collect();
        let mean = amounts.iter().sum::<f64>() / amounts.len() as f64;
        if mean <= 0.0 {
            return None;
        }
        let deviation =
            amounts.iter().map(|a| (a - mean).abs()).sum::<f64>() / amounts.len() as f64;

        (deviation / mean < self.config.income_max_variation)
            .then(|| Resolution::improved(Improvement::StableIncome))
    }

    /// Check every active alert for a user, resolving the improved ones
    pub fn sweep(
        &self,
        user_id: &str,
        evidence: &ResolutionEvidence,
        now: DateTime<Utc>,
    ) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for alert in self.store.find_all_active(user_id)? {
            report.checked += 1;
            let Some(resolution) = self.evaluate(&alert, evidence, now) else {
                continue;
            };

            match self.resolve(alert, resolution, now) {
                Ok(resolved) => {
                    report.resolved += 1;
                    info!(
                        "Resolved alert {} ({}) as {}",
                        resolved.id,
                        resolved.identity(),
                        resolution.reason
                    );
                    self.outbox.emit(AlertEvent::Resolved(ResolvedAlert {
                        alert_id: resolved.id,
                        user_id: resolved.user_id.clone(),
                        scope: resolved.scope,
                        area_key: resolved.area_key.clone(),
                        title: resolved.title.clone(),
                        reason: resolution.reason,
                        improvement: resolution.improvement,
                        reasons: resolution.reasons(&resolved),
                    }));
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Failed to resolve an alert for {}: {}", user_id, e);
                }
            }
        }

        debug!(
            "Sweep for {}: checked={} resolved={} failed={}",
            user_id, report.checked, report.resolved, report.failed
        );
        Ok(report)
    }

    fn resolve(&self, mut alert: Alert, resolution: Resolution, now: DateTime<Utc>) -> Result<Alert> {
        alert.resolve(ResolvedBy::System, resolution.reason, now);
        self.store.save(&alert)
    }
}
