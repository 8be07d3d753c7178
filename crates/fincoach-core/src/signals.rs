//! Signal extraction
//!
//! Turns one transaction plus its context (stats, history windows, goals,
//! behavior profile) into the flat set of factors the scorer reads. Pure and
//! synchronous: no I/O, no locking.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Offset, Timelike, Utc, Weekday};

use crate::config::SignalConfig;
use crate::models::{
    BehavioralFlags, EvaluationInput, GoalStatus, IncomeTrend, Transaction, TransactionType,
};

/// Factors derived for one transaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signals {
    /// Average transaction size the ratios are measured against
    pub avg_transaction: f64,
    pub size_ratio: f64,
    /// Percent deviation from the trailing 7-day expense average
    pub change_from_last_week: f64,
    /// Percent deviation from the trailing 30-day expense average
    pub change_from_last_month: f64,
    pub category_percent: f64,
    pub category_dominance: bool,
    pub goal_danger: bool,
    /// Name of the first goal the expense endangers
    pub endangered_goal: Option<String>,
    pub goal_impact: bool,
    pub near_goal: bool,
    pub streak_broken: bool,
    pub habit_broken: bool,
    pub weekend_spending: bool,
    pub late_month_spending: bool,
    pub emotional_buying: bool,
    pub overconfidence: bool,
    pub irregular_income_risk: bool,
    pub behavior_drift: bool,
    pub micro_leak: bool,
    pub spending_burst: bool,
    pub improvement_trend: bool,
    pub recovery: bool,
    pub saving_streak: u32,
}

impl Signals {
    pub fn flags(&self) -> BehavioralFlags {
        BehavioralFlags {
            habit_broken: self.habit_broken,
            goal_impact: self.goal_impact,
            milestone: self.near_goal,
            micro_leak: self.micro_leak,
            behavior_drift: self.behavior_drift,
            spending_burst: self.spending_burst,
            improvement_trend: self.improvement_trend,
            recovery: self.recovery,
        }
    }
}

pub struct SignalExtractor<'a> {
    config: &'a SignalConfig,
}

impl<'a> SignalExtractor<'a> {
    pub fn new(config: &'a SignalConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, input: &EvaluationInput, now: DateTime<Utc>) -> Signals {
        let tx = &input.transaction;
        let stats = &input.stats;
        let cfg = self.config;
        let is_expense = tx.is_expense();

        let avg = stats.avg_transaction;
        let mut signals = Signals {
            avg_transaction: avg,
            size_ratio: if avg > 0.0 { tx.amount / avg } else { 0.0 },
            saving_streak: input.profile.saving_streak,
            ..Default::default()
        };

        let prior_expenses: Vec<&Transaction> = input
            .history
            .recent_expenses
            .iter()
            .filter(|t| t.id != tx.id)
            .collect();

        let week_avg = mean_since(&prior_expenses, now - Duration::days(cfg.week_days));
        let month_avg = mean_since(&prior_expenses, now - Duration::days(cfg.month_days));
        signals.change_from_last_week = percent_change(tx.amount, week_avg);
        signals.change_from_last_month = percent_change(tx.amount, month_avg);

        signals.category_percent = stats.category_percent(&tx.category);
        signals.category_dominance = signals.category_percent > cfg.category_dominance_percent;

        self.goal_signals(input, now, &mut signals);

        signals.streak_broken = is_expense && input.profile.saving_streak > 0;

        if is_expense {
            let same_category: Vec<f64> = prior_expenses
                .iter()
                .filter(|t| t.in_category(&tx.category))
                .map(|t| t.amount)
                .collect();
            signals.habit_broken = match mean(&same_category) {
                None => true,
                Some(category_avg) => tx.amount > category_avg * cfg.habit_multiplier,
            };
        }

        let local = self.wall_clock(tx.occurred_at);
        let hour = local.hour();
        signals.weekend_spending =
            is_expense && matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
        signals.late_month_spending = is_expense
            && local.day() > cfg.late_month_day
            && stats.monthly_expense > stats.monthly_income * cfg.late_month_expense_ratio;
        let late_night = hour >= cfg.night_start_hour || hour <= cfg.night_end_hour;
        let emotional_category = cfg
            .emotional_categories
            .iter()
            .any(|c| tx.in_category(c));
        signals.emotional_buying = is_expense && late_night && emotional_category;

        let income_window = now - Duration::hours(cfg.overconfidence_window_hours);
        let recent_income = input
            .history
            .recent_income
            .iter()
            .any(|t| t.id != tx.id && t.occurred_at >= income_window);
        signals.overconfidence =
            is_expense && recent_income && tx.amount > avg * cfg.overconfidence_multiplier;

        signals.irregular_income_risk = is_expense
            && stats.income_trend == IncomeTrend::Down
            && tx.amount > stats.monthly_income * cfg.irregular_income_fraction;

        self.pattern_signals(input, now, &mut signals);

        signals
    }

    fn goal_signals(&self, input: &EvaluationInput, now: DateTime<Utc>, signals: &mut Signals) {
        let tx = &input.transaction;
        let today = self.wall_clock(now).date_naive();

        for goal in input.goals.iter().filter(|g| g.status == GoalStatus::Active) {
            let progress = goal.progress();
            if progress >= self.config.milestone_progress && progress < 100.0 {
                signals.near_goal = true;
            }

            match tx.tx_type {
                TransactionType::Expense => {
                    let Some(deadline) = goal.deadline else {
                        continue;
                    };
                    if !goal.is_open() {
                        continue;
                    }
                    let days_left = (deadline - today).num_days() as f64;
                    let months_left = (days_left / 30.0).ceil().max(1.0);
                    let monthly_needed = goal.remaining() / months_left;
                    if tx.amount > monthly_needed * self.config.goal_danger_fraction {
                        signals.goal_danger = true;
                        if signals.endangered_goal.is_none() {
                            signals.endangered_goal = Some(goal.name.clone());
                        }
                    }
                }
                TransactionType::Saving | TransactionType::Investment => {
                    if tx.in_category(&goal.category) {
                        signals.goal_impact = true;
                    }
                }
                TransactionType::Income => {}
            }
        }

        signals.goal_impact |= signals.goal_danger;
    }

    /// Drift, leak, burst, improvement and recovery over the trailing month
    fn pattern_signals(&self, input: &EvaluationInput, now: DateTime<Utc>, signals: &mut Signals) {
        let tx = &input.transaction;
        let cfg = self.config;
        let avg = signals.avg_transaction;
        let month_start = now - Duration::days(cfg.month_days);

        let mut window: Vec<&Transaction> = input
            .history
            .recent_expenses
            .iter()
            .chain(input.history.recent_savings.iter())
            .filter(|t| t.id != tx.id)
            .chain(std::iter::once(tx))
            .filter(|t| t.occurred_at >= month_start)
            .collect();
        window.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));

        let expenses: Vec<&Transaction> =
            window.iter().copied().filter(|t| t.is_expense()).collect();

        let latest: Vec<f64> = expenses
            .iter()
            .take(cfg.drift_sample)
            .map(|t| t.amount)
            .collect();
        signals.behavior_drift =
            avg > 0.0 && mean(&latest).is_some_and(|m| m > avg * cfg.drift_multiplier);

        let leak_start = now - Duration::days(cfg.micro_leak_window_days);
        let small = expenses
            .iter()
            .filter(|t| {
                t.in_category(&tx.category)
                    && t.occurred_at >= leak_start
                    && t.amount < avg * cfg.micro_leak_fraction
            })
            .count();
        signals.micro_leak = small >= cfg.micro_leak_min_count;

        let burst_start = now - Duration::hours(cfg.burst_window_hours);
        let burst = expenses
            .iter()
            .filter(|t| t.occurred_at >= burst_start)
            .count();
        signals.spending_burst = burst >= cfg.burst_min_count;

        let set_aside = window
            .iter()
            .filter(|t| t.tx_type.is_set_aside())
            .take(cfg.improvement_sample)
            .count();
        signals.improvement_trend = set_aside >= cfg.improvement_min_count;

        signals.recovery = tx.tx_type.is_set_aside()
            && avg > 0.0
            && expenses.iter().any(|t| {
                t.occurred_at <= tx.occurred_at && t.amount > avg * cfg.recovery_multiplier
            });
    }

    fn wall_clock(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(self.config.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        instant.with_timezone(&offset)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn mean_since(txs: &[&Transaction], since: DateTime<Utc>) -> f64 {
    let amounts: Vec<f64> = txs
        .iter()
        .filter(|t| t.occurred_at >= since)
        .map(|t| t.amount)
        .collect();
    mean(&amounts).unwrap_or(0.0)
}

fn percent_change(amount: f64, baseline: f64) -> f64 {
    if baseline > 0.0 {
        (amount - baseline) / baseline * 100.0
    } else {
        0.0
    }
}
