//! Risk/positivity scoring
//!
//! The rule table is an ordered slice of evaluators. Scoring folds it over a
//! [`ScoreCard`], so reasons always come out in table order. Each rule reads
//! the transaction and its [`Signals`] and may add risk, add positivity, raise
//! the level floor and attach one reason.

use crate::config::ScoringConfig;
use crate::models::{Decision, Level, Transaction};
use crate::signals::Signals;

/// Running totals while the rule table is folded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreCard {
    pub level: Level,
    pub risk: u32,
    pub positivity: u32,
    pub reasons: Vec<String>,
}

/// What a triggered rule contributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effect {
    pub risk: u32,
    pub positivity: u32,
    pub floor: Option<Level>,
    pub reason: Option<String>,
}

impl Effect {
    fn risk(points: u32, floor: Option<Level>, reason: String) -> Self {
        Self {
            risk: points,
            floor,
            reason: Some(reason),
            ..Default::default()
        }
    }

    fn positivity(points: u32, reason: Option<String>) -> Self {
        Self {
            positivity: points,
            reason,
            ..Default::default()
        }
    }
}

impl ScoreCard {
    fn apply(mut self, effect: Effect) -> Self {
        self.risk += effect.risk;
        self.positivity += effect.positivity;
        if let Some(floor) = effect.floor {
            self.level = self.level.at_least(floor);
        }
        if let Some(reason) = effect.reason {
            self.reasons.push(reason);
        }
        self
    }
}

pub struct RuleContext<'a> {
    pub tx: &'a Transaction,
    pub signals: &'a Signals,
    pub config: &'a ScoringConfig,
}

/// One row of the rule table
pub struct Rule {
    pub name: &'static str,
    eval: fn(&RuleContext) -> Option<Effect>,
}

/// Evaluation order is significant
#[rustfmt::skip]
pub const RULES: &[Rule] = &[
    Rule { name: "set_aside_base", eval: set_aside_base },
    Rule { name: "large_set_aside", eval: large_set_aside },
    Rule { name: "goal_support", eval: goal_support },
    Rule { name: "saving_streak", eval: saving_streak },
    Rule { name: "goal_danger", eval: goal_danger },
    Rule { name: "irregular_income", eval: irregular_income },
    Rule { name: "late_month", eval: late_month },
    Rule { name: "emotional_buying", eval: emotional_buying },
    Rule { name: "unusually_large", eval: unusually_large },
    Rule { name: "extremely_irregular", eval: extremely_irregular },
    Rule { name: "large_without_history", eval: large_without_history },
    Rule { name: "category_dominance", eval: category_dominance },
    Rule { name: "overconfidence", eval: overconfidence },
    Rule { name: "habit_broken", eval: habit_broken },
    Rule { name: "weekend_spending", eval: weekend_spending },
    Rule { name: "weekly_jump", eval: weekly_jump },
    Rule { name: "behavior_drift", eval: behavior_drift },
    Rule { name: "micro_leak", eval: micro_leak },
    Rule { name: "spending_burst", eval: spending_burst },
    Rule { name: "improvement_trend", eval: improvement_trend },
    Rule { name: "recovery", eval: recovery },
];

pub struct Scorer<'a> {
    config: &'a ScoringConfig,
}

impl<'a> Scorer<'a> {
    pub fn new(config: &'a ScoringConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, tx: &Transaction, signals: &Signals) -> Decision {
        let ctx = RuleContext {
            tx,
            signals,
            config: self.config,
        };

        let card = RULES
            .iter()
            .filter_map(|rule| (rule.eval)(&ctx))
            .fold(ScoreCard::default(), ScoreCard::apply);
        let card = self.resolve_level(card);

        Decision {
            level: card.level,
            risk_score: card.risk,
            positivity_score: card.positivity,
            reasons: card.reasons,
            behavioral_flags: signals.flags(),
        }
    }

    fn resolve_level(&self, mut card: ScoreCard) -> ScoreCard {
        let cfg = self.config;
        if card.positivity > cfg.positive_min_positivity && card.risk < cfg.positive_max_risk {
            card.level = Level::Positive;
        } else if card.risk >= cfg.high_min_risk && card.level == Level::Low {
            card.level = Level::High;
            card.reasons
                .push("Significant risk detected based on transaction analysis".to_string());
        }
        card
    }
}

/// Render an amount the way reasons show it: whole numbers without decimals
pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("₹{:.0}", amount)
    } else {
        let s = format!("{:.2}", amount);
        format!("₹{}", s.trim_end_matches('0').trim_end_matches('.'))
    }
}

fn set_aside_base(ctx: &RuleContext) -> Option<Effect> {
    ctx.tx
        .tx_type
        .is_set_aside()
        .then(|| Effect::positivity(ctx.config.set_aside_base, None))
}

fn large_set_aside(ctx: &RuleContext) -> Option<Effect> {
    let large = ctx.tx.amount > ctx.signals.avg_transaction * ctx.config.large_set_aside_multiplier;
    (ctx.tx.tx_type.is_set_aside() && large).then(|| {
        Effect::positivity(
            ctx.config.large_set_aside_bonus,
            Some(format!(
                "Large {} of {} - excellent discipline",
                ctx.tx.tx_type,
                format_amount(ctx.tx.amount)
            )),
        )
    })
}

fn goal_support(ctx: &RuleContext) -> Option<Effect> {
    (ctx.tx.tx_type.is_set_aside() && ctx.signals.goal_impact).then(|| {
        Effect::positivity(
            ctx.config.goal_support_bonus,
            Some(format!("This {} directly supports your goals", ctx.tx.tx_type)),
        )
    })
}

fn saving_streak(ctx: &RuleContext) -> Option<Effect> {
    (ctx.tx.tx_type.is_set_aside() && ctx.signals.saving_streak > 0).then(|| {
        Effect::positivity(
            ctx.config.streak_bonus,
            Some(format!(
                "Maintaining your {}-day savings streak",
                ctx.signals.saving_streak
            )),
        )
    })
}

fn goal_danger(ctx: &RuleContext) -> Option<Effect> {
    (ctx.tx.is_expense() && ctx.signals.goal_danger).then(|| {
        let goal = ctx.signals.endangered_goal.as_deref().unwrap_or("your goal");
        Effect::risk(
            ctx.config.goal_danger_risk,
            Some(Level::Critical),
            format!("This expense threatens your goal: {}", goal),
        )
    })
}

fn irregular_income(ctx: &RuleContext) -> Option<Effect> {
    (ctx.tx.is_expense() && ctx.signals.irregular_income_risk).then(|| {
        Effect::risk(
            ctx.config.irregular_income_risk,
            Some(Level::Critical),
            format!(
                "Large expense ({}) during unstable income period",
                format_amount(ctx.tx.amount)
            ),
        )
    })
}

fn late_month(ctx: &RuleContext) -> Option<Effect> {
    (ctx.tx.is_expense() && ctx.signals.late_month_spending).then(|| {
        Effect::risk(
            ctx.config.late_month_risk,
            Some(Level::Critical),
            "Late-month spending when budget is already tight".to_string(),
        )
    })
}

fn emotional_buying(ctx: &RuleContext) -> Option<Effect> {
    (ctx.tx.is_expense() && ctx.signals.emotional_buying).then(|| {
        Effect::risk(
            ctx.config.emotional_risk,
            Some(Level::Critical),
            format!(
                "Late-night {} purchase - potential impulse buy",
                ctx.tx.category
            ),
        )
    })
}

fn unusually_large(ctx: &RuleContext) -> Option<Effect> {
    (ctx.tx.is_expense() && ctx.signals.size_ratio > ctx.config.high_ratio).then(|| {
        Effect::risk(
            ctx.config.high_ratio_risk,
            Some(Level::High),
            format!(
                "Transaction is {:.1}x your average - unusually large",
                ctx.signals.size_ratio
            ),
        )
    })
}

fn extremely_irregular(ctx: &RuleContext) -> Option<Effect> {
    let avg = ctx.signals.avg_transaction;
    let extreme = avg > 0.0 && ctx.tx.amount > avg * ctx.config.extreme_ratio;
    (ctx.tx.is_expense() && extreme).then(|| {
        Effect::risk(
            ctx.config.extreme_ratio_risk,
            Some(Level::Critical),
            format!(
                "This expense ({}) is extremely irregular - {:.1}x your average",
                format_amount(ctx.tx.amount),
                ctx.tx.amount / avg
            ),
        )
    })
}

fn large_without_history(ctx: &RuleContext) -> Option<Effect> {
    let no_history = ctx.signals.avg_transaction == 0.0;
    (ctx.tx.is_expense() && no_history && ctx.tx.amount > ctx.config.no_history_amount).then(|| {
        Effect::risk(
            ctx.config.no_history_risk,
            Some(Level::High),
            format!(
                "Large expense detected: {} - this is significant",
                format_amount(ctx.tx.amount)
            ),
        )
    })
}

fn category_dominance(ctx: &RuleContext) -> Option<Effect> {
    let above_avg = ctx.tx.amount > ctx.signals.avg_transaction;
    (ctx.tx.is_expense() && ctx.signals.category_dominance && above_avg).then(|| {
        Effect::risk(
            ctx.config.dominance_risk,
            Some(Level::High),
            format!(
                "{} already represents {:.1}% of expenses",
                ctx.tx.category, ctx.signals.category_percent
            ),
        )
    })
}

fn overconfidence(ctx: &RuleContext) -> Option<Effect> {
    (ctx.tx.is_expense() && ctx.signals.overconfidence).then(|| {
        Effect::risk(
            ctx.config.overconfidence_risk,
            Some(Level::High),
            "Large spending immediately after income - potential overconfidence".to_string(),
        )
    })
}

fn habit_broken(ctx: &RuleContext) -> Option<Effect> {
    (ctx.tx.is_expense() && ctx.signals.habit_broken).then(|| {
        Effect::risk(
            ctx.config.habit_risk,
            Some(Level::High),
            "Unusual spending pattern detected - habit change".to_string(),
        )
    })
}

fn weekend_spending(ctx: &RuleContext) -> Option<Effect> {
    let above = ctx.tx.amount > ctx.signals.avg_transaction * ctx.config.weekend_multiplier;
    (ctx.tx.is_expense() && ctx.signals.weekend_spending && above).then(|| {
        Effect::risk(
            ctx.config.weekend_risk,
            None,
            "Weekend spending above average".to_string(),
        )
    })
}

fn weekly_jump(ctx: &RuleContext) -> Option<Effect> {
    let change = ctx.signals.change_from_last_week;
    (ctx.tx.is_expense() && change > ctx.config.weekly_change_percent).then(|| {
        Effect::risk(
            ctx.config.weekly_change_risk,
            None,
            format!("Spending {:.1}% higher than last week's average", change),
        )
    })
}

fn behavior_drift(ctx: &RuleContext) -> Option<Effect> {
    (ctx.tx.is_expense() && ctx.signals.behavior_drift).then(|| {
        Effect::risk(
            ctx.config.drift_risk,
            None,
            "Spending pattern changing rapidly (behavioral drift)".to_string(),
        )
    })
}

fn micro_leak(ctx: &RuleContext) -> Option<Effect> {
    (ctx.tx.is_expense() && ctx.signals.micro_leak).then(|| {
        Effect::risk(
            ctx.config.micro_leak_risk,
            None,
            "Repeated small expenses detected (hidden money leak)".to_string(),
        )
    })
}

fn spending_burst(ctx: &RuleContext) -> Option<Effect> {
    (ctx.tx.is_expense() && ctx.signals.spending_burst).then(|| {
        Effect::risk(
            ctx.config.burst_risk,
            None,
            "High spending frequency in short time (loss of control)".to_string(),
        )
    })
}

fn improvement_trend(ctx: &RuleContext) -> Option<Effect> {
    ctx.signals.improvement_trend.then(|| {
        Effect::positivity(
            ctx.config.improvement_bonus,
            Some("Recent pattern shows improving financial discipline".to_string()),
        )
    })
}

fn recovery(ctx: &RuleContext) -> Option<Effect> {
    ctx.signals.recovery.then(|| {
        Effect::positivity(
            ctx.config.recovery_bonus,
            Some("Recovery behavior detected after risky spending".to_string()),
        )
    })
}
