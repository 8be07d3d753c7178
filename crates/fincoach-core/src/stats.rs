//! Stats and history derivation from the transaction ledger

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, Utc};

use crate::models::{Goal, History, IncomeTrend, Stats, Transaction, TransactionType};

const EXPENSE_WINDOW_DAYS: i64 = 30;
const INCOME_WINDOW_DAYS: i64 = 180;

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn rate(part: f64, income: f64) -> f64 {
    if income <= 0.0 {
        return 0.0;
    }
    round_to((part / income * 100.0).clamp(0.0, 500.0), 1)
}

/// Aggregate the ledger as of `now`
pub fn compute_stats(ledger: &[Transaction], goals: &[Goal], now: DateTime<Utc>) -> Stats {
    let in_month = |t: &&Transaction| {
        t.occurred_at.year() == now.year() && t.occurred_at.month() == now.month()
    };
    let month: Vec<&Transaction> = ledger.iter().filter(in_month).collect();

    let total = |txs: &[&Transaction], kind: TransactionType| -> f64 {
        txs.iter()
            .filter(|t| t.tx_type == kind)
            .map(|t| t.amount)
            .sum()
    };

    let monthly_income = total(&month, TransactionType::Income);
    let monthly_expense = total(&month, TransactionType::Expense);
    let monthly_saving = total(&month, TransactionType::Saving);
    let monthly_investment = total(&month, TransactionType::Investment);

    let avg_transaction = if month.is_empty() {
        0.0
    } else {
        round_to(
            month.iter().map(|t| t.amount.abs()).sum::<f64>() / month.len() as f64,
            2,
        )
    };

    let mut by_category: HashMap<String, f64> = HashMap::new();
    for t in month.iter().filter(|t| t.is_expense()) {
        *by_category.entry(t.category.to_lowercase()).or_default() += t.amount;
    }
    let category_percents = if monthly_expense > 0.0 {
        by_category
            .into_iter()
            .map(|(category, amount)| (category, round_to(amount / monthly_expense * 100.0, 1)))
            .collect()
    } else {
        HashMap::new()
    };

    let all: Vec<&Transaction> = ledger.iter().collect();
    let liquid_savings = total(&all, TransactionType::Saving);
    let invested_amount = total(&all, TransactionType::Investment);

    Stats {
        monthly_income,
        monthly_expense,
        monthly_saving,
        monthly_investment,
        savings_rate: rate(monthly_saving, monthly_income),
        investment_rate: rate(monthly_investment, monthly_income),
        avg_transaction,
        category_percents,
        income_trend: if monthly_income > monthly_expense {
            IncomeTrend::Stable
        } else {
            IncomeTrend::Down
        },
        net_worth: liquid_savings + invested_amount,
        liquid_savings,
        invested_amount,
        total_transactions: ledger.len() as u64,
        active_goals: goals.iter().filter(|g| g.is_open()).count() as u32,
    }
}

/// Recent windows by type, each newest first
pub fn build_history(ledger: &[Transaction], now: DateTime<Utc>) -> History {
    let month_ago = now - Duration::days(EXPENSE_WINDOW_DAYS);
    let half_year_ago = now - Duration::days(INCOME_WINDOW_DAYS);

    let window = |pred: &dyn Fn(&Transaction) -> bool, since: DateTime<Utc>| {
        let mut txs: Vec<Transaction> = ledger
            .iter()
            .filter(|t| pred(*t) && t.occurred_at >= since && t.occurred_at <= now)
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        txs
    };

    History {
        recent_expenses: window(&|t: &Transaction| t.is_expense(), month_ago),
        recent_income: window(
            &|t: &Transaction| t.tx_type == TransactionType::Income,
            half_year_ago,
        ),
        recent_savings: window(&|t: &Transaction| t.tx_type.is_set_aside(), month_ago),
    }
}
