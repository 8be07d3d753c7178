//! Test utilities for fincoach-core
//!
//! Fixture builders shared by unit tests, integration tests and the CLI tests,
//! plus a mock notifier server that records what the HTTP notifiers send.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{extract::State, http::StatusCode, http::Uri, routing::post, Json, Router};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::models::{
    Alert, AlertMeta, AlertStatus, BehaviorProfile, Decision, EvaluationInput, Goal, GoalStatus,
    Level, Scope, Stats, Transaction, TransactionType,
};

pub const USER: &str = "user-1";

/// A fixed UTC instant
pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid fixture date {year}-{month}-{day}"))
}

/// Wednesday 2024-03-13 12:00 UTC: a weekday, mid-month, midday
pub fn noon() -> DateTime<Utc> {
    at(2024, 3, 13, 12, 0)
}

pub fn tx(
    id: &str,
    tx_type: TransactionType,
    category: &str,
    amount: f64,
    occurred_at: DateTime<Utc>,
) -> Transaction {
    Transaction {
        id: id.to_string(),
        user_id: USER.to_string(),
        tx_type,
        category: category.to_string(),
        amount,
        occurred_at,
        note: None,
    }
}

pub fn expense(id: &str, category: &str, amount: f64, occurred_at: DateTime<Utc>) -> Transaction {
    tx(id, TransactionType::Expense, category, amount, occurred_at)
}

pub fn income(id: &str, category: &str, amount: f64, occurred_at: DateTime<Utc>) -> Transaction {
    tx(id, TransactionType::Income, category, amount, occurred_at)
}

pub fn saving(id: &str, category: &str, amount: f64, occurred_at: DateTime<Utc>) -> Transaction {
    tx(id, TransactionType::Saving, category, amount, occurred_at)
}

/// `count` transactions of one kind, one per hour going back from `latest`
pub fn series(
    prefix: &str,
    tx_type: TransactionType,
    category: &str,
    amounts: &[f64],
    latest: DateTime<Utc>,
) -> Vec<Transaction> {
    amounts
        .iter()
        .enumerate()
        .map(|(i, amount)| {
            tx(
                &format!("{prefix}-{i}"),
                tx_type,
                category,
                *amount,
                latest - Duration::hours(i as i64),
            )
        })
        .collect()
}

pub fn goal(id: &str, name: &str, target: f64, current: f64, category: &str) -> Goal {
    Goal {
        id: id.to_string(),
        name: name.to_string(),
        target_amount: target,
        current_amount: current,
        deadline: None,
        priority: None,
        category: category.to_string(),
        status: GoalStatus::Active,
    }
}

/// Stats with a given average transaction and a comfortable budget
pub fn stats_with_avg(avg: f64) -> Stats {
    Stats {
        monthly_income: 50000.0,
        monthly_expense: 20000.0,
        avg_transaction: avg,
        total_transactions: 10,
        ..Default::default()
    }
}

/// Builder for engine inputs
pub struct InputBuilder {
    input: EvaluationInput,
}

impl InputBuilder {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            input: EvaluationInput::new(transaction),
        }
    }

    pub fn avg(mut self, avg: f64) -> Self {
        self.input.stats = stats_with_avg(avg);
        self
    }

    pub fn stats(mut self, f: impl FnOnce(&mut Stats)) -> Self {
        f(&mut self.input.stats);
        self
    }

    pub fn expenses(mut self, txs: Vec<Transaction>) -> Self {
        self.input.history.recent_expenses.extend(txs);
        self
    }

    pub fn income(mut self, txs: Vec<Transaction>) -> Self {
        self.input.history.recent_income.extend(txs);
        self
    }

    pub fn savings(mut self, txs: Vec<Transaction>) -> Self {
        self.input.history.recent_savings.extend(txs);
        self
    }

    pub fn goal(mut self, goal: Goal) -> Self {
        self.input.goals.push(goal);
        self
    }

    pub fn profile(mut self, profile: BehaviorProfile) -> Self {
        self.input.profile = profile;
        self
    }

    pub fn build(self) -> EvaluationInput {
        self.input
    }
}

pub fn decision(level: Level, risk: u32, reasons: &[&str]) -> Decision {
    Decision {
        level,
        risk_score: risk,
        positivity_score: 0,
        reasons: reasons.iter().map(|r| r.to_string()).collect(),
        behavioral_flags: Default::default(),
    }
}

/// An active alert as the store would return it
pub fn active_alert(level: Level, risk: u32, triggered_at: DateTime<Utc>) -> Alert {
    Alert {
        id: 1,
        user_id: USER.to_string(),
        scope: Scope::Expense,
        area_key: "expense_food".to_string(),
        page: "expenses".to_string(),
        title: "Expense alert – Food".to_string(),
        level,
        status: AlertStatus::Active,
        last_risk_score: risk,
        last_positivity_score: 0,
        last_transaction_id: Some("t0".to_string()),
        last_triggered_at: triggered_at,
        cool_down_until: triggered_at,
        trigger_count: 1,
        resolved_count: 0,
        ignored_count: 0,
        meta: AlertMeta {
            last_reasons: vec!["old reason".to_string()],
            ..Default::default()
        },
        resolved_at: None,
        resolved_by: None,
        resolution_reason: None,
        version: 1,
        created_at: triggered_at,
        updated_at: triggered_at,
    }
}

/// One request received by [`MockNotifyServer`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub body: Value,
}

#[derive(Clone)]
struct MockState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    status: StatusCode,
}

/// Mock insight and email service for notifier tests
pub struct MockNotifyServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockNotifyServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::start_with_status(StatusCode::OK).await
    }

    /// A server that records requests but answers 500
    pub async fn start_failing() -> Self {
        Self::start_with_status(StatusCode::INTERNAL_SERVER_ERROR).await
    }

    async fn start_with_status(status: StatusCode) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            requests: requests.clone(),
            status,
        };
        let app = Router::new()
            .route("/ai/insights", post(handle_notify))
            .route("/email/coach", post(handle_notify))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            requests,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockNotifyServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_notify(
    State(state): State<MockState>,
    uri: Uri,
    Json(body): Json<Value>,
) -> StatusCode {
    state.requests.lock().unwrap().push(RecordedRequest {
        path: uri.path().to_string(),
        body,
    });
    state.status
}
