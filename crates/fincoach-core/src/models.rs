//! Domain models for fincoach

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of money movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
    Saving,
    Investment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Saving => "saving",
            Self::Investment => "investment",
        }
    }

    /// Saving and investment both count as putting money aside
    pub fn is_set_aside(&self) -> bool {
        matches!(self, Self::Saving | Self::Investment)
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "saving" | "savings" => Ok(Self::Saving),
            "investment" | "investments" => Ok(Self::Investment),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded transaction (immutable input to the engine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub category: String,
    pub amount: f64,
    pub occurred_at: DateTime<Utc>,
    /// Free-form note; contributions mentioning "goal" count as goal-tagged
    #[serde(default)]
    pub note: Option<String>,
}

impl Transaction {
    pub fn is_expense(&self) -> bool {
        self.tx_type == TransactionType::Expense
    }

    /// Case-insensitive category comparison
    pub fn in_category(&self, category: &str) -> bool {
        self.category.eq_ignore_ascii_case(category)
    }

    pub fn is_goal_tagged(&self) -> bool {
        self.tx_type.is_set_aside()
            && self
                .note
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains("goal"))
    }
}

/// A transaction as submitted by the ingestion path, id optional
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    #[serde(default)]
    pub id: Option<String>,
    pub user_id: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    #[serde(default)]
    pub category: String,
    pub amount: f64,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
}

impl NewTransaction {
    /// Stable id derived from the transaction contents
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.user_id.as_bytes());
        hasher.update(self.tx_type.as_str().as_bytes());
        hasher.update(self.category.to_lowercase().as_bytes());
        hasher.update(format!("{:.2}", self.amount).as_bytes());
        hasher.update(self.occurred_at.to_rfc3339().as_bytes());
        hex::encode(&hasher.finalize()[..12])
    }

    pub fn into_transaction(self) -> Transaction {
        let id = match &self.id {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => self.fingerprint(),
        };
        let category = if self.category.trim().is_empty() {
            "general".to_string()
        } else {
            self.category
        };
        Transaction {
            id,
            user_id: self.user_id,
            tx_type: self.tx_type,
            category,
            amount: self.amount,
            occurred_at: self.occurred_at,
            note: self.note,
        }
    }
}

/// Direction of monthly income relative to spending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IncomeTrend {
    Up,
    #[default]
    Stable,
    Down,
}

impl IncomeTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Stable => "stable",
            Self::Down => "down",
        }
    }
}

impl std::str::FromStr for IncomeTrend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" | "increasing" => Ok(Self::Up),
            "stable" => Ok(Self::Stable),
            "down" | "decreasing" => Ok(Self::Down),
            _ => Err(format!("Unknown income trend: {}", s)),
        }
    }
}

/// Aggregate view of a user's finances, read-only for the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub monthly_income: f64,
    pub monthly_expense: f64,
    pub monthly_saving: f64,
    pub monthly_investment: f64,
    pub savings_rate: f64,
    pub investment_rate: f64,
    /// Average absolute transaction size over the current month
    pub avg_transaction: f64,
    /// Share of monthly expense per lower-cased category, in percent
    pub category_percents: HashMap<String, f64>,
    pub income_trend: IncomeTrend,
    pub net_worth: f64,
    pub liquid_savings: f64,
    pub invested_amount: f64,
    pub total_transactions: u64,
    pub active_goals: u32,
}

impl Stats {
    pub fn category_percent(&self, category: &str) -> f64 {
        self.category_percents
            .get(&category.to_lowercase())
            .copied()
            .unwrap_or(0.0)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            monthly_income: self.monthly_income,
            monthly_expense: self.monthly_expense,
            savings_rate: self.savings_rate,
            investment_rate: self.investment_rate,
            net_worth: self.net_worth,
        }
    }
}

/// Recent transaction windows, each sorted newest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct History {
    /// Expenses from the last 30 days
    pub recent_expenses: Vec<Transaction>,
    /// Income from the last 6 months
    pub recent_income: Vec<Transaction>,
    /// Savings and investments from the last 30 days
    pub recent_savings: Vec<Transaction>,
}

/// Everything the engine reads for one transaction, supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationInput {
    pub transaction: Transaction,
    #[serde(default)]
    pub stats: Stats,
    #[serde(default)]
    pub history: History,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub profile: BehaviorProfile,
}

impl EvaluationInput {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            stats: Stats::default(),
            history: History::default(),
            goals: Vec::new(),
            profile: BehaviorProfile::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    #[default]
    Active,
    Completed,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl std::str::FromStr for GoalStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Unknown goal status: {}", s)),
        }
    }
}

/// A savings target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub target_amount: f64,
    #[serde(default)]
    pub current_amount: f64,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub status: GoalStatus,
}

impl Goal {
    /// Progress toward the target, in percent
    pub fn progress(&self) -> f64 {
        if self.target_amount <= 0.0 {
            return 0.0;
        }
        self.current_amount / self.target_amount * 100.0
    }

    pub fn remaining(&self) -> f64 {
        self.target_amount - self.current_amount
    }

    pub fn is_open(&self) -> bool {
        self.status == GoalStatus::Active && self.remaining() > 0.0
    }
}

/// Long-running behavior scores, each bounded to 0..=100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BehaviorProfile {
    pub discipline_score: i32,
    pub impulse_score: i32,
    pub consistency_index: i32,
    pub risk_index: i32,
    pub saving_streak: u32,
}

impl Default for BehaviorProfile {
    fn default() -> Self {
        Self {
            discipline_score: 50,
            impulse_score: 50,
            consistency_index: 50,
            risk_index: 50,
            saving_streak: 0,
        }
    }
}

impl BehaviorProfile {
    /// Fold one transaction into the profile
    pub fn apply(&mut self, tx: &Transaction) {
        match tx.tx_type {
            TransactionType::Saving | TransactionType::Investment => {
                self.discipline_score += 2;
                self.consistency_index += 1;
                self.saving_streak += 1;
                if tx.tx_type == TransactionType::Saving {
                    self.impulse_score -= 1;
                }
            }
            TransactionType::Expense => {
                if tx.amount > 1000.0 {
                    self.impulse_score += 1;
                    self.saving_streak = 0;
                }
            }
            TransactionType::Income => {
                self.consistency_index += 1;
            }
        }
        self.discipline_score = self.discipline_score.clamp(0, 100);
        self.impulse_score = self.impulse_score.clamp(0, 100);
        self.consistency_index = self.consistency_index.clamp(0, 100);
        self.risk_index = self.risk_index.clamp(0, 100);
    }
}

/// Severity of a transaction event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    #[default]
    Low,
    Medium,
    High,
    Critical,
    Positive,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
            Self::Positive => "POSITIVE",
        }
    }

    fn severity(&self) -> u8 {
        match self {
            Self::Low | Self::Positive => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    /// Raise to at least `floor` on the risk ladder
    pub fn at_least(self, floor: Level) -> Level {
        if floor.severity() > self.severity() {
            floor
        } else {
            self
        }
    }

    /// Levels surfaced in the user's active alert list
    pub fn is_notable(&self) -> bool {
        matches!(self, Self::High | Self::Critical | Self::Positive)
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            "POSITIVE" => Ok(Self::Positive),
            _ => Err(format!("Unknown level: {}", s)),
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Named behavioral booleans carried on a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BehavioralFlags {
    pub habit_broken: bool,
    pub goal_impact: bool,
    pub milestone: bool,
    pub micro_leak: bool,
    pub behavior_drift: bool,
    pub spending_burst: bool,
    pub improvement_trend: bool,
    pub recovery: bool,
}

impl BehavioralFlags {
    pub fn any(&self) -> bool {
        self.habit_broken
            || self.goal_impact
            || self.milestone
            || self.micro_leak
            || self.behavior_drift
            || self.spending_burst
            || self.improvement_trend
            || self.recovery
    }
}

/// Scoring output for one transaction
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub level: Level,
    pub risk_score: u32,
    pub positivity_score: u32,
    pub reasons: Vec<String>,
    pub behavioral_flags: BehavioralFlags,
}

impl Decision {
    /// LOW, no scores, no reasons
    pub fn fail_closed() -> Self {
        Self::default()
    }
}

/// Top-level financial area of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Expense,
    Income,
    Goal,
    Investment,
    Saving,
    Overall,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
            Self::Goal => "goal",
            Self::Investment => "investment",
            Self::Saving => "saving",
            Self::Overall => "overall",
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "expense" => Ok(Self::Expense),
            "income" => Ok(Self::Income),
            "goal" => Ok(Self::Goal),
            "investment" => Ok(Self::Investment),
            "saving" => Ok(Self::Saving),
            "overall" => Ok(Self::Overall),
            _ => Err(format!("Unknown scope: {}", s)),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stable grouping identity for repeated events of the same kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertArea {
    pub scope: Scope,
    pub area_key: String,
    pub page: String,
    pub title: String,
}

/// Lock and lookup key of an alert
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertIdentity {
    pub user_id: String,
    pub scope: Scope,
    pub area_key: String,
}

impl AlertIdentity {
    pub fn new(user_id: &str, area: &AlertArea) -> Self {
        Self {
            user_id: user_id.to_string(),
            scope: area.scope,
            area_key: area.area_key.clone(),
        }
    }
}

impl std::fmt::Display for AlertIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.user_id, self.scope, self.area_key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "resolved" => Ok(Self::Resolved),
            _ => Err(format!("Unknown alert status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedBy {
    System,
    User,
}

impl ResolvedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

impl std::str::FromStr for ResolvedBy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            _ => Err(format!("Unknown resolver: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionReason {
    BehaviorImproved,
    MetricsImproved,
    GoalCompleted,
    UserAcknowledged,
}

impl ResolutionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BehaviorImproved => "behavior_improved",
            Self::MetricsImproved => "metrics_improved",
            Self::GoalCompleted => "goal_completed",
            Self::UserAcknowledged => "user_acknowledged",
        }
    }
}

impl std::str::FromStr for ResolutionReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "behavior_improved" => Ok(Self::BehaviorImproved),
            "metrics_improved" => Ok(Self::MetricsImproved),
            "goal_completed" => Ok(Self::GoalCompleted),
            "user_acknowledged" => Ok(Self::UserAcknowledged),
            _ => Err(format!("Unknown resolution reason: {}", s)),
        }
    }
}

impl std::fmt::Display for ResolutionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The stats fields frozen onto an alert when it fires
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsSnapshot {
    pub monthly_income: f64,
    pub monthly_expense: f64,
    pub savings_rate: f64,
    pub investment_rate: f64,
    pub net_worth: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertMeta {
    pub last_reasons: Vec<String>,
    pub last_category: String,
    pub last_type: Option<TransactionType>,
    pub last_amount: f64,
    pub behavioral_flags: BehavioralFlags,
    pub stats_snapshot: StatsSnapshot,
}

/// A persisted alert for one `(user, scope, area_key)` identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: i64,
    pub user_id: String,
    pub scope: Scope,
    pub area_key: String,
    pub page: String,
    pub title: String,
    pub level: Level,
    pub status: AlertStatus,
    pub last_risk_score: u32,
    pub last_positivity_score: u32,
    pub last_transaction_id: Option<String>,
    pub last_triggered_at: DateTime<Utc>,
    pub cool_down_until: DateTime<Utc>,
    pub trigger_count: u32,
    pub resolved_count: u32,
    pub ignored_count: u32,
    pub meta: AlertMeta,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<ResolvedBy>,
    pub resolution_reason: Option<ResolutionReason>,
    /// Optimistic concurrency token, bumped on every save
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    pub fn identity(&self) -> AlertIdentity {
        AlertIdentity {
            user_id: self.user_id.clone(),
            scope: self.scope,
            area_key: self.area_key.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }

    /// Close this instance; terminal
    pub fn resolve(&mut self, by: ResolvedBy, reason: ResolutionReason, now: DateTime<Utc>) {
        self.status = AlertStatus::Resolved;
        self.resolved_at = Some(now);
        self.resolved_by = Some(by);
        self.resolution_reason = Some(reason);
        self.resolved_count += 1;
        self.updated_at = now;
    }
}

/// Fields of an alert before the store assigns id and version
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub user_id: String,
    pub area: AlertArea,
    pub level: Level,
    pub last_risk_score: u32,
    pub last_positivity_score: u32,
    pub last_transaction_id: Option<String>,
    pub last_triggered_at: DateTime<Utc>,
    pub cool_down_until: DateTime<Utc>,
    pub trigger_count: u32,
    pub resolved_count: u32,
    pub ignored_count: u32,
    pub meta: AlertMeta,
}
